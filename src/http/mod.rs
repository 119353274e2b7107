//! HTTP/1.1 connection core.
//!
//! Each client connection is handled by three cooperating tasks: an intake
//! loop feeding socket bytes into a resumable parser, a worker running the
//! request-processing loop, and a writer performing ordered asynchronous
//! writes. Requests are pipelined up to a fixed depth and always answered in
//! arrival order.
//!
//! # Submodules
//!
//! - **`buffer`**: append-only byte accumulator consumed by the parser
//! - **`parser`**: staged, resumable request parser with a FIFO output queue
//! - **`request`** / **`response`**: the request/response value types
//! - **`error`**: structured HTTP errors that become error responses
//! - **`middleware`**: chain-of-responsibility request processing
//! - **`connection`**: the per-connection orchestrator and close sequencing
//! - **`writer`**: response and chunk wire encoding
//!
//! # Worker state machine
//!
//! ```text
//!        ┌──────────┐  complete request pulled,
//!        │   Idle   │  response written
//!        └────┬─────┘ ───────────────────────┐
//!             │ chunked response,            │
//!             │ middleware continues         ▼
//!        ┌────┴──────┐                  stays Idle
//!        │ Streaming │ ← each wake-up re-invokes the retained
//!        └────┬──────┘   middleware cursor, writes one batch of chunks
//!             │ cursor reports done (or close requested)
//!             ▼
//!            Idle
//! ```
//!
//! Malformed requests and middleware failures each produce one error response
//! and the connection keeps serving; only socket-level failures or peer
//! disconnect end it.

pub mod buffer;
pub mod connection;
pub mod error;
pub mod middleware;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
