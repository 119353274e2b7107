//! Kestrel - small HTTP/1.1 server framework
//!
//! Core library: connection handling, request parsing, middleware dispatch.

pub mod config;
pub mod http;
pub mod server;
