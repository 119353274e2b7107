use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::http::middleware::{Flow, Middleware};
use crate::http::parser::{Limits, Parser};
use crate::http::request::{Parsed, Request};
use crate::http::response::Response;
use crate::http::writer::{LAST_CHUNK, encode_chunk, encode_head, encode_response};

/// Most responses that may be in flight on one connection at a time. The
/// worker stops pulling new requests once this many are issued but not yet
/// fully written.
pub const MAX_PIPELINE: usize = 8;

/// State shared between the intake path, the worker and the writer. The
/// parser lives under the same lock as the wait predicate, so byte intake and
/// stage transitions never race the worker.
struct Inner {
    parser: Parser,
    /// In-flight responses, always in `[0, MAX_PIPELINE]`.
    queued: usize,
    closed: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    wake: Notify,
}

impl Shared {
    fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        drop(inner);
        self.wake.notify_one();
    }
}

/// One ordered write handed to the writer task. `end_of_response` marks the
/// final bytes of a response, at which point the pipelining depth drops.
struct WriteOp {
    bytes: Vec<u8>,
    end_of_response: bool,
}

/// A single client connection.
///
/// `run` splits the socket and drives three cooperating tasks:
///
/// - the intake loop reads raw bytes and feeds the parser,
/// - the worker runs the Idle/Streaming processing loop,
/// - the writer owns the write half and performs ordered asynchronous writes.
///
/// The worker never awaits a write; it hands bytes to the writer and
/// immediately reconsiders its state, exactly like handing a buffer to an
/// event loop. Teardown joins the worker and then the writer, so nothing the
/// worker could still touch is freed early and writes already issued are
/// drained before the socket goes down.
pub struct Connection {
    stream: TcpStream,
    chain: Arc<dyn Middleware>,
    limits: Limits,
}

impl Connection {
    pub fn new(stream: TcpStream, chain: Arc<dyn Middleware>, limits: Limits) -> Self {
        Self {
            stream,
            chain,
            limits,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let Connection {
            stream,
            chain,
            limits,
        } = self;
        let (mut rd, wr) = stream.into_split();

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                parser: Parser::new(limits),
                queued: 0,
                closed: false,
            }),
            wake: Notify::new(),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(wr, rx, Arc::clone(&shared)));
        let worker = tokio::spawn(worker_loop(Arc::clone(&shared), chain, tx));

        let mut buf = [0u8; 4096];
        let result = loop {
            match rd.read(&mut buf).await {
                Ok(0) => {
                    tracing::debug!("peer closed the connection");
                    break Ok(());
                }
                Ok(n) => {
                    let produced = {
                        let mut inner = shared.inner.lock().unwrap();
                        inner.parser.push(&buf[..n])
                    };
                    if produced > 0 {
                        shared.wake.notify_one();
                    }
                }
                Err(e) => break Err(anyhow::Error::new(e).context("socket read failed")),
            }
        };

        // Close sequence: set the flag, wake the worker, then join both tasks
        // before the socket halves drop. The worker exits and drops its
        // sender; the writer drains the writes already issued and shuts the
        // stream down.
        shared.close();
        let _ = worker.await;
        let _ = writer.await;

        result
    }
}

/// Records a new in-flight response. Returns false when the connection is
/// closing, in which case nothing should be written.
fn begin_response(shared: &Shared) -> bool {
    let mut inner = shared.inner.lock().unwrap();
    if inner.closed {
        return false;
    }
    inner.queued += 1;
    true
}

fn issue(tx: &UnboundedSender<WriteOp>, bytes: Vec<u8>, end_of_response: bool) {
    let _ = tx.send(WriteOp {
        bytes,
        end_of_response,
    });
}

/// The processing loop: Idle until a complete request (or a pending
/// continuation) exists and the pipeline has room, Streaming while a chunked
/// response is mid-flight. The continuation triple is local to this task; the
/// intake path never touches it.
async fn worker_loop(shared: Arc<Shared>, chain: Arc<dyn Middleware>, tx: UnboundedSender<WriteOp>) {
    let mut streaming: Option<(Request, Response, Arc<dyn Middleware>)> = None;

    loop {
        // Condition-variable wait. The predicate runs under the lock, the
        // await does not.
        loop {
            {
                let inner = shared.inner.lock().unwrap();
                if inner.closed {
                    return;
                }
                if inner.queued < MAX_PIPELINE
                    && (streaming.is_some() || inner.parser.has_complete_request())
                {
                    break;
                }
            }
            shared.wake.notified().await;
        }

        // Streaming: re-enter through the retained cursor, never the chain
        // head, and handle nothing else this wake-up.
        if let Some((req, mut resp, cursor)) = streaming.take() {
            match cursor.call(&req, &mut resp) {
                Ok(Flow::Continue(next)) if !resp.finished() => {
                    let mut bytes = Vec::new();
                    for chunk in resp.take_chunks() {
                        bytes.extend_from_slice(&encode_chunk(&chunk));
                    }
                    if !bytes.is_empty() {
                        issue(&tx, bytes, false);
                    }
                    streaming = Some((req, resp, next));
                }
                Ok(_) => {
                    resp.finish();
                    let mut bytes = Vec::new();
                    for chunk in resp.take_chunks() {
                        bytes.extend_from_slice(&encode_chunk(&chunk));
                    }
                    bytes.extend_from_slice(LAST_CHUNK);
                    issue(&tx, bytes, true);
                }
                Err(err) => {
                    // The head is already on the wire; all we can do is
                    // terminate the stream cleanly.
                    tracing::error!(error = %err, "middleware failed mid-stream, ending chunked response");
                    resp.finish();
                    issue(&tx, LAST_CHUNK.to_vec(), true);
                }
            }
            // The wait predicate stays true while a continuation is pending,
            // so give the intake and writer tasks a turn between chunks.
            tokio::task::yield_now().await;
            continue;
        }

        let parsed = {
            let mut inner = shared.inner.lock().unwrap();
            inner.parser.yield_request()
        };
        let Some(parsed) = parsed else { continue };

        match parsed {
            Parsed::Malformed(err) => {
                tracing::warn!(
                    status = err.status().as_u16(),
                    reason = %err.reason(),
                    "rejecting malformed request"
                );
                let resp = Response::from_error(&err);
                if begin_response(&shared) {
                    issue(&tx, encode_response(&resp), true);
                }
            }
            Parsed::Request(req) => {
                tracing::debug!(method = ?req.method, target = %req.target, "dispatching request");
                let mut resp = Response::new(req.version);
                match chain.call(&req, &mut resp) {
                    Err(err) => {
                        tracing::warn!(
                            status = err.status().as_u16(),
                            reason = %err.reason(),
                            method = ?req.method,
                            target = %req.target,
                            "request dispatch failed"
                        );
                        let resp = Response::from_error(&err);
                        if begin_response(&shared) {
                            issue(&tx, encode_response(&resp), true);
                        }
                    }
                    Ok(flow) => {
                        if resp.is_chunked() {
                            let cursor = match flow {
                                Flow::Continue(c) if !resp.finished() => Some(c),
                                _ => None,
                            };
                            let mut bytes = encode_head(&resp);
                            for chunk in resp.take_chunks() {
                                bytes.extend_from_slice(&encode_chunk(&chunk));
                            }
                            match cursor {
                                Some(c) => {
                                    if begin_response(&shared) {
                                        issue(&tx, bytes, false);
                                        streaming = Some((req, resp, c));
                                    }
                                }
                                None => {
                                    resp.finish();
                                    bytes.extend_from_slice(LAST_CHUNK);
                                    if begin_response(&shared) {
                                        issue(&tx, bytes, true);
                                    }
                                }
                            }
                        } else {
                            resp.finish();
                            if begin_response(&shared) {
                                issue(&tx, encode_response(&resp), true);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Owns the write half. Ops arrive in issue order over the channel and are
/// written back-to-back; the depth counter drops when a response's final
/// bytes hit the socket. A write failure flags the connection closed but the
/// channel is still drained so the depth accounting stays consistent.
async fn write_loop(mut wr: OwnedWriteHalf, mut rx: UnboundedReceiver<WriteOp>, shared: Arc<Shared>) {
    let mut failed = false;
    while let Some(op) = rx.recv().await {
        if !failed {
            if let Err(e) = wr.write_all(&op.bytes).await {
                tracing::error!(error = %e, "socket write failed");
                failed = true;
                shared.close();
            }
        }
        if op.end_of_response {
            {
                let mut inner = shared.inner.lock().unwrap();
                if inner.queued > 0 {
                    inner.queued -= 1;
                }
            }
            shared.wake.notify_one();
        }
    }
    if !failed {
        let _ = wr.shutdown().await;
    }
}
