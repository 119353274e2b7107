//! Loopback tests for the connection core: pipelining, error recovery,
//! chunked streaming and teardown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kestrel::http::connection::{Connection, MAX_PIPELINE};
use kestrel::http::error::HttpError;
use kestrel::http::middleware::{Chain, Flow, Middleware};
use kestrel::http::parser::Limits;
use kestrel::http::request::Request;
use kestrel::http::response::Response;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const TICK: Duration = Duration::from_secs(5);

/// Accepts a single connection and runs it against the given chain.
async fn serve(chain: Arc<dyn Middleware>) -> (SocketAddr, JoinHandle<anyhow::Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await?;
        Connection::new(socket, chain, Limits::default()).run().await
    });
    (addr, handle)
}

fn echo_target(req: &Request, resp: &mut Response) -> Result<Flow, HttpError> {
    resp.set_header("Content-Type", "text/plain");
    resp.set_body(req.target.clone());
    Ok(Flow::Done)
}

fn find(hay: &[u8], needle: &[u8]) -> Option<usize> {
    hay.windows(needle.len()).position(|w| w == needle)
}

/// Reads exactly `n` Content-Length framed responses, returning
/// (status, body) pairs in wire order.
async fn read_responses(stream: &mut TcpStream, n: usize) -> Vec<(u16, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut out = Vec::new();
    let mut tmp = [0u8; 4096];

    while out.len() < n {
        while out.len() < n {
            let Some(pos) = find(&buf, b"\r\n\r\n") else {
                break;
            };
            let head = String::from_utf8(buf[..pos].to_vec()).unwrap();
            let status: u16 = head
                .lines()
                .next()
                .unwrap()
                .split_whitespace()
                .nth(1)
                .unwrap()
                .parse()
                .unwrap();
            let content_length: usize = head
                .lines()
                .filter_map(|l| l.split_once(':'))
                .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                .map(|(_, v)| v.trim().parse().unwrap())
                .unwrap_or(0);
            if buf.len() < pos + 4 + content_length {
                break;
            }
            let body = buf[pos + 4..pos + 4 + content_length].to_vec();
            buf.drain(..pos + 4 + content_length);
            out.push((status, body));
        }
        if out.len() == n {
            break;
        }

        let read = timeout(TICK, stream.read(&mut tmp))
            .await
            .expect("timed out waiting for responses")
            .unwrap();
        assert_ne!(read, 0, "connection closed before all responses arrived");
        buf.extend_from_slice(&tmp[..read]);
    }
    out
}

#[tokio::test]
async fn test_single_request_gets_response() {
    let (addr, handle) = serve(Arc::new(Chain::new().link(echo_target))).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"GET /hello HTTP/1.1\r\n\r\n").await.unwrap();

    let responses = read_responses(&mut client, 1).await;
    assert_eq!(responses[0].0, 200);
    assert_eq!(responses[0].1, b"/hello".to_vec());

    drop(client);
    timeout(TICK, handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_pipelined_requests_answered_in_order() {
    let (addr, handle) = serve(Arc::new(Chain::new().link(echo_target))).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let mut wire = Vec::new();
    for i in 0..MAX_PIPELINE {
        wire.extend_from_slice(format!("GET /{} HTTP/1.1\r\n\r\n", i).as_bytes());
    }
    client.write_all(&wire).await.unwrap();

    let responses = read_responses(&mut client, MAX_PIPELINE).await;
    for (i, (status, body)) in responses.iter().enumerate() {
        assert_eq!(*status, 200);
        assert_eq!(body, format!("/{}", i).as_bytes());
    }

    drop(client);
    timeout(TICK, handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_malformed_request_answered_then_parsing_resumes() {
    let (addr, _handle) = serve(Arc::new(Chain::new().link(echo_target))).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"XX\r\n\r\nGET /ok HTTP/1.1\r\n\r\n")
        .await
        .unwrap();

    let responses = read_responses(&mut client, 2).await;
    assert!((400..500).contains(&responses[0].0));
    assert_eq!(responses[1].0, 200);
    assert_eq!(responses[1].1, b"/ok".to_vec());
}

#[tokio::test]
async fn test_dispatch_error_becomes_error_response() {
    let faulty = |req: &Request, resp: &mut Response| -> Result<Flow, HttpError> {
        if req.target == "/boom" {
            return Err(HttpError::internal("handler exploded"));
        }
        echo_target(req, resp)
    };
    let (addr, _handle) = serve(Arc::new(Chain::new().link(faulty))).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"GET /boom HTTP/1.1\r\n\r\nGET /fine HTTP/1.1\r\n\r\n")
        .await
        .unwrap();

    // The failed dispatch produced one error response and the connection
    // kept serving.
    let responses = read_responses(&mut client, 2).await;
    assert_eq!(responses[0].0, 500);
    assert_eq!(responses[0].1, b"handler exploded".to_vec());
    assert_eq!(responses[1].0, 200);
    assert_eq!(responses[1].1, b"/fine".to_vec());
}

#[tokio::test]
async fn test_response_carries_request_version() {
    let (addr, _handle) = serve(Arc::new(Chain::new().link(echo_target))).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"GET /v HTTP/1.0\r\n\r\n").await.unwrap();

    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    while find(&buf, b"\r\n\r\n").is_none() {
        let read = timeout(TICK, client.read(&mut tmp)).await.unwrap().unwrap();
        assert_ne!(read, 0);
        buf.extend_from_slice(&tmp[..read]);
    }
    assert!(buf.starts_with(b"HTTP/1.0 200 OK\r\n"));
}

/// Streams a fixed number of chunks, one per invocation, through successor
/// cursors.
struct Countdown {
    remaining: u32,
}

impl Middleware for Countdown {
    fn call(&self, _req: &Request, resp: &mut Response) -> Result<Flow, HttpError> {
        resp.set_chunked();
        resp.push_chunk(format!("tick{};", self.remaining));
        if self.remaining <= 1 {
            resp.finish();
            Ok(Flow::Done)
        } else {
            Ok(Flow::Continue(Arc::new(Countdown {
                remaining: self.remaining - 1,
            })))
        }
    }
}

#[tokio::test]
async fn test_chunked_response_streams_to_completion() {
    let (addr, handle) = serve(Arc::new(Chain::new().link_shared(
        Arc::new(Countdown { remaining: 3 }) as Arc<dyn Middleware>,
    )))
    .await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"GET /stream HTTP/1.1\r\n\r\n").await.unwrap();

    // Read until the terminating chunk.
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    while find(&buf, b"0\r\n\r\n").is_none() {
        let read = timeout(TICK, client.read(&mut tmp))
            .await
            .expect("stream never terminated")
            .unwrap();
        assert_ne!(read, 0);
        buf.extend_from_slice(&tmp[..read]);
    }

    let text = String::from_utf8_lossy(&buf);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Transfer-Encoding: chunked\r\n"));

    // Each tick appears exactly once and in countdown order: intermediate
    // wake-ups resumed the cursor instead of restarting the chain.
    let ticks: Vec<_> = ["tick3;", "tick2;", "tick1;"]
        .iter()
        .map(|t| {
            assert_eq!(text.matches(t).count(), 1, "{} seen more than once", t);
            text.find(t).unwrap()
        })
        .collect();
    assert!(ticks[0] < ticks[1] && ticks[1] < ticks[2]);

    drop(client);
    timeout(TICK, handle).await.unwrap().unwrap().unwrap();
}

/// Never finishes; used to exercise close-while-streaming.
struct Firehose;

impl Middleware for Firehose {
    fn call(&self, _req: &Request, resp: &mut Response) -> Result<Flow, HttpError> {
        resp.set_chunked();
        resp.push_chunk("data;");
        Ok(Flow::Continue(Arc::new(Firehose)))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_while_streaming_tears_down() {
    let (addr, handle) = serve(Arc::new(Chain::new().link_shared(
        Arc::new(Firehose) as Arc<dyn Middleware>,
    )))
    .await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"GET /fire HTTP/1.1\r\n\r\n").await.unwrap();

    // Take a few bytes off the stream, then disconnect mid-stream.
    let mut tmp = [0u8; 64];
    let read = timeout(TICK, client.read(&mut tmp)).await.unwrap().unwrap();
    assert_ne!(read, 0);
    drop(client);

    // The connection must observe the close, stop streaming and release
    // everything; the result itself may be Ok (EOF) or a write error.
    let result = timeout(TICK, handle).await.expect("teardown never finished");
    let _ = result.unwrap();
}

#[tokio::test]
async fn test_mid_stream_error_terminates_chunked_response() {
    struct OneThenFail;
    impl Middleware for OneThenFail {
        fn call(&self, _req: &Request, resp: &mut Response) -> Result<Flow, HttpError> {
            resp.set_chunked();
            resp.push_chunk("first;");
            Ok(Flow::Continue(Arc::new(
                |_req: &Request, _resp: &mut Response| -> Result<Flow, HttpError> {
                    Err(HttpError::internal("stream source failed"))
                },
            )))
        }
    }

    let (addr, _handle) = serve(Arc::new(Chain::new().link_shared(
        Arc::new(OneThenFail) as Arc<dyn Middleware>,
    )))
    .await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"GET /s HTTP/1.1\r\n\r\n").await.unwrap();

    // The stream is closed out with the terminating chunk rather than left
    // hanging.
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    while find(&buf, b"0\r\n\r\n").is_none() {
        let read = timeout(TICK, client.read(&mut tmp))
            .await
            .expect("stream never terminated")
            .unwrap();
        assert_ne!(read, 0);
        buf.extend_from_slice(&tmp[..read]);
    }

    let text = String::from_utf8_lossy(&buf);
    assert_eq!(text.matches("first;").count(), 1);
}
