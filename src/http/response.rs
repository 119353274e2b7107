use std::collections::{HashMap, VecDeque};

use crate::http::error::HttpError;
use crate::http::request::HttpVersion;

/// HTTP status codes the core can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 201 Created
    Created,
    /// 204 No Content
    NoContent,
    /// 400 Bad Request
    BadRequest,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 413 Payload Too Large
    PayloadTooLarge,
    /// 431 Request Header Fields Too Large
    RequestHeaderFieldsTooLarge,
    /// 500 Internal Server Error
    InternalServerError,
    /// 501 Not Implemented
    NotImplemented,
    /// 505 HTTP Version Not Supported
    HttpVersionNotSupported,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use kestrel::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::NoContent => 204,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::RequestHeaderFieldsTooLarge => 431,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::HttpVersionNotSupported => 505,
        }
    }

    /// Returns the standard reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::NoContent => "No Content",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::RequestHeaderFieldsTooLarge => "Request Header Fields Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::HttpVersionNotSupported => "HTTP Version Not Supported",
        }
    }

    /// True for 4xx codes.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.as_u16())
    }
}

/// An outgoing HTTP response, mutated in place by the middleware chain.
///
/// Plain responses carry their whole body in `body`. Streamed responses are
/// switched to chunked mode with [`set_chunked`](Response::set_chunked) and
/// feed data through [`push_chunk`](Response::push_chunk); the connection
/// drains pending chunks after every middleware invocation. Once `finish` has
/// been called no further chunk data is accepted.
#[derive(Debug)]
pub struct Response {
    version: HttpVersion,
    pub status: StatusCode,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    chunks: VecDeque<Vec<u8>>,
    chunked: bool,
    finished: bool,
}

impl Response {
    /// Creates an empty 200 response carrying the originating request's
    /// protocol version.
    pub fn new(version: HttpVersion) -> Self {
        Self {
            version,
            status: StatusCode::Ok,
            headers: HashMap::new(),
            body: Vec::new(),
            chunks: VecDeque::new(),
            chunked: false,
            finished: false,
        }
    }

    /// Builds the response for a framework-level error: the error's status
    /// code with the reason string as body. Framework errors always answer in
    /// HTTP/1.1 since the offending request's version may be unknown.
    pub fn from_error(err: &HttpError) -> Self {
        let mut resp = Response::new(HttpVersion::Http11);
        resp.status = err.status();
        resp.set_header("Content-Type", "text/plain");
        resp.set_body(err.reason());
        resp.finish();
        resp
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|v| v.as_str())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Switches the response to chunked transfer encoding.
    pub fn set_chunked(&mut self) {
        self.chunked = true;
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// Queues a chunk of a streamed response. Ignored once the response is
    /// finished.
    pub fn push_chunk(&mut self, chunk: impl Into<Vec<u8>>) {
        if self.finished {
            return;
        }
        let chunk = chunk.into();
        if !chunk.is_empty() {
            self.chunks.push_back(chunk);
        }
    }

    /// Drains the chunks queued since the last drain, in push order.
    pub fn take_chunks(&mut self) -> Vec<Vec<u8>> {
        self.chunks.drain(..).collect()
    }

    /// Marks the response complete. No chunk pushed afterwards is accepted.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn finished(&self) -> bool {
        self.finished
    }
}
