use std::collections::{HashMap, VecDeque};

use crate::http::buffer::RecvBuffer;
use crate::http::error::HttpError;
use crate::http::request::{HttpVersion, Method, Parsed, Request};

/// Caps on a single request, enforced while it is being parsed.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Request head accumulated across stage steps.
struct Head {
    method: Method,
    target: String,
    version: HttpVersion,
    headers: HashMap<String, String>,
    header_bytes: usize,
}

/// The current sub-parser. Exactly one stage is current at a time; a
/// transition happens only when that stage completes or fails.
///
/// `Discard` is the error-recovery stage: it drops the remainder of a
/// malformed message's head (everything up to the next blank line) so that a
/// well-formed request sitting right behind it in the buffer parses cleanly.
enum Stage {
    StartLine,
    Headers(Head),
    Body(Head, usize),
    Discard,
}

/// Outcome of driving the current stage once.
#[derive(Debug, PartialEq, Eq)]
pub enum Progress {
    /// A request or error sentinel was queued; the worker should be woken.
    Queued,
    /// The stage transitioned but nothing completed yet.
    Advanced,
    /// Not enough buffered data to make progress.
    NeedMore,
}

enum StepOutcome {
    NeedMore,
    Advanced,
    Complete(Request),
}

/// Incremental HTTP/1.1 request parser.
///
/// Feed it byte slices as they arrive; completed requests (or malformed
/// sentinels) accumulate in a FIFO queue in arrival order. The active stage is
/// replaced by a fresh start-line stage after every completion or error, so
/// bytes already buffered for the next pipelined request are picked up
/// immediately.
pub struct Parser {
    buf: RecvBuffer,
    stage: Stage,
    complete: VecDeque<Parsed>,
    limits: Limits,
}

impl Parser {
    pub fn new(limits: Limits) -> Self {
        Self {
            buf: RecvBuffer::new(),
            stage: Stage::StartLine,
            complete: VecDeque::new(),
            limits,
        }
    }

    /// Appends newly received bytes and drives the state machine until it
    /// runs out of data. Returns how many items were queued, so the caller
    /// knows whether to wake the worker.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        self.buf.push(bytes);
        let mut produced = 0;
        loop {
            match self.process() {
                Progress::Queued => produced += 1,
                Progress::Advanced => {}
                Progress::NeedMore => break,
            }
        }
        produced
    }

    /// True iff at least one finished request or error sentinel is queued.
    pub fn has_complete_request(&self) -> bool {
        !self.complete.is_empty()
    }

    /// Removes and returns the oldest queued item.
    pub fn yield_request(&mut self) -> Option<Parsed> {
        self.complete.pop_front()
    }

    /// Drives exactly one stage step.
    pub fn process(&mut self) -> Progress {
        match self.step() {
            Ok(StepOutcome::NeedMore) => Progress::NeedMore,
            Ok(StepOutcome::Advanced) => Progress::Advanced,
            Ok(StepOutcome::Complete(req)) => {
                self.complete.push_back(Parsed::Request(req));
                self.stage = Stage::StartLine;
                Progress::Queued
            }
            Err(err) => {
                self.complete.push_back(Parsed::Malformed(err));
                self.stage = Stage::Discard;
                Progress::Queued
            }
        }
    }

    fn step(&mut self) -> Result<StepOutcome, HttpError> {
        match std::mem::replace(&mut self.stage, Stage::StartLine) {
            Stage::StartLine => self.step_start_line(),
            Stage::Headers(head) => self.step_headers(head),
            Stage::Body(head, len) => self.step_body(head, len),
            Stage::Discard => self.step_discard(),
        }
    }

    fn step_start_line(&mut self) -> Result<StepOutcome, HttpError> {
        let line = loop {
            match self.buf.read_line()? {
                None => {
                    if self.buf.len() > self.limits.max_header_bytes {
                        return Err(HttpError::headers_too_large(self.limits.max_header_bytes));
                    }
                    self.stage = Stage::StartLine;
                    return Ok(StepOutcome::NeedMore);
                }
                // Stray CRLF between messages; tolerated.
                Some(l) if l.is_empty() => continue,
                Some(l) => break l,
            }
        };

        let mut parts = line.split_whitespace();
        let method_tok = parts
            .next()
            .ok_or_else(|| HttpError::bad_request("empty request line"))?;
        let target = parts
            .next()
            .ok_or_else(|| HttpError::bad_request("request line is missing a target"))?;
        let version_tok = parts
            .next()
            .ok_or_else(|| HttpError::bad_request("request line is missing a protocol version"))?;

        let method = Method::from_token(method_tok)
            .ok_or_else(|| HttpError::bad_request(format!("unrecognized method {:?}", method_tok)))?;
        let version = HttpVersion::from_token(version_tok)
            .ok_or_else(|| HttpError::version_not_supported(version_tok))?;

        self.stage = Stage::Headers(Head {
            method,
            target: target.to_string(),
            version,
            headers: HashMap::new(),
            header_bytes: line.len() + 2,
        });
        Ok(StepOutcome::Advanced)
    }

    fn step_headers(&mut self, mut head: Head) -> Result<StepOutcome, HttpError> {
        loop {
            let Some(line) = self.buf.read_line()? else {
                if head.header_bytes + self.buf.len() > self.limits.max_header_bytes {
                    return Err(HttpError::headers_too_large(self.limits.max_header_bytes));
                }
                self.stage = Stage::Headers(head);
                return Ok(StepOutcome::NeedMore);
            };

            head.header_bytes += line.len() + 2;
            if head.header_bytes > self.limits.max_header_bytes {
                return Err(HttpError::headers_too_large(self.limits.max_header_bytes));
            }

            if line.is_empty() {
                // End of the header section; figure out how much body to wait for.
                let content_length = match head.headers.get("Content-Length") {
                    Some(v) => v
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| HttpError::bad_request("invalid Content-Length"))?,
                    None => 0,
                };
                if content_length > self.limits.max_body_bytes {
                    return Err(HttpError::payload_too_large(
                        content_length,
                        self.limits.max_body_bytes,
                    ));
                }
                self.stage = Stage::Body(head, content_length);
                return Ok(StepOutcome::Advanced);
            }

            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| HttpError::bad_request("malformed header line"))?;
            head.headers
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    fn step_body(&mut self, head: Head, content_length: usize) -> Result<StepOutcome, HttpError> {
        let Some(body) = self.buf.take(content_length) else {
            self.stage = Stage::Body(head, content_length);
            return Ok(StepOutcome::NeedMore);
        };
        Ok(StepOutcome::Complete(Request {
            method: head.method,
            target: head.target,
            version: head.version,
            headers: head.headers,
            body,
        }))
    }

    fn step_discard(&mut self) -> Result<StepOutcome, HttpError> {
        loop {
            match self.buf.read_line() {
                Ok(Some(l)) if l.is_empty() => {
                    self.stage = Stage::StartLine;
                    return Ok(StepOutcome::Advanced);
                }
                // Garbage, UTF-8 or not, goes down with the rest of the
                // malformed head.
                Ok(Some(_)) | Err(_) => continue,
                Ok(None) => {
                    // A head with no line breaks at all would otherwise pin
                    // the buffer while we wait for a terminator.
                    if self.buf.len() > self.limits.max_header_bytes {
                        self.buf.clear();
                    }
                    self.stage = Stage::Discard;
                    return Ok(StepOutcome::NeedMore);
                }
            }
        }
    }
}
