use bytes::{Buf, BytesMut};

use crate::http::error::HttpError;

/// Append-only intake buffer consumed incrementally by the parser.
///
/// The intake path appends raw socket bytes; the parser consumes lines and
/// byte runs from the front. Bytes left over after a completed request stay in
/// place, which is what makes pipelined requests fall out for free.
pub struct RecvBuffer {
    buf: BytesMut,
}

impl RecvBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discards everything buffered. Used when a parse error invalidates the
    /// in-progress message.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Consumes one CRLF-terminated line, without the terminator.
    ///
    /// Returns `Ok(None)` when no full line has arrived yet. A line that is
    /// not valid UTF-8 is consumed and reported as a 400; request heads are
    /// text by definition.
    pub fn read_line(&mut self) -> Result<Option<String>, HttpError> {
        let Some(pos) = self.buf.windows(2).position(|w| w == b"\r\n") else {
            return Ok(None);
        };
        let line = self.buf.split_to(pos);
        self.buf.advance(2);
        let line = std::str::from_utf8(&line)
            .map_err(|_| HttpError::bad_request("request head is not valid UTF-8"))?;
        Ok(Some(line.to_string()))
    }

    /// Consumes exactly `n` bytes if that many are available.
    pub fn take(&mut self, n: usize) -> Option<Vec<u8>> {
        if self.buf.len() < n {
            return None;
        }
        Some(self.buf.split_to(n).to_vec())
    }
}

impl Default for RecvBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_line_waits_for_terminator() {
        let mut buf = RecvBuffer::new();
        buf.push(b"GET / HT");
        assert_eq!(buf.read_line().unwrap(), None);

        buf.push(b"TP/1.1\r\nrest");
        assert_eq!(buf.read_line().unwrap().as_deref(), Some("GET / HTTP/1.1"));
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn take_requires_full_run() {
        let mut buf = RecvBuffer::new();
        buf.push(b"hel");
        assert_eq!(buf.take(5), None);
        buf.push(b"lo!");
        assert_eq!(buf.take(5).unwrap(), b"hello".to_vec());
        assert_eq!(buf.len(), 1);
    }
}
