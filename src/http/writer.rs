use crate::http::response::Response;

/// Terminating chunk of a chunked-encoded response.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Serializes the status line and header section.
///
/// Framing headers are supplied automatically unless the application already
/// set them: `Transfer-Encoding: chunked` for streamed responses,
/// `Content-Length` otherwise.
pub fn encode_head(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::new();

    let status_line = format!(
        "{} {} {}\r\n",
        resp.version().as_str(),
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    for (k, v) in resp.headers() {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    if resp.is_chunked() {
        if resp.header("Transfer-Encoding").is_none() {
            buf.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
        }
    } else if resp.header("Content-Length").is_none() {
        buf.extend_from_slice(format!("Content-Length: {}\r\n", resp.body().len()).as_bytes());
    }

    buf.extend_from_slice(b"\r\n");
    buf
}

/// Serializes a complete non-chunked response.
pub fn encode_response(resp: &Response) -> Vec<u8> {
    let mut buf = encode_head(resp);
    buf.extend_from_slice(resp.body());
    buf
}

/// Frames one chunk of a chunked-encoded body. Empty input encodes to
/// nothing, since a zero-length chunk would terminate the stream.
pub fn encode_chunk(data: &[u8]) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }
    let mut buf = format!("{:x}\r\n", data.len()).into_bytes();
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
    buf
}
