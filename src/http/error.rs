use std::fmt;

use crate::http::response::StatusCode;

/// A structured HTTP-level failure: a status code plus a human-readable reason.
///
/// Raised by the parser for malformed messages and by middleware during
/// dispatch. Every `HttpError` ultimately becomes one error response on the
/// wire; none escape the connection boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    status: StatusCode,
    reason: String,
}

impl HttpError {
    pub fn new(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::BadRequest, reason)
    }

    pub fn payload_too_large(declared: usize, limit: usize) -> Self {
        Self::new(
            StatusCode::PayloadTooLarge,
            format!("declared body of {} bytes exceeds limit of {} bytes", declared, limit),
        )
    }

    pub fn headers_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::RequestHeaderFieldsTooLarge,
            format!("header section exceeds limit of {} bytes", limit),
        )
    }

    pub fn version_not_supported(token: &str) -> Self {
        Self::new(
            StatusCode::HttpVersionNotSupported,
            format!("unsupported protocol version {:?}", token),
        )
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::InternalServerError, reason)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.status.as_u16(), self.status.reason_phrase(), self.reason)
    }
}

impl std::error::Error for HttpError {}
