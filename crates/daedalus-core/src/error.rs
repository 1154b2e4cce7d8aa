//! Error types for Daedalus.
//!
//! Two layers of errors flow through a request:
//!
//! - [`HttpError`] is an error that already knows the HTTP status it maps to,
//!   whether its message may be shown to clients, and any headers that should
//!   accompany the error response (for example `Allow` on a 405).
//! - [`Error`] is the type every middleware returns. It wraps [`HttpError`]
//!   alongside I/O, serialization and opaque application failures, and knows
//!   how to derive a status for each of them.
//!
//! # Status derivation
//!
//! | Variant | Status |
//! |---|---|
//! | `Http` | the error's own status |
//! | `InvalidRequest` | `400 Bad Request` |
//! | `Io` with `ErrorKind::NotFound` | `404 Not Found` |
//! | everything else | `500 Internal Server Error` |

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error carrying an explicit HTTP status.
///
/// Messages of client errors (status below 500) are exposed to the client
/// by default; server errors are not, and the canonical reason phrase is sent
/// instead.
///
/// # Example
///
/// ```
/// use daedalus_core::HttpError;
/// use http::StatusCode;
///
/// let err = HttpError::with_message(StatusCode::NOT_FOUND, "no such chore");
/// assert_eq!(err.status(), StatusCode::NOT_FOUND);
/// assert!(err.expose());
/// assert_eq!(err.to_string(), "no such chore");
/// ```
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
    expose: bool,
    headers: HeaderMap,
}

impl HttpError {
    /// Creates an error whose message is the canonical reason phrase.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self::with_message(status, reason_phrase(status))
    }

    /// Creates an error with a custom message.
    #[must_use]
    pub fn with_message(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            expose: status.as_u16() < 500,
            headers: HeaderMap::new(),
        }
    }

    /// `400 Bad Request`.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_message(StatusCode::BAD_REQUEST, message)
    }

    /// `404 Not Found`.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    /// `405 Method Not Allowed`.
    #[must_use]
    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED)
    }

    /// `501 Not Implemented`.
    #[must_use]
    pub fn not_implemented() -> Self {
        Self::new(StatusCode::NOT_IMPLEMENTED)
    }

    /// Overrides whether the message is shown to the client.
    #[must_use]
    pub fn exposed(mut self, expose: bool) -> Self {
        self.expose = expose;
        self
    }

    /// Attaches a header that the error response must carry.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns the HTTP status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns whether the message may be sent to the client.
    #[must_use]
    pub fn expose(&self) -> bool {
        self.expose
    }

    /// Returns the headers attached to this error.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Standard error type returned by middleware.
#[derive(Debug, Error)]
pub enum Error {
    /// An error with an explicit HTTP status.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The inbound request could not be turned into a context.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A JSON body could not be encoded or decoded.
    #[error("body serialization failed: {0}")]
    Body(#[from] serde_json::Error),

    /// An HTTP message could not be assembled.
    #[error("failed to build HTTP message: {0}")]
    Message(#[from] http::Error),

    /// An I/O error. `NotFound` maps to a 404.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Any other application error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Creates an opaque error from a message.
    pub fn msg(message: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        Self::Other(anyhow::Error::msg(message))
    }

    /// Returns the HTTP status this error should produce.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Http(err) => err.status(),
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Io(err) if err.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns whether the message may be sent to the client.
    #[must_use]
    pub fn expose(&self) -> bool {
        match self {
            Self::Http(err) => err.expose(),
            Self::InvalidRequest(_) => true,
            _ => false,
        }
    }

    /// Returns headers attached to the error, if any.
    #[must_use]
    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            Self::Http(err) => Some(err.headers()),
            _ => None,
        }
    }

    /// Returns the body text a client should see for this error.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Http(err) if err.expose() => err.message().to_string(),
            Self::InvalidRequest(message) => message.clone(),
            _ => reason_phrase(self.status()).to_string(),
        }
    }
}

/// Returns the canonical reason phrase for a status.
#[must_use]
pub fn reason_phrase(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown Status")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_defaults_to_reason_phrase() {
        let err = HttpError::new(StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(err.message(), "Method Not Allowed");
        assert!(err.expose());
    }

    #[test]
    fn test_server_errors_are_not_exposed() {
        let err = HttpError::with_message(StatusCode::BAD_GATEWAY, "upstream exploded");
        assert!(!err.expose());

        let err: Error = err.into();
        assert_eq!(err.client_message(), "Bad Gateway");
    }

    #[test]
    fn test_exposed_override() {
        let err = HttpError::with_message(StatusCode::SERVICE_UNAVAILABLE, "maintenance").exposed(true);
        let err: Error = err.into();
        assert_eq!(err.client_message(), "maintenance");
    }

    #[test]
    fn test_status_derivation() {
        let http: Error = HttpError::not_implemented().into();
        assert_eq!(http.status(), StatusCode::NOT_IMPLEMENTED);

        let missing: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let denied: Error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no").into();
        assert_eq!(denied.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let other = Error::msg("boom");
        assert_eq!(other.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(other.client_message(), "Internal Server Error");
    }

    #[test]
    fn test_error_headers() {
        let err: Error = HttpError::method_not_allowed()
            .with_header(http::header::ALLOW, HeaderValue::from_static("GET, HEAD"))
            .into();

        let headers = err.headers().unwrap();
        assert_eq!(headers.get(http::header::ALLOW).unwrap(), "GET, HEAD");
        assert!(Error::msg("x").headers().is_none());
    }

    #[test]
    fn test_invalid_request_is_bad_request() {
        let err = Error::InvalidRequest("bad host header".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.expose());
        assert_eq!(err.client_message(), "bad host header");
    }
}
