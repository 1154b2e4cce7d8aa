//! Test error types.

use daedalus_server::ServerError;
use thiserror::Error;

/// Errors that can occur while building, sending or reading a test request.
#[derive(Debug, Error)]
pub enum TestError {
    /// The request could not be assembled.
    #[error("Request build error: {0}")]
    RequestBuild(String),

    /// A header name or value is invalid.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The response body could not be read.
    #[error("Body read error: {0}")]
    BodyRead(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The application rejected the request before running middleware.
    #[error("Processing error: {0}")]
    Processing(#[from] ServerError),

    /// Middleware turned off responding, so there is nothing to inspect.
    #[error("the application did not respond")]
    NoResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            TestError::InvalidHeader("x y".to_string()).to_string(),
            "Invalid header: x y"
        );
        assert_eq!(TestError::NoResponse.to_string(), "the application did not respond");

        let err: TestError = ServerError::InvalidRequest("bad host".to_string()).into();
        assert!(matches!(err, TestError::Processing(_)));
    }
}
