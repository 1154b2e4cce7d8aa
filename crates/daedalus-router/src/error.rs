//! Router errors.

use thiserror::Error;

/// Errors raised while registering routes or generating URLs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// A path pattern could not be compiled.
    #[error("invalid path pattern '{path}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A required parameter was not supplied when building a URL.
    #[error("expected parameter '{name}' to be provided")]
    MissingParam {
        /// Parameter name.
        name: String,
    },

    /// A supplied parameter does not satisfy its pattern.
    #[error("expected parameter '{name}' to match '{pattern}', but got '{value}'")]
    ParamMismatch {
        /// Parameter name.
        name: String,
        /// The pattern it must match.
        pattern: String,
        /// The encoded value that was supplied.
        value: String,
    },

    /// No route is registered under this name.
    #[error("could not resolve named route '{0}'")]
    RouteNotFound(String),
}

impl RouterError {
    pub(crate) fn invalid_pattern(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}
