//! Server errors.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors from listening, serving and embedding an [`Application`](crate::Application).
#[derive(Debug, Error)]
pub enum ServerError {
    /// `listen` was called before any middleware was registered.
    #[error("the application has no middleware to process requests with")]
    NoMiddleware,

    /// The application is already listening.
    #[error("the application is already listening")]
    AlreadyListening,

    /// A listen address could not be parsed.
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    /// The listener could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// The requested address.
        address: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TLS material could not be loaded.
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// A middleware `init` hook failed.
    #[error("middleware '{name}' failed to initialise: {source}")]
    Init {
        /// Name of the failing middleware.
        name: &'static str,
        /// The error it returned.
        #[source]
        source: daedalus_core::Error,
    },

    /// An inbound request could not be turned into a context.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport is closed.
    #[error("transport closed")]
    Closed,

    /// The peer went away before its response could be delivered.
    #[error("response for {0:?} could not be delivered")]
    Undeliverable(Option<SocketAddr>),

    /// An I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
