//! Application lifecycle events.
//!
//! Subscribe with [`Application::subscribe`](crate::Application::subscribe).
//! Each transition fires exactly once: one `Listen` when the listener is
//! bound, one `Error` per failed request, one `Close` when the listener has
//! fully shut down.

use std::net::SocketAddr;
use std::sync::Arc;

use http::{Method, StatusCode};

/// Something that happened to an application.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The listener is bound and accepting.
    Listen(ListenEvent),
    /// A request failed.
    Error(ErrorEvent),
    /// The listener has closed.
    Close,
}

/// Details of a bound listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenEvent {
    /// Requested hostname.
    pub hostname: String,
    /// Bound port.
    pub port: u16,
    /// Serving HTTPS.
    pub secure: bool,
    /// The resolved local address.
    pub local_addr: SocketAddr,
    /// Transport kind, e.g. `"http"`.
    pub transport: &'static str,
}

/// Details of a failed request.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// The error message.
    pub message: String,
    /// The status it maps to.
    pub status: StatusCode,
    /// Request method, when a context existed.
    pub method: Option<Method>,
    /// Request path, when a context existed.
    pub path: Option<String>,
    /// The original error.
    pub error: Arc<daedalus_core::Error>,
}
