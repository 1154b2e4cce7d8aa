//! # Daedalus Server
//!
//! Application orchestration for the Daedalus framework: the middleware
//! list, the request lifecycle, central error handling and the listener.
//!
//! - [`Application`] - registers middleware, handles requests, listens
//! - [`ListenOptions`] / [`ApplicationOptions`] - how to listen and how to
//!   build contexts
//! - [`AbortSignal`] - stops a listener; in-flight requests still finish
//! - [`AppEvent`] - `Listen`, `Error` and `Close` notifications
//! - [`Transport`] - the network boundary, with [`HttpTransport`] (hyper,
//!   optional rustls) and [`MemoryTransport`] (in-process)
//!
//! # Example
//!
//! ```rust,no_run
//! use daedalus_middleware::middleware_fn;
//! use daedalus_server::{AbortSignal, Application, ListenOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), daedalus_server::ServerError> {
//!     let app = Application::new();
//!     app.use_middleware(middleware_fn(|ctx, _next| {
//!         Box::pin(async move {
//!             ctx.response_mut().set_body("hello");
//!             Ok(())
//!         })
//!     }));
//!
//!     app.listen(ListenOptions::new("127.0.0.1", 8080), AbortSignal::with_os_signals())
//!         .await
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod application;
mod error;
pub mod events;
mod options;
mod shutdown;
pub mod transport;

pub use application::Application;
pub use error::{ServerError, ServerResult};
pub use events::{AppEvent, ErrorEvent, ListenEvent};
pub use options::{ApplicationOptions, ListenOptions, TlsOptions, DEFAULT_HOSTNAME, DEFAULT_PORT};
pub use shutdown::{AbortSignal, HandlingGuard, HandlingSet};
pub use transport::{
    http_factory, HttpResponse, HttpTransport, InboundRequest, MemoryClient, MemoryTransport, Responder, Transport,
    TransportFactory,
};
