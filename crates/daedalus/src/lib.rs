//! # Daedalus
//!
//! **Koa-style routing and middleware for async Rust services**
//!
//! - **Onion middleware** - every middleware wraps the rest of the pipeline
//!   and may act before and after calling `next`
//! - **Router** - path patterns, method dispatch, nested routers, named
//!   routes, URL generation, redirects, `OPTIONS`/405/501 handling
//! - **Application** - ties the pipeline to a transport with central error
//!   handling and graceful shutdown
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use daedalus::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.get("/hello/:name", [middleware_fn(|ctx, _next| {
//!         Box::pin(async move {
//!             let greeting = format!("hello, {}", ctx.param("name").unwrap_or("stranger"));
//!             ctx.response_mut().set_body(greeting);
//!             Ok(())
//!         })
//!     })])?;
//!     let router = Arc::new(router);
//!
//!     let app = Application::new();
//!     app.use_middleware(RequestLogger::new());
//!     app.use_middleware(router.routes());
//!     app.use_middleware(router.allowed_methods(AllowedMethodsOptions::default()));
//!
//!     app.listen("127.0.0.1:8080".parse()?, AbortSignal::with_os_signals()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Request flow
//!
//! ```text
//! transport → Context → RequestLogger → Router::routes → AllowedMethods
//!                            ↓ (unwinds in reverse)
//! transport ← http::Response ← central error handler
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use daedalus_core as core;

// Re-export middleware types
pub use daedalus_middleware as middleware;

// Re-export router types
pub use daedalus_router as router;

// Re-export server types
pub use daedalus_server as server;

// Re-export logging setup
pub use daedalus_telemetry as telemetry;

// Re-export configuration
pub use daedalus_config as config;

/// Prelude module for convenient imports.
///
/// ```rust
/// use daedalus::prelude::*;
/// ```
pub mod prelude {
    pub use daedalus_core::{Body, Context, Error, HttpError, Result, StatePolicy};

    pub use daedalus_middleware::{compose, middleware_fn, BoxFuture, BoxedMiddleware, Middleware, Next, RequestLogger};

    pub use daedalus_router::{param_fn, AllowedMethodsOptions, RouteOptions, Router, RouterOptions};

    pub use daedalus_server::{AbortSignal, AppEvent, Application, ApplicationOptions, ListenOptions};

    pub use daedalus_config::{ConfigLoader, DaedalusConfig};

    pub use daedalus_telemetry::{init_logging, LogConfig};
}
