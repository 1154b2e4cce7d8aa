//! # Daedalus Test
//!
//! In-memory request testing for Daedalus applications. Requests go through
//! [`Application::handle`](daedalus_server::Application::handle), so the
//! whole pipeline runs (middleware, routing, central error handling) without
//! binding a port.
//!
//! - [`TestClient`] - wraps an application and sends requests
//! - [`TestRequest`] / [`TestRequestBuilder`] - request building
//! - [`TestResponse`] - buffered response with assertion helpers
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use daedalus_middleware::middleware_fn;
//! use daedalus_router::{AllowedMethodsOptions, Router};
//! use daedalus_server::Application;
//! use daedalus_test::TestClient;
//!
//! # tokio_test::block_on(async {
//! let mut router = Router::new();
//! router.get("/chores/:id", [middleware_fn(|ctx, _next| {
//!     Box::pin(async move {
//!         let id = ctx.param("id").unwrap_or_default().to_string();
//!         ctx.response_mut().set_body(id);
//!         Ok(())
//!     })
//! })]).unwrap();
//! let router = Arc::new(router);
//!
//! let app = Application::new();
//! app.use_middleware(router.routes());
//! app.use_middleware(router.allowed_methods(AllowedMethodsOptions::default()));
//!
//! let client = TestClient::new(app);
//! client.get("/chores/7").send().await.unwrap().assert_body_eq("7");
//!
//! let response = client.delete("/chores/7").send().await.unwrap();
//! assert_eq!(response.status_code(), 405);
//! assert_eq!(response.allow(), ["GET", "HEAD"]);
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::{TestRequest, TestRequestBuilder, DEFAULT_HOST};
pub use response::TestResponse;
