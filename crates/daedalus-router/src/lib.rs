//! # Daedalus Router
//!
//! Path-pattern routing for the Daedalus framework.
//!
//! Routes are matched in registration order against patterns such as
//! `/users/:id`, `/files/:path*` or `/:lang(en|de)?/docs`. Every layer whose
//! pattern matches contributes its middleware, so path-scoped middleware and
//! routes compose into one onion chain per request.
//!
//! - [`Router`] - route registration and introspection
//! - [`Dispatch`] - the dispatch middleware from [`Router::routes`]
//! - [`AllowedMethods`] - `OPTIONS`, 405 and 501 handling
//! - [`Layer`] - one compiled route
//! - [`Handler`] - what a route can hold: middleware, a mounted router or a
//!   parameter hook
//! - [`path`] - the pattern compiler and URL builder
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use daedalus_middleware::middleware_fn;
//! use daedalus_router::{param_fn, Router};
//!
//! let mut users = Router::new();
//! users.get("/:id", [middleware_fn(|ctx, _next| {
//!     Box::pin(async move {
//!         let id = ctx.param("id").unwrap_or_default().to_string();
//!         ctx.response_mut().set_body(id);
//!         Ok(())
//!     })
//! })]).unwrap();
//!
//! let mut api = Router::new();
//! api.param("id", param_fn(|id, ctx, next| {
//!     Box::pin(async move {
//!         ctx.state_mut().set("user_id", id);
//!         next.run(ctx).await
//!     })
//! }));
//! api.use_at("/users", [users]).unwrap();
//!
//! assert_eq!(api.layers()[0].path(), "/users/:id");
//! let api = Arc::new(api);
//! let _middleware = api.routes();
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-router/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod allowed;
mod error;
mod handler;
mod layer;
pub mod path;
mod router;

pub use allowed::{AllowedMethods, AllowedMethodsOptions, ErrorFactory};
pub use error::RouterError;
pub use handler::{param_fn, Handler, ParamMiddleware};
pub use layer::{Layer, LayerOptions};
pub use path::{Query, UrlOptions, UrlParams};
pub use router::{url, Dispatch, MatchResult, NamedRoute, RouteOptions, Router, RouterOptions};
