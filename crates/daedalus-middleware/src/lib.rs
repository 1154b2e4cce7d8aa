//! # Daedalus Middleware
//!
//! Onion-model middleware for the Daedalus framework.
//!
//! A middleware receives the request [`Context`](daedalus_core::Context) and
//! a [`Next`] continuation. Everything before `next.run(ctx).await` runs on
//! the way in, everything after it on the way out:
//!
//! ```text
//! m1 pre → m2 pre → m3 pre
//!                      ↓
//! m1 post ← m2 post ← m3 post
//! ```
//!
//! - [`Middleware`] - the trait every stage implements
//! - [`Next`] - the continuation; consumed when run, so it can't run twice
//! - [`compose`] / [`Composed`] - an immutable pipeline built from a list
//! - [`FnMiddleware`] / [`middleware_fn`] - middleware from closures
//! - [`RequestLogger`] - structured per-request logging

#![doc(html_root_url = "https://docs.rs/daedalus-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod compose;
pub mod logger;
pub mod middleware;

pub use compose::{compose, Composed};
pub use logger::RequestLogger;
pub use middleware::{middleware_fn, BoxFuture, BoxedMiddleware, FnMiddleware, Middleware, Next};
