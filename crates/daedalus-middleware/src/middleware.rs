//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait and the [`Next`] continuation
//! that together implement the onion model: code before `next.run(ctx)` runs
//! on the way in, code after it runs on the way out, in reverse order.
//!
//! # Example
//!
//! ```
//! use daedalus_core::{Context, Result};
//! use daedalus_middleware::{BoxFuture, Middleware, Next};
//!
//! struct Greeting;
//!
//! impl Middleware for Greeting {
//!     fn name(&self) -> &'static str {
//!         "greeting"
//!     }
//!
//!     fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
//!         Box::pin(async move {
//!             ctx.state_mut().set("greeting", "hello");
//!             next.run(ctx).await?;
//!             if ctx.response().body().is_none() {
//!                 ctx.response_mut().set_body("hello");
//!             }
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use daedalus_core::{Context, Result};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A type-erased middleware that can be stored in a list.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The core middleware trait.
///
/// Middleware receives the request context and a [`Next`] continuation.
/// Calling `next.run(ctx)` hands control downstream and resolves once every
/// downstream middleware has finished. Not calling it ends the chain here.
///
/// # Invariants
///
/// - `next` can be run at most once; [`Next::run`] consumes it
/// - An error returned from downstream should be propagated with `?` unless
///   the middleware deliberately handles it
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this middleware, used in logs.
    fn name(&self) -> &'static str {
        "anonymous"
    }

    /// One-time asynchronous setup, run before the application starts
    /// serving.
    fn init(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Processes the request.
    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>>;
}

/// The rest of the chain after the current middleware.
///
/// A `Next` is a cursor over a borrowed middleware slice, optionally followed
/// by an outer continuation. Nested pipelines use the outer continuation so
/// that running past the end of an inner chain resumes the outer one.
pub struct Next<'a> {
    stack: &'a [BoxedMiddleware],
    tail: Option<Box<Next<'a>>>,
}

impl<'a> Next<'a> {
    /// A continuation that does nothing.
    #[must_use]
    pub fn end() -> Self {
        Self {
            stack: &[],
            tail: None,
        }
    }

    /// Runs `stack` in order, then continues with `tail`.
    #[must_use]
    pub fn chain(stack: &'a [BoxedMiddleware], tail: Next<'a>) -> Self {
        Self {
            stack,
            tail: Some(Box::new(tail)),
        }
    }

    /// Returns the number of middleware left before the outer continuation.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.stack.len()
    }

    /// Invokes the next middleware in the chain.
    ///
    /// Consumes `self`, so downstream can only be entered once.
    pub fn run<'b>(self, ctx: &'b mut Context) -> BoxFuture<'b, Result<()>>
    where
        'a: 'b,
    {
        match self.stack.split_first() {
            Some((head, rest)) => head.handle(
                ctx,
                Next {
                    stack: rest,
                    tail: self.tail,
                },
            ),
            None => match self.tail {
                Some(tail) => (*tail).run(ctx),
                None => Box::pin(async { Ok(()) }),
            },
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field(
                "stack",
                &self.stack.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("tail", &self.tail.is_some())
            .finish()
    }
}

impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn init(&self) -> BoxFuture<'_, Result<()>> {
        (**self).init()
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        (**self).handle(ctx, next)
    }
}

/// A middleware built from a closure.
///
/// The closure receives the context and continuation with matching
/// lifetimes and returns a boxed future, usually `Box::pin(async move { .. })`.
///
/// # Example
///
/// ```
/// use daedalus_middleware::FnMiddleware;
///
/// let timing = FnMiddleware::new("timing", |ctx, next| {
///     Box::pin(async move {
///         next.run(ctx).await?;
///         tracing::debug!(elapsed = ?ctx.elapsed(), "request finished");
///         Ok(())
///     })
/// });
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    /// Creates a new function-based middleware.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        (self.func)(ctx, next)
    }
}

/// Boxes a closure as a middleware.
///
/// ```
/// use daedalus_middleware::{middleware_fn, Middleware};
///
/// let hello = middleware_fn(|ctx, _next| {
///     Box::pin(async move {
///         ctx.response_mut().set_body("hello");
///         Ok(())
///     })
/// });
/// assert_eq!(hello.name(), "fn");
/// ```
pub fn middleware_fn<F>(func: F) -> BoxedMiddleware
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    Arc::new(FnMiddleware::new("fn", func))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    struct Visit(&'static str);

    impl Middleware for Visit {
        fn name(&self) -> &'static str {
            self.0
        }

        fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                let mut seen = ctx.state().get_as::<Vec<String>>("seen").unwrap_or_default();
                seen.push(self.0.to_string());
                ctx.state_mut().set("seen", seen);
                next.run(ctx).await
            })
        }
    }

    fn ctx() -> Context {
        Context::mock(http::Request::get("/").body(Bytes::new()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_end_is_noop() {
        let mut ctx = ctx();
        Next::end().run(&mut ctx).await.unwrap();
        assert!(ctx.response().body().is_none());
    }

    #[tokio::test]
    async fn test_chain_then_tail() {
        let inner: Vec<BoxedMiddleware> = vec![Arc::new(Visit("a")), Arc::new(Visit("b"))];
        let outer: Vec<BoxedMiddleware> = vec![Arc::new(Visit("c"))];

        let mut ctx = ctx();
        let next = Next::chain(&inner, Next::chain(&outer, Next::end()));
        assert_eq!(next.remaining(), 2);
        next.run(&mut ctx).await.unwrap();

        let seen: Vec<String> = ctx.state().get_as("seen").unwrap();
        assert_eq!(seen, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_fn_middleware() {
        let mw = FnMiddleware::new("setter", |ctx, next| {
            Box::pin(async move {
                ctx.response_mut().set_body("set");
                next.run(ctx).await
            })
        });
        assert_eq!(mw.name(), "setter");

        let mut ctx = ctx();
        mw.handle(&mut ctx, Next::end()).await.unwrap();
        assert_eq!(ctx.response().status(), http::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_default_init_succeeds() {
        assert!(Visit("x").init().await.is_ok());

        let passthrough = middleware_fn(|ctx, next| Box::pin(async move { next.run(ctx).await }));
        assert_eq!(passthrough.name(), "fn");
        assert!(passthrough.init().await.is_ok());
    }
}
