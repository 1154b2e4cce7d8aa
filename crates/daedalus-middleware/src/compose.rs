//! Flattening a middleware list into one pipeline.
//!
//! [`compose`] snapshots an ordered list into a [`Composed`] pipeline. The
//! snapshot is immutable and cheap to clone, so a running request keeps the
//! pipeline it started with even if the source list changes afterwards.

use std::fmt;
use std::sync::Arc;

use daedalus_core::{Context, Result};

use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, Next};

/// An immutable, shareable middleware pipeline.
///
/// Running it executes the onion model: each middleware's code before
/// `next.run(ctx)` in registration order, then the code after it in reverse
/// order. The first error short-circuits everything not yet reached.
///
/// `Composed` is itself a [`Middleware`]: nested inside another pipeline, its
/// last `next` continues with the outer chain.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use daedalus_core::Context;
/// use daedalus_middleware::{compose, middleware_fn};
///
/// # tokio_test::block_on(async {
/// let pipeline = compose(vec![
///     middleware_fn(|ctx, next| Box::pin(async move {
///         next.run(ctx).await?;
///         ctx.response_mut().set_body("outer");
///         Ok(())
///     })),
///     middleware_fn(|ctx, _next| Box::pin(async move {
///         ctx.response_mut().set_body("inner");
///         Ok(())
///     })),
/// ]);
///
/// let mut ctx = Context::mock(http::Request::get("/").body(Bytes::new()).unwrap()).unwrap();
/// pipeline.run(&mut ctx).await.unwrap();
/// # });
/// ```
#[derive(Clone)]
pub struct Composed {
    stack: Arc<[BoxedMiddleware]>,
}

/// Composes an ordered list of middleware into one pipeline.
pub fn compose(middleware: impl IntoIterator<Item = BoxedMiddleware>) -> Composed {
    Composed {
        stack: middleware.into_iter().collect(),
    }
}

impl Composed {
    /// Runs the pipeline against a context.
    pub fn run<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<()>> {
        Next::chain(&self.stack, Next::end()).run(ctx)
    }

    /// Returns the number of middleware in the pipeline.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Returns true if the pipeline is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Returns the middleware names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.stack.iter().map(|m| m.name()).collect()
    }
}

impl Middleware for Composed {
    fn name(&self) -> &'static str {
        "composed"
    }

    fn init(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            for middleware in &*self.stack {
                middleware.init().await?;
            }
            Ok(())
        })
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Next::chain(&self.stack, next).run(ctx)
    }
}

impl fmt::Debug for Composed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composed")
            .field("stack", &self.names())
            .finish()
    }
}
