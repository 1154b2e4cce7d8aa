//! What can be registered on a route.
//!
//! A route's handler list mixes three kinds of entries, modelled as the
//! [`Handler`] tagged union:
//!
//! - plain middleware
//! - a whole router to mount under the route's path
//! - a parameter hook that runs only when a named parameter is bound

use std::fmt;
use std::sync::Arc;

use daedalus_core::{Context, Result};
use daedalus_middleware::{BoxFuture, BoxedMiddleware, Composed, Middleware, Next};

use crate::router::{Dispatch, Router};

/// A hook bound to a named route parameter.
///
/// The hook receives the decoded parameter value, typically to load the
/// entity it identifies before the route's own middleware runs.
pub trait ParamMiddleware: Send + Sync + 'static {
    /// Processes the request with the bound parameter value.
    fn handle<'a>(
        &'a self,
        value: String,
        ctx: &'a mut Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<()>>;
}

struct FnParam<F>(F);

impl<F> ParamMiddleware for FnParam<F>
where
    F: for<'a> Fn(String, &'a mut Context, Next<'a>) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync
        + 'static,
{
    fn handle<'a>(
        &'a self,
        value: String,
        ctx: &'a mut Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        (self.0)(value, ctx, next)
    }
}

/// Boxes a closure as a parameter hook.
///
/// ```
/// use daedalus_router::param_fn;
///
/// let load_chore = param_fn(|id, ctx, next| {
///     Box::pin(async move {
///         ctx.state_mut().set("chore_id", id);
///         next.run(ctx).await
///     })
/// });
/// # let _ = load_chore;
/// ```
pub fn param_fn<F>(func: F) -> Arc<dyn ParamMiddleware>
where
    F: for<'a> Fn(String, &'a mut Context, Next<'a>) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnParam(func))
}

/// Stack entry adapter that runs a parameter hook with the bound value.
///
/// When the parameter is not bound, for example an optional segment that
/// did not match, the hook is skipped.
pub(crate) struct ParamStep {
    pub(crate) name: String,
    pub(crate) hook: Arc<dyn ParamMiddleware>,
}

impl Middleware for ParamStep {
    fn name(&self) -> &'static str {
        "param"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        match ctx.param(&self.name).map(ToString::to_string) {
            Some(value) => self.hook.handle(value, ctx, next),
            None => next.run(ctx),
        }
    }
}

/// One entry in a route's handler list.
#[derive(Clone)]
pub enum Handler {
    /// Ordinary middleware.
    Plain(BoxedMiddleware),
    /// A router whose routes are mounted under the registration path.
    Router(Arc<Router>),
    /// A hook run only when `name` is bound.
    Param {
        /// Parameter name.
        name: String,
        /// The hook.
        middleware: Arc<dyn ParamMiddleware>,
    },
}

impl Handler {
    /// Wraps any middleware.
    pub fn new(middleware: impl Middleware) -> Self {
        Self::Plain(Arc::new(middleware))
    }

    /// A parameter hook entry.
    pub fn param(name: impl Into<String>, middleware: Arc<dyn ParamMiddleware>) -> Self {
        Self::Param {
            name: name.into(),
            middleware,
        }
    }
}

impl From<BoxedMiddleware> for Handler {
    fn from(middleware: BoxedMiddleware) -> Self {
        Self::Plain(middleware)
    }
}

impl From<Composed> for Handler {
    fn from(composed: Composed) -> Self {
        Self::Plain(Arc::new(composed))
    }
}

impl From<Arc<Router>> for Handler {
    fn from(router: Arc<Router>) -> Self {
        Self::Router(router)
    }
}

impl From<Router> for Handler {
    fn from(router: Router) -> Self {
        Self::Router(Arc::new(router))
    }
}

impl From<Dispatch> for Handler {
    fn from(dispatch: Dispatch) -> Self {
        Self::Router(dispatch.router())
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(middleware) => f.debug_tuple("Plain").field(&middleware.name()).finish(),
            Self::Router(router) => f
                .debug_tuple("Router")
                .field(&router.layers().len())
                .finish(),
            Self::Param { name, .. } => f.debug_struct("Param").field("name", name).finish(),
        }
    }
}
