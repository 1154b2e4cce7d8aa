//! The per-request context.
//!
//! A [`Context`] is created once per request and threaded by mutable
//! reference through every middleware. Dispatch metadata (matched routes,
//! captures, params, route name, owning router) lives in fixed fields that
//! start empty and are filled in by the router.

use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::REFERER;
use http::{Extensions, Method, StatusCode};

use crate::app::AppHandle;
use crate::error::{Error, HttpError, Result};
use crate::params::Params;
use crate::request::Request;
use crate::response::Response;
use crate::state::{State, StatePolicy};

/// A route that matched the current request path.
///
/// Implemented by the router's layers; the context only needs enough to
/// compute allowed methods and report what matched.
pub trait MatchedRoute: Send + Sync + fmt::Debug {
    /// The route's path pattern.
    fn path(&self) -> &str;

    /// The methods the route answers. Empty for path-scoped middleware.
    fn methods(&self) -> &[Method];

    /// The route name, if any.
    fn name(&self) -> Option<&str>;
}

/// Per-request state flowing through the middleware pipeline.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use daedalus_core::Context;
///
/// let req = http::Request::get("/chores/1").body(Bytes::new()).unwrap();
/// let mut ctx = Context::mock(req).unwrap();
///
/// ctx.state_mut().set("user", "ada");
/// ctx.response_mut().set_body("hello");
/// assert_eq!(ctx.request().path(), "/chores/1");
/// ```
pub struct Context {
    app: AppHandle,
    request: Request,
    response: Response,
    state: State,
    matched: Vec<Arc<dyn MatchedRoute>>,
    captures: Vec<String>,
    params: Params,
    route_name: Option<String>,
    router: Option<Arc<dyn Any + Send + Sync>>,
    router_path: Option<String>,
    respond: bool,
    extensions: Extensions,
    started_at: Instant,
}

impl Context {
    /// Builds a context for an inbound request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the request URL cannot be
    /// assembled.
    pub fn new(
        app: AppHandle,
        request: http::Request<Bytes>,
        remote: Option<SocketAddr>,
        secure: bool,
        policy: StatePolicy,
    ) -> Result<Self> {
        let request = Request::new(request, remote, secure, app.proxy())?;
        let state = State::derive(app.state(), policy);
        Ok(Self {
            app,
            request,
            response: Response::new(),
            state,
            matched: Vec::new(),
            captures: Vec::new(),
            params: Params::new(),
            route_name: None,
            router: None,
            router_path: None,
            respond: true,
            extensions: Extensions::new(),
            started_at: Instant::now(),
        })
    }

    /// Builds a context with a default application, for tests and tools.
    pub fn mock(request: http::Request<Bytes>) -> Result<Self> {
        Self::new(AppHandle::default(), request, None, false, StatePolicy::default())
    }

    /// Returns the application handle.
    #[must_use]
    pub fn app(&self) -> &AppHandle {
        &self.app
    }

    /// Returns the request.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns the response.
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Returns the response mutably.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Returns the request state.
    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Returns the request state mutably.
    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// Routes whose path matched so far, across every router traversed.
    #[must_use]
    pub fn matched(&self) -> &[Arc<dyn MatchedRoute>] {
        &self.matched
    }

    /// Records a matched route.
    pub fn push_matched(&mut self, route: Arc<dyn MatchedRoute>) {
        self.matched.push(route);
    }

    /// Raw capture groups of the most recently bound route.
    #[must_use]
    pub fn captures(&self) -> &[String] {
        &self.captures
    }

    /// Replaces the captures.
    pub fn set_captures(&mut self, captures: Vec<String>) {
        self.captures = captures;
    }

    /// Route parameters bound so far.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Route parameters, mutably.
    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    /// Returns a single route parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Name of the most recently bound named route.
    #[must_use]
    pub fn route_name(&self) -> Option<&str> {
        self.route_name.as_deref()
    }

    /// Sets the route name.
    pub fn set_route_name(&mut self, name: Option<String>) {
        self.route_name = name;
    }

    /// Returns the router currently dispatching, if it is an `R`.
    #[must_use]
    pub fn router<R: Any + Send + Sync>(&self) -> Option<Arc<R>> {
        self.router.clone().and_then(|r| r.downcast::<R>().ok())
    }

    /// Sets the router currently dispatching.
    pub fn set_router(&mut self, router: Arc<dyn Any + Send + Sync>) {
        self.router = Some(router);
    }

    /// Path override used by routers instead of the request path.
    #[must_use]
    pub fn router_path(&self) -> Option<&str> {
        self.router_path.as_deref()
    }

    /// Sets the path override used by routers.
    pub fn set_router_path(&mut self, path: Option<String>) {
        self.router_path = path;
    }

    /// Returns false if the application should not send a response.
    #[must_use]
    pub fn respond(&self) -> bool {
        self.respond
    }

    /// Opts this request in or out of an automatic response.
    pub fn set_respond(&mut self, respond: bool) {
        self.respond = respond;
    }

    /// Typed per-request extensions.
    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Typed per-request extensions, mutably.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Builds an error with the given status and message.
    ///
    /// ```
    /// # use bytes::Bytes;
    /// # use daedalus_core::Context;
    /// # use http::StatusCode;
    /// # let ctx = Context::mock(http::Request::get("/").body(Bytes::new()).unwrap()).unwrap();
    /// let err = ctx.throw(StatusCode::FORBIDDEN, "nope");
    /// assert_eq!(err.status(), StatusCode::FORBIDDEN);
    /// ```
    #[must_use]
    pub fn throw(&self, status: StatusCode, message: impl Into<String>) -> Error {
        HttpError::with_message(status, message).into()
    }

    /// Fails with `status` unless `condition` holds.
    pub fn assert(
        &self,
        condition: bool,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Result<()> {
        if condition {
            Ok(())
        } else {
            Err(self.throw(status, message))
        }
    }

    /// Redirects to the `Referer`, or to `alternative` when there is none.
    pub fn redirect_back(&mut self, alternative: &str) -> Result<()> {
        let target = self
            .request
            .headers()
            .get(REFERER)
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| alternative.to_string(), ToString::to_string);
        self.response.redirect(&target)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", self.request.method())
            .field("url", &self.request.url().as_str())
            .field("status", &self.response.status())
            .field("matched", &self.matched.len())
            .field("params", &self.params)
            .field("route_name", &self.route_name)
            .field("respond", &self.respond)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SharedState;

    fn mock_ctx(path: &str) -> Context {
        Context::mock(http::Request::get(path).body(Bytes::new()).unwrap()).unwrap()
    }

    #[derive(Debug)]
    struct FakeRoute;

    impl MatchedRoute for FakeRoute {
        fn path(&self) -> &str {
            "/fake"
        }

        fn methods(&self) -> &[Method] {
            &[]
        }

        fn name(&self) -> Option<&str> {
            Some("fake")
        }
    }

    #[test]
    fn test_new_context_defaults() {
        let ctx = mock_ctx("/a");
        assert!(ctx.matched().is_empty());
        assert!(ctx.captures().is_empty());
        assert!(ctx.params().is_empty());
        assert!(ctx.route_name().is_none());
        assert!(ctx.router::<String>().is_none());
        assert!(ctx.respond());
        assert_eq!(ctx.response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_state_policy_applied() {
        let shared = SharedState::new();
        shared.set("n", 1);
        let app = AppHandle::new(shared.clone());

        let req = http::Request::get("/").body(Bytes::new()).unwrap();
        let mut ctx = Context::new(app, req, None, false, StatePolicy::Alias).unwrap();
        ctx.state_mut().set("n", 2);
        assert_eq!(shared.get("n"), Some(2.into()));
    }

    #[test]
    fn test_router_downcast() {
        let mut ctx = mock_ctx("/");
        ctx.set_router(Arc::new(String::from("router")));
        assert_eq!(ctx.router::<String>().as_deref(), Some(&"router".to_string()));
        assert!(ctx.router::<u32>().is_none());
    }

    #[test]
    fn test_matched_routes() {
        let mut ctx = mock_ctx("/");
        ctx.push_matched(Arc::new(FakeRoute));
        assert_eq!(ctx.matched()[0].name(), Some("fake"));
    }

    #[test]
    fn test_assert_and_throw() {
        let ctx = mock_ctx("/");
        assert!(ctx.assert(true, StatusCode::BAD_REQUEST, "fine").is_ok());
        let err = ctx.assert(false, StatusCode::UNAUTHORIZED, "login first").unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.client_message(), "login first");
    }

    #[test]
    fn test_redirect_back() {
        let req = http::Request::get("/")
            .header("referer", "/previous")
            .body(Bytes::new())
            .unwrap();
        let mut ctx = Context::mock(req).unwrap();
        ctx.redirect_back("/home").unwrap();
        assert_eq!(ctx.response().headers()["location"], "/previous");

        let mut ctx = mock_ctx("/");
        ctx.redirect_back("/home").unwrap();
        assert_eq!(ctx.response().headers()["location"], "/home");
    }

    #[test]
    fn test_extensions() {
        #[derive(Clone, PartialEq, Debug)]
        struct UserId(u64);

        let mut ctx = mock_ctx("/");
        ctx.extensions_mut().insert(UserId(7));
        assert_eq!(ctx.extensions().get::<UserId>(), Some(&UserId(7)));
    }
}
