//! Route registration and dispatch.
//!
//! This module provides the main [`Router`] struct. A router owns an ordered
//! list of [`Layer`]s and is mutated only during setup. For serving it is
//! shared behind an [`Arc`] and exposed as middleware through
//! [`Router::routes`] and [`Router::allowed_methods`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use daedalus_middleware::middleware_fn;
//! use daedalus_router::Router;
//!
//! let mut router = Router::new();
//! router.get("/item/:id", [middleware_fn(|ctx, _next| {
//!     Box::pin(async move {
//!         let body = format!("id={}", ctx.param("id").unwrap_or_default());
//!         ctx.response_mut().set_body(body);
//!         Ok(())
//!     })
//! })]).unwrap();
//!
//! let router = Arc::new(router);
//! let _dispatch = router.routes();
//! let _allowed = router.allowed_methods(Default::default());
//! ```
//!
//! # Dispatch
//!
//! For each request the dispatch middleware:
//!
//! 1. collects every layer whose pattern matches the path
//! 2. keeps those that also answer the request method
//! 3. passes through to `next` unless one of those declares methods
//! 4. otherwise runs, per kept layer, a parameter binding step followed by
//!    the layer's stack, and finally the outer `next`

use std::sync::Arc;

use daedalus_core::{Context, HttpError, MatchedRoute, Result};
use daedalus_middleware::{BoxFuture, BoxedMiddleware, Middleware, Next};
use http::{Method, StatusCode};
use indexmap::IndexMap;
use tracing::debug;

use crate::allowed::{AllowedMethods, AllowedMethodsOptions};
use crate::error::RouterError;
use crate::handler::{Handler, ParamMiddleware};
use crate::layer::{Layer, LayerOptions, StackEntry};
use crate::path::{self, UrlOptions, UrlParams};

/// Router-wide options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterOptions {
    /// Prefix applied to every route.
    pub prefix: Option<String>,
    /// Methods the router implements. Others are answered with 501 by
    /// [`Router::allowed_methods`].
    pub methods: Vec<Method>,
    /// Fixed path to dispatch on instead of the request path.
    pub router_path: Option<String>,
    /// Case-sensitive matching for every route.
    pub sensitive: bool,
    /// Strict trailing-slash matching for every route.
    pub strict: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            methods: vec![
                Method::DELETE,
                Method::GET,
                Method::HEAD,
                Method::OPTIONS,
                Method::PATCH,
                Method::POST,
                Method::PUT,
            ],
            router_path: None,
            sensitive: false,
            strict: false,
        }
    }
}

impl RouterOptions {
    /// Sets the route prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets the implemented methods.
    #[must_use]
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    /// Dispatches on a fixed path.
    #[must_use]
    pub fn router_path(mut self, path: impl Into<String>) -> Self {
        self.router_path = Some(path.into());
        self
    }

    /// Enables case-sensitive matching.
    #[must_use]
    pub const fn sensitive(mut self, sensitive: bool) -> Self {
        self.sensitive = sensitive;
        self
    }

    /// Enables strict trailing-slash matching.
    #[must_use]
    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Per-route registration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOptions {
    /// Route name, for [`Router::url`] and redirects.
    pub name: Option<String>,
    /// Overrides the router's case sensitivity.
    pub sensitive: Option<bool>,
    /// Overrides the router's strictness.
    pub strict: Option<bool>,
    /// Match the whole path. Middleware layers match prefixes.
    pub end: bool,
    /// Bind no params from this layer.
    pub ignore_captures: bool,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            name: None,
            sensitive: None,
            strict: None,
            end: true,
            ignore_captures: false,
        }
    }
}

/// Layers selected for one dispatch.
#[derive(Debug, Default, Clone)]
pub struct MatchResult {
    /// Layers whose pattern matches the path.
    pub path: Vec<Arc<Layer>>,
    /// The subset that also answers the method.
    pub path_and_method: Vec<Arc<Layer>>,
    /// True if a layer with declared methods answers the request.
    pub route: bool,
}

/// An ordered collection of routes.
#[derive(Clone)]
pub struct Router {
    options: RouterOptions,
    layers: Vec<Arc<Layer>>,
    params: IndexMap<String, Arc<dyn ParamMiddleware>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! verbs {
    ($($(#[$doc:meta])* $fn:ident => [$($method:ident),+];)+) => {
        $(
            $(#[$doc])*
            ///
            /// # Errors
            ///
            /// Returns [`RouterError::InvalidPattern`] if `path` does not compile.
            pub fn $fn<H>(&mut self, path: &str, handlers: H) -> Result<&mut Self, RouterError>
            where
                H: IntoIterator,
                H::Item: Into<Handler>,
            {
                self.add([$(Method::$method),+], path, handlers, RouteOptions::default())
            }
        )+
    };
}

impl Router {
    /// Creates an empty router with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    /// Creates an empty router.
    #[must_use]
    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            options,
            layers: Vec::new(),
            params: IndexMap::new(),
        }
    }

    verbs! {
        /// Registers a `GET` route. `HEAD` is implied.
        get => [GET];
        /// Registers a `POST` route.
        post => [POST];
        /// Registers a `PUT` route.
        put => [PUT];
        /// Registers a `PATCH` route.
        patch => [PATCH];
        /// Registers a `DELETE` route.
        delete => [DELETE];
        /// Registers a `HEAD` route.
        head => [HEAD];
        /// Registers an `OPTIONS` route.
        options => [OPTIONS];
        /// Registers a route for `DELETE`, `GET`, `POST` and `PUT`.
        all => [DELETE, GET, POST, PUT];
    }

    /// Starts registering a named route.
    ///
    /// ```
    /// use daedalus_router::Router;
    ///
    /// let mut router = Router::new();
    /// router.named("chore").get("/chores/:id", Vec::<daedalus_router::Handler>::new()).unwrap();
    /// assert_eq!(router.url("chore", [("id", "3")], &Default::default()).unwrap(), "/chores/3");
    /// ```
    pub fn named(&mut self, name: impl Into<String>) -> NamedRoute<'_> {
        NamedRoute {
            router: self,
            name: name.into(),
        }
    }

    /// Registers a route for an explicit method list.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] if `path` does not compile.
    pub fn add<M, H>(
        &mut self,
        methods: M,
        path: &str,
        handlers: H,
        options: RouteOptions,
    ) -> Result<&mut Self, RouterError>
    where
        M: IntoIterator<Item = Method>,
        H: IntoIterator,
        H::Item: Into<Handler>,
    {
        let methods: Vec<Method> = methods.into_iter().collect();
        let handlers = handlers.into_iter().map(Into::into).collect();
        self.register(Some(path), &methods, handlers, &options)?;
        Ok(self)
    }

    /// Registers middleware that runs for every path under the router's
    /// prefix. Routers in `handlers` are mounted as they are.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] if a mounted route fails to
    /// recompile under the router's prefix.
    pub fn use_middleware<H>(&mut self, handlers: H) -> Result<&mut Self, RouterError>
    where
        H: IntoIterator,
        H::Item: Into<Handler>,
    {
        let prefix_has_params = match &self.options.prefix {
            Some(prefix) => path::parse(prefix)?
                .iter()
                .any(|token| matches!(token, path::Token::Key(_))),
            None => false,
        };
        let options = RouteOptions {
            end: false,
            ignore_captures: !prefix_has_params,
            ..RouteOptions::default()
        };
        let handlers = handlers.into_iter().map(Into::into).collect();
        self.register(None, &[], handlers, &options)?;
        Ok(self)
    }

    /// Registers middleware for `path` and everything below it. Routers in
    /// `handlers` are mounted under `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] if `path` does not compile.
    pub fn use_at<H>(&mut self, path: &str, handlers: H) -> Result<&mut Self, RouterError>
    where
        H: IntoIterator,
        H::Item: Into<Handler>,
    {
        let options = RouteOptions {
            end: false,
            ..RouteOptions::default()
        };
        let handlers = handlers.into_iter().map(Into::into).collect();
        self.register(Some(path), &[], handlers, &options)?;
        Ok(self)
    }

    /// Registers a hook for parameter `name` on every current and future
    /// route that declares it.
    pub fn param(&mut self, name: &str, hook: Arc<dyn ParamMiddleware>) -> &mut Self {
        self.params.insert(name.to_string(), Arc::clone(&hook));
        for layer in &mut self.layers {
            Arc::make_mut(layer).param(name, Arc::clone(&hook));
        }
        self
    }

    /// Sets the router prefix and applies it to every registered route.
    /// A trailing `/` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] if a prefixed route fails to
    /// compile.
    pub fn prefix(&mut self, prefix: &str) -> Result<&mut Self, RouterError> {
        let prefix = prefix.strip_suffix('/').unwrap_or(prefix).to_string();
        for layer in &mut self.layers {
            Arc::make_mut(layer).set_prefix(&prefix)?;
        }
        self.options.prefix = Some(prefix);
        Ok(self)
    }

    /// Redirects `source` to `destination` with `302 Found`.
    ///
    /// See [`redirect_with_status`](Self::redirect_with_status).
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::RouteNotFound`] if a name cannot be resolved.
    pub fn redirect(&mut self, source: &str, destination: &str) -> Result<&mut Self, RouterError> {
        self.redirect_with_status(source, destination, StatusCode::FOUND)
    }

    /// Redirects `source` to `destination` for `DELETE`, `GET`, `POST` and
    /// `PUT`, answering with `status`.
    ///
    /// A `source` that does not start with `/` names a route. So does a
    /// `destination` that is neither a path nor an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::RouteNotFound`] if a name cannot be resolved.
    pub fn redirect_with_status(
        &mut self,
        source: &str,
        destination: &str,
        status: StatusCode,
    ) -> Result<&mut Self, RouterError> {
        let source = if source.starts_with('/') {
            source.to_string()
        } else {
            self.url(source, UrlParams::default(), &UrlOptions::default())?
        };

        let destination = if destination.starts_with('/') {
            destination.to_string()
        } else if destination.contains("://") {
            url::Url::parse(destination)
                .map_err(|_| RouterError::RouteNotFound(destination.to_string()))?;
            destination.to_string()
        } else {
            self.url(destination, UrlParams::default(), &UrlOptions::default())?
        };

        let redirect = Redirect {
            destination,
            status,
        };
        self.all(&source, [Arc::new(redirect) as BoxedMiddleware])
    }

    /// Builds a URL for the named route.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::RouteNotFound`] if no route has that name, or
    /// a parameter error from [`Layer::url`].
    pub fn url(
        &self,
        name: &str,
        params: impl Into<UrlParams>,
        options: &UrlOptions,
    ) -> Result<String, RouterError> {
        self.route(name)
            .ok_or_else(|| RouterError::RouteNotFound(name.to_string()))?
            .url(params, options)
    }

    /// First route with the given name.
    #[must_use]
    pub fn route(&self, name: &str) -> Option<&Arc<Layer>> {
        self.layers.iter().find(|layer| layer.name() == Some(name))
    }

    /// Registered layers, in registration order.
    #[must_use]
    pub fn layers(&self) -> &[Arc<Layer>] {
        &self.layers
    }

    /// Methods the router implements.
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.options.methods
    }

    /// Router options.
    #[must_use]
    pub fn router_options(&self) -> &RouterOptions {
        &self.options
    }

    /// Selects the layers for `path` and `method`.
    #[must_use]
    pub fn match_path(&self, path: &str, method: &Method) -> MatchResult {
        let mut result = MatchResult::default();
        for layer in &self.layers {
            if !layer.matches(path) {
                continue;
            }
            result.path.push(Arc::clone(layer));
            if layer.allows(method) {
                if !layer.methods().is_empty() {
                    result.route = true;
                }
                result.path_and_method.push(Arc::clone(layer));
            }
        }
        result
    }

    /// The dispatch middleware.
    #[must_use]
    pub fn routes(self: &Arc<Self>) -> Dispatch {
        Dispatch {
            router: Arc::clone(self),
        }
    }

    /// Middleware answering `OPTIONS` and rejecting unsupported methods.
    #[must_use]
    pub fn allowed_methods(&self, options: AllowedMethodsOptions) -> AllowedMethods {
        AllowedMethods::new(self.options.methods.clone(), options)
    }

    fn register(
        &mut self,
        path: Option<&str>,
        methods: &[Method],
        handlers: Vec<Handler>,
        options: &RouteOptions,
    ) -> Result<(), RouterError> {
        let mut pending = Pending::default();
        let mut mounted = false;

        for handler in handlers {
            match handler {
                Handler::Plain(middleware) => pending.stack.push(StackEntry::plain(middleware)),
                Handler::Param { name, middleware } => pending.params.push((name, middleware)),
                Handler::Router(nested) => {
                    if !pending.is_empty() {
                        self.add_layer(path, methods, std::mem::take(&mut pending), options)?;
                    }
                    self.mount(path, &nested)?;
                    mounted = true;
                }
            }
        }

        if !mounted || !pending.is_empty() {
            self.add_layer(path, methods, pending, options)?;
        }
        Ok(())
    }

    fn add_layer(
        &mut self,
        path: Option<&str>,
        methods: &[Method],
        pending: Pending,
        options: &RouteOptions,
    ) -> Result<(), RouterError> {
        let layer_options = LayerOptions {
            sensitive: options.sensitive.unwrap_or(self.options.sensitive),
            strict: options.strict.unwrap_or(self.options.strict),
            end: options.end,
            ignore_captures: options.ignore_captures,
        };
        let mut layer = Layer::from_entries(
            path.unwrap_or("(.*)").to_string(),
            methods.iter().cloned(),
            pending.stack,
            options.name.clone(),
            layer_options,
        )?;

        if let Some(prefix) = &self.options.prefix {
            layer.set_prefix(prefix)?;
        }
        for (name, hook) in pending.params {
            layer.param(&name, hook);
        }
        for (name, hook) in &self.params {
            layer.param(name, Arc::clone(hook));
        }

        debug!(path = layer.path(), methods = ?layer.methods(), "route registered");
        self.layers.push(Arc::new(layer));
        Ok(())
    }

    fn mount(&mut self, path: Option<&str>, nested: &Self) -> Result<(), RouterError> {
        let mount_path = path.map(|p| p.strip_suffix('/').unwrap_or(p));

        for layer in &nested.layers {
            let mut layer = Layer::clone(layer);
            if let Some(mount_path) = mount_path {
                layer.set_prefix(mount_path)?;
            }
            if let Some(prefix) = &self.options.prefix {
                layer.set_prefix(prefix)?;
            }
            for (name, hook) in &self.params {
                layer.param(name, Arc::clone(hook));
            }
            self.layers.push(Arc::new(layer));
        }

        debug!(
            path = mount_path.unwrap_or(""),
            routes = nested.layers.len(),
            "router mounted"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("options", &self.options)
            .field("layers", &self.layers)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Default)]
struct Pending {
    stack: Vec<StackEntry>,
    params: Vec<(String, Arc<dyn ParamMiddleware>)>,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.stack.is_empty() && self.params.is_empty()
    }
}

/// Builder for a named route, returned by [`Router::named`].
pub struct NamedRoute<'r> {
    router: &'r mut Router,
    name: String,
}

macro_rules! named_verbs {
    ($($fn:ident => [$($method:ident),+];)+) => {
        $(
            #[doc = concat!("Registers the named route like [`Router::", stringify!($fn), "`].")]
            ///
            /// # Errors
            ///
            /// Returns [`RouterError::InvalidPattern`] if `path` does not compile.
            pub fn $fn<H>(self, path: &str, handlers: H) -> Result<&'r mut Router, RouterError>
            where
                H: IntoIterator,
                H::Item: Into<Handler>,
            {
                self.add([$(Method::$method),+], path, handlers)
            }
        )+
    };
}

impl<'r> NamedRoute<'r> {
    named_verbs! {
        get => [GET];
        post => [POST];
        put => [PUT];
        patch => [PATCH];
        delete => [DELETE];
        head => [HEAD];
        options => [OPTIONS];
        all => [DELETE, GET, POST, PUT];
    }

    /// Registers the named route for an explicit method list.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] if `path` does not compile.
    pub fn add<M, H>(self, methods: M, path: &str, handlers: H) -> Result<&'r mut Router, RouterError>
    where
        M: IntoIterator<Item = Method>,
        H: IntoIterator,
        H::Item: Into<Handler>,
    {
        let options = RouteOptions {
            name: Some(self.name),
            ..RouteOptions::default()
        };
        self.router.add(methods, path, handlers, options)
    }
}

/// Dispatch middleware for a shared router.
#[derive(Clone)]
pub struct Dispatch {
    router: Arc<Router>,
}

impl Dispatch {
    /// The router this dispatches to.
    #[must_use]
    pub fn router(&self) -> Arc<Router> {
        Arc::clone(&self.router)
    }
}

impl Middleware for Dispatch {
    fn name(&self) -> &'static str {
        "router"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let router = &self.router;
            let path: Arc<str> = match (&router.options.router_path, ctx.router_path()) {
                (Some(path), _) => path.as_str().into(),
                (None, Some(path)) => path.into(),
                (None, None) => path::decode_path(ctx.request().path())
                    .ok_or_else(|| HttpError::with_message(StatusCode::BAD_REQUEST, "malformed request path"))?
                    .into(),
            };

            let matched = router.match_path(&path, ctx.request().method());
            for layer in &matched.path {
                ctx.push_matched(Arc::clone(layer) as Arc<dyn MatchedRoute>);
            }
            ctx.set_router(Arc::clone(router) as Arc<dyn std::any::Any + Send + Sync>);

            if !matched.route {
                debug!(path = %path, "no route matched");
                return next.run(ctx).await;
            }

            let mut chain: Vec<BoxedMiddleware> = Vec::new();
            for layer in matched.path_and_method {
                chain.push(Arc::new(BindParams {
                    layer: Arc::clone(&layer),
                    path: Arc::clone(&path),
                }));
                chain.extend(layer.stack().cloned());
            }

            debug!(path = %path, stages = chain.len(), "dispatching");
            Next::chain(&chain, next).run(ctx).await
        })
    }
}

/// Binds a layer's captures and params before its stack runs.
struct BindParams {
    layer: Arc<Layer>,
    path: Arc<str>,
}

impl Middleware for BindParams {
    fn name(&self) -> &'static str {
        "bind_params"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        let captures = self.layer.captures(&self.path);
        self.layer.params(&captures, ctx.params_mut());
        ctx.set_captures(captures);
        ctx.set_route_name(self.layer.name().map(ToString::to_string));
        next.run(ctx)
    }
}

struct Redirect {
    destination: String,
    status: StatusCode,
}

impl Middleware for Redirect {
    fn name(&self) -> &'static str {
        "redirect"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            ctx.response_mut().redirect(&self.destination)?;
            ctx.response_mut().set_status(self.status);
            Ok(())
        })
    }
}

/// Builds a URL from a path pattern without registering a route.
///
/// ```
/// assert_eq!(
///     daedalus_router::url("/users/:id", [("id", "7")], &Default::default()).unwrap(),
///     "/users/7"
/// );
/// ```
///
/// # Errors
///
/// See [`path::to_url`].
pub fn url(
    path: &str,
    params: impl Into<UrlParams>,
    options: &UrlOptions,
) -> Result<String, RouterError> {
    path::to_url(path, &params.into(), options)
}
