//! The application: a middleware list bound to a transport.
//!
//! # Architecture
//!
//! ```text
//! transport ──InboundRequest──▶ Context::new ──▶ composed pipeline
//!                                                   │
//!                       responder ◀── take_http ◀───┘ (errors: handle_error)
//! ```
//!
//! Each accepted request runs in its own task and is tracked in a
//! [`HandlingSet`]. Every request ends with exactly one
//! [`Response::destroy`](daedalus_core::Response::destroy), whether it
//! succeeded, failed or opted out of responding.
//!
//! # Example
//!
//! ```rust
//! use daedalus_middleware::middleware_fn;
//! use daedalus_server::Application;
//!
//! # tokio_test::block_on(async {
//! let app = Application::new();
//! app.use_middleware(middleware_fn(|ctx, _next| {
//!     Box::pin(async move {
//!         ctx.response_mut().set_body("hello");
//!         Ok(())
//!     })
//! }));
//!
//! let request = http::Request::get("/").header("host", "localhost").body(bytes::Bytes::new()).unwrap();
//! let response = app.handle(request, None, false).await.unwrap().unwrap();
//! assert_eq!(response.status(), 200);
//! # });
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use daedalus_core::{reason_phrase, AppHandle, Context, Error, SharedState};
use daedalus_middleware::{compose, BoxedMiddleware, Composed, Middleware};
use http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{Method, StatusCode};
use http_body_util::Full;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use crate::error::{ServerError, ServerResult};
use crate::events::{AppEvent, ErrorEvent, ListenEvent};
use crate::options::{ApplicationOptions, ListenOptions};
use crate::shutdown::{AbortSignal, HandlingSet};
use crate::transport::{http_factory, HttpResponse, InboundRequest, TransportFactory};

const EVENT_CAPACITY: usize = 256;
const TEXT_PLAIN: &str = "text/plain; charset=UTF-8";

/// A Koa-style application.
///
/// Cheap to clone; clones share middleware, state and events.
#[derive(Clone)]
pub struct Application {
    inner: Arc<Inner>,
}

struct Inner {
    middleware: RwLock<Vec<BoxedMiddleware>>,
    pending_init: Mutex<Vec<BoxedMiddleware>>,
    composed: RwLock<Option<Arc<Composed>>>,
    handle: AppHandle,
    options: ApplicationOptions,
    events: broadcast::Sender<AppEvent>,
    transport: RwLock<TransportFactory>,
    listening: AtomicBool,
    closing: AtomicBool,
    closed: AtomicBool,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    /// Creates an application with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(ApplicationOptions::default())
    }

    /// Creates an application.
    #[must_use]
    pub fn with_options(options: ApplicationOptions) -> Self {
        let state = SharedState::from_map(options.state.clone());
        let mut handle = AppHandle::new(state).with_proxy(options.proxy);
        if let Some(keys) = &options.keys {
            handle = handle.with_keys(Arc::clone(keys));
        }
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                middleware: RwLock::new(Vec::new()),
                pending_init: Mutex::new(Vec::new()),
                composed: RwLock::new(None),
                handle,
                options,
                events,
                transport: RwLock::new(http_factory()),
                listening: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Appends middleware.
    ///
    /// Its `init` hook runs before the next `listen`. Requests already
    /// running keep the pipeline they started with.
    pub fn use_middleware(&self, middleware: impl Middleware) -> &Self {
        let middleware: BoxedMiddleware = Arc::new(middleware);
        tracing::debug!(name = middleware.name(), "middleware registered");

        self.inner.middleware.write().push(Arc::clone(&middleware));
        self.inner.pending_init.lock().push(middleware);
        *self.inner.composed.write() = None;
        self
    }

    /// Replaces the transport factory used by `listen`.
    pub fn set_transport(&self, factory: TransportFactory) -> &Self {
        *self.inner.transport.write() = factory;
        self
    }

    /// The shared application state.
    #[must_use]
    pub fn state(&self) -> &SharedState {
        self.inner.handle.state()
    }

    /// The handle every context receives.
    #[must_use]
    pub fn app_handle(&self) -> &AppHandle {
        &self.inner.handle
    }

    /// The options the application was created with.
    #[must_use]
    pub fn options(&self) -> &ApplicationOptions {
        &self.inner.options
    }

    /// Subscribes to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.inner.events.subscribe()
    }

    /// Number of registered middleware.
    #[must_use]
    pub fn middleware_count(&self) -> usize {
        self.inner.middleware.read().len()
    }

    /// Returns `true` while a listener is open.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.inner.listening.load(Ordering::SeqCst)
    }

    /// Returns `true` once an abort has stopped intake, until the listener has closed.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
    }

    /// Returns `true` once a listener has fully closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Listens until `signal` is aborted and every in-flight request has
    /// finished.
    ///
    /// Fires one [`AppEvent::Listen`] once bound and one [`AppEvent::Close`]
    /// once closed.
    ///
    /// # Errors
    ///
    /// Fails before binding if no middleware is registered, an `init` hook
    /// fails, or the transport cannot listen.
    pub async fn listen(&self, options: ListenOptions, signal: AbortSignal) -> ServerResult<()> {
        if self.middleware_count() == 0 {
            return Err(ServerError::NoMiddleware);
        }
        if self.inner.listening.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyListening);
        }

        let result = self.serve(&options, &signal).await;
        self.inner.listening.store(false, Ordering::SeqCst);
        result
    }

    async fn serve(&self, options: &ListenOptions, signal: &AbortSignal) -> ServerResult<()> {
        self.run_init().await?;

        let factory = Arc::clone(&*self.inner.transport.read());
        let mut transport = factory(options)?;
        let local_addr = transport.listen().await?;

        self.inner.closing.store(false, Ordering::SeqCst);
        self.inner.closed.store(false, Ordering::SeqCst);
        tracing::info!(
            %local_addr,
            secure = options.secure(),
            transport = transport.kind(),
            "listening"
        );
        self.emit(AppEvent::Listen(ListenEvent {
            hostname: options.hostname().to_string(),
            port: local_addr.port(),
            secure: options.secure(),
            local_addr,
            transport: transport.kind(),
        }));

        let handling = HandlingSet::new();
        loop {
            tokio::select! {
                biased;
                () = signal.aborted() => break,
                inbound = transport.accept() => match inbound {
                    Some(inbound) => self.spawn_inbound(&handling, inbound),
                    None => break,
                },
            }
        }

        // Requests queued before the stop are still answered.
        let queued = transport.stop_accepting().await;
        if !queued.is_empty() {
            tracing::debug!(queued = queued.len(), "handling requests queued before abort");
        }
        for inbound in queued {
            self.spawn_inbound(&handling, inbound);
        }

        self.inner.closing.store(true, Ordering::SeqCst);
        if !handling.is_empty() {
            tracing::info!(in_flight = handling.len(), "waiting for in-flight requests");
            handling.drained().await;
        }

        transport.close().await;
        self.inner.closing.store(false, Ordering::SeqCst);
        self.inner.closed.store(true, Ordering::SeqCst);
        tracing::info!(%local_addr, "closed");
        self.emit(AppEvent::Close);
        Ok(())
    }

    async fn run_init(&self) -> ServerResult<()> {
        let pending: Vec<BoxedMiddleware> = std::mem::take(&mut *self.inner.pending_init.lock());
        for (index, middleware) in pending.iter().enumerate() {
            if let Err(source) = middleware.init().await {
                // Keep the failed hook and everything after it for the next attempt.
                self.inner
                    .pending_init
                    .lock()
                    .splice(0..0, pending[index..].iter().cloned());
                return Err(ServerError::Init {
                    name: middleware.name(),
                    source,
                });
            }
        }
        Ok(())
    }

    /// Runs one request through the pipeline without a listener.
    ///
    /// Returns `Ok(None)` if the middleware opted out of responding.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidRequest`] if no context could be built
    /// for the request. The failure is also reported as an error event.
    pub async fn handle(
        &self,
        request: http::Request<Bytes>,
        remote: Option<SocketAddr>,
        secure: bool,
    ) -> ServerResult<Option<HttpResponse>> {
        let ctx = Context::new(
            self.inner.handle.clone(),
            request,
            remote,
            secure,
            self.inner.options.state_policy,
        );
        match ctx {
            Ok(ctx) => Ok(self.respond(ctx).await),
            Err(error) => {
                let message = error.to_string();
                self.report(None, error);
                Err(ServerError::InvalidRequest(message))
            }
        }
    }

    fn spawn_inbound(&self, handling: &HandlingSet, inbound: InboundRequest) {
        let guard = handling.acquire();
        let app = self.clone();
        tokio::spawn(async move {
            app.handle_inbound(inbound).await;
            drop(guard);
        });
    }

    async fn handle_inbound(&self, inbound: InboundRequest) {
        let (request, remote, secure, responder) = inbound.into_parts();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        match self.handle(request, remote, secure).await {
            Ok(Some(response)) => {
                if let Err(e) = responder.respond(response) {
                    let error = Error::Other(anyhow::Error::new(e));
                    self.emit_error(Some(method), Some(path), error);
                }
            }
            Ok(None) => tracing::debug!(%method, %path, "response left to middleware"),
            Err(_) => {}
        }
    }

    async fn respond(&self, mut ctx: Context) -> Option<HttpResponse> {
        let pipeline = self.composed();
        if let Err(error) = pipeline.run(&mut ctx).await {
            self.handle_error(&mut ctx, error);
        }

        let response = if ctx.respond() {
            Some(self.convert(&mut ctx))
        } else {
            None
        };
        ctx.response_mut().destroy();
        response
    }

    fn convert(&self, ctx: &mut Context) -> HttpResponse {
        let head = ctx.request().method() == Method::HEAD;
        match ctx.response_mut().take_http() {
            Ok(response) if head => {
                let (parts, _) = response.into_parts();
                http::Response::from_parts(parts, Full::new(Bytes::new()))
            }
            Ok(response) => response,
            Err(error) => {
                let status = error.status();
                self.report(Some(ctx), error);
                plain_response(status, reason_phrase(status))
            }
        }
    }

    /// Turns a pipeline error into a response. Never fails.
    fn handle_error(&self, ctx: &mut Context, error: Error) {
        let status = error.status();
        let body = error.client_message();
        let headers = error.headers().cloned();
        self.report(Some(ctx), error);

        let response = ctx.response_mut();
        if !response.writable() {
            return;
        }
        response.headers_mut().clear();
        if let Some(headers) = headers {
            for (name, value) in &headers {
                response.headers_mut().append(name, value.clone());
            }
        }
        response.set_header(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
        response.set_status(status);
        response.set_body(body);
    }

    fn report(&self, ctx: Option<&Context>, error: Error) {
        let method = ctx.map(|ctx| ctx.request().method().clone());
        let path = ctx.map(|ctx| ctx.request().path().to_string());
        self.emit_error(method, path, error);
    }

    fn emit_error(&self, method: Option<Method>, path: Option<String>, error: Error) {
        let status = error.status();
        let message = error.to_string();

        if self.inner.options.log_errors && !error.expose() && status != StatusCode::NOT_FOUND {
            tracing::error!(
                status = status.as_u16(),
                method = method.as_ref().map(Method::as_str),
                path = path.as_deref(),
                error = %message,
                "request failed"
            );
        }

        self.emit(AppEvent::Error(ErrorEvent {
            message,
            status,
            method,
            path,
            error: Arc::new(error),
        }));
    }

    fn emit(&self, event: AppEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn composed(&self) -> Arc<Composed> {
        if let Some(composed) = self.inner.composed.read().as_ref() {
            return Arc::clone(composed);
        }

        let mut cache = self.inner.composed.write();
        let composed = cache.get_or_insert_with(|| Arc::new(compose(self.inner.middleware.read().iter().cloned())));
        Arc::clone(composed)
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field(
                "middleware",
                &self.inner.middleware.read().iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("options", &self.inner.options)
            .field("listening", &self.is_listening())
            .field("closing", &self.is_closing())
            .finish()
    }
}

fn plain_response(status: StatusCode, body: &'static str) -> HttpResponse {
    let mut response = http::Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    response
        .headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    response
}
