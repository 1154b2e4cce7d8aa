//! Request logging middleware.
//!
//! Emits one structured `tracing` event per request once the downstream
//! pipeline has finished, and sets an `x-response-time` header.
//!
//! # Log fields
//!
//! - `method` - HTTP method
//! - `path` - request path
//! - `status` - response status
//! - `route` - matched route name, if any
//! - `duration_ms` - time spent in the pipeline

use http::header::{HeaderName, HeaderValue};

use daedalus_core::{Context, Result};

use crate::middleware::{BoxFuture, Middleware, Next};

/// Header carrying the pipeline duration.
pub const X_RESPONSE_TIME: HeaderName = HeaderName::from_static("x-response-time");

/// Logs every request at `info` (or `warn` for server errors).
///
/// ```
/// use daedalus_middleware::{Middleware, RequestLogger};
///
/// let logger = RequestLogger::new().response_time(false);
/// assert_eq!(logger.name(), "logger");
/// ```
#[derive(Debug, Clone)]
pub struct RequestLogger {
    response_time: bool,
}

impl RequestLogger {
    /// Creates a logger that also sets `x-response-time`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            response_time: true,
        }
    }

    /// Toggles the `x-response-time` header.
    #[must_use]
    pub fn response_time(mut self, enabled: bool) -> Self {
        self.response_time = enabled;
        self
    }
}

impl Default for RequestLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for RequestLogger {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let method = ctx.request().method().clone();
            let path = ctx.request().path().to_string();

            let result = next.run(ctx).await;

            let elapsed = ctx.elapsed();
            let duration_ms = elapsed.as_secs_f64() * 1000.0;
            let status = match &result {
                Ok(()) => ctx.response().status(),
                Err(err) => err.status(),
            };

            if self.response_time && ctx.response().writable() {
                if let Ok(value) = HeaderValue::try_from(format!("{duration_ms:.3}ms")) {
                    ctx.response_mut().set_header(X_RESPONSE_TIME, value);
                }
            }

            if status.is_server_error() {
                tracing::warn!(
                    %method,
                    %path,
                    status = status.as_u16(),
                    route = ctx.route_name(),
                    duration_ms,
                    "request failed"
                );
            } else {
                tracing::info!(
                    %method,
                    %path,
                    status = status.as_u16(),
                    route = ctx.route_name(),
                    duration_ms,
                    "request completed"
                );
            }

            result
        })
    }
}
