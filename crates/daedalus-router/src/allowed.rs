//! `OPTIONS` handling and method rejection.

use std::fmt;
use std::sync::Arc;

use daedalus_core::{Context, Error, HttpError, Result};
use daedalus_middleware::{BoxFuture, Middleware, Next};
use http::header::{HeaderValue, ALLOW};
use http::{Method, StatusCode};

/// Produces the error thrown for an unsupported method.
pub type ErrorFactory = Arc<dyn Fn() -> HttpError + Send + Sync>;

/// Options for [`AllowedMethods`].
#[derive(Clone, Default)]
pub struct AllowedMethodsOptions {
    /// Fail with an error instead of setting the status.
    pub throw: bool,
    /// Error for methods the router does not implement. Defaults to 501.
    pub not_implemented: Option<ErrorFactory>,
    /// Error for methods the matched path does not answer. Defaults to 405.
    pub method_not_allowed: Option<ErrorFactory>,
}

impl AllowedMethodsOptions {
    /// Throwing mode with the default errors.
    #[must_use]
    pub fn throwing() -> Self {
        Self {
            throw: true,
            ..Self::default()
        }
    }
}

impl fmt::Debug for AllowedMethodsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllowedMethodsOptions")
            .field("throw", &self.throw)
            .field("not_implemented", &self.not_implemented.is_some())
            .field("method_not_allowed", &self.method_not_allowed.is_some())
            .finish()
    }
}

/// Answers `OPTIONS` and rejects unsupported methods after downstream ran.
///
/// Acts only when the response is still a 404. The allowed set is the union
/// of methods over every layer the request path matched, across all routers
/// that dispatched it, in first-seen order.
///
/// - a method the router does not implement yields 501
/// - `OPTIONS` yields 200 with an `Allow` header
/// - any other method outside the allowed set yields 405
#[derive(Debug, Clone)]
pub struct AllowedMethods {
    implemented: Vec<Method>,
    options: AllowedMethodsOptions,
}

impl AllowedMethods {
    pub(crate) fn new(implemented: Vec<Method>, options: AllowedMethodsOptions) -> Self {
        Self {
            implemented,
            options,
        }
    }

    fn reject(&self, ctx: &mut Context, status: StatusCode, allow: HeaderValue) -> Result<()> {
        if self.options.throw {
            let factory = if status == StatusCode::NOT_IMPLEMENTED {
                &self.options.not_implemented
            } else {
                &self.options.method_not_allowed
            };
            let error = match factory {
                Some(factory) => factory(),
                None => HttpError::new(status),
            };
            return Err(Error::Http(error.with_header(ALLOW, allow)));
        }

        let response = ctx.response_mut();
        response.set_status(status);
        response.set_header(ALLOW, allow);
        Ok(())
    }
}

impl Middleware for AllowedMethods {
    fn name(&self) -> &'static str {
        "allowed_methods"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            next.run(ctx).await?;

            if ctx.response().status() != StatusCode::NOT_FOUND {
                return Ok(());
            }

            let mut allowed: Vec<Method> = Vec::new();
            for route in ctx.matched() {
                for method in route.methods() {
                    if !allowed.contains(method) {
                        allowed.push(method.clone());
                    }
                }
            }
            let joined = allowed
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            let allow = HeaderValue::from_str(&joined).map_err(http::Error::from)?;

            let method = ctx.request().method().clone();
            if !self.implemented.contains(&method) {
                return self.reject(ctx, StatusCode::NOT_IMPLEMENTED, allow);
            }
            if allowed.is_empty() {
                return Ok(());
            }
            if method == Method::OPTIONS {
                let response = ctx.response_mut();
                response.set_status(StatusCode::OK);
                response.set_body("");
                response.set_header(ALLOW, allow);
                return Ok(());
            }
            if !allowed.contains(&method) {
                return self.reject(ctx, StatusCode::METHOD_NOT_ALLOWED, allow);
            }
            Ok(())
        })
    }
}
