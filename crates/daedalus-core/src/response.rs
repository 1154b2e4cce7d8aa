//! The outbound response built up by middleware.
//!
//! A [`Response`] stays writable until it is converted with
//! [`Response::take_http`] or released with [`Response::destroy`]. Resources
//! registered with [`Response::add_resource`] are released exactly once, by
//! whichever of `destroy` or `Drop` happens first.

use std::fmt;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

const TEXT_PLAIN: &str = "text/plain; charset=UTF-8";
const TEXT_HTML: &str = "text/html; charset=UTF-8";
const APPLICATION_JSON: &str = "application/json; charset=UTF-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// A response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Explicitly empty. Defaults the status to `204 No Content`.
    Empty,
    /// Raw bytes.
    Bytes(Bytes),
    /// UTF-8 text. Served as HTML when it looks like markup.
    Text(String),
    /// A JSON document.
    Json(Value),
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(b))
    }
}

impl From<Value> for Body {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}

impl Body {
    fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Empty => None,
            Self::Bytes(_) => Some(OCTET_STREAM),
            Self::Text(text) if text.trim_start().starts_with('<') => Some(TEXT_HTML),
            Self::Text(_) => Some(TEXT_PLAIN),
            Self::Json(_) => Some(APPLICATION_JSON),
        }
    }

    fn into_bytes(self) -> Result<Bytes> {
        Ok(match self {
            Self::Empty => Bytes::new(),
            Self::Bytes(bytes) => bytes,
            Self::Text(text) => Bytes::from(text),
            Self::Json(value) => Bytes::from(serde_json::to_vec(&value)?),
        })
    }
}

type Closer = Box<dyn FnOnce() + Send>;

/// The response under construction.
///
/// # Example
///
/// ```
/// use daedalus_core::{Body, Response};
/// use http::StatusCode;
///
/// let mut res = Response::new();
/// assert_eq!(res.status(), StatusCode::NOT_FOUND);
///
/// res.set_body("done");
/// assert_eq!(res.status(), StatusCode::OK);
///
/// let http = res.take_http().unwrap();
/// assert_eq!(http.headers()["content-type"], "text/plain; charset=UTF-8");
/// ```
pub struct Response {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Option<Body>,
    writable: bool,
    resources: Vec<Closer>,
    destroyed: bool,
}

impl Response {
    /// Creates an empty, writable response.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: None,
            headers: HeaderMap::new(),
            body: None,
            writable: true,
            resources: Vec::new(),
            destroyed: false,
        }
    }

    /// Returns the effective status.
    ///
    /// An explicit status always wins. Otherwise a missing body means
    /// `404`, [`Body::Empty`] means `204` and any other body means `200`.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match (self.status, &self.body) {
            (Some(status), _) => status,
            (None, None) => StatusCode::NOT_FOUND,
            (None, Some(Body::Empty)) => StatusCode::NO_CONTENT,
            (None, Some(_)) => StatusCode::OK,
        }
    }

    /// Returns the status only if one was set explicitly.
    #[must_use]
    pub fn explicit_status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Sets the status.
    pub fn set_status(&mut self, status: StatusCode) {
        if self.check_writable() {
            self.status = Some(status);
        }
    }

    /// Returns the body, if one was set.
    #[must_use]
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Sets the body.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        if self.check_writable() {
            self.body = Some(body.into());
        }
    }

    /// Serializes `value` as a JSON body.
    pub fn set_json<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set_body(Body::Json(value));
        Ok(())
    }

    /// Removes the body.
    pub fn clear_body(&mut self) {
        if self.check_writable() {
            self.body = None;
        }
    }

    /// Returns the headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the headers mutably.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Sets a header, replacing existing values.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.check_writable() {
            self.headers.insert(name, value);
        }
    }

    /// Redirects to `url`.
    ///
    /// Uses `302 Found` unless a redirect status was already chosen, and
    /// sets a short text body.
    pub fn redirect(&mut self, url: &str) -> Result<()> {
        let location = HeaderValue::try_from(url).map_err(http::Error::from)?;
        self.set_header(LOCATION, location);
        if !self.status.is_some_and(|s| s.is_redirection()) {
            self.set_status(StatusCode::FOUND);
        }
        self.set_body(format!("Redirecting to {url}."));
        Ok(())
    }

    /// Registers a closer run when the response is destroyed.
    pub fn add_resource(&mut self, closer: impl FnOnce() + Send + 'static) {
        if self.destroyed {
            closer();
        } else {
            self.resources.push(Box::new(closer));
        }
    }

    /// Returns true until the response has been converted or destroyed.
    #[must_use]
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// Converts to a protocol-level response and seals this one.
    ///
    /// Infers `content-type` when it is not set and always sets
    /// `content-length`.
    pub fn take_http(&mut self) -> Result<http::Response<Full<Bytes>>> {
        let status = self.status();
        self.writable = false;

        let body = self.body.take();
        let mut headers = std::mem::take(&mut self.headers);
        if let Some(ct) = body.as_ref().and_then(Body::content_type) {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
            }
        }

        let bytes = match body {
            Some(body) => body.into_bytes()?,
            None if status == StatusCode::NOT_FOUND => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
                }
                Bytes::from_static(b"Not Found")
            }
            None => Bytes::new(),
        };
        headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));

        let mut response = http::Response::new(Full::new(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    /// Releases every registered resource. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.writable = false;
        for closer in self.resources.drain(..) {
            closer();
        }
    }

    /// Returns true once [`destroy`](Self::destroy) has run.
    #[must_use]
    pub fn destroyed(&self) -> bool {
        self.destroyed
    }

    fn check_writable(&self) -> bool {
        if !self.writable {
            tracing::warn!("ignoring write to a response that was already sent");
        }
        self.writable
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status())
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("writable", &self.writable)
            .field("resources", &self.resources.len())
            .finish()
    }
}
