//! The inbound request as seen by middleware.

use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{Error, HttpError, Result};

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// A fully buffered inbound request.
///
/// The absolute [`Url`] is assembled once at construction from the scheme,
/// the `Host` header and the request target. When the application trusts a
/// proxy, `x-forwarded-proto` and `x-forwarded-host` take precedence.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    url: Url,
    remote: Option<SocketAddr>,
    secure: bool,
    proxy: bool,
}

impl Request {
    /// Wraps a protocol-level request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] when no valid absolute URL can be
    /// built, for example because the `Host` header is malformed.
    pub fn new(
        request: http::Request<Bytes>,
        remote: Option<SocketAddr>,
        secure: bool,
        proxy: bool,
    ) -> Result<Self> {
        let (parts, body) = request.into_parts();
        let url = build_url(&parts.uri, &parts.headers, secure, proxy)?;
        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            url,
            remote,
            secure,
            proxy,
        })
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request target as received.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the HTTP version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the absolute request URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the raw (still percent-encoded) path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Returns the raw query string, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns true if the request carries a body.
    #[must_use]
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// Returns the raw body bytes.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Fails with `400 Bad Request` if the body is not valid UTF-8.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.body)
            .map_err(|_| HttpError::bad_request("request body is not valid UTF-8").into())
    }

    /// Deserializes a JSON body.
    ///
    /// # Errors
    ///
    /// Fails with `400 Bad Request` if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| HttpError::bad_request(format!("invalid JSON body: {e}")).into())
    }

    /// Returns true if the request arrived over TLS, or the trusted proxy
    /// says it did.
    #[must_use]
    pub fn secure(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Returns the peer address of the connection.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Returns the client addresses, nearest proxy last.
    ///
    /// Only populated from `x-forwarded-for` when the proxy is trusted.
    #[must_use]
    pub fn ips(&self) -> Vec<IpAddr> {
        if !self.proxy {
            return Vec::new();
        }
        self.header(X_FORWARDED_FOR)
            .map(|v| {
                v.split(',')
                    .filter_map(|ip| ip.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the client address.
    #[must_use]
    pub fn ip(&self) -> Option<IpAddr> {
        self.ips()
            .first()
            .copied()
            .or_else(|| self.remote.map(|addr| addr.ip()))
    }

    /// Returns true if the connection itself was TLS, regardless of proxy
    /// headers.
    #[must_use]
    pub fn transport_secure(&self) -> bool {
        self.secure
    }
}

fn first_forwarded<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn build_url(uri: &Uri, headers: &HeaderMap, secure: bool, proxy: bool) -> Result<Url> {
    let forwarded_proto = if proxy {
        first_forwarded(headers, X_FORWARDED_PROTO)
    } else {
        None
    };
    let scheme = forwarded_proto.unwrap_or(if secure { "https" } else { "http" });

    let forwarded_host = if proxy {
        first_forwarded(headers, X_FORWARDED_HOST)
    } else {
        None
    };
    let host = match forwarded_host {
        Some(host) => host.to_string(),
        None => match headers.get(http::header::HOST) {
            Some(value) => value
                .to_str()
                .map_err(|_| Error::InvalidRequest("Host header is not valid ASCII".into()))?
                .to_string(),
            None => uri
                .authority()
                .map_or_else(|| "localhost".to_string(), ToString::to_string),
        },
    };

    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let raw = format!("{scheme}://{host}{target}");
    Url::parse(&raw).map_err(|e| Error::InvalidRequest(format!("invalid request URL '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn build(req: http::Request<Bytes>, proxy: bool) -> Result<Request> {
        Request::new(req, Some("10.0.0.1:5000".parse().unwrap()), false, proxy)
    }

    #[test]
    fn test_url_from_host_header() {
        let req = http::Request::get("/chores/1?done=true")
            .header("host", "example.com:8080")
            .body(Bytes::new())
            .unwrap();
        let req = build(req, false).unwrap();

        assert_eq!(req.url().as_str(), "http://example.com:8080/chores/1?done=true");
        assert_eq!(req.path(), "/chores/1");
        assert_eq!(req.query(), Some("done=true"));
        assert!(!req.secure());
    }

    #[test]
    fn test_forwarded_headers_only_when_proxy_trusted() {
        let make = || {
            http::Request::get("/")
                .header("host", "internal:3000")
                .header("x-forwarded-proto", "https")
                .header("x-forwarded-host", "public.example")
                .header("x-forwarded-for", "203.0.113.9, 10.0.0.2")
                .body(Bytes::new())
                .unwrap()
        };

        let direct = build(make(), false).unwrap();
        assert_eq!(direct.url().host_str(), Some("internal"));
        assert_eq!(direct.ip(), Some("10.0.0.1".parse().unwrap()));
        assert!(direct.ips().is_empty());

        let proxied = build(make(), true).unwrap();
        assert_eq!(proxied.url().as_str(), "https://public.example/");
        assert!(proxied.secure());
        assert!(!proxied.transport_secure());
        assert_eq!(proxied.ip(), Some("203.0.113.9".parse().unwrap()));
        assert_eq!(proxied.ips().len(), 2);
    }

    #[test]
    fn test_invalid_host_is_invalid_request() {
        let req = http::Request::get("/")
            .header("host", "bad host")
            .body(Bytes::new())
            .unwrap();
        let err = build(req, false).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_missing_host_falls_back() {
        let req = http::Request::get("/x").body(Bytes::new()).unwrap();
        let req = build(req, false).unwrap();
        assert_eq!(req.url().as_str(), "http://localhost/x");
    }

    #[test]
    fn test_json_body() {
        #[derive(Debug, Deserialize)]
        struct Chore {
            title: String,
        }

        let req = http::Request::post("/chores")
            .header("host", "h")
            .body(Bytes::from_static(br#"{"title":"dishes"}"#))
            .unwrap();
        let req = build(req, false).unwrap();
        assert!(req.has_body());
        let chore: Chore = req.json().unwrap();
        assert_eq!(chore.title, "dishes");

        let bad = http::Request::post("/chores")
            .header("host", "h")
            .body(Bytes::from_static(b"{"))
            .unwrap();
        let err = build(bad, false).unwrap().json::<Chore>().unwrap_err();
        assert_eq!(err.status(), http::StatusCode::BAD_REQUEST);
    }
}
