//! Test request building.

use std::net::SocketAddr;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use serde::Serialize;
use serde_json::Value;

use crate::error::TestError;

/// Host used when a request does not set one.
pub const DEFAULT_HOST: &str = "localhost";

/// A built test request.
#[derive(Debug, Clone)]
pub struct TestRequest {
    /// HTTP method
    pub method: Method,
    /// Request URI
    pub uri: Uri,
    /// Request headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Bytes,
    /// Reported peer address
    pub remote: Option<SocketAddr>,
    /// Whether the request claims to have arrived over TLS
    pub secure: bool,
}

impl TestRequest {
    /// Starts a GET request.
    pub fn get(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::GET, uri)
    }

    /// Starts a POST request.
    pub fn post(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::POST, uri)
    }

    /// Starts a PUT request.
    pub fn put(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::PUT, uri)
    }

    /// Starts a PATCH request.
    pub fn patch(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::PATCH, uri)
    }

    /// Starts a DELETE request.
    pub fn delete(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::DELETE, uri)
    }

    /// Starts an OPTIONS request.
    pub fn options(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::OPTIONS, uri)
    }

    /// Starts a HEAD request.
    pub fn head(uri: impl AsRef<str>) -> TestRequestBuilder {
        TestRequestBuilder::new(Method::HEAD, uri)
    }

    /// Converts to the request type the application handles.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::RequestBuild`] if the parts do not form a valid
    /// request.
    pub fn into_http_request(self) -> Result<http::Request<Bytes>, TestError> {
        let mut request = http::Request::builder()
            .method(self.method)
            .uri(self.uri)
            .body(self.body)
            .map_err(|e| TestError::RequestBuild(e.to_string()))?;
        *request.headers_mut() = self.headers;
        Ok(request)
    }
}

/// Builder for test requests.
///
/// Invalid headers or bodies are recorded and reported by
/// [`build`](Self::build), so calls can be chained freely.
#[must_use]
#[derive(Debug)]
pub struct TestRequestBuilder {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    remote: Option<SocketAddr>,
    secure: bool,
    error: Option<TestError>,
}

impl TestRequestBuilder {
    /// Creates a builder.
    pub fn new(method: Method, uri: impl AsRef<str>) -> Self {
        Self {
            method,
            uri: uri.as_ref().to_string(),
            headers: HeaderMap::new(),
            body: None,
            remote: None,
            secure: false,
            error: None,
        }
    }

    /// Sets a header, replacing earlier values.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let name = HeaderName::try_from(name.as_ref());
        let value = HeaderValue::try_from(value.as_ref());
        match (name, value) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            (Err(e), _) => self.fail(TestError::InvalidHeader(e.to_string())),
            (_, Err(e)) => self.fail(TestError::InvalidHeader(e.to_string())),
        }
        self
    }

    /// Appends a header value.
    pub fn append_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the Content-Type header.
    pub fn content_type(self, content_type: impl AsRef<str>) -> Self {
        self.header(header::CONTENT_TYPE.as_str(), content_type)
    }

    /// Sets the Accept header.
    pub fn accept(self, accept: impl AsRef<str>) -> Self {
        self.header(header::ACCEPT.as_str(), accept)
    }

    /// Sets the Authorization header with a Bearer token.
    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.header(header::AUTHORIZATION.as_str(), format!("Bearer {}", token.as_ref()))
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets a JSON body and `application/json`.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.body = Some(Bytes::from(bytes)),
            Err(e) => self.fail(e.into()),
        }
        self.content_type("application/json")
    }

    /// Sets a form-urlencoded body from a flat object.
    pub fn form<T: Serialize>(mut self, value: &T) -> Self {
        match form_encode(value) {
            Ok(encoded) => self.body = Some(Bytes::from(encoded)),
            Err(e) => self.fail(e),
        }
        self.content_type("application/x-www-form-urlencoded")
    }

    /// Sets the reported peer address.
    pub fn remote(mut self, remote: SocketAddr) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Marks the request as arriving over TLS.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Builds the request. Adds `Host: localhost` when no host is set.
    ///
    /// # Errors
    ///
    /// Returns the first recorded error, or [`TestError::RequestBuild`] for an
    /// invalid URI.
    pub fn build(mut self) -> Result<TestRequest, TestError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let uri: Uri = self
            .uri
            .parse()
            .map_err(|e| TestError::RequestBuild(format!("Invalid URI: {e}")))?;
        if !self.headers.contains_key(header::HOST) && uri.authority().is_none() {
            self.headers
                .insert(header::HOST, HeaderValue::from_static(DEFAULT_HOST));
        }

        Ok(TestRequest {
            method: self.method,
            uri,
            headers: self.headers,
            body: self.body.unwrap_or_default(),
            remote: self.remote,
            secure: self.secure,
        })
    }

    fn fail(&mut self, error: TestError) {
        self.error.get_or_insert(error);
    }
}

fn form_encode<T: Serialize>(value: &T) -> Result<String, TestError> {
    let Value::Object(map) = serde_json::to_value(value)? else {
        return Err(TestError::RequestBuild("form body must be an object".to_string()));
    };
    let pairs: Vec<String> = map
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            format!("{}={}", urlencoding::encode(&k), urlencoding::encode(&v))
        })
        .collect();
    Ok(pairs.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_request_gets_default_host() {
        let request = TestRequest::get("/chores").build().unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.uri.path(), "/chores");
        assert_eq!(request.headers[header::HOST], DEFAULT_HOST);
    }

    #[test]
    fn test_explicit_host_kept() {
        let request = TestRequest::get("/").header("Host", "example.test").build().unwrap();
        assert_eq!(request.headers[header::HOST], "example.test");
    }

    #[test]
    fn test_bearer_token() {
        let request = TestRequest::get("/users").bearer_token("my_token").build().unwrap();
        assert_eq!(request.headers.get("Authorization").unwrap(), "Bearer my_token");
    }

    #[test]
    fn test_json_body() {
        let request = TestRequest::post("/users")
            .json(&json!({"name": "Alice"}))
            .build()
            .unwrap();
        assert_eq!(request.headers.get("Content-Type").unwrap(), "application/json");
        assert_eq!(request.body.as_ref(), b"{\"name\":\"Alice\"}");
    }

    #[test]
    fn test_form_body() {
        let request = TestRequest::post("/chores")
            .form(&json!({"title": "wash up", "done": false}))
            .build()
            .unwrap();
        let body = std::str::from_utf8(&request.body).unwrap();
        assert!(body.contains("title=wash%20up"));
        assert!(body.contains("done=false"));

        assert!(TestRequest::post("/").form(&json!([1, 2])).build().is_err());
    }

    #[test]
    fn test_invalid_header_reported_at_build() {
        let result = TestRequest::get("/").header("bad header", "x").header("ok", "y").build();
        assert!(matches!(result, Err(TestError::InvalidHeader(_))));
    }

    #[test]
    fn test_invalid_uri() {
        assert!(matches!(
            TestRequest::get("not a uri").build(),
            Err(TestError::RequestBuild(_))
        ));
    }

    #[test]
    fn test_into_http_request() {
        let request = TestRequest::delete("/users/7")
            .header("X-Test", "value")
            .build()
            .unwrap()
            .into_http_request()
            .unwrap();
        assert_eq!(request.method(), Method::DELETE);
        assert_eq!(request.uri().path(), "/users/7");
        assert_eq!(request.headers().get("X-Test").unwrap(), "value");
    }
}
