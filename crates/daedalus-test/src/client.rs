//! Test client for in-memory requests.

use daedalus_server::Application;
use http::{HeaderName, HeaderValue, Method};

use crate::error::TestError;
use crate::request::{TestRequest, TestRequestBuilder};
use crate::response::TestResponse;

/// Sends requests straight into an [`Application`], with no listener.
///
/// Requests run the full middleware pipeline and error handling, exactly as
/// they would behind a transport.
///
/// ```rust
/// use daedalus_middleware::middleware_fn;
/// use daedalus_server::Application;
/// use daedalus_test::TestClient;
///
/// # tokio_test::block_on(async {
/// let app = Application::new();
/// app.use_middleware(middleware_fn(|ctx, _next| {
///     Box::pin(async move {
///         ctx.response_mut().set_body("pong");
///         Ok(())
///     })
/// }));
///
/// let client = TestClient::new(app);
/// let response = client.get("/ping").send().await.unwrap();
/// response.assert_body_eq("pong");
/// # });
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub struct TestClient {
    app: Application,
    default_headers: Vec<(HeaderName, HeaderValue)>,
}

impl TestClient {
    /// Wraps an application.
    pub fn new(app: Application) -> Self {
        Self {
            app,
            default_headers: Vec::new(),
        }
    }

    /// The wrapped application.
    #[must_use]
    pub fn app(&self) -> &Application {
        &self.app
    }

    /// Adds a header sent with every request unless the request sets it.
    pub fn with_default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.push((name, value));
        self
    }

    /// Starts a GET request.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::get(uri))
    }

    /// Starts a POST request.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::post(uri))
    }

    /// Starts a PUT request.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::put(uri))
    }

    /// Starts a PATCH request.
    pub fn patch(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::patch(uri))
    }

    /// Starts a DELETE request.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::delete(uri))
    }

    /// Starts an OPTIONS request.
    pub fn options(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::options(uri))
    }

    /// Starts a HEAD request.
    pub fn head(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::head(uri))
    }

    /// Starts a request with any method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequestBuilder::new(method, uri))
    }

    /// Sends a built request.
    ///
    /// # Errors
    ///
    /// Fails if the application rejects the request before running
    /// middleware, or if middleware opted out of responding.
    pub async fn send(&self, request: TestRequest) -> Result<TestResponse, TestError> {
        let remote = request.remote;
        let secure = request.secure;
        let mut request = request.into_http_request()?;
        for (name, value) in &self.default_headers {
            if !request.headers().contains_key(name) {
                request.headers_mut().insert(name.clone(), value.clone());
            }
        }

        let response = self
            .app
            .handle(request, remote, secure)
            .await?
            .ok_or(TestError::NoResponse)?;
        TestResponse::from_http(response).await
    }
}

/// A request builder bound to a [`TestClient`].
#[must_use]
#[derive(Debug)]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: TestRequestBuilder,
}

impl<'a> TestClientRequest<'a> {
    fn new(client: &'a TestClient, builder: TestRequestBuilder) -> Self {
        Self { client, builder }
    }

    /// Sets a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Sets the Content-Type header.
    pub fn content_type(mut self, content_type: impl AsRef<str>) -> Self {
        self.builder = self.builder.content_type(content_type);
        self
    }

    /// Sets the Authorization header with a Bearer token.
    pub fn bearer_token(mut self, token: impl AsRef<str>) -> Self {
        self.builder = self.builder.bearer_token(token);
        self
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<bytes::Bytes>) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    /// Sets a JSON body.
    pub fn json<T: serde::Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    /// Sets a form-urlencoded body.
    pub fn form<T: serde::Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.form(value);
        self
    }

    /// Sets the reported peer address.
    pub fn remote(mut self, remote: std::net::SocketAddr) -> Self {
        self.builder = self.builder.remote(remote);
        self
    }

    /// Marks the request as arriving over TLS.
    pub fn secure(mut self, secure: bool) -> Self {
        self.builder = self.builder.secure(secure);
        self
    }

    /// Builds and sends the request.
    ///
    /// # Errors
    ///
    /// Fails if the request is invalid, the application rejects it, or no
    /// response was produced.
    pub async fn send(self) -> Result<TestResponse, TestError> {
        let request = self.builder.build()?;
        self.client.send(request).await
    }
}
