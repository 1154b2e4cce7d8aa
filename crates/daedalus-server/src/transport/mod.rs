//! The boundary between an application and the network.
//!
//! A [`Transport`] binds a listener and hands the application a stream of
//! [`InboundRequest`]s. Each one carries a fully buffered request and a
//! one-shot [`Responder`] that completes the exchange.
//!
//! - [`HttpTransport`] - hyper over TCP, optionally behind rustls
//! - [`MemoryTransport`] - in-process, for embedding and tests

mod memory;
mod tcp;

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use daedalus_middleware::BoxFuture;
use http_body_util::Full;
use tokio::sync::oneshot;

pub use self::memory::{MemoryClient, MemoryTransport};
pub use self::tcp::HttpTransport;

use crate::error::{ServerError, ServerResult};
use crate::options::ListenOptions;

/// The protocol-level response type sent back through a transport.
pub type HttpResponse = http::Response<Full<Bytes>>;

/// Creates the transport for a `listen` call.
pub type TransportFactory = Arc<dyn Fn(&ListenOptions) -> ServerResult<Box<dyn Transport>> + Send + Sync>;

/// A source of inbound requests.
pub trait Transport: Send + 'static {
    /// Short name of the transport, reported in listen events.
    fn kind(&self) -> &'static str;

    /// Binds and starts accepting. Returns the resolved local address.
    fn listen(&mut self) -> BoxFuture<'_, ServerResult<SocketAddr>>;

    /// Next inbound request, or `None` once the transport is closed.
    ///
    /// Must be cancel-safe: dropping the future loses no request.
    fn accept(&mut self) -> BoxFuture<'_, Option<InboundRequest>>;

    /// Stops taking new requests. Returns the requests queued before the
    /// stop that [`accept`](Self::accept) has not handed out yet.
    ///
    /// Requests arriving afterwards are refused by the transport. Exchanges
    /// already handed out can still be answered.
    fn stop_accepting(&mut self) -> BoxFuture<'_, Vec<InboundRequest>>;

    /// Releases the listener and any remaining connections.
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

/// The default factory: [`HttpTransport`] for the given options.
#[must_use]
pub fn http_factory() -> TransportFactory {
    Arc::new(|options: &ListenOptions| Ok(Box::new(HttpTransport::new(options.clone())) as Box<dyn Transport>))
}

/// Completes one request/response exchange.
#[derive(Debug)]
pub struct Responder {
    remote: Option<SocketAddr>,
    sender: oneshot::Sender<HttpResponse>,
}

impl Responder {
    /// Sends the response.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Undeliverable`] if the peer is gone.
    pub fn respond(self, response: HttpResponse) -> ServerResult<()> {
        self.sender
            .send(response)
            .map_err(|_| ServerError::Undeliverable(self.remote))
    }
}

/// A request received by a transport.
#[derive(Debug)]
pub struct InboundRequest {
    request: http::Request<Bytes>,
    remote: Option<SocketAddr>,
    secure: bool,
    responder: Responder,
}

impl InboundRequest {
    /// Wraps a request. The receiver resolves with the response, or fails if
    /// the request is dropped unanswered.
    #[must_use]
    pub fn new(
        request: http::Request<Bytes>,
        remote: Option<SocketAddr>,
        secure: bool,
    ) -> (Self, oneshot::Receiver<HttpResponse>) {
        let (sender, receiver) = oneshot::channel();
        let inbound = Self {
            request,
            remote,
            secure,
            responder: Responder { remote, sender },
        };
        (inbound, receiver)
    }

    /// The request.
    #[must_use]
    pub fn request(&self) -> &http::Request<Bytes> {
        &self.request
    }

    /// The peer address, if known.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Whether it arrived over TLS.
    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }

    /// Answers the request.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Undeliverable`] if the peer is gone.
    pub fn respond(self, response: HttpResponse) -> ServerResult<()> {
        self.responder.respond(response)
    }

    /// Splits into request, peer address, secure flag and responder.
    #[must_use]
    pub fn into_parts(self) -> (http::Request<Bytes>, Option<SocketAddr>, bool, Responder) {
        (self.request, self.remote, self.secure, self.responder)
    }
}
