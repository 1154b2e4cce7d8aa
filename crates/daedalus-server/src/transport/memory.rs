//! In-process transport.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use daedalus_middleware::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{HttpResponse, InboundRequest, Transport, TransportFactory};
use crate::error::{ServerError, ServerResult};
use crate::options::ListenOptions;

const QUEUE_DEPTH: usize = 64;

/// A transport fed by a [`MemoryClient`] instead of sockets.
///
/// # Example
///
/// ```rust
/// use daedalus_server::MemoryTransport;
///
/// let (transport, client) = MemoryTransport::new();
/// # let _ = (transport, client);
/// ```
#[derive(Debug)]
pub struct MemoryTransport {
    local_addr: SocketAddr,
    receiver: Option<mpsc::Receiver<InboundRequest>>,
    listening: bool,
}

/// Sends requests into a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryClient {
    sender: mpsc::Sender<InboundRequest>,
    remote: SocketAddr,
    secure: bool,
}

impl MemoryTransport {
    /// Creates a transport and the client that feeds it.
    #[must_use]
    pub fn new() -> (Self, MemoryClient) {
        let (sender, receiver) = mpsc::channel(QUEUE_DEPTH);
        let transport = Self {
            local_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            receiver: Some(receiver),
            listening: false,
        };
        let client = MemoryClient {
            sender,
            remote: SocketAddr::from((Ipv4Addr::LOCALHOST, 49_152)),
            secure: false,
        };
        (transport, client)
    }

    /// A factory that hands out this transport once. Later calls fail.
    #[must_use]
    pub fn into_factory(self) -> TransportFactory {
        let slot = Mutex::new(Some(self));
        Arc::new(move |_options: &ListenOptions| {
            slot.lock()
                .take()
                .map(|transport| Box::new(transport) as Box<dyn Transport>)
                .ok_or_else(|| ServerError::Transport("memory transport already used".to_string()))
        })
    }
}

impl Transport for MemoryTransport {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn listen(&mut self) -> BoxFuture<'_, ServerResult<SocketAddr>> {
        Box::pin(async move {
            if self.listening {
                return Err(ServerError::AlreadyListening);
            }
            if self.receiver.is_none() {
                return Err(ServerError::Closed);
            }
            self.listening = true;
            Ok(self.local_addr)
        })
    }

    fn accept(&mut self) -> BoxFuture<'_, Option<InboundRequest>> {
        Box::pin(async move {
            match &mut self.receiver {
                Some(receiver) if self.listening => receiver.recv().await,
                _ => None,
            }
        })
    }

    fn stop_accepting(&mut self) -> BoxFuture<'_, Vec<InboundRequest>> {
        Box::pin(async move {
            self.listening = false;
            let mut queued = Vec::new();
            if let Some(receiver) = &mut self.receiver {
                receiver.close();
                while let Ok(inbound) = receiver.try_recv() {
                    queued.push(inbound);
                }
            }
            queued
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.listening = false;
            if let Some(mut receiver) = self.receiver.take() {
                receiver.close();
            }
        })
    }
}

impl MemoryClient {
    /// Marks requests as arriving over TLS.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the reported peer address.
    #[must_use]
    pub fn remote(mut self, remote: SocketAddr) -> Self {
        self.remote = remote;
        self
    }

    /// Sends a request and waits for its response.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Closed`] if the transport is closed, or
    /// [`ServerError::Undeliverable`] if the request was dropped without a
    /// response.
    pub async fn send(&self, request: http::Request<Bytes>) -> ServerResult<HttpResponse> {
        let (inbound, response) = InboundRequest::new(request, Some(self.remote), self.secure);
        self.sender.send(inbound).await.map_err(|_| ServerError::Closed)?;
        response
            .await
            .map_err(|_| ServerError::Undeliverable(Some(self.remote)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let (mut transport, client) = MemoryTransport::new();
        transport.listen().await.unwrap();

        let server = tokio::spawn(async move {
            let inbound = transport.accept().await.unwrap();
            assert_eq!(inbound.request().uri().path(), "/ping");
            inbound
                .respond(http::Response::new(http_body_util::Full::new(Bytes::from_static(b"pong"))))
                .unwrap();
            transport
        });

        let response = client
            .send(http::Request::get("/ping").body(Bytes::new()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);

        let mut transport = server.await.unwrap();
        transport.close().await;
        assert!(matches!(
            client.send(http::Request::get("/").body(Bytes::new()).unwrap()).await,
            Err(ServerError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_stop_accepting_returns_queued_and_refuses_new() {
        let (mut transport, client) = MemoryTransport::new();
        transport.listen().await.unwrap();

        let queued = {
            let client = client.clone();
            tokio::spawn(async move { client.send(http::Request::get("/queued").body(Bytes::new()).unwrap()).await })
        };
        while client.sender.capacity() == QUEUE_DEPTH {
            tokio::task::yield_now().await;
        }

        let pending = transport.stop_accepting().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request().uri().path(), "/queued");
        assert!(transport.accept().await.is_none());

        assert!(matches!(
            client.send(http::Request::get("/late").body(Bytes::new()).unwrap()).await,
            Err(ServerError::Closed)
        ));

        for inbound in pending {
            inbound
                .respond(http::Response::new(http_body_util::Full::new(Bytes::from_static(b"ok"))))
                .unwrap();
        }
        assert_eq!(queued.await.unwrap().unwrap().status(), http::StatusCode::OK);
        transport.close().await;
    }

    #[tokio::test]
    async fn test_factory_hands_out_once() {
        let (transport, _client) = MemoryTransport::new();
        let factory = transport.into_factory();
        let options = crate::ListenOptions::default();
        assert!(factory(&options).is_ok());
        assert!(factory(&options).is_err());
    }
}
