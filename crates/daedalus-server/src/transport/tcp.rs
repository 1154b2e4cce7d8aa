//! HTTP/1.1 over TCP, optionally behind TLS.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use daedalus_middleware::BoxFuture;
use http::header::{HeaderValue, CONNECTION, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use super::{HttpResponse, InboundRequest, Transport};
use crate::error::{ServerError, ServerResult};
use crate::options::{ListenOptions, TlsOptions};
use crate::shutdown::AbortSignal;

/// Requests buffered between the connections and the application.
const QUEUE_DEPTH: usize = 1024;

/// Serves HTTP/1.1 with hyper and forwards each request to the application.
///
/// Request bodies are collected in full before the request is forwarded.
pub struct HttpTransport {
    options: ListenOptions,
    running: Option<Running>,
}

struct Running {
    receiver: mpsc::Receiver<InboundRequest>,
    closed: AbortSignal,
    accept_loop: JoinHandle<()>,
}

impl HttpTransport {
    /// Creates an unbound transport.
    #[must_use]
    pub fn new(options: ListenOptions) -> Self {
        Self {
            options,
            running: None,
        }
    }

    async fn bind(&mut self) -> ServerResult<SocketAddr> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyListening);
        }

        let acceptor = self.options.tls().map(load_tls).transpose()?;
        let address = self.options.address();
        let listener = TcpListener::bind((self.options.hostname(), self.options.port()))
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let (sender, receiver) = mpsc::channel(QUEUE_DEPTH);
        let closed = AbortSignal::new();
        let accept_loop = tokio::spawn(accept_loop(listener, acceptor, sender, closed.clone()));

        tracing::debug!(%local_addr, secure = self.options.secure(), "transport bound");
        self.running = Some(Running {
            receiver,
            closed,
            accept_loop,
        });
        Ok(local_addr)
    }

    /// Stops the accept loop, asks open connections to finish their current
    /// exchange, and drains what was already queued.
    fn stop(&mut self) -> Vec<InboundRequest> {
        let Some(running) = &mut self.running else {
            return Vec::new();
        };
        running.closed.abort();
        running.receiver.close();
        let mut queued = Vec::new();
        while let Ok(inbound) = running.receiver.try_recv() {
            queued.push(inbound);
        }
        tracing::debug!(queued = queued.len(), "transport stopped accepting");
        queued
    }

    async fn shutdown(&mut self) {
        if let Some(running) = self.running.take() {
            running.closed.abort();
            if let Err(e) = running.accept_loop.await {
                tracing::warn!(error = %e, "accept loop ended abnormally");
            }
            tracing::debug!("transport closed");
        }
    }
}

impl Transport for HttpTransport {
    fn kind(&self) -> &'static str {
        if self.options.secure() {
            "https"
        } else {
            "http"
        }
    }

    fn listen(&mut self) -> BoxFuture<'_, ServerResult<SocketAddr>> {
        Box::pin(self.bind())
    }

    fn accept(&mut self) -> BoxFuture<'_, Option<InboundRequest>> {
        Box::pin(async move {
            match &mut self.running {
                Some(running) => running.receiver.recv().await,
                None => None,
            }
        })
    }

    fn stop_accepting(&mut self) -> BoxFuture<'_, Vec<InboundRequest>> {
        let queued = self.stop();
        Box::pin(async move { queued })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(self.shutdown())
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("options", &self.options)
            .field("running", &self.running.is_some())
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    sender: mpsc::Sender<InboundRequest>,
    closed: AbortSignal,
) {
    loop {
        tokio::select! {
            () = closed.aborted() => break,
            result = listener.accept() => match result {
                Ok((stream, remote)) => {
                    let sender = sender.clone();
                    let closed = closed.clone();
                    let acceptor = acceptor.clone();
                    tokio::spawn(async move {
                        serve_stream(stream, remote, acceptor, sender, closed).await;
                    });
                }
                Err(e) => tracing::error!(error = %e, "failed to accept connection"),
            },
        }
    }
}

async fn serve_stream(
    stream: TcpStream,
    remote: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    sender: mpsc::Sender<InboundRequest>,
    closed: AbortSignal,
) {
    match acceptor {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls) => serve_connection(tls, remote, true, sender, closed).await,
            Err(e) => tracing::warn!(%remote, error = %e, "TLS handshake failed"),
        },
        None => serve_connection(stream, remote, false, sender, closed).await,
    }
}

async fn serve_connection<I>(
    io: I,
    remote: SocketAddr,
    secure: bool,
    sender: mpsc::Sender<InboundRequest>,
    closed: AbortSignal,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |request: http::Request<Incoming>| {
        let sender = sender.clone();
        async move { forward(request, remote, secure, sender).await }
    });

    let connection = http1::Builder::new().serve_connection(TokioIo::new(io), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        () = closed.aborted() => {
            connection.as_mut().graceful_shutdown();
            connection.as_mut().await
        }
    };
    if let Err(e) = result {
        tracing::debug!(%remote, error = %e, "connection ended with error");
    }
}

async fn forward(
    request: http::Request<Incoming>,
    remote: SocketAddr,
    secure: bool,
    sender: mpsc::Sender<InboundRequest>,
) -> ServerResult<HttpResponse> {
    let (parts, body) = request.into_parts();
    let body: Bytes = body
        .collect()
        .await
        .map_err(|e| ServerError::Transport(e.to_string()))?
        .to_bytes();

    let (inbound, response) = InboundRequest::new(http::Request::from_parts(parts, body), Some(remote), secure);
    if sender.send(inbound).await.is_err() {
        tracing::debug!(%remote, "request refused while shutting down");
        return Ok(unavailable());
    }
    response.await.map_err(|_| ServerError::Undeliverable(Some(remote)))
}

fn unavailable() -> HttpResponse {
    let body = StatusCode::SERVICE_UNAVAILABLE.canonical_reason().unwrap_or_default();
    let mut response = http::Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
    let headers = response.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=UTF-8"));
    response
}

fn load_tls(options: &TlsOptions) -> ServerResult<TlsAcceptor> {
    let open = |path: &std::path::Path| {
        File::open(path)
            .map(BufReader::new)
            .map_err(|e| ServerError::Tls(format!("cannot read {}: {e}", path.display())))
    };

    let certs = rustls_pemfile::certs(&mut open(&options.cert_path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Tls(format!("invalid certificate: {e}")))?;
    if certs.is_empty() {
        return Err(ServerError::Tls(format!(
            "no certificates in {}",
            options.cert_path.display()
        )));
    }

    let key = rustls_pemfile::private_key(&mut open(&options.key_path)?)
        .map_err(|e| ServerError::Tls(format!("invalid private key: {e}")))?
        .ok_or_else(|| ServerError::Tls(format!("no private key in {}", options.key_path.display())))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(e.to_string()))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}
