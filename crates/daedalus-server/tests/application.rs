//! Application lifecycle over the memory and TCP transports.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use daedalus_middleware::{middleware_fn, BoxedMiddleware};
use daedalus_router::{AllowedMethodsOptions, Router};
use daedalus_server::{AbortSignal, AppEvent, Application, ApplicationOptions, ListenOptions, MemoryTransport, ServerError};
use http::header::ALLOW;
use http::StatusCode;
use http_body_util::BodyExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{broadcast, Notify};

fn get(uri: &str) -> http::Request<Bytes> {
    http::Request::get(uri)
        .header("host", "localhost")
        .body(Bytes::new())
        .unwrap()
}

async fn wait_for_listen(events: &mut broadcast::Receiver<AppEvent>) -> daedalus_server::ListenEvent {
    loop {
        if let AppEvent::Listen(listen) = events.recv().await.unwrap() {
            return listen;
        }
    }
}

fn count_closes(events: &mut broadcast::Receiver<AppEvent>) -> usize {
    let mut closes = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, AppEvent::Close) {
            closes += 1;
        }
    }
    closes
}

fn hello() -> BoxedMiddleware {
    middleware_fn(|ctx, _next| {
        Box::pin(async move {
            ctx.response_mut().set_body("hello");
            Ok(())
        })
    })
}

#[tokio::test]
async fn test_abort_waits_for_in_flight_requests() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let app = Application::new();
    {
        let started = Arc::clone(&started);
        let release = Arc::clone(&release);
        app.use_middleware(middleware_fn(move |ctx, _next| {
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            Box::pin(async move {
                started.notify_one();
                release.notified().await;
                ctx.response_mut().set_body("done");
                Ok(())
            })
        }));
    }

    let (transport, client) = MemoryTransport::new();
    app.set_transport(transport.into_factory());
    let mut events = app.subscribe();

    let signal = AbortSignal::new();
    let server = {
        let app = app.clone();
        let signal = signal.clone();
        tokio::spawn(async move { app.listen(ListenOptions::new("127.0.0.1", 0), signal).await })
    };
    let listen = wait_for_listen(&mut events).await;
    assert_eq!(listen.transport, "memory");

    let request = tokio::spawn(async move { client.send(get("/slow")).await });
    started.notified().await;

    signal.abort();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!server.is_finished());
    assert!(app.is_closing());
    assert_eq!(count_closes(&mut events), 0);

    release.notify_one();
    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.into_body().collect().await.unwrap().to_bytes(), "done");

    server.await.unwrap().unwrap();
    assert!(app.is_closed());
    assert!(!app.is_closing());
    assert_eq!(count_closes(&mut events), 1);
}

#[tokio::test]
async fn test_requests_after_abort_are_refused_not_dropped() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let app = Application::new();
    {
        let started = Arc::clone(&started);
        let release = Arc::clone(&release);
        app.use_middleware(middleware_fn(move |ctx, _next| {
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            Box::pin(async move {
                if ctx.request().path() == "/slow" {
                    started.notify_one();
                    release.notified().await;
                }
                ctx.response_mut().set_body("done");
                Ok(())
            })
        }));
    }

    let (transport, client) = MemoryTransport::new();
    app.set_transport(transport.into_factory());
    let mut events = app.subscribe();

    let signal = AbortSignal::new();
    let server = {
        let app = app.clone();
        let signal = signal.clone();
        tokio::spawn(async move { app.listen(ListenOptions::new("127.0.0.1", 0), signal).await })
    };
    wait_for_listen(&mut events).await;

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.send(get("/slow")).await })
    };
    started.notified().await;

    signal.abort();
    while !app.is_closing() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let late = client.send(get("/late")).await;
    assert!(matches!(late, Err(ServerError::Closed)), "{late:?}");
    assert!(!server.is_finished());

    release.notify_one();
    let response = slow.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    server.await.unwrap().unwrap();
    assert_eq!(count_closes(&mut events), 1);
}

#[tokio::test]
async fn test_abort_with_nothing_in_flight_closes_immediately() {
    let app = Application::new();
    app.use_middleware(hello());
    let (transport, _client) = MemoryTransport::new();
    app.set_transport(transport.into_factory());
    let mut events = app.subscribe();

    let signal = AbortSignal::new();
    signal.abort();
    app.listen(ListenOptions::default(), signal).await.unwrap();

    assert!(matches!(events.recv().await.unwrap(), AppEvent::Listen(_)));
    assert!(matches!(events.recv().await.unwrap(), AppEvent::Close));
}

#[tokio::test]
async fn test_second_listen_needs_a_new_transport() {
    let app = Application::new();
    app.use_middleware(hello());
    let (transport, _client) = MemoryTransport::new();
    app.set_transport(transport.into_factory());

    let signal = AbortSignal::new();
    signal.abort();
    app.listen(ListenOptions::default(), signal.clone()).await.unwrap();

    let again = app.listen(ListenOptions::default(), signal).await;
    assert!(matches!(again, Err(ServerError::Transport(_))));
}

#[tokio::test]
async fn test_router_method_not_allowed_through_application() {
    let mut router = Router::new();
    router.get("/item/:id", [hello()]).unwrap();
    let router = Arc::new(router);

    let app = Application::with_options(ApplicationOptions::new().log_errors(false));
    app.use_middleware(router.routes());
    app.use_middleware(router.allowed_methods(AllowedMethodsOptions::default()));

    let delete = http::Request::delete("/item/42")
        .header("host", "localhost")
        .body(Bytes::new())
        .unwrap();
    let response = app.handle(delete, None, false).await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[ALLOW], "GET, HEAD");

    let missing = app.handle(get("/nothing"), None, false).await.unwrap().unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(missing.into_body().collect().await.unwrap().to_bytes(), "Not Found");
}

#[tokio::test]
async fn test_throwing_allowed_methods_reports_one_error() {
    let mut router = Router::new();
    router.get("/item/:id", [hello()]).unwrap();
    let router = Arc::new(router);

    let app = Application::new();
    let mut events = app.subscribe();
    app.use_middleware(router.routes());
    app.use_middleware(router.allowed_methods(AllowedMethodsOptions::throwing()));

    let put = http::Request::put("/item/1")
        .header("host", "localhost")
        .body(Bytes::new())
        .unwrap();
    let response = app.handle(put, None, false).await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[ALLOW], "GET, HEAD");

    let mut errors = 0;
    while let Ok(event) = events.try_recv() {
        if let AppEvent::Error(error) = event {
            assert_eq!(error.status, StatusCode::METHOD_NOT_ALLOWED);
            errors += 1;
        }
    }
    assert_eq!(errors, 1);
}

#[tokio::test]
async fn test_serves_over_tcp() {
    let app = Application::new();
    app.use_middleware(hello());
    let mut events = app.subscribe();

    let signal = AbortSignal::new();
    let server = {
        let app = app.clone();
        let signal = signal.clone();
        tokio::spawn(async move { app.listen(ListenOptions::new("127.0.0.1", 0), signal).await })
    };
    let listen = wait_for_listen(&mut events).await;
    assert_eq!(listen.transport, "http");
    assert_ne!(listen.port, 0);

    let mut stream = tokio::net::TcpStream::connect(listen.local_addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    assert!(raw.starts_with("HTTP/1.1 200 OK"), "{raw}");
    assert!(raw.contains("content-length: 5"), "{raw}");
    assert!(raw.ends_with("hello"), "{raw}");

    signal.abort();
    server.await.unwrap().unwrap();
    assert!(app.is_closed());
}
