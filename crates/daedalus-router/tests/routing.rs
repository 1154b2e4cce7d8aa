//! End-to-end dispatch through composed pipelines.

use std::sync::Arc;

use bytes::Bytes;
use daedalus_core::{Body, Context, Params};
use daedalus_middleware::{compose, middleware_fn, BoxedMiddleware, Composed};
use daedalus_router::{param_fn, AllowedMethodsOptions, Layer, LayerOptions, Router, RouterOptions, UrlOptions};
use http::header::ALLOW;
use http::{Method, StatusCode};
use parking_lot::Mutex;
use proptest::prelude::*;

fn context(method: Method, uri: &str) -> Context {
    let req = http::Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "example.test")
        .body(Bytes::new())
        .unwrap();
    Context::mock(req).unwrap()
}

fn pipeline(router: Router) -> Composed {
    let router = Arc::new(router);
    compose([
        Arc::new(router.routes()) as BoxedMiddleware,
        Arc::new(router.allowed_methods(AllowedMethodsOptions::default())),
    ])
}

fn body_text(ctx: &Context) -> String {
    match ctx.response().body() {
        Some(Body::Text(text)) => text.clone(),
        other => panic!("unexpected body: {other:?}"),
    }
}

fn item_router() -> Router {
    let mut router = Router::new();
    router
        .get(
            "/item/:id",
            [middleware_fn(|ctx, _next| {
                Box::pin(async move {
                    let body = format!("id={}", ctx.param("id").unwrap_or_default());
                    ctx.response_mut().set_body(body);
                    Ok(())
                })
            })],
        )
        .unwrap();
    router
}

#[tokio::test]
async fn test_get_item_by_id() {
    let app = pipeline(item_router());
    let mut ctx = context(Method::GET, "/item/42");
    app.run(&mut ctx).await.unwrap();

    assert_eq!(ctx.response().status(), StatusCode::OK);
    assert_eq!(body_text(&ctx), "id=42");
}

#[tokio::test]
async fn test_delete_item_is_method_not_allowed() {
    let router = Arc::new(item_router());
    let app = compose([
        Arc::new(router.allowed_methods(AllowedMethodsOptions::default())) as BoxedMiddleware,
        Arc::new(router.routes()),
    ]);
    let mut ctx = context(Method::DELETE, "/item/42");
    app.run(&mut ctx).await.unwrap();

    assert_eq!(ctx.response().status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(ctx.response().headers()[ALLOW], "GET, HEAD");
}

#[tokio::test]
async fn test_options_unions_all_matching_layers() {
    let mut router = item_router();
    router
        .post("/item/:id", [middleware_fn(|ctx, next| Box::pin(async move { next.run(ctx).await }))])
        .unwrap();
    router
        .use_middleware([middleware_fn(|ctx, next| Box::pin(async move { next.run(ctx).await }))])
        .unwrap();

    let app = pipeline(router);
    let mut ctx = context(Method::OPTIONS, "/item/1");
    app.run(&mut ctx).await.unwrap();

    assert_eq!(ctx.response().status(), StatusCode::OK);
    assert_eq!(ctx.response().headers()[ALLOW], "GET, HEAD, POST");
}

#[tokio::test]
async fn test_mounted_router_under_prefix() {
    let mut nested = Router::new();
    nested
        .get(
            "/:id",
            [middleware_fn(|ctx, _next| {
                Box::pin(async move {
                    let body = format!(
                        "{}:{}",
                        ctx.param("org").unwrap_or_default(),
                        ctx.param("id").unwrap_or_default()
                    );
                    ctx.response_mut().set_body(body);
                    Ok(())
                })
            })],
        )
        .unwrap();

    let mut parent = Router::with_options(RouterOptions::default().prefix("/orgs/:org"));
    parent.use_at("/users", [nested]).unwrap();

    let app = pipeline(parent);
    let mut ctx = context(Method::GET, "/orgs/acme/users/7");
    app.run(&mut ctx).await.unwrap();
    assert_eq!(body_text(&ctx), "acme:7");
}

#[tokio::test]
async fn test_prefixed_middleware_binds_prefix_params() {
    let mut router = Router::with_options(RouterOptions::default().prefix("/orgs/:org"));
    router
        .use_middleware([middleware_fn(|ctx, next| {
            Box::pin(async move {
                let org = ctx.param("org").unwrap_or_default().to_string();
                ctx.state_mut().set("org", org);
                next.run(ctx).await
            })
        })])
        .unwrap();
    router
        .get(
            "/",
            [middleware_fn(|ctx, _next| {
                Box::pin(async move {
                    let org = ctx.state().get("org").unwrap_or_default();
                    ctx.response_mut().set_body(org.as_str().unwrap_or_default().to_string());
                    Ok(())
                })
            })],
        )
        .unwrap();

    let app = pipeline(router);
    let mut ctx = context(Method::GET, "/orgs/acme");
    app.run(&mut ctx).await.unwrap();
    assert_eq!(body_text(&ctx), "acme");
}

#[tokio::test]
async fn test_param_hooks_run_in_path_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut router = Router::new();

    let seen = Arc::clone(&order);
    router
        .get(
            "/users/:user/posts/:post",
            [middleware_fn(move |ctx, _next| {
                let seen = Arc::clone(&seen);
                Box::pin(async move {
                    seen.lock().push("handler".to_string());
                    ctx.response_mut().set_body("ok");
                    Ok(())
                })
            })],
        )
        .unwrap();

    for name in ["post", "user"] {
        let seen = Arc::clone(&order);
        router.param(
            name,
            param_fn(move |value, ctx, next| {
                let seen = Arc::clone(&seen);
                Box::pin(async move {
                    seen.lock().push(value);
                    next.run(ctx).await
                })
            }),
        );
    }

    let app = pipeline(router);
    let mut ctx = context(Method::GET, "/users/ada/posts/7");
    app.run(&mut ctx).await.unwrap();

    assert_eq!(*order.lock(), ["ada", "7", "handler"]);
}

#[tokio::test]
async fn test_param_hook_can_reject() {
    let mut router = item_router();
    router.param(
        "id",
        param_fn(|value, ctx, next| {
            Box::pin(async move {
                if value.parse::<u32>().is_err() {
                    return Err(ctx.throw(StatusCode::BAD_REQUEST, "id must be numeric"));
                }
                next.run(ctx).await
            })
        }),
    );

    let app = pipeline(router);
    let mut ctx = context(Method::GET, "/item/abc");
    let err = app.run(&mut ctx).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_nested_dispatch_appends_matched() {
    let mut inner = Router::new();
    inner
        .get(
            "/a",
            [middleware_fn(|ctx, _next| {
                Box::pin(async move {
                    ctx.response_mut().set_body("inner");
                    Ok(())
                })
            })],
        )
        .unwrap();
    let inner = Arc::new(inner);

    let mut outer = Router::new();
    outer
        .use_middleware([Arc::new(inner.routes()) as BoxedMiddleware])
        .unwrap();
    outer.get("/a", Vec::<BoxedMiddleware>::new()).unwrap();
    let outer = Arc::new(outer);

    let app = compose([Arc::new(outer.routes()) as BoxedMiddleware]);
    let mut ctx = context(Method::GET, "/a");
    app.run(&mut ctx).await.unwrap();
    assert_eq!(body_text(&ctx), "inner");
    assert_eq!(ctx.matched().len(), 3);
}

#[tokio::test]
async fn test_prefix_stacks_and_treats_root_specially() {
    let mut root = Layer::new("/", [Method::GET], Vec::new(), None, LayerOptions::default()).unwrap();
    root.set_prefix("/api").unwrap();
    assert_eq!(root.path(), "/api");
    assert!(root.matches("/api"));
    assert!(root.matches("/api/"));

    let strict = LayerOptions {
        strict: true,
        ..LayerOptions::default()
    };
    let mut strict_root = Layer::new("/", [Method::GET], Vec::new(), None, strict).unwrap();
    strict_root.set_prefix("/api").unwrap();
    assert_eq!(strict_root.path(), "/api/");
    assert!(!strict_root.matches("/api"));

    let mut unchanged = Layer::new("/x", [Method::GET], Vec::new(), None, LayerOptions::default()).unwrap();
    unchanged.set_prefix("").unwrap();
    assert_eq!(unchanged.path(), "/x");

    let mut router = item_router();
    router.prefix("/a").unwrap();
    router.prefix("/b").unwrap();
    assert_eq!(router.layers()[0].path(), "/b/a/item/:id");

    router
        .get(
            "/later",
            [middleware_fn(|ctx, _next| {
                Box::pin(async move {
                    ctx.response_mut().set_body("later");
                    Ok(())
                })
            })],
        )
        .unwrap();
    assert_eq!(router.layers()[1].path(), "/b/later");

    let app = pipeline(router);
    let mut ctx = context(Method::GET, "/b/a/item/7");
    app.run(&mut ctx).await.unwrap();
    assert_eq!(body_text(&ctx), "id=7");

    let mut ctx = context(Method::GET, "/a/item/7");
    app.run(&mut ctx).await.unwrap();
    assert_eq!(ctx.response().status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_path_is_bad_request() {
    let app = pipeline(item_router());
    let mut ctx = context(Method::GET, "/item/%zz");
    let err = app.run(&mut ctx).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert!(err.expose());

    let mut ctx = context(Method::GET, "/item/caf%C3%A9");
    app.run(&mut ctx).await.unwrap();
    assert_eq!(body_text(&ctx), "id=café");
}

proptest! {
    #[test]
    fn test_url_round_trip(user in "[A-Za-z0-9._~ -]{1,16}", post in "[0-9]{1,6}") {
        let layer = Layer::new(
            "/users/:user/posts/:post",
            [Method::GET],
            Vec::new(),
            None,
            LayerOptions::default(),
        )
        .unwrap();

        let url = layer
            .url([("user", user.as_str()), ("post", post.as_str())], &UrlOptions::default())
            .unwrap();
        prop_assert!(layer.matches(&url));

        let mut params = Params::new();
        layer.params(&layer.captures(&url), &mut params);
        prop_assert_eq!(params.get("user"), Some(user.as_str()));
        prop_assert_eq!(params.get("post"), Some(post.as_str()));
    }
}
