//! HTTP routes for the chore list.
//!
//! ```text
//! GET    /chores           list
//! POST   /chores           create, 201 with Location
//! GET    /chores/:id       show
//! PATCH  /chores/:id/done  mark done
//! DELETE /chores/:id       remove, 204
//! GET    /                 302 to the list
//! ```

use std::sync::Arc;

use daedalus::core::Context;
use daedalus::middleware::{middleware_fn, BoxedMiddleware};
use daedalus::router::{param_fn, ParamMiddleware, Router, RouterError, RouterOptions, UrlOptions};
use http::{header, HeaderValue, StatusCode};
use serde::Deserialize;
use tracing::info;

use crate::store::{Chore, ChoreStore};

#[derive(Debug, Deserialize)]
struct NewChore {
    title: String,
}

/// Builds the application router.
///
/// # Errors
///
/// Fails if a route path does not compile.
pub fn app_router(store: &ChoreStore, options: RouterOptions) -> Result<Router, RouterError> {
    let mut router = Router::with_options(options);
    router.use_at("/chores", [chores_router(store)?])?;
    router.redirect("/", "chores")?;
    Ok(router)
}

fn chores_router(store: &ChoreStore) -> Result<Router, RouterError> {
    let mut chores = Router::new();
    chores.named("chores").get("/", [list(store.clone())])?;
    chores.post("/", [create(store.clone())])?;
    chores.named("chore").get("/:id", [show()])?;
    chores.patch("/:id/done", [complete(store.clone())])?;
    chores.delete("/:id", [remove(store.clone())])?;
    chores.param("id", load_chore(store.clone()));
    Ok(chores)
}

/// Resolves `:id` to a stored chore, kept in the context extensions.
fn load_chore(store: ChoreStore) -> Arc<dyn ParamMiddleware> {
    param_fn(move |id, ctx, next| {
        let store = store.clone();
        Box::pin(async move {
            let chore = id
                .parse::<u64>()
                .ok()
                .and_then(|id| store.get(id))
                .ok_or_else(|| ctx.throw(StatusCode::NOT_FOUND, format!("no chore {id}")))?;
            ctx.extensions_mut().insert(chore);
            next.run(ctx).await
        })
    })
}

fn loaded(ctx: &Context) -> daedalus::core::Result<Chore> {
    ctx.extensions()
        .get::<Chore>()
        .cloned()
        .ok_or_else(|| daedalus::core::Error::msg("chore was not loaded"))
}

fn list(store: ChoreStore) -> BoxedMiddleware {
    middleware_fn(move |ctx, _next| {
        let chores = store.list();
        Box::pin(async move { ctx.response_mut().set_json(&chores) })
    })
}

fn create(store: ChoreStore) -> BoxedMiddleware {
    middleware_fn(move |ctx, _next| {
        let store = store.clone();
        Box::pin(async move {
            let new: NewChore = ctx.request().json()?;
            let title = new.title.trim();
            ctx.assert(!title.is_empty(), StatusCode::UNPROCESSABLE_ENTITY, "title must not be empty")?;

            let chore = store.insert(title);
            info!(chore.id = chore.id, "chore created");

            if let Some(router) = ctx.router::<Router>() {
                let location = router
                    .url("chore", [("id", chore.id.to_string())], &UrlOptions::default())
                    .map_err(daedalus::core::Error::msg)?;
                let location = HeaderValue::try_from(location).map_err(daedalus::core::Error::msg)?;
                ctx.response_mut().set_header(header::LOCATION, location);
            }
            ctx.response_mut().set_status(StatusCode::CREATED);
            ctx.response_mut().set_json(&chore)
        })
    })
}

fn show() -> BoxedMiddleware {
    middleware_fn(|ctx, _next| {
        Box::pin(async move {
            let chore = loaded(ctx)?;
            ctx.response_mut().set_json(&chore)
        })
    })
}

fn complete(store: ChoreStore) -> BoxedMiddleware {
    middleware_fn(move |ctx, _next| {
        let store = store.clone();
        Box::pin(async move {
            let id = loaded(ctx)?.id;
            let chore = store
                .complete(id)
                .ok_or_else(|| ctx.throw(StatusCode::NOT_FOUND, format!("no chore {id}")))?;
            ctx.response_mut().set_json(&chore)
        })
    })
}

fn remove(store: ChoreStore) -> BoxedMiddleware {
    middleware_fn(move |ctx, _next| {
        let store = store.clone();
        Box::pin(async move {
            let id = loaded(ctx)?.id;
            store.remove(id);
            info!(chore.id = id, "chore removed");
            ctx.response_mut().set_status(StatusCode::NO_CONTENT);
            Ok(())
        })
    })
}
