//! Read-only route handlers. Each one calls a single cache repository.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use dastarkhan_cache::{CacheStatus, Fetched};
use serde::Serialize;

use crate::context::AppContext;
use crate::error::ApiError;

/// Response header naming the tier that served the body.
pub const CACHE_HEADER: &str = "x-cache";

type Ctx = State<Arc<AppContext>>;

fn cached<V: Serialize>(fetched: Fetched<V>) -> Response {
    let mut response = Json(&*fetched.value).into_response();
    response.headers_mut().insert(
        CACHE_HEADER,
        HeaderValue::from_static(fetched.source.as_str()),
    );
    response
}

pub async fn list_menu(State(ctx): Ctx) -> Result<Response, ApiError> {
    Ok(cached(ctx.cache.menu.list_with_source().await?))
}

pub async fn menu_detail(State(ctx): Ctx, Path(id): Path<String>) -> Result<Response, ApiError> {
    ctx.cache
        .menu_detail
        .get_with_source(&id)
        .await?
        .map(cached)
        .ok_or_else(|| ApiError::not_found(format!("menu item {id}")))
}

pub async fn list_ingredients(State(ctx): Ctx) -> Result<Response, ApiError> {
    Ok(cached(ctx.cache.ingredients.list_with_source().await?))
}

pub async fn ingredient_detail(
    State(ctx): Ctx,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    ctx.cache
        .ingredients
        .get_with_source(&id)
        .await?
        .map(cached)
        .ok_or_else(|| ApiError::not_found(format!("ingredient {id}")))
}

pub async fn list_restaurants(State(ctx): Ctx) -> Result<Response, ApiError> {
    Ok(cached(ctx.cache.restaurants.list_with_source().await?))
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    store: &'static str,
    cache: CacheHealth,
}

#[derive(Serialize)]
struct CacheHealth {
    backend: &'static str,
    enabled: bool,
    reachable: bool,
}

/// The service stays healthy without Redis; reads fall back to the store.
pub async fn health(State(ctx): Ctx) -> impl IntoResponse {
    let kv = &ctx.cache.deps().kv;
    let body = HealthResponse {
        status: "ok",
        store: ctx.store.backend_name(),
        cache: CacheHealth {
            backend: kv.backend_name(),
            enabled: kv.is_enabled(),
            reachable: kv.ping().await,
        },
    };
    (StatusCode::OK, Json(body))
}

pub async fn cache_status(State(ctx): Ctx) -> Json<CacheStatus> {
    Json(ctx.cache.status().await)
}
