//! Route tests over the in-memory store and in-process key-value store.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use dastarkhan_cache::MemoryStore;
use dastarkhan_db_memory::InMemoryStore;
use dastarkhan_server::handlers::CACHE_HEADER;
use dastarkhan_server::{AppConfig, AppContext, build_app};
use dastarkhan_storage::{Collection, SourceStore};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn context() -> Arc<AppContext> {
    let db = Arc::new(InMemoryStore::new());
    db.create(
        Collection::MenuItem,
        &json!({"id": "osh", "name": "Osh", "priceCents": 4500}),
    )
    .await
    .unwrap();
    db.create(Collection::Ingredient, &json!({"id": "rice", "name": "Rice"}))
        .await
        .unwrap();
    db.create(
        Collection::MenuItemIngredient,
        &json!({"menuItemId": "osh", "ingredientId": "rice"}),
    )
    .await
    .unwrap();

    let mut config = AppConfig::default();
    config.cache.memory_ttl_ms = 0;
    Arc::new(AppContext::from_parts(
        &config,
        db,
        Arc::new(MemoryStore::new()),
    ))
}

async fn get(ctx: &Arc<AppContext>, uri: &str) -> (StatusCode, Option<String>, Value) {
    let response = build_app(Arc::clone(ctx))
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let tier = response
        .headers()
        .get(CACHE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, tier, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_menu_served_from_store_then_cache() {
    let ctx = context().await;

    let (status, tier, body) = get(&ctx, "/menu").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tier.as_deref(), Some("store"));
    assert_eq!(body[0]["name"], "Osh");
    assert_eq!(body[0]["priceCents"], 4500);

    let (_, tier, _) = get(&ctx, "/menu").await;
    assert_eq!(tier.as_deref(), Some("distributed"));
}

#[tokio::test]
async fn test_write_through_context_store_refreshes_route() {
    let ctx = context().await;
    get(&ctx, "/menu").await;

    ctx.store
        .update(Collection::MenuItem, "osh", &json!({"name": "Osh Plov"}))
        .await
        .unwrap();

    let (_, tier, body) = get(&ctx, "/menu").await;
    assert_eq!(tier.as_deref(), Some("store"));
    assert_eq!(body[0]["name"], "Osh Plov");
}

#[tokio::test]
async fn test_detail_routes() {
    let ctx = context().await;

    let (status, _, body) = get(&ctx, "/menu/osh").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["id"], "osh");
    assert_eq!(body["ingredients"][0]["name"], "Rice");

    let (status, _, body) = get(&ctx, "/ingredients/rice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Rice");

    let (status, _, body) = get(&ctx, "/menu/plov").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not-found");
}

#[tokio::test]
async fn test_health_and_status() {
    let ctx = context().await;
    get(&ctx, "/restaurants").await;

    let (status, _, body) = get(&ctx, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "memory");
    assert_eq!(body["cache"]["backend"], "memory");
    assert_eq!(body["cache"]["reachable"], true);

    let (status, _, body) = get(&ctx, "/cache/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], true);
    assert_eq!(body["versions"]["restaurant:list"], 0);
    assert!(body["last_sync"].is_null());
}
