//! 库存接口测试

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use inventory_service::StockLedger;
use inventory_service::repository::MemoryStockRepository;
use inventory_service::routes::build_router;
use inventory_service::state::AppState;
use inventory_service::stock_cache::MemoryStockCache;
use serde_json::{Value, json};
use tower::ServiceExt;

struct Fixture {
    repo: Arc<MemoryStockRepository>,
    cache: Arc<MemoryStockCache>,
    app: Router,
}

fn fixture() -> Fixture {
    let repo = Arc::new(MemoryStockRepository::new().with_stock(42, 10).with_stock(43, 0));
    let cache = Arc::new(MemoryStockCache::new());
    let ledger = StockLedger::new(repo.clone(), cache.clone(), 5);
    let app = build_router(AppState::new(
        Arc::new(ledger),
        Duration::from_secs(60),
        4,
    ));
    Fixture { repo, cache, app }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

#[tokio::test]
async fn test_stock_endpoint_returns_bare_count() {
    let f = fixture();
    let (status, body) = get(&f.app, "/products/42/stock").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"stock": 10}));
}

#[tokio::test]
async fn test_unknown_product_is_404() {
    let f = fixture();
    let (status, body) = get(&f.app, "/products/7/stock").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PRODUCT_NOT_FOUND");
}

#[tokio::test]
async fn test_reserve_then_release() {
    let f = fixture();

    let (status, body) = post(
        &f.app,
        "/products/reserve",
        json!({"product_id": 42, "quantity": 4}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available_quantity"], 6);
    assert_eq!(f.repo.available(42), Some(6));

    let (status, body) = post(
        &f.app,
        "/products/release",
        json!({"product_id": 42, "quantity": 4}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available_quantity"], 10);
    assert_eq!(get(&f.app, "/products/42/stock").await.1, json!({"stock": 10}));
}

#[tokio::test]
async fn test_reserve_rejections() {
    let f = fixture();

    let (status, body) = post(
        &f.app,
        "/products/reserve",
        json!({"product_id": 42, "quantity": 11}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INSUFFICIENT_STOCK");

    let (status, body) = post(
        &f.app,
        "/products/release",
        json!({"product_id": 42, "quantity": 0}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    assert_eq!(f.repo.available(42), Some(10));
}

#[tokio::test]
async fn test_warmup_cache_reports_loaded_records() {
    let f = fixture();

    let (status, body) = get(&f.app, "/products/warmup-cache").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loaded"], 2);
    assert_eq!(body["cached"], 2);
    assert_eq!(body["failures"], json!([]));
    let (record, ttl) = f.cache.entry(43).unwrap();
    assert_eq!(record.available_quantity, 0);
    assert!(ttl.is_some());
}

#[tokio::test]
async fn test_warmup_cache_lists_failures() {
    let f = fixture();
    f.cache.set_failing(true);

    let (status, body) = get(&f.app, "/products/warmup-cache").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cached"], 0);
    assert_eq!(body["failures"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_health() {
    let f = fixture();
    let (status, body) = get(&f.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "inventory-service");
}
