//! 路由配置模块

use axum::{
    Router,
    http::Method,
    middleware,
    routing::{get, post},
};
use order_shared::observability::middleware::http_tracing;
use tower_http::cors::{Any, CorsLayer};

use crate::{handlers, state::AppState};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/products/{id}/stock", get(handlers::get_stock))
        .route("/products/reserve", post(handlers::reserve_stock))
        .route("/products/release", post(handlers::release_stock))
        .route("/products/warmup-cache", get(handlers::warmup_cache))
        .route("/health", get(handlers::health))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST]),
        )
        .route_layer(middleware::from_fn(http_tracing))
        .with_state(state)
}
