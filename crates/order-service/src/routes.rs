//! 路由配置模块

use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};
use order_shared::observability::middleware::http_tracing;
use tower_http::cors::{Any, CorsLayer};

use crate::{handlers, state::AppState};

/// 订单接口
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/orders",
            post(handlers::create_order).put(handlers::update_order),
        )
        .route("/orders/health", get(handlers::health))
        .route(
            "/orders/{order_id}",
            get(handlers::get_order).delete(handlers::cancel_order),
        )
        .route("/orders/{order_id}/status", patch(handlers::update_status))
}

/// 运维接口
fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/orders/{order_id}", delete(handlers::delete_order))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(order_routes())
        .merge(admin_routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .route_layer(middleware::from_fn(http_tracing))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_construction() {
        let _orders = order_routes();
        let _admin = admin_routes();
    }
}
