//! 订单 API 处理器
//!
//! 处理器只做参数提取与校验，业务规则全部在 `OrderService` 中。

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use order_shared::models::Order;
use tracing::info;
use validator::Validate;

use crate::{
    dto::{
        ApiResponse, CreateOrderRequest, HealthResponse, UpdateOrderRequest, UpdateStatusRequest,
    },
    error::OrderError,
    state::AppState,
};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// 请求头优先，其次请求体；都缺失时交给幂等守卫按空令牌拒绝
fn idempotency_key(headers: &HeaderMap, body: Option<String>) -> String {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or(body)
        .unwrap_or_default()
}

/// 创建订单
///
/// POST /orders
pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Order>>), OrderError> {
    req.validate()?;

    let key = idempotency_key(&headers, req.idempotency_key.take());
    let order = state.orders.create_order(req.into_submission(key)).await?;

    info!(order_id = order.order_id, "创建订单请求完成");
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// 整单更新
///
/// PUT /orders
pub async fn update_order(
    State(state): State<AppState>,
    Json(req): Json<UpdateOrderRequest>,
) -> Result<Json<ApiResponse<Order>>, OrderError> {
    req.validate()?;
    let order = state.orders.update_order(req.into()).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// 查询订单
///
/// GET /orders/{order_id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<ApiResponse<Order>>, OrderError> {
    let order = state.orders.get_order(order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// 取消订单
///
/// DELETE /orders/{order_id}
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<ApiResponse<Order>>, OrderError> {
    let order = state.orders.cancel_order(order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// 变更订单状态
///
/// PATCH /orders/{order_id}/status
pub async fn update_status(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<Order>>, OrderError> {
    let order = state.orders.set_status(order_id, req.status).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// 管理性删除订单，不发布事件
///
/// DELETE /admin/orders/{order_id}
pub async fn delete_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, OrderError> {
    state.orders.delete_order(order_id).await?;
    Ok(Json(ApiResponse::<()>::success_empty()))
}

/// GET /orders/health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "order-service".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_key_wins_over_body() {
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_HEADER, HeaderValue::from_static("from-header"));
        assert_eq!(
            idempotency_key(&headers, Some("from-body".into())),
            "from-header"
        );
    }

    #[test]
    fn test_blank_header_falls_back_to_body() {
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_HEADER, HeaderValue::from_static("  "));
        assert_eq!(idempotency_key(&headers, Some("from-body".into())), "from-body");
        assert_eq!(idempotency_key(&HeaderMap::new(), None), "");
    }
}
