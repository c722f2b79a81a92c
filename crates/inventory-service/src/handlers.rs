//! 库存 API 处理器
//!
//! 查询接口的响应体为订单服务库存客户端使用的裸格式，不套统一响应包装。
//! 扣减、归还与缓存预热为运维接口，与事件对账走同一个库存账本。

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};

use crate::{error::InventoryError, ledger::PrewarmReport, models::StockRecord, state::AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct StockResponse {
    pub stock: i64,
}

/// 查询商品可用库存
///
/// GET /products/{id}/stock
pub async fn get_stock(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> Result<Json<StockResponse>, InventoryError> {
    let record = state.ledger.get_stock(product_id).await?;
    Ok(Json(StockResponse {
        stock: record.available_quantity,
    }))
}

/// 扣减与归还请求
#[derive(Debug, Serialize, Deserialize)]
pub struct StockAdjustmentRequest {
    pub product_id: i64,
    pub quantity: i64,
}

/// 扣减库存
///
/// POST /products/reserve
pub async fn reserve_stock(
    State(state): State<AppState>,
    Json(req): Json<StockAdjustmentRequest>,
) -> Result<Json<StockRecord>, InventoryError> {
    let record = state.ledger.reserve(req.product_id, req.quantity).await?;
    Ok(Json(record))
}

/// 归还库存
///
/// POST /products/release
pub async fn release_stock(
    State(state): State<AppState>,
    Json(req): Json<StockAdjustmentRequest>,
) -> Result<Json<StockRecord>, InventoryError> {
    let record = state.ledger.release(req.product_id, req.quantity).await?;
    Ok(Json(record))
}

/// 以预热 TTL 重新加载全部库存到缓存
///
/// GET /products/warmup-cache
pub async fn warmup_cache(
    State(state): State<AppState>,
) -> Result<Json<PrewarmReport>, InventoryError> {
    let report = state
        .ledger
        .prewarm(state.prewarm_ttl, state.prewarm_concurrency)
        .await?;
    Ok(Json(report))
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "inventory-service"
    }))
}
