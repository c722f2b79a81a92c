//! 订单服务错误类型
//!
//! 每一种失败都以独立的错误种类返回给调用方，不会把库存不足等业务失败
//! 降级为通用错误。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use order_shared::error::CommerceError;
use order_shared::models::OrderStatus;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    // ==================== 请求级错误 ====================
    #[error("重复请求: idempotency_key={0}")]
    DuplicateRequest(String),

    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("订单不存在: order_id={0}")]
    NotFound(i64),

    #[error("非法的状态转换: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    // ==================== 下游错误 ====================
    #[error("下游服务不可用: {service}: {message}")]
    DownstreamUnavailable {
        service: &'static str,
        message: String,
    },

    #[error("库存不足: product_id={product_id}, 需要 {requested}, 可用 {available}")]
    InsufficientStock {
        product_id: i64,
        requested: i64,
        available: i64,
    },

    #[error("操作超时: {stage}")]
    Timeout { stage: &'static str },

    // ==================== 存储与消息错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("幂等存储错误: {0}")]
    IdempotencyStore(String),

    #[error("事件发布失败: {0}")]
    Publish(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, OrderError>;

impl OrderError {
    /// 稳定的机器可读错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateRequest(_) => "DUPLICATE_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::DownstreamUnavailable { .. } => "DOWNSTREAM_UNAVAILABLE",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Database(_) | Self::IdempotencyStore(_) => "STORAGE_FAILURE",
            Self::Publish(_) => "PUBLISH_FAILURE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DuplicateRequest(_)
            | Self::InsufficientStock { .. }
            | Self::InvalidStatusTransition { .. } => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DownstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Publish(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::IdempotencyStore(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<CommerceError> for OrderError {
    fn from(err: CommerceError) -> Self {
        match err {
            CommerceError::Database(e) => Self::Database(e),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for OrderError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 存储类错误只返回通用提示，细节仅记录日志
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::IdempotencyStore(e) => {
                tracing::error!(error = %e, "幂等存储操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}
