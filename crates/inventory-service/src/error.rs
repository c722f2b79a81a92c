//! 库存服务错误类型

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use order_shared::error::CommerceError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("库存不足: product_id={product_id}, 需要 {requested}, 可用 {available}")]
    InsufficientStock {
        product_id: i64,
        requested: i64,
        available: i64,
    },

    #[error("商品不存在: product_id={0}")]
    ProductNotFound(i64),

    #[error("数量必须大于 0: {0}")]
    InvalidQuantity(i64),

    #[error("库存版本冲突: product_id={product_id}, 已重试 {attempts} 次")]
    VersionConflict { product_id: i64, attempts: u32 },

    #[error("无法解析的订单事件: {0}")]
    UndecodableEvent(String),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Shared(#[from] CommerceError),
}

pub type Result<T> = std::result::Result<T, InventoryError>;

impl InventoryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            Self::InvalidQuantity(_) => "VALIDATION_ERROR",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::UndecodableEvent(_) => "UNDECODABLE_EVENT",
            Self::Database(_) => "STORAGE_FAILURE",
            Self::Shared(e) => e.code(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InsufficientStock { .. } | Self::VersionConflict { .. } => StatusCode::CONFLICT,
            Self::ProductNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidQuantity(_) | Self::UndecodableEvent(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) | Self::Shared(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for InventoryError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Shared(e) => {
                tracing::error!(error = %e, "基础设施错误");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            InventoryError::ProductNotFound(1).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            InventoryError::VersionConflict {
                product_id: 1,
                attempts: 5
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_shared_error_keeps_code() {
        let err: InventoryError = CommerceError::Kafka("down".into()).into();
        assert_eq!(err.code(), "KAFKA_ERROR");
        assert_eq!(err.to_string(), "Kafka 错误: down");
    }
}
