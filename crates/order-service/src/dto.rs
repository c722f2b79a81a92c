//! HTTP 请求与响应 DTO

use order_shared::models::{LineItem, Order, OrderStatus};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// API 统一响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }

    pub fn success_empty() -> ApiResponse<()> {
        ApiResponse {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: None,
        }
    }
}

/// 订单行请求
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LineItemRequest {
    pub product_id: i64,
    #[validate(range(min = 1, message = "数量必须大于 0"))]
    pub quantity: i32,
}

/// 更新请求中的订单行，允许携带客户端的行金额
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PricedLineItemRequest {
    pub product_id: i64,
    #[validate(range(min = 1, message = "数量必须大于 0"))]
    pub quantity: i32,
    #[serde(default)]
    pub markup: f64,
    #[serde(default)]
    pub discount: f64,
    #[serde(default)]
    pub final_price: f64,
}

impl From<PricedLineItemRequest> for LineItem {
    fn from(req: PricedLineItemRequest) -> Self {
        Self {
            product_id: req.product_id,
            quantity: req.quantity,
            markup: req.markup,
            discount: req.discount,
            final_price: req.final_price,
        }
    }
}

/// 创建订单请求
///
/// 幂等令牌优先取 `Idempotency-Key` 请求头，其次取请求体字段。
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(range(min = 1, message = "user_id 必须为正数"))]
    pub user_id: i64,
    #[validate(length(min = 1, message = "订单至少包含一个订单行"), nested)]
    pub line_items: Vec<LineItemRequest>,
    pub idempotency_key: Option<String>,
}

impl CreateOrderRequest {
    pub fn into_submission(self, idempotency_key: String) -> Order {
        Order {
            user_id: self.user_id,
            line_items: self
                .line_items
                .into_iter()
                .map(|item| LineItem::new(item.product_id, item.quantity))
                .collect(),
            idempotency_key,
            ..Default::default()
        }
    }
}

/// 整单更新请求
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateOrderRequest {
    pub order_id: i64,
    #[validate(length(min = 1, message = "订单至少包含一个订单行"), nested)]
    pub line_items: Vec<PricedLineItemRequest>,
    pub status: OrderStatus,
}

impl From<UpdateOrderRequest> for Order {
    fn from(req: UpdateOrderRequest) -> Self {
        Order {
            order_id: req.order_id,
            line_items: req.line_items.into_iter().map(LineItem::from).collect(),
            status: req.status,
            ..Default::default()
        }
    }
}

/// 状态变更请求
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_validation() {
        let req: CreateOrderRequest = serde_json::from_value(serde_json::json!({
            "user_id": 7,
            "line_items": [{"product_id": 1, "quantity": 0}]
        }))
        .unwrap();
        assert!(req.validate().is_err());

        let req: CreateOrderRequest = serde_json::from_value(serde_json::json!({
            "user_id": 7,
            "line_items": []
        }))
        .unwrap();
        assert!(req.validate().is_err());

        let req: CreateOrderRequest = serde_json::from_value(serde_json::json!({
            "user_id": 7,
            "line_items": [{"product_id": 1, "quantity": 2}],
            "idempotency_key": "abc"
        }))
        .unwrap();
        assert!(req.validate().is_ok());

        let order = req.into_submission("abc".to_string());
        assert_eq!(order.line_items, vec![LineItem::new(1, 2)]);
        assert_eq!(order.status, OrderStatus::Created);
    }

    #[test]
    fn test_update_request_accepts_canceled_spelling() {
        let req: UpdateStatusRequest =
            serde_json::from_value(serde_json::json!({"status": "canceled"})).unwrap();
        assert_eq!(req.status, OrderStatus::Cancelled);
    }
}
