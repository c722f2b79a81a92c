//! 订单领域模型
//!
//! 订单服务持久化、库存服务通过事件消费的同一份订单结构。
//! JSON 字段名即事件负载的线上格式。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 订单状态
///
/// 状态机：created → paid；cancelled 可由任意非终态经显式取消到达，且为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Created,
    Paid,
    #[serde(alias = "canceled")]
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    /// 状态转换是否合法
    ///
    /// 同状态转换（如 paid → paid）视为无操作，允许；
    /// 进入 cancelled 只能走取消路径，此处同样允许，由调用方限制入口。
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self, next) {
            (Self::Created, _) => true,
            (Self::Paid, Self::Paid | Self::Cancelled) => true,
            (Self::Cancelled, Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 存储中出现未知状态字符串时的解析错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown order status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "paid" => Ok(Self::Paid),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// 订单行
///
/// `markup`、`discount`、`final_price` 均为行合计（单价 × 数量）。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: i64,
    pub quantity: i32,
    #[serde(default)]
    pub markup: f64,
    #[serde(default)]
    pub discount: f64,
    #[serde(default)]
    pub final_price: f64,
}

impl LineItem {
    pub fn new(product_id: i64, quantity: i32) -> Self {
        Self {
            product_id,
            quantity,
            ..Default::default()
        }
    }

    /// 按单价填充行金额
    pub fn apply_unit_price(&mut self, unit_markup: f64, unit_discount: f64, unit_final: f64) {
        let qty = f64::from(self.quantity);
        self.markup = qty * unit_markup;
        self.discount = qty * unit_discount;
        self.final_price = qty * unit_final;
    }
}

/// 订单
///
/// `id` 为存储分配的行号，仅在所属分片内有意义；`order_id` 为全局唯一的业务键，
/// 分片路由、事件键、对外接口均使用 `order_id`。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub order_id: i64,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub total_markup: f64,
    #[serde(default)]
    pub total_discount: f64,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub idempotency_key: String,
}

impl Order {
    /// 由行金额重新汇总订单合计，保证 total == Σ final_price
    pub fn recompute_totals(&mut self) {
        self.total = self.line_items.iter().map(|li| li.final_price).sum();
        self.total_markup = self.line_items.iter().map(|li| li.markup).sum();
        self.total_discount = self.line_items.iter().map(|li| li.discount).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde_lowercase() {
        assert_eq!(serde_json::to_string(&OrderStatus::Paid).unwrap(), "\"paid\"");
        let parsed: OrderStatus = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(parsed, OrderStatus::Cancelled);
        assert_eq!("created".parse::<OrderStatus>().unwrap(), OrderStatus::Created);
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;

        assert!(Created.can_transition_to(Paid));
        assert!(Created.can_transition_to(Created));
        assert!(Created.can_transition_to(Cancelled));
        assert!(Paid.can_transition_to(Cancelled));
        assert!(!Paid.can_transition_to(Created));
        assert!(!Cancelled.can_transition_to(Paid));
        assert!(!Cancelled.can_transition_to(Created));
        assert!(Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn test_line_total_scales_with_quantity() {
        let mut item = LineItem::new(42, 2);
        item.apply_unit_price(0.1, 0.05, 100.0);

        assert_eq!(item.final_price, 200.0);
        assert!((item.markup - 0.2).abs() < f64::EPSILON);
        assert!((item.discount - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_recompute_totals() {
        let mut order = Order {
            user_id: 7,
            line_items: vec![
                LineItem {
                    product_id: 1,
                    quantity: 1,
                    markup: 1.0,
                    discount: 0.5,
                    final_price: 10.0,
                },
                LineItem {
                    product_id: 2,
                    quantity: 3,
                    markup: 3.0,
                    discount: 1.5,
                    final_price: 30.0,
                },
            ],
            ..Default::default()
        };

        order.recompute_totals();

        assert_eq!(order.total, 40.0);
        assert_eq!(order.total_markup, 4.0);
        assert_eq!(order.total_discount, 2.0);
    }

    #[test]
    fn test_order_deserializes_submission_payload() {
        let order: Order = serde_json::from_str(
            r#"{"user_id":7,"line_items":[{"product_id":42,"quantity":2}],"idempotency_key":"abc"}"#,
        )
        .unwrap();

        assert_eq!(order.user_id, 7);
        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(order.line_items[0].final_price, 0.0);
    }
}
