//! 库存领域模型

use serde::{Deserialize, Serialize};

/// 商品库存记录
///
/// `version` 为持久化存储中的乐观锁版本，缓存中的副本可能落后。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub product_id: i64,
    pub available_quantity: i64,
    pub version: i64,
}

/// 库存调整方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockAdjustment {
    /// 订单创建：扣减
    Reserve,
    /// 订单取消：归还
    Release,
}

impl StockAdjustment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reserve => "reserve",
            Self::Release => "release",
        }
    }

    /// 调整后的可用数量；扣减后为负返回 None
    pub fn apply(&self, available: i64, quantity: i64) -> Option<i64> {
        match self {
            Self::Reserve => available.checked_sub(quantity).filter(|next| *next >= 0),
            Self::Release => available.checked_add(quantity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_never_negative() {
        assert_eq!(StockAdjustment::Reserve.apply(5, 3), Some(2));
        assert_eq!(StockAdjustment::Reserve.apply(5, 5), Some(0));
        assert_eq!(StockAdjustment::Reserve.apply(5, 6), None);
    }

    #[test]
    fn test_release_adds() {
        assert_eq!(StockAdjustment::Release.apply(0, 3), Some(3));
        assert_eq!(StockAdjustment::Release.apply(i64::MAX, 1), None);
    }

    #[test]
    fn test_record_json() {
        let record = StockRecord {
            product_id: 1,
            available_quantity: 10,
            version: 3,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"product_id":1,"available_quantity":10,"version":3}"#);
    }
}
