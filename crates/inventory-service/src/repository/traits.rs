//! 库存仓储 trait 定义

use async_trait::async_trait;

use crate::error::Result;
use crate::models::StockRecord;

/// 库存持久化存储，唯一的事实来源
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StockRepositoryTrait: Send + Sync {
    async fn get(&self, product_id: i64) -> Result<Option<StockRecord>>;

    /// 版本号等于 `expected_version` 时写入新数量并递增版本
    ///
    /// 成功返回新记录；版本不匹配或商品不存在返回 None。
    async fn compare_and_swap(
        &self,
        product_id: i64,
        expected_version: i64,
        available_quantity: i64,
    ) -> Result<Option<StockRecord>>;

    async fn list_all(&self) -> Result<Vec<StockRecord>>;
}
