//! 仓储 Trait 定义

use async_trait::async_trait;
use order_shared::models::{Order, OrderStatus};

use crate::error::Result;

/// 分片订单仓储接口
///
/// 所有操作以业务键 `order_id` 寻址，实现方据此选择分片。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepositoryTrait: Send + Sync {
    /// 单事务写入订单与全部订单行，返回存储分配的行号
    async fn create(&self, order: &Order) -> Result<i64>;

    /// 整单替换：更新订单字段，删除并重新写入订单行集合；订单不存在时返回 NotFound
    async fn replace(&self, order: &Order) -> Result<()>;

    /// 点查订单及其订单行；不存在返回 `None`
    async fn get(&self, order_id: i64) -> Result<Option<Order>>;

    /// 仅更新状态；订单不存在时返回 NotFound
    async fn set_status(&self, order_id: i64, status: OrderStatus) -> Result<()>;

    /// 删除订单行与订单；订单不存在时返回 NotFound
    async fn delete(&self, order_id: i64) -> Result<()>;
}
