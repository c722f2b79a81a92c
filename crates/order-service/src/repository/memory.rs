//! 进程内分片订单仓储
//!
//! 每个分片一个 `DashMap`，路由规则与 PostgreSQL 实现相同；
//! 单个订单的读写在对应分片条目锁内完成，整单替换对读者原子可见。

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use order_shared::models::{Order, OrderStatus};

use super::traits::OrderRepositoryTrait;
use crate::error::{OrderError, Result};
use crate::sharding::ShardRouter;

pub struct MemoryOrderRepository {
    router: ShardRouter,
    shards: Vec<DashMap<i64, Order>>,
    next_id: AtomicI64,
}

impl MemoryOrderRepository {
    pub fn new(router: ShardRouter) -> Self {
        Self {
            router,
            shards: (0..router.shard_count()).map(|_| DashMap::new()).collect(),
            next_id: AtomicI64::new(1),
        }
    }

    fn shard(&self, order_id: i64) -> &DashMap<i64, Order> {
        &self.shards[self.router.shard_for(order_id)]
    }

    /// 订单所在分片，不存在时返回 None
    pub fn shard_of(&self, order_id: i64) -> Option<usize> {
        self.shards
            .iter()
            .position(|shard| shard.contains_key(&order_id))
    }

    /// 全部分片中的订单数
    pub fn len(&self) -> usize {
        self.shards.iter().map(DashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OrderRepositoryTrait for MemoryOrderRepository {
    async fn create(&self, order: &Order) -> Result<i64> {
        let duplicate_key = self.shards.iter().any(|shard| {
            shard
                .iter()
                .any(|entry| entry.idempotency_key == order.idempotency_key)
        });
        if duplicate_key {
            return Err(OrderError::DuplicateRequest(order.idempotency_key.clone()));
        }

        let shard = self.shard(order.order_id);
        if shard.contains_key(&order.order_id) {
            return Err(OrderError::Internal(format!(
                "order_id {} already exists",
                order.order_id
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut stored = order.clone();
        stored.id = id;
        shard.insert(order.order_id, stored);
        Ok(id)
    }

    async fn replace(&self, order: &Order) -> Result<()> {
        let mut entry = self
            .shard(order.order_id)
            .get_mut(&order.order_id)
            .ok_or(OrderError::NotFound(order.order_id))?;

        let id = entry.id;
        let idempotency_key = entry.idempotency_key.clone();
        *entry = Order {
            id,
            idempotency_key,
            ..order.clone()
        };
        Ok(())
    }

    async fn get(&self, order_id: i64) -> Result<Option<Order>> {
        Ok(self
            .shard(order_id)
            .get(&order_id)
            .map(|entry| entry.value().clone()))
    }

    async fn set_status(&self, order_id: i64, status: OrderStatus) -> Result<()> {
        let mut entry = self
            .shard(order_id)
            .get_mut(&order_id)
            .ok_or(OrderError::NotFound(order_id))?;
        entry.status = status;
        Ok(())
    }

    async fn delete(&self, order_id: i64) -> Result<()> {
        self.shard(order_id)
            .remove(&order_id)
            .map(|_| ())
            .ok_or(OrderError::NotFound(order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_shared::test_utils::TestDataGenerator;

    fn repo() -> MemoryOrderRepository {
        MemoryOrderRepository::new(ShardRouter::new(3).unwrap())
    }

    #[tokio::test]
    async fn test_orders_placed_by_router() {
        let repo = repo();
        for order_id in [3_i64, 4, 5] {
            let order = TestDataGenerator::persisted_order(order_id, vec![]);
            repo.create(&order).await.unwrap();
        }

        assert_eq!(repo.shard_of(3), Some(0));
        assert_eq!(repo.shard_of(4), Some(1));
        assert_eq!(repo.shard_of(5), Some(2));
        assert_eq!(repo.len(), 3);
    }

    #[tokio::test]
    async fn test_replace_keeps_row_id_and_key() {
        let repo = repo();
        let order = TestDataGenerator::persisted_order(
            10,
            vec![TestDataGenerator::priced_item(1, 1, 2.0)],
        );
        let id = repo.create(&order).await.unwrap();

        let mut replacement = order.clone();
        replacement.id = 0;
        replacement.idempotency_key = "other".to_string();
        replacement.line_items.clear();
        repo.replace(&replacement).await.unwrap();

        let stored = repo.get(10).await.unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.idempotency_key, order.idempotency_key);
        assert!(stored.line_items.is_empty());
    }

    #[tokio::test]
    async fn test_missing_order_paths() {
        let repo = repo();
        let order = TestDataGenerator::persisted_order(99, vec![]);

        assert!(repo.get(99).await.unwrap().is_none());
        assert!(matches!(repo.replace(&order).await, Err(OrderError::NotFound(99))));
        assert!(matches!(
            repo.set_status(99, OrderStatus::Paid).await,
            Err(OrderError::NotFound(99))
        ));
        assert!(matches!(repo.delete(99).await, Err(OrderError::NotFound(99))));
    }
}
