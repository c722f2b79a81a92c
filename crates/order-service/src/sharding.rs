//! 分片路由
//!
//! 订单号到分片下标的确定性映射，无外部状态。分片数在进程生命周期内固定，
//! 同一订单的所有读写必须经过同一配置的路由，避免落到不同分片。

use crate::error::{OrderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRouter {
    shard_count: usize,
}

impl ShardRouter {
    pub fn new(shard_count: usize) -> Result<Self> {
        if shard_count == 0 {
            return Err(OrderError::Internal("shard count must be positive".to_string()));
        }
        Ok(Self { shard_count })
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// `order_id mod shard_count`，负数订单号同样落在 `[0, shard_count)`
    pub fn shard_for(&self, order_id: i64) -> usize {
        order_id.rem_euclid(self.shard_count as i64) as usize
    }
}
