//! 订单预留记录
//!
//! created 事件中实际扣减成功的订单行按订单号记录下来，cancelled 事件只归还
//! 记录中的数量：扣减失败的订单行从未占用库存，取消时也不会被归还。
//! 记录在归还时一次性取出并删除。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use order_shared::cache::{Cache, CacheKey};
use order_shared::error::CommerceError;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedLine {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub order_id: i64,
    pub lines: Vec<ReservedLine>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn record(&self, reservation: &Reservation) -> Result<()>;

    /// 取出并删除订单的预留记录，不存在返回 None
    async fn take(&self, order_id: i64) -> Result<Option<Reservation>>;
}

/// Redis 实现，key 为 `order-reservation:<order_id>`
#[derive(Clone)]
pub struct RedisReservationStore {
    cache: Cache,
    ttl: Duration,
}

impl RedisReservationStore {
    pub fn new(cache: Cache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }
}

#[async_trait]
impl ReservationStore for RedisReservationStore {
    async fn record(&self, reservation: &Reservation) -> Result<()> {
        let key = CacheKey::reservation(reservation.order_id);
        Ok(self.cache.set(&key, reservation, self.ttl).await?)
    }

    async fn take(&self, order_id: i64) -> Result<Option<Reservation>> {
        Ok(self.cache.take(&CacheKey::reservation(order_id)).await?)
    }
}

/// 进程内实现，可切换为故障模式
#[derive(Default)]
pub struct MemoryReservationStore {
    entries: DashMap<i64, Reservation>,
    failing: AtomicBool,
}

impl MemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get(&self, order_id: i64) -> Option<Reservation> {
        self.entries.get(&order_id).map(|entry| entry.clone())
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CommerceError::Internal("reservation store unavailable".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for MemoryReservationStore {
    async fn record(&self, reservation: &Reservation) -> Result<()> {
        self.check()?;
        self.entries
            .insert(reservation.order_id, reservation.clone());
        Ok(())
    }

    async fn take(&self, order_id: i64) -> Result<Option<Reservation>> {
        self.check()?;
        Ok(self.entries.remove(&order_id).map(|(_, reservation)| reservation))
    }
}
