//! 库存缓存
//!
//! 缓存只是读加速，从不作为事实来源。查询结果显式区分命中与未命中，
//! 命中的记录可能落后于持久化存储，写入前一律以持久化版本号为准。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use order_shared::cache::{Cache, CacheKey};
use order_shared::error::CommerceError;
use tracing::debug;

use crate::error::Result;
use crate::models::StockRecord;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StockCacheTrait: Send + Sync {
    /// 命中返回 Some，未命中返回 None
    async fn get(&self, product_id: i64) -> Result<Option<StockRecord>>;

    /// 写入记录，`ttl` 为 None 时不过期
    ///
    /// 缓存中已有同版本或更新版本时不覆盖，乱序到达的写穿不会让旧记录回到缓存。
    async fn put(&self, record: &StockRecord, ttl: Option<Duration>) -> Result<()>;
}

/// Redis 实现，key 为 `product:<id>`
#[derive(Clone)]
pub struct RedisStockCache {
    cache: Cache,
}

impl RedisStockCache {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl StockCacheTrait for RedisStockCache {
    async fn get(&self, product_id: i64) -> Result<Option<StockRecord>> {
        Ok(self.cache.get(&CacheKey::product(product_id)).await?)
    }

    async fn put(&self, record: &StockRecord, ttl: Option<Duration>) -> Result<()> {
        let key = CacheKey::product(record.product_id);
        let written = self
            .cache
            .set_if_newer(&key, record, record.version, ttl)
            .await?;
        if !written {
            debug!(
                product_id = record.product_id,
                version = record.version,
                "缓存已有更新版本，跳过写入"
            );
        }
        Ok(())
    }
}

/// 进程内实现，可切换为故障模式
#[derive(Default)]
pub struct MemoryStockCache {
    entries: DashMap<i64, (StockRecord, Option<Instant>)>,
    failing: AtomicBool,
}

impl MemoryStockCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 条目及其剩余过期时间（None 表示不过期）
    pub fn entry(&self, product_id: i64) -> Option<(StockRecord, Option<Duration>)> {
        let now = Instant::now();
        self.entries.get(&product_id).and_then(|entry| {
            let (record, expires_at) = *entry;
            match expires_at {
                Some(at) if at <= now => None,
                Some(at) => Some((record, Some(at - now))),
                None => Some((record, None)),
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CommerceError::Internal("cache unavailable".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl StockCacheTrait for MemoryStockCache {
    async fn get(&self, product_id: i64) -> Result<Option<StockRecord>> {
        self.check()?;
        Ok(self.entry(product_id).map(|(record, _)| record))
    }

    async fn put(&self, record: &StockRecord, ttl: Option<Duration>) -> Result<()> {
        self.check()?;
        let now = Instant::now();
        let expires_at = ttl.map(|ttl| now + ttl);

        // 条目锁内完成比较与写入
        let mut entry = self
            .entries
            .entry(record.product_id)
            .or_insert((*record, expires_at));
        let (cached, cached_expiry) = *entry;
        let live = cached_expiry.is_none_or(|at| at > now);
        if !live || cached.version < record.version {
            *entry = (*record, expires_at);
        }
        Ok(())
    }
}
