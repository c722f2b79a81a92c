//! 幂等标记存储
//!
//! `claim` 必须是单步的"不存在则写入"：两个并发请求携带同一令牌时只有一个成功。
//! 订单服务的幂等守卫与库存服务的事件去重都建立在这一原语之上。

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::{Duration, Instant};

use crate::cache::Cache;
use crate::error::Result;

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// 原子地占用 key：返回 true 表示首次占用并已写入标记，false 表示已存在（不写入）
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool>;
}

/// Redis 实现，基于 SET NX EX
#[derive(Clone)]
pub struct RedisIdempotencyStore {
    cache: Cache,
}

impl RedisIdempotencyStore {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.cache.set_nx(key, &"exists", ttl).await
    }
}

/// 进程内实现，用于测试与单机部署
#[derive(Default)]
pub struct MemoryIdempotencyStore {
    markers: DashMap<String, Instant>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前未过期的标记数
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.markers.iter().filter(|e| *e.value() > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        // 每次占用前清理过期标记，存储大小受限于 TTL 窗口内的请求数
        self.markers.retain(|_, expires_at| *expires_at > now);

        // entry 持有分片写锁，检查与写入不可被并发请求穿插
        match self.markers.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() > now {
                    Ok(false)
                } else {
                    occupied.insert(now + ttl);
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now + ttl);
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_second_claim_rejected() {
        let store = MemoryIdempotencyStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.claim("abc", ttl).await.unwrap());
        assert!(!store.claim("abc", ttl).await.unwrap());
        assert!(store.claim("other", ttl).await.unwrap());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_marker_can_be_reclaimed() {
        let store = MemoryIdempotencyStore::new();

        assert!(store.claim("abc", Duration::from_millis(10)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.claim("abc", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_markers_are_swept() {
        let store = MemoryIdempotencyStore::new();
        for key in ["a", "b", "c"] {
            store.claim(key, Duration::ZERO).await.unwrap();
        }

        assert!(store.claim("d", Duration::from_secs(60)).await.unwrap());
        assert_eq!(store.markers.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_claims_admit_exactly_one() {
        let store = Arc::new(MemoryIdempotencyStore::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.claim("same", Duration::from_secs(60)).await })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}
