//! 幂等守卫
//!
//! 把客户端令牌映射为带 TTL 的标记。检查与写入在存储端是一步完成的条件写，
//! 两个携带同一令牌的并发请求只有一个被放行。存储故障作为失败返回，
//! 不会被当作"非重复"放行。

use std::sync::Arc;
use std::time::Duration;

use order_shared::cache::CacheKey;
use order_shared::idempotency::IdempotencyStore;
use tracing::{debug, warn};

use crate::error::{OrderError, Result};

pub struct IdempotencyGuard {
    store: Arc<dyn IdempotencyStore>,
    ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn IdempotencyStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// 放行返回 `Ok(())`；重复返回 `DuplicateRequest`，此时不发生写入
    pub async fn admit(&self, token: &str) -> Result<()> {
        if token.trim().is_empty() {
            return Err(OrderError::Validation("idempotency_key 不能为空".to_string()));
        }

        let claimed = self
            .store
            .claim(&CacheKey::idempotency(token), self.ttl)
            .await
            .map_err(|e| OrderError::IdempotencyStore(e.to_string()))?;

        if claimed {
            debug!(idempotency_key = token, "请求已放行");
            Ok(())
        } else {
            warn!(idempotency_key = token, "重复请求被拒绝");
            Err(OrderError::DuplicateRequest(token.to_string()))
        }
    }
}
