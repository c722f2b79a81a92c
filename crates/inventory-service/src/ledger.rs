//! 库存账本
//!
//! 预留与释放都是"读候选记录 -> 计算新数量 -> 按版本号 CAS 写入持久化存储"。
//! 候选记录优先取缓存，缓存未命中或出错时读持久化存储；CAS 冲突后重新读取
//! 持久化记录重试，最多 `max_cas_retries` 次。写入成功后把新记录写穿到缓存
//! （不过期），缓存写失败只记录日志。
//!
//! 基于缓存候选判断库存不足时，先用持久化记录复核再拒绝。

use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use order_shared::error::CommerceError;
use serde::Serialize;
use order_shared::observability::metrics::record_stock_adjustment;
use tracing::{debug, info, instrument, warn};

use crate::error::{InventoryError, Result};
use crate::models::{StockAdjustment, StockRecord};
use crate::repository::StockRepositoryTrait;
use crate::stock_cache::StockCacheTrait;

/// 候选记录来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Cache,
    Durable,
}

/// 预热结果，失败逐条保留
#[derive(Debug, Default, Serialize)]
pub struct PrewarmReport {
    pub loaded: usize,
    pub cached: usize,
    pub failures: Vec<(i64, String)>,
}

pub struct StockLedger {
    repo: Arc<dyn StockRepositoryTrait>,
    cache: Arc<dyn StockCacheTrait>,
    max_cas_retries: u32,
}

impl StockLedger {
    pub fn new(
        repo: Arc<dyn StockRepositoryTrait>,
        cache: Arc<dyn StockCacheTrait>,
        max_cas_retries: u32,
    ) -> Self {
        Self {
            repo,
            cache,
            max_cas_retries,
        }
    }

    /// 读穿查询：缓存命中直接返回，否则读持久化存储并回填缓存
    #[instrument(skip(self))]
    pub async fn get_stock(&self, product_id: i64) -> Result<StockRecord> {
        match self.cache.get(product_id).await {
            Ok(Some(record)) => return Ok(record),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "读取库存缓存失败，改读数据库"),
        }

        let record = self.durable(product_id).await?;
        self.write_through(&record).await;
        Ok(record)
    }

    /// 扣减库存
    pub async fn reserve(&self, product_id: i64, quantity: i64) -> Result<StockRecord> {
        self.adjust(product_id, quantity, StockAdjustment::Reserve)
            .await
    }

    /// 归还库存
    pub async fn release(&self, product_id: i64, quantity: i64) -> Result<StockRecord> {
        self.adjust(product_id, quantity, StockAdjustment::Release)
            .await
    }

    #[instrument(skip(self), fields(direction = direction.as_str()))]
    async fn adjust(
        &self,
        product_id: i64,
        quantity: i64,
        direction: StockAdjustment,
    ) -> Result<StockRecord> {
        let result = self.try_adjust(product_id, quantity, direction).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.code(),
        };
        record_stock_adjustment(direction.as_str(), outcome);
        result
    }

    async fn try_adjust(
        &self,
        product_id: i64,
        quantity: i64,
        direction: StockAdjustment,
    ) -> Result<StockRecord> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }

        let (mut candidate, mut source) = self.candidate(product_id).await?;
        let mut conflicts = 0;

        loop {
            let Some(next) = direction.apply(candidate.available_quantity, quantity) else {
                if source == Source::Cache {
                    debug!(cached = candidate.available_quantity, "缓存显示库存不足，复核数据库");
                    candidate = self.durable(product_id).await?;
                    source = Source::Durable;
                    continue;
                }
                return Err(match direction {
                    StockAdjustment::Reserve => InventoryError::InsufficientStock {
                        product_id,
                        requested: quantity,
                        available: candidate.available_quantity,
                    },
                    StockAdjustment::Release => InventoryError::Shared(CommerceError::Internal(
                        format!("product {product_id} stock overflow"),
                    )),
                });
            };

            if let Some(updated) = self
                .repo
                .compare_and_swap(product_id, candidate.version, next)
                .await?
            {
                debug!(
                    before = candidate.available_quantity,
                    after = updated.available_quantity,
                    version = updated.version,
                    "库存已更新"
                );
                self.write_through(&updated).await;
                return Ok(updated);
            }

            conflicts += 1;
            if conflicts > self.max_cas_retries {
                warn!(attempts = conflicts, "库存版本冲突，重试耗尽");
                return Err(InventoryError::VersionConflict {
                    product_id,
                    attempts: conflicts,
                });
            }

            candidate = self.durable(product_id).await?;
            source = Source::Durable;
        }
    }

    async fn candidate(&self, product_id: i64) -> Result<(StockRecord, Source)> {
        match self.cache.get(product_id).await {
            Ok(Some(record)) => return Ok((record, Source::Cache)),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "读取库存缓存失败，改读数据库"),
        }
        Ok((self.durable(product_id).await?, Source::Durable))
    }

    async fn durable(&self, product_id: i64) -> Result<StockRecord> {
        self.repo
            .get(product_id)
            .await?
            .ok_or(InventoryError::ProductNotFound(product_id))
    }

    async fn write_through(&self, record: &StockRecord) {
        if let Err(e) = self.cache.put(record, None).await {
            warn!(product_id = record.product_id, error = %e, "库存缓存写入失败");
        }
    }

    /// 把全部库存记录以短 TTL 写入缓存，并发数受 `concurrency` 限制
    ///
    /// 读取持久化存储失败时返回错误；单条缓存写入失败收集进报告。
    #[instrument(skip(self))]
    pub async fn prewarm(&self, ttl: Duration, concurrency: usize) -> Result<PrewarmReport> {
        let records = self.repo.list_all().await?;
        let loaded = records.len();

        let results: Vec<std::result::Result<(), (i64, String)>> = stream::iter(records)
            .map(|record| async move {
                self.cache
                    .put(&record, Some(ttl))
                    .await
                    .map_err(|e| (record.product_id, e.to_string()))
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut report = PrewarmReport {
            loaded,
            ..Default::default()
        };
        for result in results {
            match result {
                Ok(()) => report.cached += 1,
                Err(failure) => report.failures.push(failure),
            }
        }

        if report.failures.is_empty() {
            info!(loaded, "库存缓存预热完成");
        } else {
            warn!(
                loaded,
                cached = report.cached,
                failed = report.failures.len(),
                failures = ?report.failures,
                "库存缓存预热部分失败"
            );
        }
        Ok(report)
    }
}
