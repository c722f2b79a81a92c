//! 进程内库存仓储

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::traits::StockRepositoryTrait;
use crate::error::Result;
use crate::models::StockRecord;

#[derive(Default)]
pub struct MemoryStockRepository {
    records: DashMap<i64, StockRecord>,
    conflicts: AtomicUsize,
}

impl MemoryStockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stock(self, product_id: i64, available_quantity: i64) -> Self {
        self.records.insert(
            product_id,
            StockRecord {
                product_id,
                available_quantity,
                version: 0,
            },
        );
        self
    }

    /// 直接改写持久化数量并递增版本，模拟其他写入者
    pub fn overwrite(&self, product_id: i64, available_quantity: i64) {
        if let Some(mut record) = self.records.get_mut(&product_id) {
            record.available_quantity = available_quantity;
            record.version += 1;
        }
    }

    pub fn available(&self, product_id: i64) -> Option<i64> {
        self.records
            .get(&product_id)
            .map(|record| record.available_quantity)
    }

    /// 累计的版本冲突次数
    pub fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StockRepositoryTrait for MemoryStockRepository {
    async fn get(&self, product_id: i64) -> Result<Option<StockRecord>> {
        Ok(self.records.get(&product_id).map(|record| *record))
    }

    async fn compare_and_swap(
        &self,
        product_id: i64,
        expected_version: i64,
        available_quantity: i64,
    ) -> Result<Option<StockRecord>> {
        let Some(mut record) = self.records.get_mut(&product_id) else {
            return Ok(None);
        };

        if record.version != expected_version {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
            return Ok(None);
        }

        record.available_quantity = available_quantity;
        record.version += 1;
        Ok(Some(*record))
    }

    async fn list_all(&self) -> Result<Vec<StockRecord>> {
        let mut records: Vec<StockRecord> = self.records.iter().map(|entry| *entry).collect();
        records.sort_by_key(|record| record.product_id);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cas_bumps_version() {
        let repo = MemoryStockRepository::new().with_stock(1, 10);

        let updated = repo.compare_and_swap(1, 0, 8).await.unwrap().unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.available_quantity, 8);

        assert!(repo.compare_and_swap(1, 0, 5).await.unwrap().is_none());
        assert_eq!(repo.conflicts(), 1);
        assert_eq!(repo.available(1), Some(8));
    }

    #[tokio::test]
    async fn test_missing_product() {
        let repo = MemoryStockRepository::new();
        assert!(repo.get(1).await.unwrap().is_none());
        assert!(repo.compare_and_swap(1, 0, 1).await.unwrap().is_none());
    }
}
