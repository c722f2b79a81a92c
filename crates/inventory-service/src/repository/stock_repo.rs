//! PostgreSQL 库存仓储

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use super::traits::StockRepositoryTrait;
use crate::error::Result;
use crate::models::StockRecord;

#[derive(sqlx::FromRow)]
struct StockRow {
    id: i64,
    stock: i64,
    version: i64,
}

impl From<StockRow> for StockRecord {
    fn from(row: StockRow) -> Self {
        Self {
            product_id: row.id,
            available_quantity: row.stock,
            version: row.version,
        }
    }
}

pub struct StockRepository {
    pool: PgPool,
}

impl StockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 新建商品并返回其库存记录
    pub async fn create_product(
        &self,
        name: &str,
        description: &str,
        price: f64,
        stock: i64,
    ) -> Result<StockRecord> {
        let row = sqlx::query_as::<_, StockRow>(
            r#"
            INSERT INTO products (name, description, price, stock)
            VALUES ($1, $2, $3, $4)
            RETURNING id, stock, version
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(stock)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }
}

#[async_trait]
impl StockRepositoryTrait for StockRepository {
    #[instrument(skip(self))]
    async fn get(&self, product_id: i64) -> Result<Option<StockRecord>> {
        let row = sqlx::query_as::<_, StockRow>(
            "SELECT id, stock, version FROM products WHERE id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(StockRecord::from))
    }

    #[instrument(skip(self))]
    async fn compare_and_swap(
        &self,
        product_id: i64,
        expected_version: i64,
        available_quantity: i64,
    ) -> Result<Option<StockRecord>> {
        let row = sqlx::query_as::<_, StockRow>(
            r#"
            UPDATE products
            SET stock = $1, version = version + 1, updated_at = NOW()
            WHERE id = $2 AND version = $3
            RETURNING id, stock, version
            "#,
        )
        .bind(available_quantity)
        .bind(product_id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        if row.is_none() {
            debug!("版本不匹配，未写入");
        }
        Ok(row.map(StockRecord::from))
    }

    async fn list_all(&self) -> Result<Vec<StockRecord>> {
        let rows = sqlx::query_as::<_, StockRow>(
            "SELECT id, stock, version FROM products ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StockRecord::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_shared::database::Database;
    use order_shared::test_utils::test_database_config;

    async fn repository() -> StockRepository {
        let config = test_database_config();
        let url = config.primary_url().unwrap_or_default().to_string();
        let db = Database::connect(&url, &config).await.unwrap();
        db.bootstrap_schema(crate::INVENTORY_SCHEMA).await.unwrap();
        StockRepository::new(db.pool().clone())
    }

    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_compare_and_swap_checks_version() {
        let repo = repository().await;
        let created = repo.create_product("widget", "", 9.9, 10).await.unwrap();

        let updated = repo
            .compare_and_swap(created.product_id, created.version, 7)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.available_quantity, 7);
        assert_eq!(updated.version, created.version + 1);

        // 旧版本号不再生效
        let stale = repo
            .compare_and_swap(created.product_id, created.version, 1)
            .await
            .unwrap();
        assert!(stale.is_none());

        let current = repo.get(created.product_id).await.unwrap().unwrap();
        assert_eq!(current, updated);
    }

    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_negative_stock_rejected_by_schema() {
        let repo = repository().await;
        let created = repo.create_product("gadget", "", 1.0, 1).await.unwrap();

        let result = repo
            .compare_and_swap(created.product_id, created.version, -1)
            .await;
        assert!(result.is_err());
    }
}
