//! 数据库连接管理模块
//!
//! 订单存储按分片部署，每个分片一个独立的 PostgreSQL 连接池。
//! 分片数在进程生命周期内固定，由 `DatabaseConfig::shard_urls` 决定。

use crate::config::DatabaseConfig;
use crate::error::{CommerceError, Result};
use crate::retry::{RetryPolicy, retry_with_policy};
use futures::future::try_join_all;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

/// 单个数据库连接池包装
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 创建数据库连接池
    #[instrument(skip(url, config))]
    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    /// 带指数退避的连接，用于启动阶段等待数据库就绪
    pub async fn connect_with_retry(url: &str, config: &DatabaseConfig) -> Result<Self> {
        let policy = RetryPolicy::startup(config.connect_retries);
        retry_with_policy(&policy, "connect_database", CommerceError::is_retryable, || {
            Self::connect(url, config)
        })
        .await
    }

    /// 获取连接池引用
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 执行建表脚本（多语句，需幂等）
    pub async fn bootstrap_schema(&self, schema: &str) -> Result<()> {
        sqlx::raw_sql(schema).execute(&self.pool).await?;
        Ok(())
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(CommerceError::from)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl std::ops::Deref for Database {
    type Target = PgPool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

/// 分片数据库：下标即分片号
#[derive(Clone)]
pub struct ShardedDatabase {
    shards: Vec<Database>,
}

impl ShardedDatabase {
    /// 依次连接所有分片，任一分片在重试耗尽后仍不可用则启动失败
    #[instrument(skip(config), fields(shard_count = config.shard_urls.len()))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        if config.shard_urls.is_empty() {
            return Err(CommerceError::Config("database.shard_urls 为空".to_string()));
        }

        let mut shards = Vec::with_capacity(config.shard_urls.len());
        for (index, url) in config.shard_urls.iter().enumerate() {
            let db = Database::connect_with_retry(url, config).await?;
            info!(shard = index, "Shard connection pool created");
            shards.push(db);
        }

        Ok(Self { shards })
    }

    /// 由已有连接池构造，测试使用
    pub fn from_pools(pools: Vec<PgPool>) -> Self {
        Self {
            shards: pools.into_iter().map(|pool| Database { pool }).collect(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// 获取指定分片；越界说明路由与配置不一致
    pub fn shard(&self, index: usize) -> Result<&PgPool> {
        self.shards
            .get(index)
            .map(Database::pool)
            .ok_or_else(|| {
                CommerceError::Internal(format!(
                    "shard index {} out of range (shard_count={})",
                    index,
                    self.shards.len()
                ))
            })
    }

    /// 在每个分片上执行建表脚本，遇到瞬时错误时重试
    pub async fn bootstrap_schema(&self, schema: &str, policy: &RetryPolicy) -> Result<()> {
        for (index, db) in self.shards.iter().enumerate() {
            retry_with_policy(policy, "bootstrap_schema", CommerceError::is_retryable, || {
                db.bootstrap_schema(schema)
            })
            .await?;
            info!(shard = index, "Schema bootstrapped");
        }
        Ok(())
    }

    /// 所有分片健康时才算健康
    pub async fn health_check(&self) -> Result<()> {
        try_join_all(self.shards.iter().map(Database::health_check)).await?;
        Ok(())
    }

    pub async fn close(&self) {
        for db in &self.shards {
            db.close().await;
        }
        info!("All shard connection pools closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_empty_shard_list() {
        let config = DatabaseConfig {
            shard_urls: vec![],
            ..Default::default()
        };
        let result = ShardedDatabase::connect(&config).await;
        assert!(matches!(result, Err(CommerceError::Config(_))));
    }

    #[tokio::test]
    async fn test_shard_out_of_range() {
        let db = ShardedDatabase::from_pools(vec![]);
        assert_eq!(db.shard_count(), 0);
        assert!(matches!(db.shard(0), Err(CommerceError::Internal(_))));
    }

    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_sharded_connection() {
        let config = crate::test_utils::test_database_config();
        let db = ShardedDatabase::connect(&config).await.unwrap();
        db.health_check().await.unwrap();
        assert_eq!(db.shard_count(), config.shard_urls.len());
    }
}
