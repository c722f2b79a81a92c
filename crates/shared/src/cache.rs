//! Redis 缓存管理模块
//!
//! 提供 Redis 连接管理和常用缓存操作封装。缓存只作为读加速层，
//! 读取接口必须用 `Option` 明确区分"未命中"与"命中"。

use crate::config::RedisConfig;
use crate::error::{CommerceError, Result};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{info, instrument};

/// KEYS[1] 缓存键；ARGV[1] 新值，ARGV[2] 新版本号，ARGV[3] TTL 秒数（0 为不过期）
const SET_IF_NEWER_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
    local ok, decoded = pcall(cjson.decode, current)
    if ok and type(decoded) == 'table' and decoded['version'] ~= nil
        and tonumber(decoded['version']) >= tonumber(ARGV[2]) then
        return 0
    end
end
if tonumber(ARGV[3]) > 0 then
    redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[3])
else
    redis.call('SET', KEYS[1], ARGV[1])
end
return 1
"#;

/// Redis 缓存客户端
#[derive(Clone)]
pub struct Cache {
    client: Client,
}

impl Cache {
    /// 创建 Redis 客户端（懒连接，首次操作时才建立连接）
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        info!("Redis client created");
        Ok(Self { client })
    }

    async fn get_conn(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(CommerceError::from)
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(CommerceError::from)
    }

    /// 获取值
    ///
    /// `Ok(None)` 表示 key 不存在；值存在但无法反序列化时返回错误，
    /// 绝不把损坏的缓存当作未命中吞掉。
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.get_conn().await?;
        let value: Option<String> = conn.get(key).await?;

        match value {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    /// 设置值并指定 TTL
    #[instrument(skip(self, value))]
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let serialized = serde_json::to_string(value)?;

        let _: () = conn.set_ex(key, serialized, ttl.as_secs()).await?;
        Ok(())
    }

    /// 仅当缓存中没有更新的版本时写入，`ttl` 为 None 时不过期
    ///
    /// 比较与写入在 Redis 端由脚本一步完成，乱序到达的旧版本不会覆盖新版本。
    /// 已缓存值的 `version` 字段大于等于 `version` 时跳过写入并返回 false。
    #[instrument(skip(self, value))]
    pub async fn set_if_newer<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        version: i64,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let serialized = serde_json::to_string(value)?;

        let written: i64 = redis::Script::new(SET_IF_NEWER_SCRIPT)
            .key(key)
            .arg(serialized)
            .arg(version)
            .arg(ttl.map(|ttl| ttl.as_secs().max(1)).unwrap_or(0))
            .invoke_async(&mut conn)
            .await?;
        Ok(written == 1)
    }

    /// 取出并删除值（GETDEL），并发调用者中只有一个拿到值
    #[instrument(skip(self))]
    pub async fn take<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.get_conn().await?;
        let value: Option<String> = redis::cmd("GETDEL").arg(key).query_async(&mut conn).await?;

        match value {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    /// 原子性地仅在 key 不存在时设置值，并指定 TTL
    ///
    /// 基于 Redis SET NX EX 实现。返回 true 表示设置成功（key 不存在），
    /// false 表示 key 已存在，此时不发生任何写入。
    pub async fn set_nx<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let serialized = serde_json::to_string(value)?;

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(serialized)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }
}

/// 缓存键生成器
pub struct CacheKey;

impl CacheKey {
    /// 客户端幂等令牌，按逻辑命名空间而非分片划分
    pub fn idempotency(token: &str) -> String {
        format!("idempotent-key:{}", token)
    }

    /// 商品库存记录
    pub fn product(product_id: i64) -> String {
        format!("product:{}", product_id)
    }

    /// 消费端已处理的订单事件
    pub fn processed_event(event_key: &str) -> String {
        format!("order-event:processed:{}", event_key)
    }

    /// 订单实际预留成功的库存行
    pub fn reservation(order_id: i64) -> String {
        format!("order-reservation:{}", order_id)
    }
}
