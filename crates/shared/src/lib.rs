//! 共享库
//!
//! 订单服务与库存服务共用的配置、错误处理、分片数据库连接、缓存、Kafka、
//! 订单领域模型与订单事件模型等基础设施代码。

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod idempotency;
pub mod kafka;
pub mod models;
pub mod observability;
pub mod retry;
pub mod test_utils;
