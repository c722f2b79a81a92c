//! 订单编排服务
//!
//! 接收订单请求，经幂等守卫、下游库存与定价聚合后写入对应分片，
//! 并向订单事件 topic 发布生命周期事件，由库存服务异步完成预留或释放。
//!
//! ## 模块结构
//!
//! - `idempotency`: 幂等守卫（客户端令牌 → 24h 标记）
//! - `sharding`: 订单号到分片的路由
//! - `downstream`: 库存查询与定价服务客户端
//! - `aggregator`: 并发查询库存与定价并合并结果
//! - `repository`: 分片订单存储
//! - `publisher`: 订单事件发布
//! - `service`: 订单编排（create/update/cancel）
//! - `handlers` / `routes` / `state`: HTTP 接入层

pub mod aggregator;
pub mod downstream;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod idempotency;
pub mod publisher;
pub mod repository;
pub mod routes;
pub mod service;
pub mod sharding;
pub mod state;
pub mod test_utils;

pub use error::{OrderError, Result};
pub use service::OrderService;

/// 订单库建表脚本，启动时在每个分片上执行
pub const ORDER_SCHEMA: &str = include_str!("../migrations/001_orders.sql");
