//! 库存服务
//!
//! 消费订单事件维护商品库存：订单创建时扣减，订单取消时归还。
//! 持久化存储是唯一事实来源，Redis 缓存只做读加速，
//! 写入基于版本号的乐观锁，冲突时重读重试。
//!
//! ## 模块结构
//!
//! - `repository`: 库存持久化（PostgreSQL / 进程内）
//! - `stock_cache`: 库存缓存（Redis / 进程内）
//! - `ledger`: 库存账本（预留、释放、查询、缓存预热）
//! - `reservation`: 订单实际预留的库存行
//! - `reconciler`: 订单事件消费与去重
//! - `handlers` / `routes` / `state`: 库存查询接口

pub mod error;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod reconciler;
pub mod repository;
pub mod reservation;
pub mod routes;
pub mod state;
pub mod stock_cache;

pub use error::{InventoryError, Result};
pub use ledger::StockLedger;

/// 商品库建表脚本
pub const INVENTORY_SCHEMA: &str = include_str!("../migrations/001_products.sql");
