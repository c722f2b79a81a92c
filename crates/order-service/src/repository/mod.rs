//! 订单仓储层
//!
//! - `OrderRepository`: PostgreSQL 分片实现，按 `order_id` 路由到分片
//! - `MemoryOrderRepository`: 进程内实现，用于测试与本地联调
//!
//! 每个写操作在所属分片上以单个事务完成，订单行与订单行集合在提交时刻始终一致。

mod memory;
mod order_repo;
mod traits;

pub use memory::MemoryOrderRepository;
pub use order_repo::OrderRepository;
pub use traits::*;
