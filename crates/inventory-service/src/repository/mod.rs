//! 库存仓储层

mod memory;
mod stock_repo;
mod traits;

pub use memory::MemoryStockRepository;
pub use stock_repo::StockRepository;
pub use traits::*;
