//! 应用状态定义

use std::sync::Arc;

use crate::service::OrderService;

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
}

impl AppState {
    pub fn new(orders: Arc<OrderService>) -> Self {
        Self { orders }
    }
}
