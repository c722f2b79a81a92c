//! 应用状态定义

use std::sync::Arc;
use std::time::Duration;

use crate::ledger::StockLedger;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<StockLedger>,
    pub prewarm_ttl: Duration,
    pub prewarm_concurrency: usize,
}

impl AppState {
    pub fn new(ledger: Arc<StockLedger>, prewarm_ttl: Duration, prewarm_concurrency: usize) -> Self {
        Self {
            ledger,
            prewarm_ttl,
            prewarm_concurrency,
        }
    }
}
