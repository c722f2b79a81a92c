//! 测试替身
//!
//! 基于 `DashMap` 的下游 stub 与记录型事件发布器，
//! 让编排流程在无外部依赖的情况下端到端运行。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use order_shared::events::{Lifecycle, OrderEvent};
use order_shared::idempotency::MemoryIdempotencyStore;
use order_shared::models::Order;

use crate::aggregator::DownstreamAggregator;
use crate::downstream::{INVENTORY_SERVICE, InventoryLookup, PRICING_SERVICE, PricingLookup, UnitPrice};
use crate::error::{OrderError, Result};
use crate::idempotency::IdempotencyGuard;
use crate::publisher::EventPublisher;
use crate::repository::MemoryOrderRepository;
use crate::service::OrderService;
use crate::sharding::ShardRouter;

/// 库存 stub：未登记的商品视为下游不可用
#[derive(Default)]
pub struct StubInventory {
    stock: DashMap<i64, i64>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    completed: AtomicUsize,
    in_flight: AtomicUsize,
}

/// 查询 future 被 drop 或完成时减少在途计数
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StubInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stock(self, product_id: i64, available: i64) -> Self {
        self.stock.insert(product_id, available);
        self
    }

    /// 每次查询前等待，用于截止时间测试
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 走完等待、真正返回结果的查询数
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// 已开始但尚未完成也未被 drop 的查询数
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InventoryLookup for StubInventory {
    async fn available_stock(&self, product_id: i64) -> Result<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.in_flight);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.stock
            .get(&product_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| OrderError::DownstreamUnavailable {
                service: INVENTORY_SERVICE,
                message: "HTTP 404".to_string(),
            })
    }
}

/// 定价 stub：按商品返回固定单价
#[derive(Default)]
pub struct StubPricing {
    prices: DashMap<i64, UnitPrice>,
}

impl StubPricing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(self, product_id: i64, markup: f64, discount: f64, final_price: f64) -> Self {
        self.prices.insert(
            product_id,
            UnitPrice {
                product_id,
                markup,
                discount,
                final_price,
            },
        );
        self
    }
}

#[async_trait]
impl PricingLookup for StubPricing {
    async fn unit_price(&self, product_id: i64) -> Result<UnitPrice> {
        self.prices
            .get(&product_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| OrderError::DownstreamUnavailable {
                service: PRICING_SERVICE,
                message: "HTTP 500".to_string(),
            })
    }
}

/// 已发布事件的记录
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub key: String,
    pub lifecycle: Lifecycle,
    pub order: Order,
}

/// 记录型发布器，可切换为失败模式模拟 broker 不可用
#[derive(Default)]
pub struct RecordingPublisher {
    events: std::sync::Mutex<Vec<PublishedEvent>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.key).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, order: &Order, lifecycle: Lifecycle) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(OrderError::Publish("broker unavailable".to_string()));
        }

        let event = OrderEvent::new(lifecycle, order.clone());
        let record = PublishedEvent {
            key: event.key(),
            lifecycle,
            order: event.order,
        };
        self.events
            .lock()
            .map_err(|e| OrderError::Internal(e.to_string()))?
            .push(record);
        Ok(())
    }
}

/// 组装好的进程内订单服务及其依赖
pub struct TestHarness {
    pub service: Arc<OrderService>,
    pub repo: Arc<MemoryOrderRepository>,
    pub publisher: Arc<RecordingPublisher>,
    pub inventory: Arc<StubInventory>,
    pub idempotency: Arc<MemoryIdempotencyStore>,
}

impl TestHarness {
    /// 3 个分片、5 秒请求截止时间
    pub fn new(inventory: StubInventory, pricing: StubPricing) -> Result<Self> {
        Self::with_timeout(inventory, pricing, Duration::from_secs(5))
    }

    pub fn with_timeout(
        inventory: StubInventory,
        pricing: StubPricing,
        request_timeout: Duration,
    ) -> Result<Self> {
        let router = ShardRouter::new(3)?;
        let repo = Arc::new(MemoryOrderRepository::new(router));
        let publisher = Arc::new(RecordingPublisher::new());
        let inventory = Arc::new(inventory);
        let idempotency = Arc::new(MemoryIdempotencyStore::new());

        let service = OrderService::new(
            IdempotencyGuard::new(idempotency.clone(), Duration::from_secs(86_400)),
            DownstreamAggregator::new(inventory.clone(), Arc::new(pricing), 8),
            repo.clone(),
            publisher.clone(),
            request_timeout,
        );

        Ok(Self {
            service: Arc::new(service),
            repo,
            publisher,
            inventory,
            idempotency,
        })
    }
}
