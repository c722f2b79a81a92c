//! 订单编排服务
//!
//! ## 创建流程
//!
//! 1. 幂等守卫 -> 2. 分配订单号 -> 3. 下游聚合（库存 + 定价）
//!    -> 4. 汇总金额 -> 5. 写入分片 -> 6. 发布 created 事件
//!
//! 任一步失败即以该步骤的错误终止，已完成的步骤不做补偿：幂等标记不会回滚，
//! 同一令牌的失败请求不能被静默重试。
//!
//! ## 更新与取消
//!
//! - 更新：状态转为 paid 时复核库存（不重新定价），整单替换后发布 updated
//! - 取消：读取订单，置为 cancelled，整单替换后发布 cancelled；
//!   对已取消订单重复取消是无操作转换，但仍会再次发布 cancelled
//!
//! 每个请求有整体截止时间，每一步都在截止时间内执行，超时返回 `Timeout`，
//! 进行中的下游查询随 future 一起被取消。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use order_shared::events::Lifecycle;
use order_shared::models::{LineItem, Order, OrderStatus};
use order_shared::observability::metrics::record_order_operation;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::aggregator::DownstreamAggregator;
use crate::error::{OrderError, Result};
use crate::idempotency::IdempotencyGuard;
use crate::publisher::EventPublisher;
use crate::repository::OrderRepositoryTrait;

/// 订单号生成器
pub type OrderIdGenerator = Arc<dyn Fn() -> i64 + Send + Sync>;

/// 随机正整数订单号
pub fn random_order_id() -> i64 {
    rand::random_range(1..=i64::MAX)
}

pub struct OrderService {
    guard: IdempotencyGuard,
    aggregator: DownstreamAggregator,
    repo: Arc<dyn OrderRepositoryTrait>,
    publisher: Arc<dyn EventPublisher>,
    id_generator: OrderIdGenerator,
    request_timeout: Duration,
}

impl OrderService {
    pub fn new(
        guard: IdempotencyGuard,
        aggregator: DownstreamAggregator,
        repo: Arc<dyn OrderRepositoryTrait>,
        publisher: Arc<dyn EventPublisher>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            guard,
            aggregator,
            repo,
            publisher,
            id_generator: Arc::new(random_order_id),
            request_timeout,
        }
    }

    /// 替换订单号生成器，测试中用于得到确定的订单号
    pub fn with_id_generator(mut self, generator: OrderIdGenerator) -> Self {
        self.id_generator = generator;
        self
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.request_timeout
    }

    /// 创建订单
    #[instrument(skip(self, submission), fields(user_id = submission.user_id, order_id))]
    pub async fn create_order(&self, submission: Order) -> Result<Order> {
        observe("create", async {
            validate_line_items(&submission.line_items)?;
            let deadline = self.deadline();

            within(deadline, "idempotency", self.guard.admit(&submission.idempotency_key))
                .await?;

            let order_id = (self.id_generator)();
            tracing::Span::current().record("order_id", order_id);

            let line_items = within(
                deadline,
                "aggregate",
                self.aggregator.price_and_check(&submission.line_items),
            )
            .await?;

            let mut order = Order {
                id: 0,
                user_id: submission.user_id,
                order_id,
                line_items,
                status: OrderStatus::Created,
                idempotency_key: submission.idempotency_key,
                ..Default::default()
            };
            order.recompute_totals();

            order.id = within(deadline, "store", self.repo.create(&order)).await?;

            within(
                deadline,
                "publish",
                self.publisher.publish(&order, Lifecycle::Created),
            )
            .await?;

            info!(order_id, total = order.total, "订单已创建");
            Ok(order)
        })
        .await
    }

    /// 整单更新
    ///
    /// 所有者与幂等键以存储中的订单为准；订单行按提交内容整体替换，合计由订单行重新汇总。
    #[instrument(skip(self, update), fields(order_id = update.order_id, status = %update.status))]
    pub async fn update_order(&self, update: Order) -> Result<Order> {
        observe("update", async {
            validate_line_items(&update.line_items)?;
            let deadline = self.deadline();

            let current = self.load(deadline, update.order_id).await?;
            ensure_transition(current.status, update.status)?;

            if update.status == OrderStatus::Paid {
                within(
                    deadline,
                    "stock_recheck",
                    self.aggregator.check_stock(&update.line_items),
                )
                .await?;
            }

            let mut order = Order {
                id: current.id,
                user_id: current.user_id,
                order_id: current.order_id,
                line_items: update.line_items,
                status: update.status,
                idempotency_key: current.idempotency_key,
                ..Default::default()
            };
            order.recompute_totals();

            within(deadline, "store", self.repo.replace(&order)).await?;
            within(
                deadline,
                "publish",
                self.publisher.publish(&order, Lifecycle::Updated),
            )
            .await?;

            info!(status = %order.status, total = order.total, "订单已更新");
            Ok(order)
        })
        .await
    }

    /// 取消订单
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: i64) -> Result<Order> {
        observe("cancel", async {
            let deadline = self.deadline();

            let mut order = self.load(deadline, order_id).await?;
            if order.status == OrderStatus::Cancelled {
                info!("订单已是取消状态，重新发布取消事件");
            }
            order.status = OrderStatus::Cancelled;

            within(deadline, "store", self.repo.replace(&order)).await?;
            within(
                deadline,
                "publish",
                self.publisher.publish(&order, Lifecycle::Cancelled),
            )
            .await?;

            info!("订单已取消");
            Ok(order)
        })
        .await
    }

    /// 查询订单
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: i64) -> Result<Order> {
        self.load(self.deadline(), order_id).await
    }

    /// 仅更新状态，发布 updated 事件；取消必须走取消路径
    #[instrument(skip(self))]
    pub async fn set_status(&self, order_id: i64, status: OrderStatus) -> Result<Order> {
        observe("set_status", async {
            let deadline = self.deadline();

            let mut order = self.load(deadline, order_id).await?;
            ensure_transition(order.status, status)?;

            if status == OrderStatus::Paid {
                within(
                    deadline,
                    "stock_recheck",
                    self.aggregator.check_stock(&order.line_items),
                )
                .await?;
            }

            within(deadline, "store", self.repo.set_status(order_id, status)).await?;
            order.status = status;

            within(
                deadline,
                "publish",
                self.publisher.publish(&order, Lifecycle::Updated),
            )
            .await?;

            Ok(order)
        })
        .await
    }

    /// 管理性删除，不发布事件
    #[instrument(skip(self))]
    pub async fn delete_order(&self, order_id: i64) -> Result<()> {
        observe("delete", async {
            within(self.deadline(), "store", self.repo.delete(order_id)).await?;
            warn!("订单已删除");
            Ok(())
        })
        .await
    }

    async fn load(&self, deadline: Instant, order_id: i64) -> Result<Order> {
        within(deadline, "read", self.repo.get(order_id))
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }
}

/// 在截止时间内执行一步；超时后 future 被 drop
async fn within<T>(
    deadline: Instant,
    stage: &'static str,
    step: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout_at(deadline, step).await {
        Ok(result) => result,
        Err(_) => {
            warn!(stage, "超过请求截止时间");
            Err(OrderError::Timeout { stage })
        }
    }
}

/// 记录操作耗时与结果
async fn observe<T>(operation: &'static str, op: impl Future<Output = Result<T>>) -> Result<T> {
    let start = std::time::Instant::now();
    let result = op.await;
    let outcome = match &result {
        Ok(_) => "success",
        Err(e) => e.code(),
    };
    record_order_operation(operation, outcome, start.elapsed().as_secs_f64());
    result
}

/// 更新与状态变更路径不允许进入 cancelled
fn ensure_transition(from: OrderStatus, to: OrderStatus) -> Result<()> {
    if to == OrderStatus::Cancelled || !from.can_transition_to(to) {
        return Err(OrderError::InvalidStatusTransition { from, to });
    }
    Ok(())
}

fn validate_line_items(items: &[LineItem]) -> Result<()> {
    if items.is_empty() {
        return Err(OrderError::Validation("订单至少包含一个订单行".to_string()));
    }
    if let Some(item) = items.iter().find(|item| item.quantity <= 0) {
        return Err(OrderError::Validation(format!(
            "product_id={} 的数量必须大于 0",
            item.product_id
        )));
    }
    Ok(())
}
