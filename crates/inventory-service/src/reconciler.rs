//! 库存对账消费者
//!
//! 消费订单事件：created 按订单行扣减库存并记录实际扣减成功的行，
//! cancelled 只归还记录中的行，其他生命周期记录后丢弃。应用前以事件 key
//! 做 SET NX 去重，同一个 key 的重复投递只生效一次。
//!
//! 任何失败（无法解析、去重存储故障、单行调整失败）都记录日志后丢弃，不重试。

use std::sync::Arc;
use std::time::Duration;

use order_shared::cache::CacheKey;
use order_shared::error::CommerceError;
use order_shared::events::{Lifecycle, ParsedEventKey};
use order_shared::idempotency::IdempotencyStore;
use order_shared::kafka::{ConsumerMessage, KafkaConsumer};
use order_shared::models::Order;
use order_shared::observability::metrics::record_reconciler_event;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::error::{InventoryError, Result};
use crate::ledger::StockLedger;
use crate::models::StockAdjustment;
use crate::reservation::{Reservation, ReservationStore, ReservedLine};

/// 单条事件的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// 已应用；`failed` 为调整失败的订单行
    Applied {
        lifecycle: Lifecycle,
        adjusted: usize,
        failed: Vec<(i64, String)>,
    },
    /// 同一 key 已处理过
    Duplicate,
    /// 不需要调整库存的生命周期或未知标签
    Ignored { tag: String },
    Undecodable(String),
    /// 去重或预留记录存储不可用，未应用
    Failed(String),
}

impl ReconcileOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Applied { failed, .. } if failed.is_empty() => "applied",
            Self::Applied { .. } => "partial",
            Self::Duplicate => "duplicate",
            Self::Ignored { .. } => "ignored",
            Self::Undecodable(_) => "undecodable",
            Self::Failed(_) => "failed",
        }
    }
}

/// 调整成功的行数与失败的订单行
type LineResults = (usize, Vec<(i64, String)>);

pub struct InventoryReconciler {
    ledger: Arc<StockLedger>,
    dedup: Arc<dyn IdempotencyStore>,
    reservations: Arc<dyn ReservationStore>,
    dedup_ttl: Duration,
}

impl InventoryReconciler {
    pub fn new(
        ledger: Arc<StockLedger>,
        dedup: Arc<dyn IdempotencyStore>,
        reservations: Arc<dyn ReservationStore>,
        dedup_ttl: Duration,
    ) -> Self {
        Self {
            ledger,
            dedup,
            reservations,
            dedup_ttl,
        }
    }

    /// 处理一条订单事件
    #[instrument(skip(self, payload), fields(key = key.unwrap_or("")))]
    pub async fn handle(&self, key: Option<&str>, payload: &[u8]) -> ReconcileOutcome {
        let outcome = self.reconcile(key, payload).await;

        let tag = key
            .and_then(ParsedEventKey::parse)
            .map(|parsed| parsed.tag)
            .unwrap_or_else(|| "unknown".to_string());
        record_reconciler_event(&tag, outcome.label());

        match &outcome {
            ReconcileOutcome::Applied { failed, .. } if !failed.is_empty() => {
                error!(?failed, "部分订单行库存调整失败，已丢弃")
            }
            ReconcileOutcome::Undecodable(reason) => warn!(reason = %reason, "订单事件无法解析，已丢弃"),
            ReconcileOutcome::Failed(reason) => error!(reason = %reason, "订单事件处理失败，已丢弃"),
            ReconcileOutcome::Ignored { tag } => info!(tag = %tag, "忽略的订单事件"),
            _ => {}
        }
        outcome
    }

    async fn reconcile(&self, key: Option<&str>, payload: &[u8]) -> ReconcileOutcome {
        let Some(key) = key else {
            return ReconcileOutcome::Undecodable("missing key".to_string());
        };
        let Some(parsed) = ParsedEventKey::parse(key) else {
            return ReconcileOutcome::Undecodable(format!("malformed key: {key}"));
        };

        let (lifecycle, direction) = match parsed.lifecycle {
            Some(Lifecycle::Created) => (Lifecycle::Created, StockAdjustment::Reserve),
            Some(Lifecycle::Cancelled) => (Lifecycle::Cancelled, StockAdjustment::Release),
            Some(Lifecycle::Updated) | None => {
                return ReconcileOutcome::Ignored { tag: parsed.tag };
            }
        };

        let order = match decode(payload) {
            Ok(order) => order,
            Err(e) => return ReconcileOutcome::Undecodable(e.to_string()),
        };

        match self
            .dedup
            .claim(&CacheKey::processed_event(key), self.dedup_ttl)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!("重复投递的订单事件，跳过");
                return ReconcileOutcome::Duplicate;
            }
            Err(e) => return ReconcileOutcome::Failed(e.to_string()),
        }

        let applied = match direction {
            StockAdjustment::Reserve => self.reserve_lines(&order).await,
            StockAdjustment::Release => self.release_reserved(order.order_id).await,
        };
        let (adjusted, failed) = match applied {
            Ok(lines) => lines,
            Err(reason) => return ReconcileOutcome::Failed(reason),
        };

        info!(
            order_id = order.order_id,
            lifecycle = %lifecycle,
            adjusted,
            "订单事件已应用"
        );
        ReconcileOutcome::Applied {
            lifecycle,
            adjusted,
            failed,
        }
    }

    /// 逐行扣减，并记录实际扣减成功的订单行
    ///
    /// 记录写入失败时归还本次已扣减的数量，整条事件按失败处理。
    async fn reserve_lines(&self, order: &Order) -> std::result::Result<LineResults, String> {
        let mut reserved = Vec::new();
        let mut failed = Vec::new();
        for item in &order.line_items {
            let quantity = i64::from(item.quantity);
            match self.ledger.reserve(item.product_id, quantity).await {
                Ok(_) => reserved.push(ReservedLine {
                    product_id: item.product_id,
                    quantity,
                }),
                Err(e) => failed.push((item.product_id, e.to_string())),
            }
        }

        if reserved.is_empty() {
            return Ok((0, failed));
        }

        let reservation = Reservation {
            order_id: order.order_id,
            lines: reserved,
        };
        if let Err(e) = self.reservations.record(&reservation).await {
            error!(error = %e, "预留记录写入失败，归还已扣减库存");
            self.release_lines(&reservation.lines).await;
            return Err(format!("record reservation: {e}"));
        }
        Ok((reservation.lines.len(), failed))
    }

    /// 只归还该订单实际预留过的数量
    async fn release_reserved(&self, order_id: i64) -> std::result::Result<LineResults, String> {
        let reservation = self
            .reservations
            .take(order_id)
            .await
            .map_err(|e| format!("take reservation: {e}"))?;

        let Some(reservation) = reservation else {
            info!(order_id, "订单没有预留记录，无需归还");
            return Ok((0, Vec::new()));
        };
        let failed = self.release_lines(&reservation.lines).await;
        Ok((reservation.lines.len() - failed.len(), failed))
    }

    async fn release_lines(&self, lines: &[ReservedLine]) -> Vec<(i64, String)> {
        let mut failed = Vec::new();
        for line in lines {
            if let Err(e) = self.ledger.release(line.product_id, line.quantity).await {
                failed.push((line.product_id, e.to_string()));
            }
        }
        failed
    }

    /// 订阅订单事件 topic 并串行处理，直到收到关闭信号
    pub async fn run(
        self: Arc<Self>,
        consumer: KafkaConsumer,
        topic: String,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        consumer.subscribe(&[topic.as_str()])?;

        consumer
            .start(shutdown, move |message: ConsumerMessage| {
                let reconciler = Arc::clone(&self);
                async move {
                    reconciler
                        .handle(message.key.as_deref(), &message.payload)
                        .await;
                    Ok::<(), CommerceError>(())
                }
            })
            .await;

        info!("库存对账消费者已退出");
        Ok(())
    }
}

fn decode(payload: &[u8]) -> Result<Order> {
    serde_json::from_slice(payload).map_err(|e| InventoryError::UndecodableEvent(e.to_string()))
}
