//! 订单事件发布
//!
//! 发布对编排器是同步的：broker 确认前不返回。发布失败时订单已经落库，
//! 编排器仍把本次操作视为失败（至少一次语义下的已知缺口）。

use async_trait::async_trait;
use order_shared::config::KafkaConfig;
use order_shared::events::{Lifecycle, OrderEvent};
use order_shared::kafka::KafkaProducer;
use order_shared::models::Order;
use order_shared::observability::metrics::record_event_published;
use tracing::{info, instrument, warn};

use crate::error::{OrderError, Result};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, order: &Order, lifecycle: Lifecycle) -> Result<()>;
}

/// Kafka 事件发布器，按订单号显式选择分区
pub struct KafkaEventPublisher {
    producer: KafkaProducer,
    topic: String,
    partitions: i32,
}

impl KafkaEventPublisher {
    pub fn new(producer: KafkaProducer, config: &KafkaConfig) -> Self {
        Self {
            producer,
            topic: config.order_topic.clone(),
            partitions: config.order_topic_partitions,
        }
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    #[instrument(skip(self, order), fields(order_id = order.order_id, lifecycle = %lifecycle))]
    async fn publish(&self, order: &Order, lifecycle: Lifecycle) -> Result<()> {
        let event = OrderEvent::new(lifecycle, order.clone());
        let key = event.key();
        let payload = event
            .payload()
            .map_err(|e| OrderError::Publish(format!("序列化失败: {e}")))?;

        match self
            .producer
            .send(
                &self.topic,
                event.partition(self.partitions),
                &key,
                payload.as_bytes(),
            )
            .await
        {
            Ok(receipt) => {
                record_event_published(lifecycle.as_str(), "success");
                info!(
                    key = %key,
                    partition = receipt.partition,
                    offset = receipt.offset,
                    "订单事件已发布"
                );
                Ok(())
            }
            Err(e) => {
                record_event_published(lifecycle.as_str(), "error");
                warn!(key = %key, error = %e, "订单事件发布失败");
                Err(OrderError::Publish(e.to_string()))
            }
        }
    }
}
