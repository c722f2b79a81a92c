//! Kafka 基础设施封装
//!
//! 订单事件的生产与消费。生产端显式指定分区，消费端以 `watch` channel
//! 控制关闭，单条消息处理失败只记录日志，不中断消费循环。

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::CommerceError;

/// 单条消息投递的最长等待时间
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// 消费到的消息，拥有所有权以便跨 await 传递
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

impl ConsumerMessage {
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key: msg
                .key()
                .and_then(|k| std::str::from_utf8(k).ok())
                .map(String::from),
            payload: msg.payload().map(|p| p.to_vec()).unwrap_or_default(),
        }
    }
}

/// 投递回执
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub partition: i32,
    pub offset: i64,
}

/// Kafka 生产者，`FutureProducer` 内部为 Arc，可廉价 Clone
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self, CommerceError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .create()
            .map_err(|e| CommerceError::Kafka(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "Kafka 生产者已初始化");
        Ok(Self { producer })
    }

    /// 发送原始字节到指定分区，等待 broker 确认
    pub async fn send(
        &self,
        topic: &str,
        partition: i32,
        key: &str,
        payload: &[u8],
    ) -> Result<DeliveryReceipt, CommerceError> {
        let record = FutureRecord::to(topic)
            .partition(partition)
            .key(key)
            .payload(payload);

        let delivery = self
            .producer
            .send(record, DELIVERY_TIMEOUT)
            .await
            .map_err(|(e, _)| CommerceError::Kafka(format!("发送消息失败: {e}")))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok(DeliveryReceipt {
            partition: delivery.partition,
            offset: delivery.offset,
        })
    }
}

/// Kafka 消费者
pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    /// 创建消费者，同一服务的所有实例共享 `consumer_group`
    pub fn new(config: &KafkaConfig) -> Result<Self, CommerceError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .create()
            .map_err(|e| CommerceError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(
            brokers = %config.brokers,
            group_id = %config.consumer_group,
            "Kafka 消费者已初始化"
        );
        Ok(Self { consumer })
    }

    pub fn subscribe(&self, topics: &[&str]) -> Result<(), CommerceError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| CommerceError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅 Kafka topics");
        Ok(())
    }

    /// 启动消费循环，直到关闭信号变为 `true` 或消息流结束
    ///
    /// 消息逐条串行处理，保证同一分区内的事件按发布顺序生效。
    pub async fn start<F, Fut>(self, mut shutdown: watch::Receiver<bool>, handler: F)
    where
        F: Fn(ConsumerMessage) -> Fut,
        Fut: std::future::Future<Output = Result<(), CommerceError>>,
    {
        use futures::StreamExt;

        let stream = self.consumer.stream();
        futures::pin_mut!(stream);

        info!("Kafka 消费循环已启动");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("收到关闭信号，Kafka 消费循环退出");
                        break;
                    }
                }

                msg_result = stream.next() => {
                    let Some(msg_result) = msg_result else {
                        warn!("Kafka 消息流意外结束");
                        break;
                    };

                    match msg_result {
                        Ok(borrowed) => {
                            let msg = ConsumerMessage::from_borrowed(&borrowed);
                            debug!(
                                topic = %msg.topic,
                                partition = msg.partition,
                                offset = msg.offset,
                                "收到 Kafka 消息"
                            );

                            if let Err(e) = handler(msg).await {
                                error!(error = %e, "处理 Kafka 消息失败，消息已丢弃");
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "接收 Kafka 消息出错");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_creation_is_lazy() {
        // librdkafka 创建客户端时不连接 broker
        let config = KafkaConfig {
            brokers: "127.0.0.1:1".to_string(),
            ..Default::default()
        };
        assert!(KafkaProducer::new(&config).is_ok());
    }

    #[test]
    fn test_consumer_requires_valid_offset_reset() {
        let config = KafkaConfig {
            auto_offset_reset: "sideways".to_string(),
            ..Default::default()
        };
        assert!(KafkaConsumer::new(&config).is_err());
    }
}
