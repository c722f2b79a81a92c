//! 订单事件模型
//!
//! 订单服务发布、库存服务消费的事件线上格式：
//! - key: `order-<lifecycle>-<order_id>`
//! - value: 完整订单 JSON
//!
//! 分区由 `order_id` 决定而不是 key 的哈希，保证同一订单的所有生命周期事件
//! 落在同一分区，消费者按发布顺序观察到它们。

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Order;

const KEY_PREFIX: &str = "order-";

/// 生命周期标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Created,
    Updated,
    Cancelled,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Cancelled => "cancelled",
        }
    }

    /// 未知标签返回 None，由消费端记录后丢弃
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 待发布的订单事件
#[derive(Debug, Clone)]
pub struct OrderEvent {
    pub lifecycle: Lifecycle,
    pub order: Order,
}

impl OrderEvent {
    pub fn new(lifecycle: Lifecycle, order: Order) -> Self {
        Self { lifecycle, order }
    }

    /// 消息 key
    pub fn key(&self) -> String {
        format!("{}{}-{}", KEY_PREFIX, self.lifecycle, self.order.order_id)
    }

    /// 目标分区：`order_id mod partitions`，partitions 必须为正
    pub fn partition(&self, partitions: i32) -> i32 {
        self.order.order_id.rem_euclid(i64::from(partitions.max(1))) as i32
    }

    pub fn payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.order)
    }
}

/// 从消息 key 解析出的生命周期与订单号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEventKey {
    /// 原始标签文本，未知标签也保留以便记录
    pub tag: String,
    pub lifecycle: Option<Lifecycle>,
    pub order_id: Option<i64>,
}

impl ParsedEventKey {
    /// 解析 `order-<lifecycle>-<order_id>`；格式不符返回 None
    pub fn parse(key: &str) -> Option<Self> {
        let rest = key.strip_prefix(KEY_PREFIX)?;
        let (tag, id) = rest.rsplit_once('-')?;
        if tag.is_empty() {
            return None;
        }

        Some(Self {
            tag: tag.to_string(),
            lifecycle: Lifecycle::parse(tag),
            order_id: id.parse().ok(),
        })
    }
}
