//! 下游服务客户端
//!
//! 库存查询：`GET {inventory_url}/products/{id}/stock` -> `{"stock": n}`
//! 定价查询：`GET {pricing_url}/products/{id}/pricing` -> 单价信息
//!
//! 非 2xx 响应与传输失败一律视为下游不可用，这里不做重试。
//! 通过 trait 抽象，测试时注入 stub 实现。

use std::collections::HashMap;

use async_trait::async_trait;
use order_shared::observability::metrics::record_downstream_lookup;
use order_shared::observability::tracing::inject_to_headers;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{OrderError, Result};

pub const INVENTORY_SERVICE: &str = "inventory";
pub const PRICING_SERVICE: &str = "pricing";

/// 单件商品的定价（未乘数量）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitPrice {
    pub product_id: i64,
    pub markup: f64,
    pub discount: f64,
    /// 已包含加价与折扣的最终单价
    pub final_price: f64,
}

#[derive(Debug, Deserialize)]
struct StockResponse {
    stock: i64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryLookup: Send + Sync {
    /// 查询商品当前可用库存
    async fn available_stock(&self, product_id: i64) -> Result<i64>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PricingLookup: Send + Sync {
    async fn unit_price(&self, product_id: i64) -> Result<UnitPrice>;
}

/// 发起 GET 并解析 JSON，附带当前追踪上下文
async fn get_json<T: serde::de::DeserializeOwned>(
    client: &Client,
    service: &'static str,
    url: &str,
) -> Result<T> {
    let mut trace_headers = HashMap::new();
    inject_to_headers(&mut trace_headers);

    let mut request = client.get(url);
    for (name, value) in &trace_headers {
        request = request.header(name.as_str(), value.as_str());
    }

    let result = async {
        let response = request
            .send()
            .await
            .map_err(|e| OrderError::DownstreamUnavailable {
                service,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrderError::DownstreamUnavailable {
                service,
                message: format!("HTTP {}", status),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| OrderError::DownstreamUnavailable {
                service,
                message: format!("响应解析失败: {e}"),
            })
    }
    .await;

    record_downstream_lookup(service, if result.is_ok() { "success" } else { "error" });
    result
}

/// 库存查询 HTTP 客户端
#[derive(Clone)]
pub struct HttpInventoryClient {
    client: Client,
    base_url: String,
}

impl HttpInventoryClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl InventoryLookup for HttpInventoryClient {
    #[instrument(skip(self))]
    async fn available_stock(&self, product_id: i64) -> Result<i64> {
        let url = format!("{}/products/{}/stock", self.base_url, product_id);
        let body: StockResponse = get_json(&self.client, INVENTORY_SERVICE, &url).await?;
        debug!(product_id, stock = body.stock, "库存查询完成");
        Ok(body.stock)
    }
}

/// 定价 HTTP 客户端
#[derive(Clone)]
pub struct HttpPricingClient {
    client: Client,
    base_url: String,
}

impl HttpPricingClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PricingLookup for HttpPricingClient {
    #[instrument(skip(self))]
    async fn unit_price(&self, product_id: i64) -> Result<UnitPrice> {
        let url = format!("{}/products/{}/pricing", self.base_url, product_id);
        let price: UnitPrice = get_json(&self.client, PRICING_SERVICE, &url).await?;

        if price.product_id != product_id {
            return Err(OrderError::DownstreamUnavailable {
                service: PRICING_SERVICE,
                message: format!(
                    "定价响应商品不匹配: 请求 {}, 返回 {}",
                    product_id, price.product_id
                ),
            });
        }
        Ok(price)
    }
}
