//! 下游聚合器
//!
//! 为订单中每个不同的商品发起一次库存检查和一次定价查询，在并发上限内执行。
//! 结果按商品 ID 回填到订单行，与完成顺序无关。任一查询失败（传输失败、
//! 非成功状态、库存不足）都会终止整批：剩余的查询 future 随 stream 一起被
//! drop，不会在放弃后继续运行。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use order_shared::models::LineItem;
use tracing::{debug, instrument, warn};

use crate::downstream::{InventoryLookup, PricingLookup, UnitPrice};
use crate::error::{OrderError, Result};

/// 单个下游查询任务
#[derive(Debug, Clone, Copy)]
enum Lookup {
    Stock { product_id: i64, requested: i64 },
    Price { product_id: i64 },
}

/// 查询结果，库存检查通过时不携带数据
enum LookupOutcome {
    StockAvailable,
    Priced(UnitPrice),
}

pub struct DownstreamAggregator {
    inventory: Arc<dyn InventoryLookup>,
    pricing: Arc<dyn PricingLookup>,
    max_concurrency: usize,
}

impl DownstreamAggregator {
    pub fn new(
        inventory: Arc<dyn InventoryLookup>,
        pricing: Arc<dyn PricingLookup>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            inventory,
            pricing,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// 检查库存并定价，返回与输入同序的已定价订单行
    #[instrument(skip(self, items), fields(line_items = items.len()))]
    pub async fn price_and_check(&self, items: &[LineItem]) -> Result<Vec<LineItem>> {
        let lookups: Vec<Lookup> = demand_by_product(items)
            .into_iter()
            .flat_map(|(product_id, requested)| {
                [
                    Lookup::Stock {
                        product_id,
                        requested,
                    },
                    Lookup::Price { product_id },
                ]
            })
            .collect();

        let outcomes = self.run_all(lookups).await?;

        let prices: HashMap<i64, UnitPrice> = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                LookupOutcome::Priced(price) => Some((price.product_id, price)),
                LookupOutcome::StockAvailable => None,
            })
            .collect();

        items
            .iter()
            .map(|item| {
                let price = prices.get(&item.product_id).ok_or_else(|| {
                    OrderError::Internal(format!("missing price for product {}", item.product_id))
                })?;
                let mut priced = item.clone();
                priced.apply_unit_price(price.markup, price.discount, price.final_price);
                Ok(priced)
            })
            .collect()
    }

    /// 仅检查库存（支付前复核），不查询定价
    #[instrument(skip(self, items), fields(line_items = items.len()))]
    pub async fn check_stock(&self, items: &[LineItem]) -> Result<()> {
        let lookups: Vec<Lookup> = demand_by_product(items)
            .into_iter()
            .map(|(product_id, requested)| Lookup::Stock {
                product_id,
                requested,
            })
            .collect();

        self.run_all(lookups).await.map(|_| ())
    }

    /// 在并发上限内执行全部查询，首个错误即返回
    async fn run_all(&self, lookups: Vec<Lookup>) -> Result<Vec<LookupOutcome>> {
        stream::iter(lookups)
            .map(|lookup| self.run(lookup))
            .buffer_unordered(self.max_concurrency)
            .try_collect()
            .await
    }

    async fn run(&self, lookup: Lookup) -> Result<LookupOutcome> {
        match lookup {
            Lookup::Stock {
                product_id,
                requested,
            } => {
                let available = self.inventory.available_stock(product_id).await?;
                if available < requested {
                    warn!(product_id, requested, available, "库存不足");
                    return Err(OrderError::InsufficientStock {
                        product_id,
                        requested,
                        available,
                    });
                }
                debug!(product_id, requested, available, "库存充足");
                Ok(LookupOutcome::StockAvailable)
            }
            Lookup::Price { product_id } => {
                let price = self.pricing.unit_price(product_id).await?;
                Ok(LookupOutcome::Priced(UnitPrice {
                    product_id,
                    ..price
                }))
            }
        }
    }
}

/// 按商品汇总需求数量，同一商品多行时合并检查
fn demand_by_product(items: &[LineItem]) -> BTreeMap<i64, i64> {
    let mut demand = BTreeMap::new();
    for item in items {
        *demand.entry(item.product_id).or_insert(0) += i64::from(item.quantity);
    }
    demand
}
