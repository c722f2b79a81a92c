//! 库存对账流程集成测试
//!
//! 进程内库存仓储、库存缓存与去重存储，无需外部依赖。

use std::sync::Arc;
use std::time::Duration;

use inventory_service::InventoryError;
use inventory_service::StockLedger;
use inventory_service::reconciler::{InventoryReconciler, ReconcileOutcome};
use inventory_service::repository::MemoryStockRepository;
use inventory_service::reservation::{MemoryReservationStore, ReservedLine};
use inventory_service::stock_cache::{MemoryStockCache, StockCacheTrait};
use inventory_service::models::StockRecord;
use order_shared::events::{Lifecycle, OrderEvent};
use order_shared::idempotency::MemoryIdempotencyStore;
use order_shared::models::{LineItem, Order, OrderStatus};
use tokio_test::assert_ok;

struct Fixture {
    repo: Arc<MemoryStockRepository>,
    cache: Arc<MemoryStockCache>,
    reservations: Arc<MemoryReservationStore>,
    ledger: Arc<StockLedger>,
    reconciler: InventoryReconciler,
}

fn fixture(repo: MemoryStockRepository, max_cas_retries: u32) -> Fixture {
    let repo = Arc::new(repo);
    let cache = Arc::new(MemoryStockCache::new());
    let reservations = Arc::new(MemoryReservationStore::new());
    let ledger = Arc::new(StockLedger::new(repo.clone(), cache.clone(), max_cas_retries));
    let reconciler = InventoryReconciler::new(
        ledger.clone(),
        Arc::new(MemoryIdempotencyStore::new()),
        reservations.clone(),
        Duration::from_secs(86_400),
    );
    Fixture {
        repo,
        cache,
        reservations,
        ledger,
        reconciler,
    }
}

fn order(order_id: i64, items: &[(i64, i32)]) -> Order {
    Order {
        id: 1,
        user_id: 7,
        order_id,
        line_items: items
            .iter()
            .map(|&(product_id, quantity)| LineItem::new(product_id, quantity))
            .collect(),
        status: OrderStatus::Created,
        idempotency_key: format!("key-{order_id}"),
        ..Default::default()
    }
}

/// 与订单服务发布的消息格式一致
fn event(lifecycle: Lifecycle, order: &Order) -> (String, Vec<u8>) {
    let event = OrderEvent::new(lifecycle, order.clone());
    (event.key(), event.payload().unwrap().into_bytes())
}

async fn deliver(f: &Fixture, lifecycle: Lifecycle, order: &Order) -> ReconcileOutcome {
    let (key, payload) = event(lifecycle, order);
    f.reconciler.handle(Some(&key), &payload).await
}

#[tokio::test]
async fn test_reserve_then_release_restores_stock() {
    let f = fixture(MemoryStockRepository::new().with_stock(1, 10), 5);
    let order = order(1001, &[(1, 3)]);

    let outcome = deliver(&f, Lifecycle::Created, &order).await;
    assert_eq!(
        outcome,
        ReconcileOutcome::Applied {
            lifecycle: Lifecycle::Created,
            adjusted: 1,
            failed: vec![]
        }
    );
    assert_eq!(f.repo.available(1), Some(7));

    deliver(&f, Lifecycle::Cancelled, &order).await;
    assert_eq!(f.repo.available(1), Some(10));
}

#[tokio::test]
async fn test_repeated_cancel_releases_once() {
    let f = fixture(MemoryStockRepository::new().with_stock(1, 10), 5);
    let order = order(1002, &[(1, 3)]);

    deliver(&f, Lifecycle::Created, &order).await;
    deliver(&f, Lifecycle::Cancelled, &order).await;
    let second = deliver(&f, Lifecycle::Cancelled, &order).await;

    assert_eq!(second, ReconcileOutcome::Duplicate);
    assert_eq!(f.repo.available(1), Some(10));
}

#[tokio::test]
async fn test_redelivered_created_reserves_once() {
    let f = fixture(MemoryStockRepository::new().with_stock(1, 10), 5);
    let order = order(1003, &[(1, 4)]);

    deliver(&f, Lifecycle::Created, &order).await;
    assert_eq!(
        deliver(&f, Lifecycle::Created, &order).await,
        ReconcileOutcome::Duplicate
    );
    assert_eq!(f.repo.available(1), Some(6));
}

#[tokio::test]
async fn test_updated_and_unknown_events_ignored() {
    let f = fixture(MemoryStockRepository::new().with_stock(1, 10), 5);
    let order = order(1004, &[(1, 1)]);

    let outcome = deliver(&f, Lifecycle::Updated, &order).await;
    assert_eq!(
        outcome,
        ReconcileOutcome::Ignored {
            tag: "updated".to_string()
        }
    );

    let payload = serde_json::to_vec(&order).unwrap();
    let outcome = f
        .reconciler
        .handle(Some("order-shipped-1004"), &payload)
        .await;
    assert_eq!(
        outcome,
        ReconcileOutcome::Ignored {
            tag: "shipped".to_string()
        }
    );
    assert_eq!(f.repo.available(1), Some(10));
}

#[tokio::test]
async fn test_undecodable_event_dropped_without_marker() {
    let f = fixture(MemoryStockRepository::new().with_stock(1, 10), 5);

    let outcome = f
        .reconciler
        .handle(Some("order-created-1005"), b"{not json")
        .await;
    assert!(matches!(outcome, ReconcileOutcome::Undecodable(_)));

    assert!(matches!(
        f.reconciler.handle(None, b"{}").await,
        ReconcileOutcome::Undecodable(_)
    ));

    // 解析失败未占用去重标记，修复后的重投仍会生效
    let order = order(1005, &[(1, 2)]);
    assert!(matches!(
        deliver(&f, Lifecycle::Created, &order).await,
        ReconcileOutcome::Applied { .. }
    ));
    assert_eq!(f.repo.available(1), Some(8));
}

#[tokio::test]
async fn test_failed_line_does_not_block_others() {
    let f = fixture(
        MemoryStockRepository::new().with_stock(1, 10).with_stock(2, 1),
        5,
    );
    let order = order(1006, &[(1, 2), (2, 5), (3, 1)]);

    let outcome = deliver(&f, Lifecycle::Created, &order).await;

    let ReconcileOutcome::Applied {
        adjusted, failed, ..
    } = outcome
    else {
        panic!("expected applied outcome");
    };
    assert_eq!(adjusted, 1);
    assert_eq!(
        failed.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        vec![2, 3]
    );
    assert_eq!(f.repo.available(1), Some(8));
    assert_eq!(f.repo.available(2), Some(1));
}

#[tokio::test]
async fn test_cancel_releases_only_reserved_lines() {
    let f = fixture(
        MemoryStockRepository::new().with_stock(1, 10).with_stock(2, 2),
        5,
    );
    let order = order(1007, &[(1, 3), (2, 5)]);

    deliver(&f, Lifecycle::Created, &order).await;
    assert_eq!(f.repo.available(1), Some(7));
    assert_eq!(f.repo.available(2), Some(2));
    assert_eq!(
        f.reservations.get(1007).unwrap().lines,
        vec![ReservedLine {
            product_id: 1,
            quantity: 3
        }]
    );

    let outcome = deliver(&f, Lifecycle::Cancelled, &order).await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Applied {
            lifecycle: Lifecycle::Cancelled,
            adjusted: 1,
            failed: vec![]
        }
    );
    assert_eq!(f.repo.available(1), Some(10));
    assert_eq!(f.repo.available(2), Some(2));
    assert!(f.reservations.get(1007).is_none());
}

#[tokio::test]
async fn test_cancel_without_reservation_releases_nothing() {
    let f = fixture(MemoryStockRepository::new().with_stock(1, 10), 5);
    let order = order(1008, &[(1, 3)]);

    let outcome = deliver(&f, Lifecycle::Cancelled, &order).await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Applied {
            lifecycle: Lifecycle::Cancelled,
            adjusted: 0,
            failed: vec![]
        }
    );
    assert_eq!(f.repo.available(1), Some(10));
}

#[tokio::test]
async fn test_unrecorded_reservation_is_rolled_back() {
    let f = fixture(
        MemoryStockRepository::new().with_stock(1, 10).with_stock(2, 4),
        5,
    );
    f.reservations.set_failing(true);
    let order = order(1009, &[(1, 3), (2, 1)]);

    let outcome = deliver(&f, Lifecycle::Created, &order).await;

    assert!(matches!(outcome, ReconcileOutcome::Failed(_)));
    assert_eq!(f.repo.available(1), Some(10));
    assert_eq!(f.repo.available(2), Some(4));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reservations_never_oversell() {
    let f = fixture(MemoryStockRepository::new().with_stock(1, 10), 50);

    let tasks = (0..20).map(|_| {
        let ledger = f.ledger.clone();
        tokio::spawn(async move { ledger.reserve(1, 1).await })
    });
    let results = futures::future::join_all(tasks).await;

    let mut reserved = 0;
    let mut rejected = 0;
    for result in results {
        match result.unwrap() {
            Ok(_) => reserved += 1,
            Err(InventoryError::InsufficientStock { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(reserved, 10);
    assert_eq!(rejected, 10);
    assert_eq!(f.repo.available(1), Some(0));
}

#[tokio::test]
async fn test_stale_cache_does_not_reject_reservation() {
    let f = fixture(MemoryStockRepository::new().with_stock(1, 5), 5);
    f.cache
        .put(
            &StockRecord {
                product_id: 1,
                available_quantity: 0,
                version: 0,
            },
            None,
        )
        .await
        .unwrap();
    f.repo.overwrite(1, 5);

    let updated = f.ledger.reserve(1, 2).await.unwrap();

    assert_eq!(updated.available_quantity, 3);
    let (cached, ttl) = f.cache.entry(1).unwrap();
    assert_eq!(cached, updated);
    assert_eq!(ttl, None);
}

#[tokio::test]
async fn test_stale_cache_version_conflict_retried() {
    let f = fixture(MemoryStockRepository::new().with_stock(1, 10), 5);
    f.ledger.get_stock(1).await.unwrap();
    // 缓存仍是版本 0，数据库已被其他写入者推进
    f.repo.overwrite(1, 6);

    let updated = f.ledger.reserve(1, 1).await.unwrap();

    assert_eq!(updated.available_quantity, 5);
    assert_eq!(f.repo.conflicts(), 1);
}

#[tokio::test]
async fn test_cache_outage_falls_back_to_durable() {
    let f = fixture(MemoryStockRepository::new().with_stock(1, 4), 5);
    f.cache.set_failing(true);

    let updated = assert_ok!(f.ledger.reserve(1, 4).await);
    assert_eq!(updated.available_quantity, 0);
    assert_eq!(f.ledger.get_stock(1).await.unwrap().available_quantity, 0);
}

#[tokio::test]
async fn test_prewarm_uses_short_ttl_and_reports_failures() {
    let f = fixture(
        MemoryStockRepository::new()
            .with_stock(1, 4)
            .with_stock(2, 0)
            .with_stock(3, 9),
        5,
    );

    let report = f
        .ledger
        .prewarm(Duration::from_secs(60), 2)
        .await
        .unwrap();
    assert_eq!(report.loaded, 3);
    assert_eq!(report.cached, 3);
    assert!(report.failures.is_empty());

    let (record, ttl) = f.cache.entry(2).unwrap();
    assert_eq!(record.available_quantity, 0);
    assert!(ttl.is_some_and(|ttl| ttl <= Duration::from_secs(60)));

    // 写穿覆盖预热条目，改为不过期
    assert_ok!(f.ledger.release(2, 1).await);
    assert_eq!(f.cache.entry(2).unwrap().1, None);

    f.cache.set_failing(true);
    let report = f
        .ledger
        .prewarm(Duration::from_secs(60), 2)
        .await
        .unwrap();
    assert_eq!(report.cached, 0);
    assert_eq!(report.failures.len(), 3);
}

#[tokio::test]
async fn test_late_cache_write_does_not_resurrect_old_stock() {
    let f = fixture(MemoryStockRepository::new().with_stock(1, 10), 5);
    let first = f.ledger.reserve(1, 2).await.unwrap();
    let second = f.ledger.reserve(1, 3).await.unwrap();

    // 第一次写穿晚于第二次到达缓存
    f.cache.put(&first, None).await.unwrap();

    assert_eq!(f.cache.entry(1).unwrap().0, second);
    assert_eq!(f.ledger.get_stock(1).await.unwrap().available_quantity, 5);
}
