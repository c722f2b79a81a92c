//! 测试数据生成器的集成测试

use std::collections::HashSet;

use order_shared::models::OrderStatus;
use order_shared::test_utils::{
    TestDataGenerator, test_database_config, test_order_id, test_redis_config,
};

#[test]
fn test_order_ids_unique_across_threads() {
    let handles: Vec<_> = (0..4)
        .map(|_| std::thread::spawn(|| (0..50).map(|_| test_order_id()).collect::<Vec<_>>()))
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(seen.insert(id), "duplicate order id {id}");
        }
    }
}

#[test]
fn test_submission_is_unpriced() {
    let order = TestDataGenerator::submission(7, &[(1, 2), (2, 1)], "key-1");

    assert_eq!(order.user_id, 7);
    assert_eq!(order.order_id, 0);
    assert_eq!(order.idempotency_key, "key-1");
    assert_eq!(order.line_items.len(), 2);
    assert_eq!(order.line_items[0].product_id, 1);
    assert_eq!(order.line_items[0].quantity, 2);
}

#[test]
fn test_persisted_order_sums_lines() {
    let order = TestDataGenerator::persisted_order(
        42,
        vec![
            TestDataGenerator::priced_item(1, 2, 40.0),
            TestDataGenerator::priced_item(2, 4, 30.0),
        ],
    );

    assert_eq!(order.total, 200.0);
    assert_eq!(order.status, OrderStatus::Created);
    assert_eq!(order.idempotency_key, "test-key-42");
}

#[test]
fn test_infrastructure_configs_have_defaults() {
    let db = test_database_config();
    assert!(!db.shard_urls.is_empty());
    assert!(db.max_connections >= db.min_connections);
    assert!(test_redis_config().url.starts_with("redis://"));
}
