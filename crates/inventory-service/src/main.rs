//! 库存服务
//!
//! 启动时预热库存缓存，随后并行运行订单事件对账消费者与库存查询 HTTP 接口。

use std::sync::Arc;

use anyhow::Context;
use inventory_service::{
    INVENTORY_SCHEMA, StockLedger,
    reconciler::InventoryReconciler,
    repository::StockRepository,
    reservation::RedisReservationStore,
    routes,
    state::AppState,
    stock_cache::RedisStockCache,
};
use order_shared::{
    cache::Cache,
    config::AppConfig,
    database::Database,
    error::CommerceError,
    idempotency::RedisIdempotencyStore,
    kafka::KafkaConsumer,
    observability,
    retry::{RetryPolicy, retry_with_policy},
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "inventory-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(SERVICE_NAME)?;
    let _guard = observability::init(&config.observability, SERVICE_NAME).await?;

    info!("Starting inventory-service on {}", config.server_addr());

    let url = config
        .database
        .primary_url()
        .context("database.shard_urls 为空")?;
    let db = Database::connect_with_retry(url, &config.database).await?;
    retry_with_policy(
        &RetryPolicy::startup(config.database.connect_retries),
        "bootstrap_schema",
        CommerceError::is_retryable,
        || db.bootstrap_schema(INVENTORY_SCHEMA),
    )
    .await?;

    let cache = Cache::new(&config.redis)?;
    cache.health_check().await?;
    let ledger = Arc::new(StockLedger::new(
        Arc::new(StockRepository::new(db.pool().clone())),
        Arc::new(RedisStockCache::new(cache.clone())),
        config.inventory.max_cas_retries,
    ));

    // 预热失败不阻止启动，缓存未命中时会回落到数据库
    match ledger
        .prewarm(
            config.inventory.prewarm_ttl(),
            config.inventory.prewarm_concurrency,
        )
        .await
    {
        Ok(report) => info!(
            loaded = report.loaded,
            cached = report.cached,
            failed = report.failures.len(),
            "Stock cache prewarm finished"
        ),
        Err(e) => warn!(error = %e, "Stock cache prewarm skipped"),
    }

    let reconciler = Arc::new(InventoryReconciler::new(
        ledger.clone(),
        Arc::new(RedisIdempotencyStore::new(cache.clone())),
        Arc::new(RedisReservationStore::new(
            cache,
            config.inventory.reservation_ttl(),
        )),
        config.inventory.event_dedup_ttl(),
    ));
    let consumer = KafkaConsumer::new(&config.kafka)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_task = tokio::spawn(reconciler.run(
        consumer,
        config.kafka.order_topic.clone(),
        shutdown_rx,
    ));

    let app = routes::build_router(AppState::new(
        ledger,
        config.inventory.prewarm_ttl(),
        config.inventory.prewarm_concurrency,
    ));
    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    match consumer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Reconciler stopped with error"),
        Err(e) => error!(error = %e, "Reconciler task panicked"),
    }

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
