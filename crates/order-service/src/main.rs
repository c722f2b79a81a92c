//! 订单服务
//!
//! 提供订单创建、更新、取消的 REST API，订单按订单号分片存储，
//! 生命周期事件发布到 Kafka 由库存服务消费。

use std::sync::Arc;

use order_service::{
    ORDER_SCHEMA, OrderService,
    aggregator::DownstreamAggregator,
    downstream::{HttpInventoryClient, HttpPricingClient},
    idempotency::IdempotencyGuard,
    publisher::KafkaEventPublisher,
    repository::OrderRepository,
    routes,
    sharding::ShardRouter,
    state::AppState,
};
use order_shared::{
    cache::Cache,
    config::AppConfig,
    database::ShardedDatabase,
    idempotency::RedisIdempotencyStore,
    kafka::KafkaProducer,
    observability,
    retry::RetryPolicy,
};
use tokio::net::TcpListener;
use tracing::{error, info};

const SERVICE_NAME: &str = "order-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(SERVICE_NAME)?;
    let _guard = observability::init(&config.observability, SERVICE_NAME).await?;

    info!(
        shards = config.shard_count(),
        addr = %config.server_addr(),
        "Starting order-service"
    );

    // 分片连接与建表
    let db = ShardedDatabase::connect(&config.database).await?;
    db.bootstrap_schema(
        ORDER_SCHEMA,
        &RetryPolicy::startup(config.database.connect_retries),
    )
    .await?;
    let router = ShardRouter::new(db.shard_count())?;
    let repo = Arc::new(OrderRepository::new(db.clone(), router)?);

    let cache = Cache::new(&config.redis)?;
    cache.health_check().await?;
    let guard = IdempotencyGuard::new(
        Arc::new(RedisIdempotencyStore::new(cache)),
        config.orders.idempotency_ttl(),
    );

    let http = reqwest::Client::builder()
        .timeout(config.downstream.request_timeout())
        .build()?;
    let aggregator = DownstreamAggregator::new(
        Arc::new(HttpInventoryClient::new(
            http.clone(),
            &config.downstream.inventory_url,
        )),
        Arc::new(HttpPricingClient::new(http, &config.downstream.pricing_url)),
        config.downstream.max_concurrency,
    );

    let producer = KafkaProducer::new(&config.kafka)?;
    let publisher = Arc::new(KafkaEventPublisher::new(producer, &config.kafka));

    let service = OrderService::new(
        guard,
        aggregator,
        repo,
        publisher,
        config.orders.request_timeout(),
    );
    let app = routes::build_router(AppState::new(Arc::new(service)));

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// 等待 Ctrl+C 或 SIGTERM；信号处理器注册失败时只记录日志，不退出
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
