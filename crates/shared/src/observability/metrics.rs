//! Prometheus 指标
//!
//! 基于 metrics crate 记录，metrics-exporter-prometheus 通过独立端口导出 `/metrics`。
//! 未安装 recorder 时所有记录函数为空操作，测试中可直接调用。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// 指标服务器守卫，Drop 时停止服务
pub struct MetricsHandle {
    server: tokio::task::JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// 安装全局 recorder 并启动指标 HTTP 服务
pub async fn init(port: u16, service_name: &str) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_metrics();
    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server })
}

fn describe_metrics() {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "orders_total",
        "Order operations by operation and outcome"
    );
    metrics::describe_histogram!(
        "order_operation_duration_seconds",
        "Order operation duration in seconds"
    );
    metrics::describe_counter!(
        "downstream_lookups_total",
        "Inventory and pricing lookups by service and outcome"
    );
    metrics::describe_counter!(
        "order_events_published_total",
        "Order events published by lifecycle and outcome"
    );

    metrics::describe_counter!(
        "stock_adjustments_total",
        "Stock reservations and releases by outcome"
    );
    metrics::describe_counter!(
        "reconciler_events_total",
        "Order events consumed by the inventory reconciler"
    );
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    }))
}

#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status
    )
    .record(duration_secs);
}

/// 记录订单编排操作（create/update/cancel/set_status/delete）
#[inline]
pub fn record_order_operation(operation: &'static str, outcome: &'static str, duration_secs: f64) {
    metrics::counter!("orders_total", "operation" => operation, "outcome" => outcome).increment(1);
    metrics::histogram!("order_operation_duration_seconds", "operation" => operation)
        .record(duration_secs);
}

/// 记录一次下游查询（service: inventory/pricing）
#[inline]
pub fn record_downstream_lookup(service: &'static str, outcome: &'static str) {
    metrics::counter!(
        "downstream_lookups_total",
        "service" => service,
        "outcome" => outcome
    )
    .increment(1);
}

#[inline]
pub fn record_event_published(lifecycle: &'static str, outcome: &'static str) {
    metrics::counter!(
        "order_events_published_total",
        "lifecycle" => lifecycle,
        "outcome" => outcome
    )
    .increment(1);
}

/// 记录库存调整（direction: reserve/release）
#[inline]
pub fn record_stock_adjustment(direction: &'static str, outcome: &'static str) {
    metrics::counter!(
        "stock_adjustments_total",
        "direction" => direction,
        "outcome" => outcome
    )
    .increment(1);
}

#[inline]
pub fn record_reconciler_event(lifecycle: &str, outcome: &'static str) {
    metrics::counter!(
        "reconciler_events_total",
        "lifecycle" => lifecycle.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_without_recorder() {
        record_http_request("POST", "/orders", 201, 0.05);
        record_order_operation("create", "success", 0.2);
        record_downstream_lookup("pricing", "error");
        record_event_published("created", "success");
        record_stock_adjustment("reserve", "insufficient");
        record_reconciler_event("shipped", "ignored");
    }
}
