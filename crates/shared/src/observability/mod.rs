//! 统一可观测性模块
//!
//! 日志、分布式追踪与 Prometheus 指标的单一初始化入口。
//! subscriber 只在 `main` 中安装一次；各组件不持有 logger 对象，
//! 通过 `tracing` 宏与 `#[instrument]` 输出，上下文由 span 携带。

pub mod metrics;
pub mod middleware;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;

use crate::config::ObservabilityConfig;

/// 可观测性资源守卫
///
/// Drop 时关闭 tracer provider 并刷新待导出的 span。
pub struct ObservabilityGuard {
    _metrics_handle: Option<metrics::MetricsHandle>,
    _tracing_guard: Option<tracing::TracingGuard>,
}

impl ObservabilityGuard {
    /// 空守卫，测试或禁用可观测性时使用
    pub fn empty() -> Self {
        Self {
            _metrics_handle: None,
            _tracing_guard: None,
        }
    }
}

/// 初始化日志、追踪，以及（启用时）指标端点
pub async fn init(config: &ObservabilityConfig, service_name: &str) -> Result<ObservabilityGuard> {
    let tracing_guard = tracing::init(config, service_name)?;

    let metrics_handle = if config.metrics_enabled {
        Some(metrics::init(config.metrics_port, service_name).await?)
    } else {
        None
    };

    info!(
        service = %service_name,
        metrics_enabled = config.metrics_enabled,
        metrics_port = config.metrics_port,
        otlp_endpoint = ?config.otlp_endpoint,
        "Observability initialized"
    );

    Ok(ObservabilityGuard {
        _metrics_handle: metrics_handle,
        _tracing_guard: Some(tracing_guard),
    })
}
