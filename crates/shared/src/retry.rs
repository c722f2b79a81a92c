//! 启动期重试
//!
//! 数据库分片在容器编排中往往晚于服务就绪，连接与建表需要指数退避重试。
//! 请求路径（下游查询、事务、事件发布）不使用本模块：单次失败即终止本次请求，
//! 重试策略属于客户端。

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::CommerceError;

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大重试次数（不含首次执行）
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 启动期策略：固定重试次数，退避上限 10 秒
    pub fn startup(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }

    /// 第 N 次重试前的等待时间：initial_delay * multiplier^attempt，不超过 max_delay
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(attempt as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// 带重试的异步执行器
///
/// 仅当 `is_retryable` 判定为瞬时错误时重试，其余错误直接返回。
pub async fn retry_with_policy<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&CommerceError) -> bool,
    mut operation: F,
) -> Result<T, CommerceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CommerceError>>,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation = operation_name, attempt, "操作在重试后成功");
                }
                return Ok(value);
            }
            Err(err) if !is_retryable(&err) => {
                warn!(operation = operation_name, error = %err, "操作失败且不可重试");
                return Err(err);
            }
            Err(err) if !policy.should_retry(attempt) => {
                warn!(
                    operation = operation_name,
                    attempt,
                    max_retries = policy.max_retries,
                    error = %err,
                    "已达最大重试次数，放弃"
                );
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "操作失败，退避后重试"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
