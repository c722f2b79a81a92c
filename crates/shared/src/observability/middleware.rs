//! HTTP 中间件
//!
//! 为每个请求建立追踪 span（以上游 traceparent 为父上下文）并记录请求指标。

use std::collections::HashMap;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, info_span};

use super::metrics;
use super::tracing::set_parent_from_headers;

/// HTTP 请求追踪与指标中间件
///
/// ```ignore
/// let app = Router::new()
///     .route("/orders", post(create_order))
///     .layer(axum::middleware::from_fn(http_tracing));
/// ```
pub async fn http_tracing(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    // 使用路由模板而非原始路径，避免指标标签基数随订单号膨胀
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let span = info_span!(
        "http_request",
        method = %method,
        path = %path,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let trace_headers: HashMap<String, String> = ["traceparent", "tracestate"]
        .iter()
        .filter_map(|name| {
            request
                .headers()
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect();
    if !trace_headers.is_empty() {
        set_parent_from_headers(&span, &trace_headers);
    }

    let start = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    let latency = start.elapsed();
    let status = response.status().as_u16();

    span.record("status", status);
    span.record("latency_ms", latency.as_millis() as i64);

    metrics::record_http_request(&method, &path, status, latency.as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::StatusCode, routing::get};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_http_tracing_passes_response_through() {
        let app = Router::new()
            .route("/orders/{order_id}", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(http_tracing));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/orders/1001")
                    .header(
                        "traceparent",
                        "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
