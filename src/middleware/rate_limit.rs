use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::cache::{AdmissionController, AdmissionOutcome};
use crate::error::AppError;

/// 识别客户端：优先 x-real-ip，其次 x-forwarded-for 的第一个地址，最后是连接地址
pub fn client_key(req: &Request<Body>) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    req.headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .filter(|ip| !ip.trim().is_empty())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip.as_deref())
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

/// 准入中间件，在任何业务逻辑之前执行
pub async fn rate_limit(
    State(limiter): State<Arc<AdmissionController>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_key(&req);

    match limiter.admit(&ip).await {
        AdmissionOutcome::Admitted { remaining } => {
            let mut response = next.run(req).await;
            response
                .headers_mut()
                .insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
        AdmissionOutcome::Rejected { retry_after, .. } => {
            tracing::info!(client = %ip, retry_after = ?retry_after, "request rejected by admission control");
            AppError::AdmissionRejected { retry_after }.into_response()
        }
        AdmissionOutcome::Degraded { allowed: true, .. } => next.run(req).await,
        AdmissionOutcome::Degraded { error, .. } => {
            AppError::StoreUnavailable(error.to_string()).into_response()
        }
    }
}
