//! Runtime metrics
//!
//! `GET /debug/vars` exposes process gauges for operators. It is only served
//! to direct loopback connections; anything arriving through a proxy (an
//! `X-Forwarded-For` header is present) or from another host gets 403.

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use shared::error::{ApiResponse, AppError};
use std::net::SocketAddr;

use crate::db::PoolStats;
use crate::security_log;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub version: &'static str,
    /// Unix seconds
    pub timestamp: i64,
    pub runtime: RuntimeMetrics,
    /// Scheduled emails not yet finished
    pub background_tasks: usize,
    /// Clients currently holding a rate limit bucket
    pub rate_limited_clients: usize,
    /// Absent for the in-memory store
    pub database: Option<PoolStats>,
}

#[derive(Debug, Serialize)]
pub struct RuntimeMetrics {
    pub workers: usize,
    pub alive_tasks: usize,
}

/// Reject callers that are not on this host
pub async fn local_only(request: Request, next: Next) -> Result<Response, AppError> {
    let proxied = request.headers().contains_key("x-forwarded-for");
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    match peer {
        Some(addr) if addr.ip().is_loopback() && !proxied => Ok(next.run(request).await),
        _ => {
            let peer_ip = peer.map(|a| a.ip().to_string()).unwrap_or_default();
            security_log!(
                "WARN",
                "metrics_denied",
                peer = peer_ip.as_str(),
                proxied = proxied
            );
            Err(AppError::permission_denied())
        }
    }
}

/// GET /debug/vars
pub async fn debug_vars(State(state): State<AppState>) -> Json<ApiResponse<MetricsResponse>> {
    let runtime = tokio::runtime::Handle::current().metrics();

    Json(ApiResponse::success(MetricsResponse {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: state.store.now_millis() / 1000,
        runtime: RuntimeMetrics {
            workers: runtime.num_workers(),
            alive_tasks: runtime.num_alive_tasks(),
        },
        background_tasks: state.runner.len(),
        rate_limited_clients: state.limiter.len().await,
        database: state.store.pool_stats(),
    }))
}
