//! Per-client token-bucket rate limiting
//!
//! One global limiter keyed by client IP. Each bucket starts full, refills at
//! `rps` tokens per second up to `burst`, and each admitted request consumes
//! one token. A sweeper task drops buckets that have been idle longer than
//! `idle_timeout`; it takes the same lock as the request path.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use shared::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::security_log;
use crate::state::AppState;

struct Bucket {
    /// Always within `[0, burst]`
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

#[derive(Clone)]
pub struct RateLimiter {
    /// client key -> bucket
    inner: Arc<Mutex<HashMap<String, Bucket>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Returns `true` if the request is allowed, `false` if rate-limited.
    pub async fn check(&self, key: &str) -> bool {
        if !self.config.enabled {
            return true;
        }

        let burst = f64::from(self.config.burst);
        let now = Instant::now();
        let mut map = self.inner.lock().await;

        let bucket = map.entry(key.to_owned()).or_insert_with(|| Bucket {
            tokens: burst,
            last_refill: now,
            last_seen: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.rps).min(burst);
        bucket.last_refill = now;
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets not seen within `idle_timeout`; returns how many were removed
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let idle = self.config.idle_timeout;
        let mut map = self.inner.lock().await;
        let before = map.len();
        map.retain(|_, bucket| now.duration_since(bucket.last_seen) < idle);
        before - map.len()
    }

    /// Number of tracked clients
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Start the periodic sweep
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let limiter = self.clone();
        let period = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = limiter.sweep().await;
                if removed > 0 {
                    tracing::debug!(removed, "Swept idle rate limit buckets");
                }
            }
        })
    }
}

/// Extract client IP: peer address, or the first X-Forwarded-For entry when
/// the server sits behind a trusted proxy.
pub fn extract_client_key(request: &Request, trust_proxy: bool) -> String {
    if trust_proxy
        && let Some(forwarded) = request.headers().get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
    {
        // X-Forwarded-For can be comma-separated; first entry is the original client
        if let Some(first) = val.split(',').next() {
            let ip = first.trim();
            if !ip.is_empty() {
                return ip.to_owned();
            }
        }
    }

    request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Global rate limit middleware
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = extract_client_key(&request, state.limiter.config().trust_proxy);
    if !state.limiter.check(&key).await {
        security_log!(
            "WARN",
            "rate_limited",
            client = key.as_str(),
            path = request.uri().path()
        );
        return Err(AppError::too_many_requests());
    }
    Ok(next.run(request).await)
}
