//! Fixed-window per-client rate limiting for the serving path.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use optipress_core::config::RateLimitConfig;

use crate::metrics::{normalize_path, RATE_LIMITED_TOTAL};
use crate::state::AppState;

/// Client windows are pruned once the map grows past this.
const PRUNE_THRESHOLD: usize = 1024;

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter, one window per client IP.
///
/// The first request from a client opens its window; requests past the
/// budget are rejected until the window expires.
///
/// Windows are keyed on client IP alone. The limiter is layered on the
/// media routes only, so all limited requests share one budget per client;
/// limiting another route family independently needs a route-qualified key.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Counts a request. Returns the seconds to wait when over budget.
    pub fn check(&self, ip: IpAddr) -> Result<(), u64> {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), u64> {
        let mut windows = match self.windows.lock() {
            Ok(windows) => windows,
            // A poisoned lock only loses counters; failing open is fine.
            Err(poisoned) => poisoned.into_inner(),
        };

        if windows.len() > PRUNE_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            let elapsed = now.duration_since(entry.started);
            let retry_after = self.window.saturating_sub(elapsed).as_secs().max(1);
            return Err(retry_after);
        }
        entry.count += 1;
        Ok(())
    }
}

/// Rate limiting middleware for the media serving routes.
///
/// Clients presenting the configured admin bearer token bypass the limit.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            if state.is_admin_token(token) {
                return next.run(request).await;
            }
        }
    }

    let ip = client_ip(&request);
    match state.rate_limiter().check(ip) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            RATE_LIMITED_TOTAL
                .with_label_values(&[&normalize_path(request.uri().path())])
                .inc();
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(serde_json::json!({ "error": "rate limit exceeded" })),
            )
                .into_response()
        }
    }
}

fn client_ip(request: &Request<Body>) -> IpAddr {
    request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .or_else(|| {
            request
                .extensions()
                .get::<SocketAddr>()
                .map(|addr| addr.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
