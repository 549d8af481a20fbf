//! Fixed-window request limits per route and client address

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::AppState;

/// Entries beyond this trigger a sweep of expired windows
const SWEEP_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    buckets: Mutex<HashMap<(&'static str, String), Window>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Count one request; `Err` carries the time until the window resets
    ///
    /// A limit of 0 disables the check.
    pub fn check(&self, route: &'static str, client: &str, limit: u32) -> Result<(), Duration> {
        if limit == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        if buckets.len() > SWEEP_THRESHOLD {
            let window = self.window;
            buckets.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = buckets
            .entry((route, client.to_string()))
            .or_insert(Window {
                started: now,
                count: 0,
            });

        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= limit {
            return Err(self.window.saturating_sub(now.duration_since(entry.started)));
        }
        entry.count += 1;
        Ok(())
    }
}

fn client_addr(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn enforce(
    state: &AppState,
    route: &'static str,
    limit: u32,
    request: &Request,
) -> Option<Response> {
    let client = client_addr(request);
    let retry_after = state.limiter.check(route, &client, limit).err()?;

    // Round up so clients never retry too early
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    tracing::warn!(route, client = %client, retry_after = secs, "Rate limit exceeded");

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "error": "Rate limit exceeded", "retry_after": secs })),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    Some(response)
}

pub async fn limit_proxy(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let limit = state.config.settings.server.rate_limit_per_minute;
    match enforce(&state, "proxy", limit, &request) {
        Some(rejected) => rejected,
        None => next.run(request).await,
    }
}

pub async fn limit_run_tests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let limit = state.config.settings.server.run_tests_per_minute;
    match enforce(&state, "run-tests", limit, &request) {
        Some(rejected) => rejected,
        None => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_enforced_per_client_and_route() {
        let limiter = RateLimiter::default();
        assert!(limiter.check("proxy", "1.1.1.1", 2).is_ok());
        assert!(limiter.check("proxy", "1.1.1.1", 2).is_ok());
        let wait = limiter.check("proxy", "1.1.1.1", 2).unwrap_err();
        assert!(wait <= Duration::from_secs(60));

        assert!(limiter.check("proxy", "2.2.2.2", 2).is_ok());
        assert!(limiter.check("run-tests", "1.1.1.1", 2).is_ok());
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(Duration::from_millis(20));
        assert!(limiter.check("proxy", "c", 1).is_ok());
        assert!(limiter.check("proxy", "c", 1).is_err());
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check("proxy", "c", 1).is_ok());
    }

    #[test]
    fn test_zero_limit_is_unlimited() {
        let limiter = RateLimiter::default();
        for _ in 0..100 {
            assert!(limiter.check("proxy", "c", 0).is_ok());
        }
    }
}
