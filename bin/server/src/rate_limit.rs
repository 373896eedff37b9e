//! Per-IP fixed-window rate limiting.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;

/// Tracks request counts per client key within a fixed window.
#[derive(Debug)]
pub struct RateLimiter {
    /// key -> (requests in window, window start)
    windows: Mutex<HashMap<String, (u32, Instant)>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    #[must_use]
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Counts a request for `key`.
    ///
    /// Returns `Ok(remaining)` when allowed, or `Err(retry_after_secs)` once
    /// the window is exhausted.
    pub fn check(&self, key: &str) -> Result<u32, u64> {
        self.check_at(key, Instant::now())
    }

    pub(crate) fn check_at(&self, key: &str, now: Instant) -> Result<u32, u64> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = windows.entry(key.to_string()).or_insert((0, now));

        if now.duration_since(entry.1) >= self.window {
            *entry = (1, now);
            return Ok(self.max_requests.saturating_sub(1));
        }

        if entry.0 >= self.max_requests {
            let elapsed = now.duration_since(entry.1).as_secs();
            return Err(self.window.as_secs().saturating_sub(elapsed).max(1));
        }

        entry.0 += 1;
        Ok(self.max_requests.saturating_sub(entry.0))
    }

    /// Drops windows that have ended. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub(crate) fn sweep_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, (_, start)| now.duration_since(*start) < self.window);
        before - windows.len()
    }
}

/// Rejects requests past the limit with 429 and `Retry-After`.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);

    match limiter.check(&key) {
        Ok(remaining) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", HeaderValue::from(limiter.max_requests()));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
            response
        }
        Err(retry_after) => {
            tracing::warn!(client = %key, retry_after, "rate limit exceeded");
            let mut response = ApiError::RateLimited.into_response();
            let headers = response.headers_mut();
            headers.insert("Retry-After", HeaderValue::from(retry_after));
            headers.insert("X-RateLimit-Limit", HeaderValue::from(limiter.max_requests()));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u32));
            response
        }
    }
}

/// Keys requests by TCP peer address. Forwarding headers are not trusted.
fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "ip:unknown".to_string(), |info| format!("ip:{}", info.0.ip()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn allows_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        assert_eq!(limiter.check_at("ip:1.2.3.4", now), Ok(2));
        assert_eq!(limiter.check_at("ip:1.2.3.4", now), Ok(1));
        assert_eq!(limiter.check_at("ip:1.2.3.4", now), Ok(0));
        assert!(limiter.check_at("ip:1.2.3.4", now).is_err());
    }

    #[test]
    fn retry_after_counts_down_the_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();

        let _ = limiter.check_at("k", start);
        assert_eq!(limiter.check_at("k", start + Duration::from_secs(20)), Err(40));
        assert_eq!(limiter.check_at("k", start + Duration::from_millis(59_900)), Err(1));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("ip:10.0.0.1", now).is_ok());
        assert!(limiter.check_at("ip:10.0.0.1", now).is_err());
        assert!(limiter.check_at("ip:10.0.0.2", now).is_ok());
    }

    #[test]
    fn window_resets_after_it_ends() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.check_at("k", start).is_ok());
        assert!(limiter.check_at("k", start).is_err());
        assert_eq!(limiter.check_at("k", start + Duration::from_secs(60)), Ok(0));
    }

    #[test]
    fn sweep_drops_only_ended_windows() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let start = Instant::now();

        let _ = limiter.check_at("old", start);
        let _ = limiter.check_at("fresh", start + Duration::from_secs(30));

        assert_eq!(limiter.sweep_at(start + Duration::from_secs(61)), 1);
        assert_eq!(limiter.check_at("fresh", start + Duration::from_secs(61)), Ok(3));
    }

    #[test]
    fn client_key_uses_peer_address_not_headers() {
        let addr: SocketAddr = "192.168.1.100:12345".parse().expect("addr");
        let mut request = Request::builder()
            .header("X-Forwarded-For", "1.2.3.4")
            .body(Body::empty())
            .expect("request");
        assert_eq!(client_key(&request), "ip:unknown");

        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_key(&request), "ip:192.168.1.100");
    }
}
