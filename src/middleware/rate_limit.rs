//! Rate limiting middleware.
//!
//! In-memory sliding-window limiter per client IP. Two profiles are used:
//! a general API budget, and a much stricter budget for the auth routes so
//! repeated credential guessing is throttled server-side as well as in the
//! client's local lockout.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Configuration for one rate limit profile.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
    /// Message returned to throttled clients.
    pub message: &'static str,
}

impl RateLimitConfig {
    /// General API profile.
    pub fn general(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            message: "Too many requests from this IP, please try again later.",
        }
    }

    /// Strict profile for /api/auth routes.
    pub fn auth(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            message: "Too many authentication attempts, please try again later.",
        }
    }
}

/// Rate limiter state tracking requests per IP.
#[derive(Clone)]
pub struct RateLimitLayer {
    config: RateLimitConfig,
    state: Arc<Mutex<HashMap<IpAddr, WindowEntry>>>,
}

struct WindowEntry {
    count: u32,
    window_start: Instant,
}

enum Decision {
    Allowed,
    Throttled { retry_after: Duration },
}

impl RateLimitLayer {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn check(&self, ip: IpAddr) -> Decision {
        let mut state = self.state.lock();
        let now = Instant::now();

        let entry = state.entry(ip).or_insert(WindowEntry {
            count: 0,
            window_start: now,
        });

        // Reset window if expired
        if now.duration_since(entry.window_start) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;

        if entry.count > self.config.max_requests {
            let reset_at = entry.window_start + self.config.window;
            Decision::Throttled {
                retry_after: reset_at.duration_since(now),
            }
        } else {
            Decision::Allowed
        }
    }

    /// Periodic cleanup of stale entries (call from a background task).
    pub fn cleanup(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let window = self.config.window;

        state.retain(|_, entry| now.duration_since(entry.window_start) < window * 2);
    }
}

/// Rate limiting middleware function.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    axum::extract::State(limiter): axum::extract::State<RateLimitLayer>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = addr.ip();

    match limiter.check(ip) {
        Decision::Allowed => next.run(request).await,
        Decision::Throttled { retry_after } => {
            warn!(
                ip = %ip,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );

            let body = serde_json::json!({
                "error": "rate_limit_exceeded",
                "message": limiter.config.message,
                "retry_after_seconds": retry_after.as_secs(),
            });

            (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after.as_secs().to_string())],
                axum::Json(body),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_under_limit() {
        let limiter = RateLimitLayer::new(RateLimitConfig::general(
            10,
            Duration::from_secs(60),
        ));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..10 {
            assert!(matches!(limiter.check(ip), Decision::Allowed));
        }
    }

    #[test]
    fn test_throttles_over_limit() {
        let limiter = RateLimitLayer::new(RateLimitConfig::auth(5, Duration::from_secs(60)));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..5 {
            assert!(matches!(limiter.check(ip), Decision::Allowed));
        }
        assert!(matches!(limiter.check(ip), Decision::Throttled { .. }));
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimitLayer::new(RateLimitConfig::auth(1, Duration::from_millis(10)));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        assert!(matches!(limiter.check(ip), Decision::Allowed));
        assert!(matches!(limiter.check(ip), Decision::Throttled { .. }));

        std::thread::sleep(Duration::from_millis(15));
        assert!(matches!(limiter.check(ip), Decision::Allowed));
    }

    #[test]
    fn test_ips_tracked_independently() {
        let limiter = RateLimitLayer::new(RateLimitConfig::auth(1, Duration::from_secs(60)));
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(matches!(limiter.check(a), Decision::Allowed));
        assert!(matches!(limiter.check(a), Decision::Throttled { .. }));
        assert!(matches!(limiter.check(b), Decision::Allowed));
    }
}
