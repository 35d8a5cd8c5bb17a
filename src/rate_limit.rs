//! Per-client request rate limiting.
//!
//! Sliding window: each client IP may issue at most `max_requests` within any `window`.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::{
    collections::{HashMap, VecDeque},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

use crate::{AppState, error::ApiError};

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    /// Seconds until the oldest request in the window expires.
    Limited { retry_after: u64 },
}

/// RateLimiter
///
/// Shared through `AppState`; clones point at the same request log.
#[derive(Clone)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: Arc<Mutex<HashMap<IpAddr, VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn check(&self, ip: IpAddr) -> RateLimitResult {
        self.check_at(ip, Instant::now()).await
    }

    async fn check_at(&self, ip: IpAddr, now: Instant) -> RateLimitResult {
        let mut clients = self.clients.lock().await;
        let log = clients.entry(ip).or_default();

        while log
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= self.window)
        {
            log.pop_front();
        }

        if log.len() >= self.max_requests {
            let retry_after = log
                .front()
                .map(|&oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)))
                .unwrap_or(self.window);
            // Round up so clients never retry too early.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            return RateLimitResult::Limited {
                retry_after: secs.max(1),
            };
        }

        log.push_back(now);
        RateLimitResult::Allowed
    }

    /// Drops clients whose whole log has aged out of the window.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let window = self.window;
        self.clients.lock().await.retain(|_, log| {
            log.back()
                .is_some_and(|&t| now.saturating_duration_since(t) < window)
        });
    }

    pub async fn tracked_clients(&self) -> usize {
        self.clients.lock().await.len()
    }
}

/// rate_limit_middleware
///
/// Applied to the whole router. The client is identified by the peer address when the
/// server runs with `ConnectInfo`; otherwise every request shares one bucket.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    match state.limiter.check(ip).await {
        RateLimitResult::Allowed => Ok(next.run(request).await),
        RateLimitResult::Limited { retry_after } => {
            tracing::warn!(client_ip = %ip, retry_after, "rate limit exceeded");
            Err(ApiError::RateLimited { retry_after })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[tokio::test]
    async fn allows_up_to_limit_then_blocks() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        for _ in 0..3 {
            assert_eq!(limiter.check_at(ip(1), now).await, RateLimitResult::Allowed);
        }
        assert!(matches!(
            limiter.check_at(ip(1), now).await,
            RateLimitResult::Limited { retry_after: 60 }
        ));
    }

    #[tokio::test]
    async fn clients_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert_eq!(limiter.check_at(ip(1), now).await, RateLimitResult::Allowed);
        assert_eq!(limiter.check_at(ip(2), now).await, RateLimitResult::Allowed);
        assert!(matches!(
            limiter.check_at(ip(1), now).await,
            RateLimitResult::Limited { .. }
        ));
        assert_eq!(limiter.tracked_clients().await, 2);
    }

    #[tokio::test]
    async fn window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();

        assert_eq!(limiter.check_at(ip(1), start).await, RateLimitResult::Allowed);
        let later = start + Duration::from_secs(4);
        assert_eq!(limiter.check_at(ip(1), later).await, RateLimitResult::Allowed);

        let blocked = limiter.check_at(ip(1), start + Duration::from_secs(6)).await;
        assert_eq!(blocked, RateLimitResult::Limited { retry_after: 4 });

        // The first request has aged out.
        let after = start + Duration::from_secs(10);
        assert_eq!(limiter.check_at(ip(1), after).await, RateLimitResult::Allowed);
    }
}
