use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::AppState;

/// How many hits a key may make within a rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub max_hits: u32,
    pub window: Duration,
}

/// Endpoints that send email (codes, magic links).
pub const CHALLENGE_LIMIT: Limit = Limit {
    max_hits: 5,
    window: Duration::from_secs(60),
};

/// Endpoints that check a secret (code verify, magic-link consume).
pub const VERIFY_LIMIT: Limit = Limit {
    max_hits: 10,
    window: Duration::from_secs(60),
};

/// Sliding-window hit log per key, single instance only.
#[derive(Clone, Default)]
pub struct RateLimitState {
    hits: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hit at `now`. Ok(hits left) or Err(time until the oldest
    /// hit leaves the window).
    pub async fn hit(&self, key: &str, limit: Limit, now: Instant) -> Result<u32, Duration> {
        let mut hits = self.hits.lock().await;
        let log = hits.entry(key.to_string()).or_default();

        while log
            .front()
            .is_some_and(|&at| now.saturating_duration_since(at) >= limit.window)
        {
            log.pop_front();
        }

        if log.len() as u32 >= limit.max_hits {
            let oldest = log.front().copied().unwrap_or(now);
            return Err(limit.window.saturating_sub(now.saturating_duration_since(oldest)));
        }

        log.push_back(now);
        Ok(limit.max_hits - log.len() as u32)
    }

    /// Forget keys with no hit inside the longest window. Returns how many
    /// were dropped.
    pub async fn cleanup(&self) -> usize {
        let mut hits = self.hits.lock().await;
        let now = Instant::now();
        let horizon = CHALLENGE_LIMIT.window.max(VERIFY_LIMIT.window);
        let before = hits.len();
        hits.retain(|_, log| {
            log.back()
                .is_some_and(|&at| now.saturating_duration_since(at) < horizon)
        });
        before - hits.len()
    }
}

async fn enforce(
    state: &AppState,
    limit: Limit,
    addr: SocketAddr,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = addr.ip().to_string();
    let path = req.uri().path().to_string();
    let key = format!("{}:{}", ip, path);

    match state.rate_limiter.hit(&key, limit, Instant::now()).await {
        Ok(remaining) => {
            tracing::debug!(ip = %ip, path = %path, remaining, "Rate limit check passed");
            Ok(next.run(req).await)
        }
        Err(retry_after) => {
            tracing::warn!(
                ip = %ip,
                path = %path,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            Err(AppError::RateLimited)
        }
    }
}

pub async fn rate_limit_challenges(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    enforce(&state, CHALLENGE_LIMIT, addr, req, next).await
}

pub async fn rate_limit_verification(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    enforce(&state, VERIFY_LIMIT, addr, req, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_the_limit() {
        let limiter = RateLimitState::new();
        let now = Instant::now();
        for i in 0..CHALLENGE_LIMIT.max_hits {
            assert!(
                limiter.hit("ip:/api/auth/code", CHALLENGE_LIMIT, now).await.is_ok(),
                "request {} allowed",
                i + 1
            );
        }
        assert!(limiter.hit("ip:/api/auth/code", CHALLENGE_LIMIT, now).await.is_err());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = RateLimitState::new();
        let now = Instant::now();
        for _ in 0..CHALLENGE_LIMIT.max_hits {
            let _ = limiter.hit("ip:/api/auth/code", CHALLENGE_LIMIT, now).await;
        }
        assert!(limiter.hit("ip:/api/auth/magic-link", CHALLENGE_LIMIT, now).await.is_ok());
    }

    #[tokio::test]
    async fn remaining_counts_down() {
        let limiter = RateLimitState::new();
        let limit = Limit {
            max_hits: 3,
            window: Duration::from_secs(60),
        };
        let now = Instant::now();
        assert_eq!(limiter.hit("k", limit, now).await, Ok(2));
        assert_eq!(limiter.hit("k", limit, now).await, Ok(1));
        assert_eq!(limiter.hit("k", limit, now).await, Ok(0));
    }

    #[tokio::test]
    async fn old_hits_slide_out_of_the_window() {
        let limiter = RateLimitState::new();
        let limit = Limit {
            max_hits: 2,
            window: Duration::from_secs(60),
        };
        let start = Instant::now();
        limiter.hit("k", limit, start).await.unwrap();
        limiter.hit("k", limit, start + Duration::from_secs(30)).await.unwrap();

        let blocked = limiter.hit("k", limit, start + Duration::from_secs(45)).await;
        assert_eq!(blocked, Err(Duration::from_secs(15)));

        // The first hit has aged out; the second still counts.
        assert_eq!(limiter.hit("k", limit, start + Duration::from_secs(60)).await, Ok(0));
    }

    #[tokio::test]
    async fn cleanup_keeps_live_windows() {
        let limiter = RateLimitState::new();
        let _ = limiter.hit("fresh", CHALLENGE_LIMIT, Instant::now()).await;
        assert_eq!(limiter.cleanup().await, 0);
    }
}
