//! Token bucket rate limiter for GitHub requests
//!
//! Charts hosted on GitHub share one API budget, so every worker waits on
//! the same limiter before downloading from `github.com` or
//! `raw.githubusercontent.com`.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{RepoError, Result};

/// Limiter settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_hour")]
    pub requests_per_hour: u32,

    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_requests_per_hour() -> u32 {
    5000
}

fn default_burst() -> u32 {
    25
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_hour: default_requests_per_hour(),
            burst: default_burst(),
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Async token bucket shared by all workers
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = f64::from(config.burst.max(1));
        Self {
            capacity,
            refill_per_sec: f64::from(config.requests_per_hour.max(1)) / 3600.0,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take a token without waiting
    pub async fn try_acquire(&self) -> bool {
        self.acquire_or_delay().await.is_none()
    }

    /// Wait until a token is available
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        while let Some(delay) = self.acquire_or_delay().await {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RepoError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Ok(())
    }

    /// Consume a token, or return how long until one is available
    async fn acquire_or_delay(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut bucket = self.bucket.lock().await;
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.last_refill = now;
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64(
                (1.0 - bucket.tokens) / self.refill_per_sec,
            ))
        }
    }
}
