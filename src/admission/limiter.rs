//! Per-key token bucket rate limiting
//!
//! Every API key owns an independent bucket holding up to
//! `requests_per_minute` tokens. Tokens trickle back continuously at
//! `requests_per_minute` per 60 seconds, never above capacity. There is no
//! waiting queue: an empty bucket rejects immediately.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::plans::PlanLimit;

/// Length of one full replenishment period
pub const REPLENISH_PERIOD: Duration = Duration::from_secs(60);

/// Token bucket state for one key
#[derive(Debug)]
struct TokenBucket {
    capacity: u32,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, now: Instant) -> Self {
        Self {
            capacity,
            tokens: f64::from(capacity),
            last_refill: now,
        }
    }

    /// Tokens per second
    fn refill_rate(&self) -> f64 {
        f64::from(self.capacity) / REPLENISH_PERIOD.as_secs_f64()
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate()).min(f64::from(self.capacity));
        self.last_refill = now;
    }

    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(self.time_until_token())
        }
    }

    fn time_until_token(&self) -> Duration {
        if self.capacity == 0 {
            // Never refills; advertise a full period
            return REPLENISH_PERIOD;
        }
        let missing = (1.0 - self.tokens).max(0.0);
        REPLENISH_PERIOD.mul_f64(missing / f64::from(self.capacity))
    }
}

/// Lazily populated set of per-key token buckets.
///
/// The map's shard lock is only held long enough to find a key's bucket;
/// refill and deduction happen under that key's own mutex, so unrelated
/// keys never wait on each other.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    buckets: DashMap<String, Mutex<TokenBucket>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take one token from `api_key`'s bucket.
    ///
    /// Returns `Err(retry_after)` with the time until the next token when
    /// the bucket is empty.
    pub fn check(&self, api_key: &str, limit: &PlanLimit) -> Result<(), Duration> {
        let capacity = limit.requests_per_minute;
        let now = Instant::now();

        if let Some(bucket) = self.buckets.get(api_key) {
            let mut bucket = bucket.lock();
            if bucket.capacity == capacity {
                return Self::take(&mut bucket, now);
            }
        }

        let entry = self
            .buckets
            .entry(api_key.to_owned())
            .or_insert_with(|| Mutex::new(TokenBucket::new(capacity, now)));
        let mut bucket = entry.lock();

        // Capacity changed since the bucket was made: start over full
        if bucket.capacity != capacity {
            *bucket = TokenBucket::new(capacity, now);
        }

        Self::take(&mut bucket, now)
    }

    /// `true` if a token was available and consumed
    #[allow(dead_code)]
    pub fn try_admit(&self, api_key: &str, limit: &PlanLimit) -> bool {
        self.check(api_key, limit).is_ok()
    }

    /// Number of keys with a live bucket
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    fn take(bucket: &mut TokenBucket, now: Instant) -> Result<(), Duration> {
        bucket.try_take(now).map_err(|wait| {
            debug!(
                capacity = bucket.capacity,
                retry_after_ms = wait.as_millis() as u64,
                "Token bucket empty"
            );
            wait
        })
    }
}
