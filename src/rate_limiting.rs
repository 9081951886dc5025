//! # Outbound Rate Limiter
//!
//! One rate limiter instance guards each outbound Integration Service. It
//! combines a token bucket (burst tolerance) with a sliding window counter
//! (precise per-window ceiling); a call is admitted only when both permit
//! it. An adaptive layer widens or narrows the sliding window based on the
//! observed error rate, and tracks either an explicit `retry_after` hint or
//! an exponential backoff when the service itself signals rate limiting.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Configuration for one service's rate limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests permitted per sliding window.
    pub requests_per_window: u32,
    /// Window width in seconds.
    pub window_seconds: u64,
    /// Token bucket burst capacity.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_seconds: 60,
            burst_size: 10,
        }
    }
}

/// Token bucket: permits short bursts up to `capacity`, refilled at
/// `requests_per_window / window_seconds` tokens/s.
#[derive(Debug)]
struct TokenBucket {
    tokens: AtomicI64,
    capacity: i64,
    refill_rate: f64,
    last_refill: Mutex<Instant>,
}

impl TokenBucket {
    fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            tokens: AtomicI64::new(capacity as i64),
            capacity: capacity as i64,
            refill_rate,
            last_refill: Mutex::new(Instant::now()),
        }
    }

    fn refill(&self) {
        let mut last_refill = self.last_refill.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(*last_refill);
        let to_add = (elapsed.as_secs_f64() * self.refill_rate) as i64;
        if to_add > 0 {
            let current = self.tokens.load(Ordering::Relaxed);
            let updated = (current + to_add).min(self.capacity);
            self.tokens.store(updated, Ordering::Relaxed);
            *last_refill = now;
        }
    }

    fn try_acquire(&self) -> bool {
        self.refill();
        loop {
            let current = self.tokens.load(Ordering::Relaxed);
            if current <= 0 {
                return false;
            }
            if self
                .tokens
                .compare_exchange(current, current - 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }
}

/// Sliding window counter: at most `max_requests` timestamps retained within
/// the trailing `window` duration.
#[derive(Debug)]
struct SlidingWindowCounter {
    timestamps: Mutex<VecDeque<Instant>>,
    max_requests: AtomicU32,
    window: Duration,
}

impl SlidingWindowCounter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            timestamps: Mutex::new(VecDeque::new()),
            max_requests: AtomicU32::new(max_requests),
            window,
        }
    }

    fn evict_expired(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock().unwrap();
        self.evict_expired(&mut timestamps, now);
        if timestamps.len() < self.max_requests.load(Ordering::Relaxed) as usize {
            timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    fn remaining(&self) -> u32 {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock().unwrap();
        self.evict_expired(&mut timestamps, now);
        self.max_requests
            .load(Ordering::Relaxed)
            .saturating_sub(timestamps.len() as u32)
    }

    fn set_max_requests(&self, max_requests: u32) {
        self.max_requests.store(max_requests, Ordering::Relaxed);
    }
}

/// Outcome recorded against the adaptive layer after a call completes.
pub enum Outcome {
    Success,
    RateLimited { retry_after: Option<u64> },
}

/// Per-service rate limiter: token bucket + sliding window + adaptive
/// backoff (§4.1). One instance is owned by each Integration Service
/// Envelope.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: TokenBucket,
    window: SlidingWindowCounter,
    configured_requests_per_window: u32,
    retry_after_deadline: Mutex<Option<Instant>>,
    error_count: AtomicU32,
    success_count: AtomicU64,
    total_count: AtomicU64,
    last_adjustment: Mutex<Instant>,
    adjustment_interval: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let refill_rate = config.requests_per_window as f64 / config.window_seconds as f64;
        Self {
            bucket: TokenBucket::new(config.burst_size, refill_rate),
            window: SlidingWindowCounter::new(config.requests_per_window, Duration::from_secs(config.window_seconds)),
            configured_requests_per_window: config.requests_per_window,
            retry_after_deadline: Mutex::new(None),
            error_count: AtomicU32::new(0),
            success_count: AtomicU64::new(0),
            total_count: AtomicU64::new(0),
            last_adjustment: Mutex::new(Instant::now()),
            adjustment_interval: Duration::from_secs(60),
        }
    }

    /// Single non-blocking admission check: both the bucket and the window
    /// must currently have capacity, and no retry-after deadline may be in
    /// effect.
    fn try_admit(&self) -> bool {
        if let Some(deadline) = *self.retry_after_deadline.lock().unwrap() {
            if Instant::now() < deadline {
                return false;
            }
        }
        self.bucket.try_acquire() && self.window.try_acquire()
    }

    /// Block cooperatively until admission or `timeout` elapses, sleeping at
    /// most one second at a time so cancellation stays responsive.
    pub async fn wait_for_slot(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_admit() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let sleep_for = remaining.min(Duration::from_secs(1));
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// Record a call outcome and, at most once per adjustment interval,
    /// tighten or relax the sliding window based on the observed error rate.
    pub fn record_outcome(&self, outcome: Outcome) {
        self.total_count.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Outcome::Success => {
                self.success_count.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::RateLimited { retry_after } => {
                let error_count = self.error_count.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(secs) = retry_after {
                    *self.retry_after_deadline.lock().unwrap() = Some(Instant::now() + Duration::from_secs(secs));
                } else {
                    let backoff = (2u64.saturating_pow(error_count)).min(60);
                    *self.retry_after_deadline.lock().unwrap() = Some(Instant::now() + Duration::from_secs(backoff));
                }
            }
        }
        self.maybe_adjust();
    }

    fn maybe_adjust(&self) {
        let mut last_adjustment = self.last_adjustment.lock().unwrap();
        if last_adjustment.elapsed() < self.adjustment_interval {
            return;
        }
        let total = self.total_count.swap(0, Ordering::Relaxed);
        let successes = self.success_count.swap(0, Ordering::Relaxed);
        let errors = self.error_count.swap(0, Ordering::Relaxed) as u64;
        *last_adjustment = Instant::now();

        if total == 0 {
            return;
        }
        let error_rate = errors as f64 / total as f64;
        if error_rate > 0.1 {
            let tightened = (self.configured_requests_per_window as f64 * 0.8) as u32;
            self.window.set_max_requests(tightened.max(1));
            info!(error_rate, tightened, "rate limiter tightening sliding window after elevated error rate");
        } else {
            self.window.set_max_requests(self.configured_requests_per_window);
        }
        debug!(total, successes, errors, "rate limiter adjustment tick");
    }

    pub fn remaining_requests(&self) -> u32 {
        self.window.remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_burst_capacity() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_window: 100,
            window_seconds: 60,
            burst_size: 3,
        });
        for _ in 0..3 {
            assert!(limiter.wait_for_slot(Duration::from_millis(10)).await);
        }
    }

    #[tokio::test]
    async fn sliding_window_caps_admissions() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_window: 2,
            window_seconds: 60,
            burst_size: 100,
        });
        assert!(limiter.wait_for_slot(Duration::from_millis(10)).await);
        assert!(limiter.wait_for_slot(Duration::from_millis(10)).await);
        assert!(!limiter.wait_for_slot(Duration::from_millis(50)).await);
    }

    #[test]
    fn explicit_retry_after_blocks_future_admissions() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        limiter.record_outcome(Outcome::RateLimited { retry_after: Some(60) });
        assert!(!limiter.try_admit());
    }

    #[test]
    fn backoff_without_hint_is_exponential_and_capped() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        for _ in 0..10 {
            limiter.record_outcome(Outcome::RateLimited { retry_after: None });
        }
        let deadline = limiter.retry_after_deadline.lock().unwrap().unwrap();
        assert!(deadline <= Instant::now() + Duration::from_secs(61));
    }
}
