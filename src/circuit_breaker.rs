//! # Circuit Breaker
//!
//! Three-state breaker (§4.2) guarding one outbound Integration Service.
//! Wraps the rate-limited adapter call; a rate-limit signal is excluded from
//! the failure count and forwarded to the rate limiter instead, since the
//! system prefers waiting over tripping the breaker on a 429-like response.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_seconds: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout_seconds: 30,
        }
    }
}

/// An exception class the breaker excludes from its failure count — a
/// rate-limit signal, which the rate limiter handles instead.
pub struct ExcludedFailure;

struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    trips_total: AtomicU32,
    // Monotonic counter so callers can detect whether a concurrent
    // transition happened between `before_call` and `on_result`.
    generation: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Proceed,
    Rejected,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            }),
            trips_total: AtomicU32::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Called before attempting the guarded call. `Rejected` means fail fast
    /// without touching the network.
    pub fn before_call(&self) -> Admission {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => Admission::Proceed,
            CircuitState::HalfOpen => Admission::Proceed,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed >= Duration::from_secs(self.config.timeout_seconds) {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    info!(service = %self.name, "circuit breaker transitioning OPEN -> HALF_OPEN");
                    Admission::Proceed
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    pub fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failure_count = 0;
        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.success_count = 0;
                    self.generation.fetch_add(1, Ordering::Relaxed);
                    info!(service = %self.name, "circuit breaker transitioning HALF_OPEN -> CLOSED");
                }
            }
            CircuitState::Closed | CircuitState::Open => {}
        }
    }

    /// Record a non-excluded failure (Transport or Upstream-5xx, per the
    /// envelope's error taxonomy). Call `record_rate_limited` instead for a
    /// 429-like response — it must not reach here.
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                self.trips_total.fetch_add(1, Ordering::Relaxed);
                self.generation.fetch_add(1, Ordering::Relaxed);
                info!(service = %self.name, "circuit breaker reopened after HALF_OPEN failure");
            }
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    self.trips_total.fetch_add(1, Ordering::Relaxed);
                    self.generation.fetch_add(1, Ordering::Relaxed);
                    info!(service = %self.name, threshold = self.config.failure_threshold, "circuit breaker tripped OPEN");
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        let inner = self.inner.lock().unwrap();
        CircuitBreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            trips_total: self.trips_total.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub trips_total: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 3,
                success_threshold: 2,
                timeout_seconds: 0,
            },
        )
    }

    #[test]
    fn trips_open_after_threshold_failures() {
        let cb = breaker();
        for _ in 0..3 {
            assert_eq!(cb.before_call(), Admission::Proceed);
            cb.on_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_reopens_on_any_failure() {
        let cb = breaker();
        for _ in 0..3 {
            cb.on_failure();
        }
        assert_eq!(cb.before_call(), Admission::Proceed); // timeout=0, immediate half-open probe
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let cb = breaker();
        for _ in 0..3 {
            cb.on_failure();
        }
        cb.before_call();
        cb.on_success();
        cb.on_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn success_resets_failure_count_in_closed() {
        let cb = breaker();
        cb.on_failure();
        cb.on_failure();
        cb.on_success();
        cb.on_failure();
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
