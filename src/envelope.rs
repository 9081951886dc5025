//! # Integration Service Envelope
//!
//! Wraps one outbound [`KnowledgeAdapter`] with rate limiting, circuit
//! breaking, multi-layer caching and per-service metrics (§4.5). Every
//! outbound call to a backend service goes through exactly one envelope;
//! nothing above this layer talks to an adapter directly.

use crate::caching::{cache_key, CacheConfig, MultiLayerCache, SharedCache};
use crate::circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::error::ProxyError;
use crate::rate_limiting::{Outcome, RateLimitConfig, RateLimiter};
use crate::record::{Record, SearchQuery};
use crate::services::KnowledgeAdapter;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub cache: CacheConfig,
    pub max_retries: u32,
    pub call_timeout_seconds: u64,
    /// Base delay for retry backoff; the actual wait is `retry_delay * 2^attempt`.
    pub retry_delay_millis: u64,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            max_retries: 2,
            call_timeout_seconds: 10,
            retry_delay_millis: 100,
        }
    }
}

/// Per-envelope running counters, in the teacher's `MetricsCollector`
/// atomics style.
#[derive(Debug)]
struct EnvelopeMetrics {
    requests_total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    cached: AtomicU64,
    response_time_accumulator_ms: AtomicU64,
    response_time_count: AtomicU64,
    last_request_time: AtomicU64,
    start_time: Instant,
}

impl EnvelopeMetrics {
    fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            success: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cached: AtomicU64::new(0),
            response_time_accumulator_ms: AtomicU64::new(0),
            response_time_count: AtomicU64::new(0),
            last_request_time: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        self.last_request_time.store(now, Ordering::Relaxed);
    }

    fn record_success(&self, elapsed: Duration) {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.response_time_accumulator_ms.fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.response_time_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_hit(&self) {
        self.cached.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> EnvelopeMetricsSnapshot {
        let count = self.response_time_count.load(Ordering::Relaxed);
        let sum = self.response_time_accumulator_ms.load(Ordering::Relaxed);
        EnvelopeMetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cached: self.cached.load(Ordering::Relaxed),
            avg_response_time_ms: if count > 0 { sum as f64 / count as f64 } else { 0.0 },
            last_request_time: self.last_request_time.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeMetricsSnapshot {
    pub requests_total: u64,
    pub success: u64,
    pub failed: u64,
    pub cached: u64,
    pub avg_response_time_ms: f64,
    pub last_request_time: u64,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub name: String,
    pub healthy: bool,
    pub circuit_state: CircuitState,
    pub remaining_rate_limit: u32,
}

/// One outbound service's complete resilience stack: rate limiter, circuit
/// breaker, multi-layer cache, and the adapter they all guard.
pub struct IntegrationServiceEnvelope {
    service_name: String,
    adapter: Arc<dyn KnowledgeAdapter>,
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    cache: MultiLayerCache,
    metrics: EnvelopeMetrics,
    max_retries: u32,
    call_timeout: Duration,
    retry_delay: Duration,
}

impl IntegrationServiceEnvelope {
    pub fn new(
        service_name: impl Into<String>,
        adapter: Arc<dyn KnowledgeAdapter>,
        config: &EnvelopeConfig,
        l2: Arc<dyn SharedCache>,
    ) -> Self {
        let service_name = service_name.into();
        Self {
            rate_limiter: RateLimiter::new(config.rate_limit.clone()),
            circuit_breaker: CircuitBreaker::new(service_name.clone(), config.circuit_breaker.clone()),
            cache: MultiLayerCache::new(service_name.clone(), &config.cache, l2),
            adapter,
            service_name,
            max_retries: config.max_retries,
            call_timeout: Duration::from_secs(config.call_timeout_seconds),
            retry_delay: Duration::from_millis(config.retry_delay_millis),
        }
    }

    /// Runs the full cache -> rate-limit -> circuit-breaker -> adapter call
    /// -> cache-write pipeline for one query.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<Record>, ProxyError> {
        self.metrics.record_request();

        let key = cache_key(
            "search",
            &serde_json::json!({ "query": query.query, "limit": query.limit, "filters": query.filters }),
        );

        if let Some(cached) = self.cache.get(&key) {
            self.metrics.record_cache_hit();
            debug!(service = %self.service_name, "envelope cache hit");
            return serde_json::from_str(&cached).map_err(|e| ProxyError::Serialization(e.to_string()));
        }

        if !self.rate_limiter.wait_for_slot(self.call_timeout).await {
            return Err(ProxyError::RateLimited(None));
        }

        if matches!(self.circuit_breaker.before_call(), Admission::Rejected) {
            return Err(ProxyError::CircuitOpen);
        }

        let started = Instant::now();
        let result = self.call_with_retries(query).await;

        match &result {
            Ok(records) => {
                self.circuit_breaker.on_success();
                self.rate_limiter.record_outcome(Outcome::Success);
                self.metrics.record_success(started.elapsed());
                if let Ok(serialized) = serde_json::to_string(records) {
                    self.cache.set(&key, serialized);
                }
            }
            Err(ProxyError::RateLimited(retry_after)) => {
                self.rate_limiter.record_outcome(Outcome::RateLimited { retry_after: *retry_after });
                self.metrics.record_failure();
                warn!(service = %self.service_name, "upstream signalled rate limiting");
            }
            Err(err) if err.is_breaker_failure() => {
                self.circuit_breaker.on_failure();
                // Not a rate-limit signal, so the rate limiter's adaptive
                // error tracking treats it as a non-rate-limited outcome.
                self.rate_limiter.record_outcome(Outcome::Success);
                self.metrics.record_failure();
            }
            Err(_) => {
                // Client-fault errors (BadRequest, Upstream 4xx, Malformed)
                // are returned immediately: no breaker trip, no retry.
                self.rate_limiter.record_outcome(Outcome::Success);
                self.metrics.record_failure();
            }
        }

        result
    }

    async fn call_with_retries(&self, query: &SearchQuery) -> Result<Vec<Record>, ProxyError> {
        let mut attempt = 0;
        loop {
            match tokio::time::timeout(self.call_timeout, self.adapter.search(query)).await {
                Ok(Ok(records)) => return Ok(records),
                Ok(Err(err)) if attempt < self.max_retries && is_retryable(&err) => {
                    let delay = self.retry_delay.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    debug!(service = %self.service_name, attempt, ?delay, "retrying envelope call after transient failure");
                    tokio::time::sleep(delay).await;
                }
                Ok(Err(err)) => return Err(err),
                Err(_) => return Err(ProxyError::Transport("adapter call timed out".to_string())),
            }
        }
    }

    pub fn health_check(&self) -> ServiceHealth {
        ServiceHealth {
            name: self.service_name.clone(),
            healthy: self.circuit_breaker.state() != CircuitState::Open,
            circuit_state: self.circuit_breaker.state(),
            remaining_rate_limit: self.rate_limiter.remaining_requests(),
        }
    }

    pub fn metrics(&self) -> EnvelopeMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn name(&self) -> &str {
        &self.service_name
    }
}

fn is_retryable(err: &ProxyError) -> bool {
    err.is_breaker_failure()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::InProcessSharedCache;
    use crate::record::SourceKind;
    use crate::services::StubAdapter;

    fn envelope(config: EnvelopeConfig) -> IntegrationServiceEnvelope {
        envelope_with_adapter(config, StubAdapter::new("stub", SourceKind::Wiki))
    }

    fn envelope_with_adapter(config: EnvelopeConfig, adapter: StubAdapter) -> IntegrationServiceEnvelope {
        IntegrationServiceEnvelope::new("test-service", Arc::new(adapter), &config, Arc::new(InProcessSharedCache::new()))
    }

    #[tokio::test]
    async fn successful_search_is_cached() {
        let env = envelope(EnvelopeConfig::default());
        let query = SearchQuery::new("deploy runbook");
        let first = env.search(&query).await.unwrap();
        assert!(!first.is_empty());
        let snapshot_before = env.metrics();
        let second = env.search(&query).await.unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(env.metrics().cached, snapshot_before.cached + 1);
    }

    #[tokio::test]
    async fn open_circuit_fails_fast() {
        let config = EnvelopeConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                success_threshold: 1,
                timeout_seconds: 3600,
            },
            max_retries: 0,
            ..EnvelopeConfig::default()
        };
        let env = envelope_with_adapter(config, StubAdapter::new("stub", SourceKind::Wiki).failing());
        // the stub adapter's transport failure trips the breaker.
        let _ = env.search(&SearchQuery::new("anything")).await;
        let result = env.search(&SearchQuery::new("anything")).await;
        assert!(matches!(result, Err(ProxyError::CircuitOpen)));
    }

    #[tokio::test]
    async fn bad_request_does_not_trip_the_breaker() {
        let config = EnvelopeConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                success_threshold: 1,
                timeout_seconds: 3600,
            },
            max_retries: 0,
            ..EnvelopeConfig::default()
        };
        let env = envelope(config);
        // empty query is a client fault, not a breaker failure.
        let first = env.search(&SearchQuery::new("")).await;
        assert!(matches!(first, Err(ProxyError::BadRequest(_))));
        let second = env.search(&SearchQuery::new("anything")).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn health_check_reports_circuit_state() {
        let env = envelope(EnvelopeConfig::default());
        let health = env.health_check();
        assert!(health.healthy);
        assert_eq!(health.circuit_state, CircuitState::Closed);
    }
}
