//! # Application State
//!
//! Shared state passed to every Gateway API handler: the configuration, the
//! Orchestrator (with its registered Integration Service Envelopes), the
//! Query Router, the RAG Assembler, and the chat history / settings stores.

use crate::caching::{CacheConfig, InProcessSharedCache, SharedCache};
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::config::Config;
use crate::core::http_client::HttpClientBuilder;
use crate::envelope::{EnvelopeConfig, IntegrationServiceEnvelope};
use crate::llm::{HttpLlmClient, LlmClient, StubLlmClient};
use crate::orchestrator::{default_services, Orchestrator, OrchestratorConfig};
use crate::rag::RagAssembler;
use crate::rate_limiting::RateLimitConfig;
use crate::routing::QueryRouter;
use crate::services::StubAdapter;
use crate::store::{HistoryStore, InProcessHistoryStore, InProcessSettingsStore, SettingsStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub orchestrator: Arc<Orchestrator>,
    pub query_router: Arc<QueryRouter>,
    pub rag: Arc<RagAssembler>,
    pub history: Arc<dyn HistoryStore>,
    pub settings: Arc<dyn SettingsStore>,
}

impl AppState {
    pub async fn new(config: Config) -> Self {
        let http_client = HttpClientBuilder::from_config(&config).build().unwrap_or_else(|_| HttpClientBuilder::new().build().unwrap());

        let llm: Arc<dyn LlmClient> = if config.llm_url == "direct" {
            Arc::new(StubLlmClient)
        } else {
            Arc::new(HttpLlmClient::new(http_client.clone(), config.llm_url.clone(), config.llm_model.clone(), config.llm_token.clone()))
        };

        let envelope_config = EnvelopeConfig {
            rate_limit: RateLimitConfig {
                requests_per_window: config.rate_limit_requests_per_window,
                window_seconds: config.rate_limit_window_seconds,
                burst_size: config.rate_limit_burst_size,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: config.circuit_failure_threshold,
                success_threshold: config.circuit_success_threshold,
                timeout_seconds: config.circuit_timeout_seconds,
            },
            cache: CacheConfig {
                l1_max_entries: config.cache_l1_max_entries,
                l1_ttl_seconds: config.cache_l1_ttl_seconds,
                l2_ttl_seconds: config.cache_l2_ttl_seconds,
                enabled: config.enable_caching,
            },
            max_retries: 2,
            call_timeout_seconds: config.orchestrator_service_timeout_seconds,
            retry_delay_millis: 100,
        };

        let shared_cache: Arc<dyn SharedCache> = Arc::new(InProcessSharedCache::new());
        let orchestrator = Orchestrator::new(OrchestratorConfig {
            max_parallel: config.orchestrator_max_parallel,
            service_timeout_seconds: config.orchestrator_service_timeout_seconds,
        });

        for service in default_services() {
            let adapter = Arc::new(StubAdapter::new(service.name.clone(), service.source));
            let envelope = Arc::new(IntegrationServiceEnvelope::new(service.name.clone(), adapter, &envelope_config, shared_cache.clone()));
            orchestrator.register(service, envelope);
        }

        Self {
            query_router: Arc::new(QueryRouter::new(llm.clone())),
            rag: Arc::new(RagAssembler::new(llm)),
            orchestrator: Arc::new(orchestrator),
            history: Arc::new(InProcessHistoryStore::new()),
            settings: Arc::new(InProcessSettingsStore::new()),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn app_state_registers_the_default_service_catalog() {
        let state = AppState::new(Config::for_test()).await;
        assert_eq!(state.orchestrator.services_status().len(), default_services().len());
    }
}
