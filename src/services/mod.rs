//! # Backend Knowledge Adapters
//!
//! One adapter per outbound Integration Service. Real deployments point
//! these at Jira, Confluence, Slack, GitHub and the rest; this crate ships
//! deterministic in-process stand-ins behind the same [`KnowledgeAdapter`]
//! trait so the Envelope, Orchestrator and Router can be exercised without
//! live credentials or network access.

use crate::error::ProxyError;
use crate::record::{Record, SearchQuery, SourceKind};
use async_trait::async_trait;

/// The uniform contract every outbound knowledge service satisfies. The
/// Integration Service Envelope is the only caller — it owns rate limiting,
/// circuit breaking and caching around whatever this returns.
#[async_trait]
pub trait KnowledgeAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn source(&self) -> SourceKind;
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Record>, ProxyError>;
}

/// Deterministic stand-in for a real vendor backend. Generates synthetic
/// records from the query string so the rest of the pipeline has realistic,
/// reproducible data to rank and assemble without a network call.
#[derive(Debug, Clone)]
pub struct StubAdapter {
    name: String,
    source: SourceKind,
    record_count: usize,
    fail: bool,
}

impl StubAdapter {
    pub fn new(name: impl Into<String>, source: SourceKind) -> Self {
        Self { name: name.into(), source, record_count: 3, fail: false }
    }

    pub fn with_record_count(mut self, count: usize) -> Self {
        self.record_count = count;
        self
    }

    /// Makes every call fail with a transport error, for exercising the
    /// Envelope's breaker/retry behavior in tests.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl KnowledgeAdapter for StubAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> SourceKind {
        self.source
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Record>, ProxyError> {
        if self.fail {
            return Err(ProxyError::Transport("stub adapter configured to fail".to_string()));
        }
        if query.query.trim().is_empty() {
            return Err(ProxyError::BadRequest("search query must not be empty".to_string()));
        }

        let limit = query.limit.min(self.record_count);
        let records = (0..limit)
            .map(|i| {
                Record::new(
                    self.source,
                    format!("{}-{}", self.name, i),
                    format!("{} result {} for \"{}\"", self.name, i, query.query),
                    format!(
                        "Synthetic content from {} matching query \"{}\". Entry {} of {}.",
                        self.name, query.query, i + 1, limit
                    ),
                )
                .with_service(self.name.clone())
                .with_url(format!("https://example.invalid/{}/{}", self.name, i))
                .with_metadata("stub", serde_json::Value::Bool(true))
            })
            .collect();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_adapter_returns_bounded_results() {
        let adapter = StubAdapter::new("jira-stub", SourceKind::TicketTracker).with_record_count(5);
        let results = adapter.search(&SearchQuery::new("deploy failure").with_limit(2)).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.source == SourceKind::TicketTracker));
    }

    #[tokio::test]
    async fn stub_adapter_rejects_empty_query() {
        let adapter = StubAdapter::new("wiki-stub", SourceKind::Wiki);
        assert!(adapter.search(&SearchQuery::new("")).await.is_err());
    }
}
