//! # Orchestrator
//!
//! Fans a query out across the enabled Integration Service Envelopes,
//! collects their results and ranks them deterministically (§4.6). This is
//! the only component that knows about more than one outbound service at a
//! time; the Query Router and RAG Assembler both call through it.

use crate::envelope::{IntegrationServiceEnvelope, ServiceHealth};
use crate::record::{Record, SearchQuery, ServiceConfig, SourceKind};
use dashmap::DashMap;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

const FALLBACK_TOP_N: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub max_parallel: usize,
    pub service_timeout_seconds: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_parallel: 10, service_timeout_seconds: 10 }
    }
}

struct ServiceEntry {
    config: ServiceConfig,
    envelope: Arc<IntegrationServiceEnvelope>,
}

pub struct Orchestrator {
    services: DashMap<String, ServiceEntry>,
    config: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerServiceTiming {
    pub service: String,
    pub elapsed_ms: u64,
    pub result_count: usize,
    pub responded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub results: Vec<Record>,
    pub sources_queried: Vec<String>,
    pub sources_responded: Vec<String>,
    pub total_time_ms: u64,
    pub per_service_time: Vec<PerServiceTiming>,
}

/// One step of the streaming aggregation protocol (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Start { services: Vec<String> },
    Results { source: String, count: usize, time_ms: u64, results: Vec<Record> },
    NoResults { source: String, time_ms: u64 },
    Error { source: String, message: String },
    Done { total_results: usize, top_results: Vec<Record> },
}

/// The gateway's seed service catalog, one entry per organizational
/// knowledge tool it fans queries out to by default.
pub fn default_services() -> Vec<ServiceConfig> {
    vec![
        ServiceConfig::new("confluence", SourceKind::Wiki, 1, &["document", "wiki", "page", "documentation", "guide", "article"]),
        ServiceConfig::new("jira", SourceKind::TicketTracker, 1, &["issue", "ticket", "bug", "task", "story", "epic", "sprint"]),
        ServiceConfig::new("slack", SourceKind::Chat, 2, &["message", "chat", "channel", "discussion", "conversation"]),
        ServiceConfig::new("github", SourceKind::CodeHost, 2, &["code", "repository", "commit", "pr", "pull request", "branch"]),
        ServiceConfig::new("google", SourceKind::DocumentStore, 2, &["drive", "doc", "sheet", "email", "calendar", "meeting"]),
        ServiceConfig::new("notion", SourceKind::Wiki, 2, &["page", "database", "note", "wiki"]),
        ServiceConfig::new("linear", SourceKind::TicketTracker, 3, &["issue", "project", "cycle", "roadmap"]),
        ServiceConfig::new("figma", SourceKind::DocumentStore, 3, &["design", "prototype", "component", "frame", "ui", "ux", "mockup"]),
        ServiceConfig::new(
            "microsoft365",
            SourceKind::DocumentStore,
            2,
            &["teams", "sharepoint", "outlook", "onedrive", "office", "microsoft", "excel", "word", "powerpoint"],
        ),
        ServiceConfig::new(
            "devtools",
            SourceKind::Web,
            3,
            &["stackoverflow", "npm", "pypi", "package", "library", "mdn", "documentation", "how to", "error", "exception"],
        ),
        ServiceConfig::new("productivity", SourceKind::DocumentStore, 4, &["file", "local", "document", "notes", "bookmark", "clipboard", "recent"]),
    ]
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { services: DashMap::new(), config }
    }

    pub fn register(&self, config: ServiceConfig, envelope: Arc<IntegrationServiceEnvelope>) {
        self.services.insert(config.name.clone(), ServiceEntry { config, envelope });
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        if let Some(mut entry) = self.services.get_mut(name) {
            entry.config.enabled = enabled;
            info!(service = name, enabled, "orchestrator toggled service");
            true
        } else {
            false
        }
    }

    /// Source selection per §4.6: explicit list, then keyword+priority match,
    /// then a top-N priority fallback.
    fn determine_services(&self, query: &str, requested: Option<&[String]>) -> Vec<String> {
        if let Some(requested) = requested {
            return requested
                .iter()
                .filter(|name| self.services.get(*name).map(|e| e.config.enabled).unwrap_or(false))
                .cloned()
                .collect();
        }

        let lower = query.to_lowercase();
        let mut matched: Vec<(u32, String)> = Vec::new();
        let mut all_enabled: Vec<(u32, String)> = Vec::new();

        for entry in self.services.iter() {
            if !entry.config.enabled {
                continue;
            }
            all_enabled.push((entry.config.priority, entry.config.name.clone()));
            if entry.config.keywords.iter().any(|kw| lower.contains(kw.as_str())) {
                matched.push((entry.config.priority, entry.config.name.clone()));
            }
        }

        if !matched.is_empty() {
            matched.sort_by_key(|(priority, _)| *priority);
            return matched.into_iter().map(|(_, name)| name).collect();
        }

        all_enabled.sort_by_key(|(priority, _)| *priority);
        all_enabled.into_iter().take(FALLBACK_TOP_N).map(|(_, name)| name).collect()
    }

    /// Bounded-parallel fan-out, per-service timeout, ranked aggregate.
    pub async fn search(&self, query: &SearchQuery, requested_services: Option<&[String]>) -> SearchOutcome {
        let started = Instant::now();
        let service_names = self.determine_services(&query.query, requested_services);
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
        let timeout = Duration::from_secs(self.config.service_timeout_seconds);

        let mut handles = Vec::with_capacity(service_names.len());
        for name in &service_names {
            let Some(entry) = self.services.get(name) else { continue };
            let envelope = entry.envelope.clone();
            let query = query.clone();
            let semaphore = semaphore.clone();
            let name = name.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let call_started = Instant::now();
                let outcome = tokio::time::timeout(timeout, envelope.search(&query)).await;
                let elapsed = call_started.elapsed();
                match outcome {
                    Ok(Ok(records)) => (name, elapsed, Some(records)),
                    Ok(Err(err)) => {
                        warn!(service = %name, error = %err, "orchestrator: service call failed");
                        (name, elapsed, None)
                    }
                    Err(_) => {
                        warn!(service = %name, "orchestrator: service call timed out");
                        (name, elapsed, None)
                    }
                }
            }));
        }

        let mut all_records = Vec::new();
        let mut responded = Vec::new();
        let mut timings = Vec::new();
        for handle in handles {
            let (name, elapsed, records) = handle.await.unwrap_or((String::new(), Duration::ZERO, None));
            let result_count = records.as_ref().map(Vec::len).unwrap_or(0);
            let responded_flag = records.is_some();
            if let Some(records) = records {
                responded.push(name.clone());
                all_records.extend(records);
            }
            timings.push(PerServiceTiming { service: name, elapsed_ms: elapsed.as_millis() as u64, result_count, responded: responded_flag });
        }

        let ranked = rank_and_dedup(all_records, &query.query, &self.services);

        SearchOutcome {
            results: ranked.into_iter().take(query.limit).collect(),
            sources_queried: service_names,
            sources_responded: responded,
            total_time_ms: started.elapsed().as_millis() as u64,
            per_service_time: timings,
        }
    }

    pub fn services_status(&self) -> Vec<ServiceHealth> {
        self.services.iter().map(|entry| entry.envelope.health_check()).collect()
    }

    /// The static configuration of every registered service, for admin
    /// surfaces that need `priority`/`base_url`/`enabled` alongside health.
    pub fn registered_configs(&self) -> Vec<ServiceConfig> {
        self.services.iter().map(|entry| entry.config.clone()).collect()
    }

    /// Source kinds backed by at least one enabled registered service.
    pub fn available_sources(&self) -> Vec<SourceKind> {
        let mut sources: Vec<SourceKind> = self.services.iter().filter(|e| e.config.enabled).map(|e| e.config.source).collect();
        sources.sort_by_key(|s| s.as_str());
        sources.dedup();
        sources
    }

    /// Registered service names whose source kind is one of `sources`, used
    /// to translate a Query Router recommendation into an explicit service
    /// list for [`Orchestrator::search`].
    pub fn services_for_sources(&self, sources: &[SourceKind]) -> Vec<String> {
        self.services.iter().filter(|e| e.config.enabled && sources.contains(&e.config.source)).map(|e| e.config.name.clone()).collect()
    }

    /// Streams results as each service call completes, followed by a final
    /// ranked summary (§4.6's `start -> results/no_results/error* -> done`
    /// sequence).
    pub fn stream_search(self: Arc<Self>, query: SearchQuery, requested_services: Option<Vec<String>>) -> Pin<Box<dyn Stream<Item = StreamEvent> + Send>> {
        let (tx, rx) = tokio::sync::mpsc::channel(32);

        tokio::spawn(async move {
            let service_names = self.determine_services(&query.query, requested_services.as_deref());
            if tx.send(StreamEvent::Start { services: service_names.clone() }).await.is_err() {
                return;
            }

            let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
            let timeout = Duration::from_secs(self.config.service_timeout_seconds);
            let mut pending = FuturesUnordered::new();

            for name in &service_names {
                let Some(entry) = self.services.get(name) else { continue };
                let envelope = entry.envelope.clone();
                let query = query.clone();
                let semaphore = semaphore.clone();
                let name = name.clone();
                pending.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    let started = Instant::now();
                    let outcome = tokio::time::timeout(timeout, envelope.search(&query)).await;
                    (name, started.elapsed(), outcome.ok().and_then(Result::ok))
                }));
            }

            let mut all_records = Vec::new();
            while let Some(joined) = pending.next().await {
                let (name, elapsed, records) = match joined {
                    Ok(value) => value,
                    Err(_) => continue,
                };
                let event = match records {
                    Some(records) if !records.is_empty() => {
                        let count = records.len();
                        let top3: Vec<Record> = records.iter().take(3).cloned().collect();
                        all_records.extend(records);
                        StreamEvent::Results { source: name, count, time_ms: elapsed.as_millis() as u64, results: top3 }
                    }
                    Some(_) => StreamEvent::NoResults { source: name, time_ms: elapsed.as_millis() as u64 },
                    None => StreamEvent::Error { source: name, message: "service call failed or timed out".to_string() },
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }

            let ranked = rank_and_dedup(all_records, &query.query, &self.services);
            let top_results: Vec<Record> = ranked.into_iter().take(query.limit).collect();
            let _ = tx.send(StreamEvent::Done { total_results: top_results.len(), top_results }).await;
        });

        Box::pin(ReceiverStream::new(rx))
    }

    pub async fn refresh_all(&self) -> Vec<ServiceHealth> {
        let envelopes: Vec<_> = self.services.iter().map(|e| e.envelope.clone()).collect();
        let checks: Vec<_> = envelopes.iter().map(|e| e.health_check()).collect();
        debug!(count = checks.len(), "orchestrator refreshed service health");
        checks
    }
}

fn rank_and_dedup(records: Vec<Record>, query: &str, services: &DashMap<String, ServiceEntry>) -> Vec<Record> {
    let terms: Vec<String> = query.to_lowercase().split_whitespace().map(String::from).collect();
    let mut seen: HashSet<(SourceKind, String)> = HashSet::new();
    let mut scored: Vec<(f64, usize, Record)> = Vec::new();

    for (index, record) in records.into_iter().enumerate() {
        let key = (record.source, record.id.clone());
        if !seen.insert(key) {
            continue;
        }
        let title_lower = record.title.to_lowercase();
        let content_lower = record.content.to_lowercase();
        let title_matches = terms.iter().filter(|t| title_lower.contains(t.as_str())).count();
        let content_matches = terms.iter().filter(|t| content_lower.contains(t.as_str())).count();
        let priority_bonus = service_priority_bonus(&record.service, services);
        let score = 2.0 * title_matches as f64 + content_matches as f64 + priority_bonus;
        scored.push((score, index, record));
    }

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1)));
    scored.into_iter().map(|(_, _, record)| record).collect()
}

/// Looks up the originating service's priority by name rather than by
/// [`SourceKind`]: several services can share one kind (e.g. `notion` and
/// `confluence` are both `Wiki`) with different priorities, so indexing by
/// kind would pick an arbitrary one of them.
fn service_priority_bonus(service: &str, services: &DashMap<String, ServiceEntry>) -> f64 {
    services.get(service).map(|entry| (5i64 - entry.config.priority as i64) as f64).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::InProcessSharedCache;
    use crate::envelope::EnvelopeConfig;
    use crate::services::StubAdapter;

    fn make_envelope(name: &str, source: SourceKind) -> Arc<IntegrationServiceEnvelope> {
        Arc::new(IntegrationServiceEnvelope::new(
            name,
            Arc::new(StubAdapter::new(name, source)),
            &EnvelopeConfig::default(),
            Arc::new(InProcessSharedCache::new()),
        ))
    }

    fn orchestrator() -> Orchestrator {
        let orch = Orchestrator::new(OrchestratorConfig::default());
        orch.register(
            ServiceConfig::new("jira", SourceKind::TicketTracker, 1, &["ticket", "bug", "jira"]),
            make_envelope("jira", SourceKind::TicketTracker),
        );
        orch.register(
            ServiceConfig::new("confluence", SourceKind::Wiki, 2, &["doc", "wiki", "guide"]),
            make_envelope("confluence", SourceKind::Wiki),
        );
        orch
    }

    #[tokio::test]
    async fn keyword_match_selects_only_matching_service() {
        let orch = orchestrator();
        let outcome = orch.search(&SearchQuery::new("find the bug report"), None).await;
        assert_eq!(outcome.sources_queried, vec!["jira".to_string()]);
    }

    #[tokio::test]
    async fn no_keyword_match_falls_back_to_all_enabled() {
        let orch = orchestrator();
        let outcome = orch.search(&SearchQuery::new("something unrelated entirely"), None).await;
        assert_eq!(outcome.sources_queried.len(), 2);
    }

    #[tokio::test]
    async fn disabled_service_is_excluded() {
        let orch = orchestrator();
        orch.set_enabled("jira", false);
        let outcome = orch.search(&SearchQuery::new("bug report"), None).await;
        assert!(outcome.sources_queried.is_empty());
    }

    #[tokio::test]
    async fn explicit_service_list_is_honored() {
        let orch = orchestrator();
        let outcome = orch.search(&SearchQuery::new("anything"), Some(&["confluence".to_string()])).await;
        assert_eq!(outcome.sources_queried, vec!["confluence".to_string()]);
    }
}
