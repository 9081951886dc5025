//! # Core Data Model
//!
//! The universal shapes that flow between the Query Router, the Orchestrator,
//! the Integration Service Envelope and the RAG Assembler. Every adapter
//! translates its vendor payload into a [`Record`] at the boundary; nothing
//! past the adapter layer ever sees vendor-specific JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A backend knowledge service kind. One typed enum stands in for the
/// source-language idiom of passing service names around as bare strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    TicketTracker,
    Wiki,
    Chat,
    CodeHost,
    DocumentStore,
    Web,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::TicketTracker => "ticket_tracker",
            SourceKind::Wiki => "wiki",
            SourceKind::Chat => "chat",
            SourceKind::CodeHost => "code_host",
            SourceKind::DocumentStore => "document_store",
            SourceKind::Web => "web",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ticket_tracker" | "jira" | "ticket" => Ok(SourceKind::TicketTracker),
            "wiki" | "confluence" | "documentation" => Ok(SourceKind::Wiki),
            "chat" | "slack" | "team_communication" => Ok(SourceKind::Chat),
            "code_host" | "github" | "code" => Ok(SourceKind::CodeHost),
            "document_store" | "drive" | "notion" => Ok(SourceKind::DocumentStore),
            "web" => Ok(SourceKind::Web),
            _ => Err(()),
        }
    }
}

/// The universal retrieved-document shape every adapter produces and every
/// downstream consumer understands. `(source, id)` uniquely identifies a
/// Record across the system; the ranker deduplicates on this compound key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub source: SourceKind,
    /// Name of the registered service that produced this record, e.g.
    /// `"notion"` or `"confluence"`, both `Wiki`. Several services can share
    /// one [`SourceKind`], so the ranker keys its per-service priority lookup
    /// on this field rather than on `source`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Record {
    pub fn new(source: SourceKind, id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source,
            service: String::new(),
            title: title.into(),
            content: content.into(),
            url: None,
            score: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Compound dedup key used by the ranker.
    pub fn dedup_key(&self) -> (SourceKind, &str) {
        (self.source, self.id.as_str())
    }
}

/// A search request as seen by the Integration Service Envelope and by the
/// Orchestrator's per-service dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<HashMap<String, serde_json::Value>>,
}

fn default_limit() -> usize {
    10
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: default_limit(),
            filters: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// The Router's closed intent classification set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    TicketLookup,
    TicketSearch,
    Documentation,
    ProjectStatus,
    TeamCommunication,
    PersonLookup,
    CodeRelated,
    GeneralKnowledge,
    Unknown,
}

impl Intent {
    /// The source kind that must be available for this intent to proceed,
    /// per the Router's source-required policy (§4.7).
    pub fn required_source(&self) -> Option<SourceKind> {
        match self {
            Intent::TicketLookup => Some(SourceKind::TicketTracker),
            Intent::TeamCommunication => Some(SourceKind::Chat),
            _ => None,
        }
    }
}

/// Output of the Query Router: what the user meant, and how to search for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub original_query: String,
    pub intent: Intent,
    #[serde(default)]
    pub entities: HashMap<String, String>,
    pub recommended_sources: Vec<SourceKind>,
    #[serde(default)]
    pub per_source_queries: HashMap<SourceKind, String>,
    pub confidence: f64,
    pub reasoning: String,
}

/// Static per-service configuration. Immutable after startup except for
/// `enabled`, which admin endpoints toggle under a short critical section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub source: SourceKind,
    pub base_url: String,
    pub enabled: bool,
    /// Lower is preferred.
    pub priority: u32,
    pub timeout_secs: u64,
    pub keywords: Vec<String>,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, source: SourceKind, priority: u32, keywords: &[&str]) -> Self {
        Self {
            name: name.into(),
            source,
            base_url: String::new(),
            enabled: true,
            priority,
            timeout_secs: 10,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// One turn of conversation, as persisted by the gateway's history store.
/// Read-only from the core's perspective — only the gateway writes these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub session_id: String,
    pub user_message: String,
    pub bot_response: String,
    pub sources: Vec<SourceKind>,
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_distinguishes_source() {
        let a = Record::new(SourceKind::TicketTracker, "1", "t", "c");
        let b = Record::new(SourceKind::Wiki, "1", "t", "c");
        assert_ne!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn source_kind_round_trips_through_str() {
        for kind in [
            SourceKind::TicketTracker,
            SourceKind::Wiki,
            SourceKind::Chat,
            SourceKind::CodeHost,
            SourceKind::DocumentStore,
            SourceKind::Web,
        ] {
            let parsed: SourceKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn required_source_policy() {
        assert_eq!(Intent::TicketLookup.required_source(), Some(SourceKind::TicketTracker));
        assert_eq!(Intent::TeamCommunication.required_source(), Some(SourceKind::Chat));
        assert_eq!(Intent::Documentation.required_source(), None);
    }
}
