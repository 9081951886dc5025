//! # Query Router
//!
//! Two-tier intent classification (§4.7): fast deterministic patterns first,
//! falling back to an LLM-driven JSON classification only when no pattern
//! meets its confidence bar. Enforces the source-required policy for
//! intents that need a specific backend to be configured.

use crate::llm::LlmClient;
use crate::record::{Intent, QueryAnalysis, SourceKind};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct QueryRouter {
    llm: Arc<dyn LlmClient>,
    ticket_pattern: Regex,
}

impl QueryRouter {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            ticket_pattern: Regex::new(r"\b[A-Z]{2,10}-\d+\b").expect("static ticket pattern is valid"),
        }
    }

    pub async fn analyze(&self, query: &str) -> QueryAnalysis {
        if let Some(analysis) = self.tier_a(query) {
            info!(intent = ?analysis.intent, confidence = analysis.confidence, "query router: tier A pattern matched");
            return analysis;
        }

        match self.tier_b(query).await {
            Some(analysis) => analysis,
            None => fallback_analysis(query),
        }
    }

    fn tier_a(&self, query: &str) -> Option<QueryAnalysis> {
        let lower = query.to_lowercase();

        if self.ticket_pattern.is_match(query) {
            return Some(QueryAnalysis {
                original_query: query.to_string(),
                intent: Intent::TicketLookup,
                entities: HashMap::new(),
                recommended_sources: vec![SourceKind::TicketTracker],
                per_source_queries: HashMap::from([(SourceKind::TicketTracker, query.to_string())]),
                confidence: 0.95,
                reasoning: "detected a ticket-style identifier".to_string(),
            });
        }

        const DOC_PHRASES: &[&str] = &["how to", "how do i", "guide", "tutorial", "documentation", "docs", "runbook", "playbook"];
        if DOC_PHRASES.iter().any(|p| lower.contains(p)) {
            return Some(simple_analysis(query, Intent::Documentation, &[SourceKind::Wiki, SourceKind::TicketTracker], 0.85, "looks like a documentation request"));
        }

        const STATUS_PHRASES: &[&str] = &["status", "progress", "sprint", "release", "roadmap", "milestone"];
        if STATUS_PHRASES.iter().any(|p| lower.contains(p)) {
            return Some(simple_analysis(
                query,
                Intent::ProjectStatus,
                &[SourceKind::TicketTracker, SourceKind::Wiki, SourceKind::Chat],
                0.8,
                "looks like a project or sprint status question",
            ));
        }

        const COMM_PHRASES: &[&str] = &["slack", "chat", "thread", "message", "standup", "discussion"];
        if COMM_PHRASES.iter().any(|p| lower.contains(p)) {
            return Some(simple_analysis(query, Intent::TeamCommunication, &[SourceKind::Chat, SourceKind::Wiki], 0.85, "looks like a team communication search"));
        }

        const PERSON_PHRASES: &[&str] = &["who is", "who are", "owner", "assignee", "responsible", "contact"];
        if PERSON_PHRASES.iter().any(|p| lower.contains(p)) {
            return Some(simple_analysis(
                query,
                Intent::PersonLookup,
                &[SourceKind::TicketTracker, SourceKind::Chat, SourceKind::Wiki],
                0.75,
                "looks like a person or ownership lookup",
            ));
        }

        const ISSUE_PHRASES: &[&str] = &["bug", "issue", "error", "broken", "problem"];
        if ISSUE_PHRASES.iter().any(|p| lower.contains(p)) {
            return Some(simple_analysis(query, Intent::TicketSearch, &[SourceKind::TicketTracker, SourceKind::Wiki], 0.8, "looks like a bug or issue search"));
        }

        None
    }

    async fn tier_b(&self, query: &str) -> Option<QueryAnalysis> {
        let prompt = classification_prompt(query);
        let response = match self.llm.answer("You are a query analysis assistant. Respond with JSON only.", &prompt).await {
            Ok(r) => r,
            Err(err) => {
                warn!(error = %err, "query router: LLM classification call failed");
                return None;
            }
        };

        let json_start = response.find('{')?;
        let json_end = response.rfind('}')?;
        let candidate = &response[json_start..=json_end];
        let parsed: LlmClassification = match serde_json::from_str(candidate) {
            Ok(p) => p,
            Err(err) => {
                warn!(error = %err, "query router: LLM response was not well-formed JSON");
                return None;
            }
        };

        let intent = parse_intent(&parsed.intent);
        let mut sources: Vec<SourceKind> = parsed.sources.iter().filter_map(|s| s.parse().ok()).collect();
        if let Some(pos) = sources.iter().position(|s| *s == SourceKind::Web) {
            let web = sources.remove(pos);
            sources.push(web);
        }
        if sources.is_empty() {
            sources = vec![SourceKind::TicketTracker, SourceKind::Wiki];
        }

        let mut per_source_queries = HashMap::new();
        for source in &sources {
            let q = parsed.per_source_queries.get(source.as_str()).cloned().unwrap_or_else(|| query.to_string());
            per_source_queries.insert(*source, q);
        }

        Some(QueryAnalysis {
            original_query: query.to_string(),
            intent,
            entities: parsed.entities,
            recommended_sources: sources,
            per_source_queries,
            confidence: parsed.confidence,
            reasoning: parsed.reasoning,
        })
    }

    /// Source-required policy (§4.7): does `analysis` need a backend this
    /// deployment doesn't have configured?
    pub fn missing_required_source(&self, analysis: &QueryAnalysis, available: &[SourceKind]) -> Option<SourceKind> {
        analysis.intent.required_source().filter(|required| !available.contains(required))
    }
}

fn simple_analysis(query: &str, intent: Intent, sources: &[SourceKind], confidence: f64, reasoning: &str) -> QueryAnalysis {
    QueryAnalysis {
        original_query: query.to_string(),
        intent,
        entities: HashMap::new(),
        recommended_sources: sources.to_vec(),
        per_source_queries: sources.iter().map(|s| (*s, query.to_string())).collect(),
        confidence,
        reasoning: reasoning.to_string(),
    }
}

fn fallback_analysis(query: &str) -> QueryAnalysis {
    let sources = vec![SourceKind::TicketTracker, SourceKind::Wiki, SourceKind::Chat];
    QueryAnalysis {
        original_query: query.to_string(),
        intent: Intent::Unknown,
        entities: HashMap::new(),
        recommended_sources: sources.clone(),
        per_source_queries: sources.into_iter().map(|s| (s, query.to_string())).collect(),
        confidence: 0.5,
        reasoning: "neither tier classified the query; searching all default sources".to_string(),
    }
}

fn classification_prompt(query: &str) -> String {
    format!(
        "Analyze this user query and respond with a JSON object with fields: \
         intent (one of: ticket_lookup, ticket_search, documentation, project_status, \
         team_communication, person_lookup, code_related, general_knowledge, unknown), \
         entities (object of string lists), sources (subset of ticket_tracker, wiki, chat, \
         code_host, document_store, web), per_source_queries (object keyed by source), \
         confidence (0.0-1.0), reasoning (short string).\n\nQuery: \"{}\"",
        query
    )
}

fn parse_intent(raw: &str) -> Intent {
    match raw {
        "ticket_lookup" => Intent::TicketLookup,
        "ticket_search" => Intent::TicketSearch,
        "documentation" => Intent::Documentation,
        "project_status" => Intent::ProjectStatus,
        "team_communication" => Intent::TeamCommunication,
        "person_lookup" => Intent::PersonLookup,
        "code_related" => Intent::CodeRelated,
        "general_knowledge" => Intent::GeneralKnowledge,
        _ => Intent::Unknown,
    }
}

#[derive(Debug, Deserialize)]
struct LlmClassification {
    intent: String,
    #[serde(default)]
    entities: HashMap<String, String>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    per_source_queries: HashMap<String, String>,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

fn default_confidence() -> f64 {
    0.7
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StubLlmClient;

    fn router() -> QueryRouter {
        QueryRouter::new(Arc::new(StubLlmClient))
    }

    #[tokio::test]
    async fn ticket_id_routes_to_ticket_lookup() {
        let analysis = router().analyze("what's the status of PROJ-1234").await;
        assert_eq!(analysis.intent, Intent::TicketLookup);
        assert_eq!(analysis.recommended_sources, vec![SourceKind::TicketTracker]);
        assert!(analysis.confidence > 0.9);
    }

    #[tokio::test]
    async fn documentation_phrase_routes_to_documentation() {
        let analysis = router().analyze("how to deploy the service").await;
        assert_eq!(analysis.intent, Intent::Documentation);
    }

    #[tokio::test]
    async fn missing_required_source_is_reported() {
        let router = router();
        let analysis = router.analyze("PROJ-1 details").await;
        assert_eq!(router.missing_required_source(&analysis, &[SourceKind::Wiki]), Some(SourceKind::TicketTracker));
        assert_eq!(router.missing_required_source(&analysis, &[SourceKind::TicketTracker]), None);
    }
}
