//! # RAG Assembler
//!
//! Turns a ranked [`Record`] list and recent conversation history into a
//! single LLM prompt, then drives the non-streaming and streaming answer
//! interfaces over it (§4.8). The security preamble, history block and
//! evidence block are assembled in a fixed order every time so the prompt
//! shape is predictable regardless of what the orchestrator returned.

use super::security::security_enhanced_system_prompt;
use crate::error::ProxyError;
use crate::llm::LlmClient;
use crate::record::{ChatTurn, Record};
use futures_util::stream::Stream;
use futures_util::StreamExt;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;

/// Number of most-recent chat turns folded into the prompt's history block.
const HISTORY_TURN_LIMIT: usize = 5;
/// Number of top-ranked records folded into the prompt's evidence block.
const EVIDENCE_RECORD_LIMIT: usize = 5;
/// Per-record truncation applied before a record enters the evidence block.
const EVIDENCE_CHAR_LIMIT: usize = 500;

const ROLE_DESCRIPTION: &str = "You are a helpful assistant that answers questions using the \
retrieved context below. Cite the source each fact came from by name. If the context does not \
contain the answer, say so plainly instead of guessing.";

pub struct RagAssembler {
    llm: Arc<dyn LlmClient>,
}

/// A single piece of evidence surfaced to the client through the `context`
/// and `done` events, independent of the LLM-facing prompt block.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerDocument {
    pub source: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub excerpt: String,
}

/// One step of the Assembler's streaming envelope (§4.8):
/// `start -> sources -> context(count, used_sources, documents) -> chunk(text)* -> done(sources, used_sources, documents)`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AnswerEvent {
    Start(Vec<String>),
    Sources(Vec<String>),
    Context { count: usize, used_sources: Vec<String>, documents: Vec<AnswerDocument> },
    Chunk(String),
    Done { sources: Vec<String>, used_sources: Vec<String>, documents: Vec<AnswerDocument> },
    Error(String),
}

impl RagAssembler {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn build_prompt(&self, query: &str, history: &[ChatTurn], evidence: &[Record]) -> (String, String) {
        let system_message = security_enhanced_system_prompt(ROLE_DESCRIPTION);

        let mut user_message = String::new();
        if !history.is_empty() {
            user_message.push_str("Conversation history:\n");
            for turn in history.iter().rev().take(HISTORY_TURN_LIMIT).collect::<Vec<_>>().into_iter().rev() {
                user_message.push_str(&format!("User: {}\nAssistant: {}\n", turn.user_message, turn.bot_response));
            }
            user_message.push('\n');
        }

        if !evidence.is_empty() {
            user_message.push_str("Retrieved context:\n");
            for record in evidence.iter().take(EVIDENCE_RECORD_LIMIT) {
                let truncated = truncate_chars(&record.content, EVIDENCE_CHAR_LIMIT);
                user_message.push_str(&format!("[{} - {}] {}\n\n", record.source, record.title, truncated));
            }
        }

        user_message.push_str(&format!("Current Question: {}\n\nCite the sources you used.", query));
        (system_message, user_message)
    }

    /// Non-streaming answer: assemble the prompt, call the LLM once.
    pub async fn answer(&self, query: &str, history: &[ChatTurn], evidence: &[Record]) -> Result<String, ProxyError> {
        let (system_message, user_message) = self.build_prompt(query, history, evidence);
        self.llm.answer(&system_message, &user_message).await
    }

    /// Streaming answer: start -> sources -> context -> chunk* -> done/error.
    pub async fn stream_answer(
        &self,
        query: &str,
        history: &[ChatTurn],
        evidence: &[Record],
    ) -> Pin<Box<dyn Stream<Item = AnswerEvent> + Send>> {
        let (system_message, user_message) = self.build_prompt(query, history, evidence);

        let sources: Vec<String> = evidence.iter().map(|r| r.source.to_string()).collect();
        let mut used_sources = sources.clone();
        used_sources.sort();
        used_sources.dedup();

        let documents: Vec<AnswerDocument> = evidence
            .iter()
            .take(EVIDENCE_RECORD_LIMIT)
            .map(|r| AnswerDocument {
                source: r.source.to_string(),
                title: r.title.clone(),
                url: r.url.clone(),
                excerpt: truncate_chars(&r.content, EVIDENCE_CHAR_LIMIT),
            })
            .collect();

        let llm_stream = match self.llm.stream_answer(&system_message, &user_message).await {
            Ok(stream) => stream,
            Err(err) => {
                let message = err.to_string();
                return Box::pin(futures_util::stream::iter(vec![
                    AnswerEvent::Start(used_sources.clone()),
                    AnswerEvent::Sources(sources),
                    AnswerEvent::Context { count: documents.len(), used_sources, documents },
                    AnswerEvent::Error(message),
                ]));
            }
        };

        let prefix = futures_util::stream::iter(vec![
            AnswerEvent::Start(used_sources.clone()),
            AnswerEvent::Sources(sources.clone()),
            AnswerEvent::Context { count: documents.len(), used_sources: used_sources.clone(), documents: documents.clone() },
        ]);
        let chunks = llm_stream.map(AnswerEvent::Chunk);
        let suffix = futures_util::stream::iter(vec![AnswerEvent::Done { sources, used_sources, documents }]);
        Box::pin(prefix.chain(chunks).chain(suffix))
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StubLlmClient;
    use crate::record::SourceKind;

    fn sample_record() -> Record {
        Record::new(SourceKind::Wiki, "1", "Deploy Runbook", "Run the deploy script from the release branch.")
    }

    #[tokio::test]
    async fn answer_cites_and_reaches_the_llm() {
        let assembler = RagAssembler::new(Arc::new(StubLlmClient));
        let answer = assembler.answer("how do I deploy?", &[], &[sample_record()]).await.unwrap();
        assert!(answer.contains("deploy"));
    }

    #[tokio::test]
    async fn stream_answer_emits_start_then_sources_then_context_then_chunks_then_done() {
        let assembler = RagAssembler::new(Arc::new(StubLlmClient));
        let mut stream = assembler.stream_answer("how do I deploy?", &[], &[sample_record()]).await;
        let events: Vec<_> = {
            let mut collected = Vec::new();
            while let Some(event) = stream.next().await {
                collected.push(event);
            }
            collected
        };
        assert!(matches!(events.first(), Some(AnswerEvent::Start(_))));
        assert!(matches!(events.get(1), Some(AnswerEvent::Sources(_))));
        assert!(matches!(events.get(2), Some(AnswerEvent::Context { .. })));
        assert!(matches!(events.last(), Some(AnswerEvent::Done { .. })));
        assert!(events.iter().any(|e| matches!(e, AnswerEvent::Chunk(_))));

        if let Some(AnswerEvent::Done { used_sources, documents, .. }) = events.last() {
            assert_eq!(used_sources, &["wiki".to_string()]);
            assert_eq!(documents.len(), 1);
        } else {
            panic!("expected a Done event");
        }
    }

    #[test]
    fn evidence_is_truncated_in_the_prompt() {
        let assembler = RagAssembler::new(Arc::new(StubLlmClient));
        let long_record = Record::new(SourceKind::Wiki, "1", "Long", &"x".repeat(1000));
        let (_, user_message) = assembler.build_prompt("q", &[], &[long_record]);
        assert!(user_message.len() < 1000);
    }
}
