//! SSE event ordering for the Orchestrator's streaming search and the RAG
//! Assembler's streaming answer (§4.6, §4.8): the gateway must preserve
//! arrival order and always terminate with exactly one closing event.

use futures_util::StreamExt;
use knowledge_gateway::orchestrator::StreamEvent;
use knowledge_gateway::rag::AnswerEvent;
use knowledge_gateway::record::SearchQuery;
use knowledge_gateway::{AppState, Config};
use std::sync::Arc;

#[tokio::test]
async fn stream_search_starts_and_ends_with_exactly_one_start_and_done() {
    let state = AppState::new(Config::for_test()).await;
    let orchestrator = Arc::clone(&state.orchestrator);

    let query = SearchQuery::new("deploy the service");
    let mut stream = orchestrator.stream_search(query, None);

    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(StreamEvent::Start { .. })));
    assert!(matches!(events.last(), Some(StreamEvent::Done { .. })));
    assert_eq!(events.iter().filter(|e| matches!(e, StreamEvent::Start { .. })).count(), 1);
    assert_eq!(events.iter().filter(|e| matches!(e, StreamEvent::Done { .. })).count(), 1);
}

#[tokio::test]
async fn stream_answer_preserves_sources_context_chunk_done_order() {
    let state = AppState::new(Config::for_test()).await;
    let query = SearchQuery::new("how do I deploy?");
    let outcome = state.orchestrator.search(&query, None).await;

    let mut stream = state.rag.stream_answer("how do I deploy?", &[], &outcome.results).await;
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }

    assert!(matches!(events[0], AnswerEvent::Start(_)));
    assert!(matches!(events[1], AnswerEvent::Sources(_)));
    assert!(matches!(events[2], AnswerEvent::Context { .. }));
    assert!(matches!(events.last(), Some(AnswerEvent::Done { .. })));
}
