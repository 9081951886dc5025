//! # Gateway API Handlers
//!
//! HTTP route handlers for the Gateway API (§6): chat (sync and streaming),
//! per-user settings, chat history, and service administration. Each handler
//! is a thin translation between the HTTP surface and the Orchestrator,
//! Query Router, RAG Assembler and stores already wired into [`AppState`].

use super::AppState;
use crate::error::ProxyError;
use crate::orchestrator::StreamEvent;
use crate::rag::assembler::AnswerEvent;
use crate::rag::security::validate_query;
use crate::record::{ChatTurn, Record, SearchQuery};
use crate::store::UserSettings;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use axum::Json;
use futures_util::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

fn default_user_id() -> String {
    "anonymous".to_string()
}

/// `GET /api/`
pub async fn index() -> impl IntoResponse {
    JsonResponse(serde_json::json!({
        "message": "knowledge gateway online",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /api/health`
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator_ok = !state.orchestrator.registered_configs().is_empty();
    JsonResponse(serde_json::json!({
        "status": "healthy",
        "orchestrator": if orchestrator_ok { "ready" } else { "no services registered" },
        "database": "in_process",
    }))
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub sources: Vec<Record>,
    pub context: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub requires_setup: bool,
}

/// Top `n` evidence excerpts, `[source - title] snippet`, for the
/// non-streaming response's `context` field.
fn context_excerpts(records: &[Record], n: usize) -> Vec<String> {
    records
        .iter()
        .take(n)
        .map(|r| format!("[{} - {}] {}", r.source, r.title, r.content.chars().take(160).collect::<String>()))
        .collect()
}

/// Validates the query, classifies intent, fans out across the
/// Orchestrator's registered services, then assembles and returns a single
/// answer over the ranked evidence (§6). A missing required source is a
/// success envelope with `requires_setup: true`, per §7, not an HTTP error.
pub async fn chat(
    State(state): State<AppState>,
    Query(_user): Query<UserIdQuery>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ProxyError> {
    let validated = validate_query(&req.message).map_err(ProxyError::BadRequest)?;
    let session_id = req.session_id;

    let analysis = state.query_router.analyze(&validated.text).await;
    if let Some(missing) = state.query_router.missing_required_source(&analysis, &state.orchestrator.available_sources()) {
        return Ok(Json(ChatResponse {
            response: format!("This query requires {} access, which is not configured.", missing),
            sources: Vec::new(),
            context: Vec::new(),
            requires_setup: true,
        })
        .into_response());
    }

    let requested = state.orchestrator.services_for_sources(&analysis.recommended_sources);
    let requested = (!requested.is_empty()).then_some(requested);

    let query = SearchQuery::new(validated.text.clone());
    let outcome = state.orchestrator.search(&query, requested.as_deref()).await;

    let history = state.history.recent(&session_id, state.config.rag_history_turns).await;
    let answer = state.rag.answer(&validated.text, &history, &outcome.results).await?;
    let context = context_excerpts(&outcome.results, 3);

    state
        .history
        .append(
            &session_id,
            ChatTurn {
                session_id: session_id.clone(),
                user_message: validated.text,
                bot_response: answer.clone(),
                sources: outcome.results.iter().map(|r| r.source).collect(),
                timestamp: now_unix(),
            },
        )
        .await;

    Ok(Json(ChatResponse { response: answer, sources: outcome.results, context, requires_setup: false }).into_response())
}

fn answer_event_to_sse(event: AnswerEvent) -> Event {
    Event::default().data(serde_json::to_string(&event).unwrap_or_default())
}

/// Proxies buffer SSE responses unless told not to (§6); stamp the headers
/// that keep chunks flushed as they're produced instead of batched.
fn sse_response(sse: Sse<impl futures_util::Stream<Item = Result<Event, Infallible>> + Send + 'static>) -> Response {
    let mut response = sse.into_response();
    let headers = response.headers_mut();
    headers.insert(axum::http::header::CACHE_CONTROL, axum::http::HeaderValue::from_static("no-cache"));
    headers.insert(axum::http::header::CONNECTION, axum::http::HeaderValue::from_static("keep-alive"));
    headers.insert("X-Accel-Buffering", axum::http::HeaderValue::from_static("no"));
    response
}

/// Same flow as [`chat`], but streams the Assembler's `start -> sources ->
/// context -> chunk* -> done` envelope over SSE instead of waiting for the
/// full answer (§4.8). A missing required source still emits a single
/// `error` event rather than failing the HTTP upgrade.
pub async fn chat_stream(
    State(state): State<AppState>,
    Query(_user): Query<UserIdQuery>,
    Json(req): Json<ChatRequest>,
) -> Response {
    let session_id = req.session_id;

    let validated = match validate_query(&req.message) {
        Ok(v) => v,
        Err(message) => {
            let events = vec![AnswerEvent::Error(message)];
            return sse_response(Sse::new(futures_util::stream::iter(events).map(|e| Ok(answer_event_to_sse(e)))));
        }
    };

    let analysis = state.query_router.analyze(&validated.text).await;
    if let Some(missing) = state.query_router.missing_required_source(&analysis, &state.orchestrator.available_sources()) {
        let events = vec![AnswerEvent::Error(format!("this query requires {} access, which is not configured", missing))];
        return sse_response(Sse::new(futures_util::stream::iter(events).map(|e| Ok(answer_event_to_sse(e)))));
    }

    let requested = state.orchestrator.services_for_sources(&analysis.recommended_sources);
    let requested = (!requested.is_empty()).then_some(requested);

    let query = SearchQuery::new(validated.text.clone());
    let outcome = state.orchestrator.search(&query, requested.as_deref()).await;
    let history = state.history.recent(&session_id, state.config.rag_history_turns).await;

    let answer_stream = state.rag.stream_answer(&validated.text, &history, &outcome.results).await;

    let history_store = state.history.clone();
    let query_text = validated.text.clone();
    let sources: Vec<_> = outcome.results.iter().map(|r| r.source).collect();
    let mut collected = String::new();

    let sse_stream = answer_stream.map(move |event| {
        if let AnswerEvent::Chunk(chunk) = &event {
            collected.push_str(chunk);
        }
        if matches!(event, AnswerEvent::Done { .. }) {
            let turn = ChatTurn {
                session_id: session_id.clone(),
                user_message: query_text.clone(),
                bot_response: collected.clone(),
                sources: sources.clone(),
                timestamp: now_unix(),
            };
            let history_store = history_store.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                history_store.append(&session_id, turn).await;
            });
        }
        Ok(answer_event_to_sse(event))
    });

    sse_response(Sse::new(sse_stream))
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub status: String,
    pub message: String,
}

/// `POST /api/settings?user_id=…`
pub async fn put_settings(
    State(state): State<AppState>,
    Query(user): Query<UserIdQuery>,
    Json(settings): Json<UserSettings>,
) -> impl IntoResponse {
    state.settings.upsert(&user.user_id, settings).await;
    JsonResponse(SettingsResponse { status: "ok".to_string(), message: "settings saved".to_string() })
}

/// `GET /api/settings/{user_id}`
pub async fn get_settings(State(state): State<AppState>, Path(user_id): Path<String>) -> impl IntoResponse {
    JsonResponse(state.settings.get(&user_id).await)
}

#[derive(Debug, Serialize)]
pub struct ChatHistoryResponse {
    pub history: Vec<ChatTurn>,
}

/// `GET /api/chat/history/{session_id}`
pub async fn get_chat_history(State(state): State<AppState>, Path(session_id): Path<String>) -> impl IntoResponse {
    JsonResponse(ChatHistoryResponse { history: state.history.list(&session_id).await })
}

/// `DELETE /api/chat/history/{session_id}`
pub async fn delete_chat_history(State(state): State<AppState>, Path(session_id): Path<String>) -> impl IntoResponse {
    let deleted_count = state.history.clear(&session_id).await;
    JsonResponse(serde_json::json!({ "status": "ok", "deleted_count": deleted_count }))
}

#[derive(Debug, Serialize)]
pub struct ServiceStatusEntry {
    pub name: String,
    pub enabled: bool,
    pub url: String,
    pub status: &'static str,
    pub priority: u32,
}

/// `GET /api/services` (gateway) and `GET /services` (orchestrator API).
pub async fn list_services(State(state): State<AppState>) -> impl IntoResponse {
    let health: std::collections::HashMap<String, bool> =
        state.orchestrator.services_status().into_iter().map(|h| (h.name, h.healthy)).collect();

    let entries: Vec<ServiceStatusEntry> = state
        .orchestrator
        .registered_configs()
        .into_iter()
        .map(|config| {
            let healthy = health.get(&config.name).copied().unwrap_or(false);
            let status = if !config.enabled {
                "disabled"
            } else if healthy {
                "healthy"
            } else {
                "degraded"
            };
            ServiceStatusEntry { name: config.name, enabled: config.enabled, url: config.base_url, status, priority: config.priority }
        })
        .collect();

    JsonResponse(entries)
}

/// `POST /services/{name}/enable`
pub async fn enable_service(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    let found = state.orchestrator.set_enabled(&name, true);
    found.then_some(axum::http::StatusCode::NO_CONTENT).unwrap_or(axum::http::StatusCode::NOT_FOUND)
}

/// `POST /services/{name}/disable`
pub async fn disable_service(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    let found = state.orchestrator.set_enabled(&name, false);
    found.then_some(axum::http::StatusCode::NO_CONTENT).unwrap_or(axum::http::StatusCode::NOT_FOUND)
}

/// `POST /services/{name}/refresh`
pub async fn refresh_service(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    let refreshed = state.orchestrator.refresh_all().await;
    match refreshed.into_iter().find(|h| h.name == name) {
        Some(health) => JsonResponse(serde_json::json!({ "name": health.name, "healthy": health.healthy })).into_response(),
        None => axum::http::StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub services: Option<Vec<String>>,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub include_metadata: bool,
}

fn default_search_limit() -> usize {
    10
}

/// `POST /search` (Orchestrator API): raw ranked results, no RAG assembly.
pub async fn search(State(state): State<AppState>, Json(req): Json<SearchRequest>) -> impl IntoResponse {
    let _ = (req.parallel, req.include_metadata); // dispatch is always parallel/bounded and metadata is always populated.
    let query = SearchQuery::new(req.query).with_limit(req.limit);
    let outcome = state.orchestrator.search(&query, req.services.as_deref()).await;
    JsonResponse(outcome)
}

fn stream_event_to_sse(event: StreamEvent) -> Event {
    Event::default().data(serde_json::to_string(&event).unwrap_or_default())
}

/// `POST /search/stream`: emits `start -> results/no_results/error* -> done`
/// as each service completes (§4.6).
pub async fn search_stream(State(state): State<AppState>, Json(req): Json<SearchRequest>) -> Response {
    let query = SearchQuery::new(req.query).with_limit(req.limit);
    let stream = state.orchestrator.clone().stream_search(query, req.services);
    sse_response(Sse::new(stream.map(|event| Ok(stream_event_to_sse(event)))))
}

#[derive(Debug, Deserialize)]
pub struct TestConnectionRequest {
    #[serde(default)]
    pub services: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct IntegrationTestResult {
    pub status: &'static str,
    pub message: String,
}

/// `POST /test-connection`: per-integration credential/reachability probe.
/// With only stand-in adapters registered, this reports each requested
/// service's circuit/health state rather than performing a live call.
pub async fn test_connection(State(state): State<AppState>, Json(req): Json<TestConnectionRequest>) -> impl IntoResponse {
    let wanted = req.services;
    let results: std::collections::HashMap<String, IntegrationTestResult> = state
        .orchestrator
        .services_status()
        .into_iter()
        .filter(|h| wanted.as_ref().map_or(true, |names| names.contains(&h.name)))
        .map(|h| {
            let result = if h.healthy {
                IntegrationTestResult { status: "ok", message: "reachable".to_string() }
            } else {
                IntegrationTestResult { status: "error", message: "circuit open".to_string() }
            };
            (h.name, result)
        })
        .collect();
    JsonResponse(results)
}

/// `POST /test-integration/{name}`: single-integration probe; 400 if the
/// name isn't a registered service.
pub async fn test_integration(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, ProxyError> {
    let health = state.orchestrator.services_status().into_iter().find(|h| h.name == name);
    match health {
        Some(h) if h.healthy => Ok(JsonResponse(IntegrationTestResult { status: "ok", message: "reachable".to_string() }).into_response()),
        Some(_) => Ok(JsonResponse(IntegrationTestResult { status: "error", message: "circuit open".to_string() }).into_response()),
        None => Err(ProxyError::BadRequest(format!("unknown integration '{}'", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn chat_returns_an_answer_with_sources() {
        let state = AppState::new(Config::for_test()).await;
        let response = chat(
            State(state),
            Query(UserIdQuery { user_id: "u1".to_string() }),
            Json(ChatRequest { message: "how do I deploy the service?".to_string(), session_id: "s1".to_string() }),
        )
        .await;
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn chat_rejects_empty_query() {
        let state = AppState::new(Config::for_test()).await;
        let response = chat(
            State(state),
            Query(UserIdQuery { user_id: "u1".to_string() }),
            Json(ChatRequest { message: "".to_string(), session_id: "s1".to_string() }),
        )
        .await;
        assert!(response.is_err());
    }

    #[tokio::test]
    async fn chat_reports_requires_setup_for_a_missing_source() {
        let state = AppState::new(Config::for_test()).await;
        for config in state.orchestrator.registered_configs() {
            if config.source == crate::record::SourceKind::Chat {
                state.orchestrator.set_enabled(&config.name, false);
            }
        }
        let response = chat(
            State(state),
            Query(UserIdQuery { user_id: "u1".to_string() }),
            Json(ChatRequest { message: "show me the slack thread about the incident".to_string(), session_id: "s1".to_string() }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn list_services_reports_the_default_catalog() {
        let state = AppState::new(Config::for_test()).await;
        let response = list_services(State(state)).await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
