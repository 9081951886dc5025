//! # Server Module
//!
//! Wires the Gateway API's HTTP surface under `/api` (chat, settings, chat
//! history, diagnostics) plus the internal Orchestrator search endpoints at
//! the root, all sharing one [`AppState`] (§6).

pub mod handlers;
pub mod state;

pub use state::AppState;

use axum::routing::{delete, get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::{self, TraceLayer};
use tracing::Level;

/// Create the Gateway API router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let gateway_api = Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check))
        .route("/settings", post(handlers::put_settings))
        .route("/settings/{user_id}", get(handlers::get_settings))
        .route("/chat", post(handlers::chat))
        .route("/chat/stream", post(handlers::chat_stream))
        .route("/chat/history/{session_id}", get(handlers::get_chat_history))
        .route("/chat/history/{session_id}", delete(handlers::delete_chat_history))
        .route("/services", get(handlers::list_services))
        .route("/test-connection", post(handlers::test_connection))
        .route("/test-integration/{name}", post(handlers::test_integration));

    let orchestrator_api = Router::new()
        .route("/search", post(handlers::search))
        .route("/search/stream", post(handlers::search_stream))
        .route("/services", get(handlers::list_services))
        .route("/services/{name}/enable", post(handlers::enable_service))
        .route("/services/{name}/disable", post(handlers::disable_service))
        .route("/services/{name}/refresh", post(handlers::refresh_service));

    Router::new()
        .nest("/api", gateway_api)
        .merge(orchestrator_api)
        .layer(
            ServiceBuilder::new()
                .layer(CompressionLayer::new())
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
