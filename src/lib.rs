//! # Knowledge Gateway
//!
//! A federated query gateway that fans a user's question out to several
//! knowledge sources (ticket trackers, wikis, chat history, code search,
//! and more), ranks and deduplicates what comes back, and hands the result
//! to an LLM to assemble a grounded, cited answer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use knowledge_gateway::{Config, AppState, create_router};
//! use std::net::SocketAddr;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::for_test(); // or Config::parse_args() for CLI
//!     let state = AppState::new(config).await;
//!     let app = create_router(state);
//!
//!     let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
//!     let listener = tokio::net::TcpListener::bind(addr).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`config`] - configuration management with CLI and environment support
//! - [`record`] - the shared domain model: sources, records, queries, chat turns
//! - [`error`] - gateway-wide error type and its HTTP mapping
//! - [`rate_limiting`] - token bucket + sliding window limiter
//! - [`circuit_breaker`] - three-state breaker guarding each knowledge source
//! - [`caching`] - layered L1/L2 response cache
//! - [`chunker`] - document chunking for adapters that ingest long text
//! - [`services`] - the [`services::KnowledgeAdapter`] trait and stub adapters
//! - [`envelope`] - the Integration Service Envelope wrapping every adapter call
//! - [`orchestrator`] - parallel fan-out, ranking, and streaming search
//! - [`routing`] - query intent classification (pattern-first, LLM fallback)
//! - [`rag`] - security preflight and prompt assembly over retrieved evidence
//! - [`store`] - chat history and per-user settings persistence
//! - [`llm`] - the LLM client used by both the router and the RAG assembler
//! - [`server`] - the Gateway API's HTTP surface

pub mod core;
pub mod config;
pub mod error;
pub mod schemas;
pub mod graceful_shutdown;

pub mod record;
pub mod rate_limiting;
pub mod circuit_breaker;
pub mod caching;
pub mod chunker;
pub mod services;
pub mod envelope;
pub mod orchestrator;
pub mod routing;
pub mod rag;
pub mod store;
pub mod llm;

#[cfg(feature = "server")]
pub mod server;

pub use config::Config;
pub use error::ProxyError;
pub use core::http_client::{HttpClientBuilder, HttpClientConfig};
pub use graceful_shutdown::{GracefulShutdown, ServerLifecycle, ShutdownConfig, setup_shutdown_handler};

pub use record::{ChatTurn, Intent, QueryAnalysis, Record, SearchQuery, ServiceConfig, SourceKind};
pub use envelope::{IntegrationServiceEnvelope, ServiceHealth};
pub use orchestrator::{Orchestrator, OrchestratorConfig, SearchOutcome, StreamEvent};
pub use routing::QueryRouter;
pub use rag::{AnswerEvent, RagAssembler};
pub use store::{HistoryStore, SettingsStore, UserSettings};
pub use llm::LlmClient;

#[cfg(feature = "server")]
pub use server::{AppState, create_router};

/// The result type used throughout the library
pub type Result<T> = std::result::Result<T, ProxyError>;
