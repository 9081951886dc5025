//! # Knowledge Gateway — binary entry point
//!
//! Parses configuration, builds the shared [`AppState`] (Orchestrator,
//! Query Router, RAG Assembler, stores), and serves the Gateway API over
//! HTTP/2 with prior knowledge, the same manual `hyper` accept loop the
//! library has always used.

use hyper::server::conn::http2;
use hyper_util::rt::{TokioExecutor, TokioIo};
use knowledge_gateway::{create_router, AppState, Config, ServerLifecycle, ShutdownConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tower::Service;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();

    let state = AppState::new(config.clone()).await;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("knowledge gateway starting on http://{}", addr);
    info!("LLM backend: {}", config.llm_url);
    info!("HTTP/2 enabled with prior knowledge (h2c)");

    let lifecycle = ServerLifecycle::new(ShutdownConfig::default());
    lifecycle.start().await?;
    let shutdown = lifecycle.shutdown().clone();

    let listener = tokio::net::TcpListener::bind(addr).await?;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let app = app.clone();

                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = hyper::service::service_fn(move |req| {
                        let mut app = app.clone();
                        async move {
                            app.call(req).await.map_err(|e| {
                                tracing::error!("service error: {:?}", e);
                                std::io::Error::new(std::io::ErrorKind::Other, format!("{:?}", e))
                            })
                        }
                    });

                    if let Err(err) = http2::Builder::new(TokioExecutor::new()).serve_connection(io, service).await {
                        tracing::error!("HTTP/2 connection error: {:?}", err);
                    }
                });
            }
            _ = async {
                while !shutdown.is_shutdown_initiated() {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            } => {
                info!("shutdown signal received, no longer accepting new connections");
                break;
            }
        }
    }

    shutdown.graceful_shutdown(Duration::from_secs(10), || async { Ok(()) }).await?;
    Ok(())
}
