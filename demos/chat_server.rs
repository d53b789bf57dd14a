//! Chat-completions HTTP server example (requires the `server` feature)
//!
//! Mounts `POST /chat/completions` against a single local backend and
//! serves it on `127.0.0.1:8080`, shaped exactly like an OpenAI
//! chat-completions endpoint plus the `content_type` SSE extension.
//!
//! Usage:
//!   cargo run --example chat_server --features server

use open_agent_rt::llm::endpoints::{Backend, EndpointPool};
use open_agent_rt::{AppState, LlmClient, RuntimeConfig, ToolRegistry};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let llm = LlmClient::new(EndpointPool::single(Backend::new(
        "http://localhost:11434/v1",
        "not-needed",
        "qwen3:8b",
    )));

    let runtime_config = RuntimeConfig::from_env()?;
    let registry = Arc::new(ToolRegistry::new());

    let state = Arc::new(AppState::new(
        llm,
        "You are a helpful assistant.",
        registry,
        &runtime_config,
        "qwen3:8b",
    ));

    let app = open_agent_rt::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
