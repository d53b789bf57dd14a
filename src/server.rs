//! Client-facing HTTP surface: `POST <base>/chat/completions`, shaped as an
//! OpenAI chat-completion endpoint.
//!
//! Thin on purpose. The route handler resolves a session's memory from the
//! [`MemoryPool`], builds one [`Agent`] for the request, drives the ReAct (or
//! Skill) loop, and relays the [`SseStreamer`] either as a live SSE body or,
//! for non-streaming requests, as a single aggregated JSON response. `axum`
//! is pulled in only behind the `server` feature, so library-only
//! consumers don't pay for it.

use crate::agent::{react, skill_loop, Agent, AgentConfig};
use crate::config::RuntimeConfig;
use crate::error::Error;
use crate::hooks::HookBus;
use crate::llm::LlmClient;
use crate::memory::pool::MemoryPool;
use crate::skills::SkillManager;
use crate::streamer::SseStreamer;
use crate::tools::registry::ToolRegistry;

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Shared, request-independent state backing every route.
pub struct AppState {
    pub llm: LlmClient,
    pub system_prompt: String,
    pub registry: Arc<ToolRegistry>,
    pub hooks: Arc<HookBus>,
    pub memory_pool: Arc<MemoryPool>,
    pub agent_config: AgentConfig,
    pub idle_timeout: Duration,
    pub model: String,
    /// When set, requests are served by the skill-augmented loop instead
    /// of the plain ReAct loop.
    pub skills: Option<Arc<SkillManager>>,
}

impl AppState {
    pub fn new(
        llm: LlmClient,
        system_prompt: impl Into<String>,
        registry: Arc<ToolRegistry>,
        runtime_config: &RuntimeConfig,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            registry,
            hooks: Arc::new(HookBus::new(runtime_config.hook_default_timeout())),
            memory_pool: Arc::new(MemoryPool::new(runtime_config.memory_ttl(), runtime_config.max_memory_items)),
            agent_config: AgentConfig::from_runtime(runtime_config),
            idle_timeout: runtime_config.request_idle_timeout(),
            model: model.into(),
            skills: None,
        }
    }

    pub fn with_skills(mut self, skills: Arc<SkillManager>) -> Self {
        self.skills = Some(skills);
        self
    }
}

/// Builds the router. Mount at any base path with `.nest(base, router)`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat/completions", post(chat_completions))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ChatMessageIn {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsRequest {
    messages: Vec<ChatMessageIn>,
    #[serde(default)]
    stream: bool,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    session_id: Option<String>,
    timestamp: String,
}

fn error_response(error: &Error, session_id: Option<String>) -> Response {
    let body = ErrorBody {
        error: error.to_string(),
        session_id,
        timestamp: Utc::now().to_rfc3339(),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

#[derive(Debug, Serialize)]
struct NonStreamMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct NonStreamChoice {
    index: u32,
    message: NonStreamMessage,
    finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
struct NonStreamResponse {
    id: String,
    object: &'static str,
    model: String,
    session_id: String,
    choices: Vec<NonStreamChoice>,
}

/// Splits the incoming message list into "history to seed a fresh session
/// with" and "the latest user query", per this runtime's chat-completions
/// convention: the last message is taken as the live turn, mirroring how
/// the OpenAI-shaped chat-completions contract is conventionally consumed.
fn split_messages(messages: Vec<ChatMessageIn>) -> (Vec<ChatMessageIn>, String) {
    let mut messages = messages;
    let query = messages.pop().map(|m| m.content).unwrap_or_default();
    (messages, query)
}

async fn seed_history_if_fresh(agent: &Agent, history: Vec<ChatMessageIn>) {
    if history.is_empty() {
        return;
    }
    let mut memory = agent.memory_handle().lock().await;
    if !memory.messages().is_empty() {
        return;
    }
    for message in history {
        match message.role.as_str() {
            "system" => memory.add_system(message.content),
            "assistant" => memory.add_assistant_text(message.content),
            _ => memory.add_user(message.content),
        }
    }
}

async fn chat_completions(State(state): State<Arc<AppState>>, Json(request): Json<ChatCompletionsRequest>) -> Response {
    let requested_session_id = request.session_id.clone().unwrap_or_default();
    let (session_id, memory) = state.memory_pool.get_or_create(&requested_session_id, None).await;

    let (history, query) = split_messages(request.messages);
    let streamer = Arc::new(SseStreamer::new(state.model.clone(), state.idle_timeout));

    let agent = Agent::new(
        state.llm.clone(),
        state.system_prompt.clone(),
        streamer.clone(),
        state.registry.clone(),
        state.agent_config.clone(),
    )
    .with_hooks(state.hooks.clone());

    let agent = match agent.with_memory(memory) {
        Ok(agent) => agent,
        Err(error) => return error_response(&error, Some(session_id)),
    };

    seed_history_if_fresh(&agent, history).await;

    if request.stream {
        stream_response(state, agent, query, session_id, streamer).await
    } else {
        aggregate_response(state, agent, query, session_id, streamer).await
    }
}

async fn run_loop(state: &Arc<AppState>, agent: &Agent, query: &str) -> crate::error::Result<String> {
    match &state.skills {
        Some(skills) => skill_loop::run(agent, skills, query).await,
        None => react::run(agent, query).await,
    }
}

async fn stream_response(
    state: Arc<AppState>,
    agent: Agent,
    query: String,
    session_id: String,
    streamer: Arc<SseStreamer>,
) -> Response {
    let frames = streamer.start_streaming().await;

    tokio::spawn(async move {
        if let Err(error) = run_loop(&state, &agent, &query).await {
            tracing::warn!(%error, session_id = %session_id, "agent loop failed mid-stream");
        }
    });

    let body_stream = frames.map(|frame| Ok::<_, std::io::Error>(axum::body::Bytes::from(frame.to_sse_line())));
    let body = axum::body::Body::from_stream(body_stream);

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert("content-type", HeaderValue::from_static("text/event-stream"));
    headers.insert("cache-control", HeaderValue::from_static("no-cache"));
    headers.insert("connection", HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

async fn aggregate_response(
    state: Arc<AppState>,
    agent: Agent,
    query: String,
    session_id: String,
    streamer: Arc<SseStreamer>,
) -> Response {
    let collected = {
        let streamer = streamer.clone();
        tokio::spawn(async move { streamer.collect().await })
    };

    if let Err(error) = run_loop(&state, &agent, &query).await {
        return error_response(&error, Some(session_id));
    }

    let content = collected.await.unwrap_or_default();
    let body = NonStreamResponse {
        id: uuid::Uuid::new_v4().to_string(),
        object: "chat.completion",
        model: state.model.clone(),
        session_id,
        choices: vec![NonStreamChoice {
            index: 0,
            message: NonStreamMessage { role: "assistant", content },
            finish_reason: "stop",
        }],
    };
    Json(body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_messages_takes_last_as_query() {
        let messages = vec![
            ChatMessageIn { role: "system".to_string(), content: "be nice".to_string() },
            ChatMessageIn { role: "user".to_string(), content: "hello".to_string() },
        ];
        let (history, query) = split_messages(messages);
        assert_eq!(history.len(), 1);
        assert_eq!(query, "hello");
    }

    #[test]
    fn test_split_messages_empty_list_yields_empty_query() {
        let (history, query) = split_messages(vec![]);
        assert!(history.is_empty());
        assert_eq!(query, "");
    }
}
