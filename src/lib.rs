//! # open-agent-rt
//!
//! A streaming-first Rust runtime for building stateful, tool-using
//! ReAct/Skill agents on OpenAI-compatible chat-completion backends, with
//! session memory, SSE streaming, and an optional sandboxed tool surface.
//!
//! ## Key Features
//!
//! - **Streaming-first**: every LLM call, tool dispatch, and hook emission
//!   flows through a bounded channel; nothing blocks the reactor.
//! - **ReAct and Skill loops**: [`agent::react`] drives the plain tool-use
//!   cycle; [`agent::skill_loop`] layers a discovered skill catalogue and
//!   skill-access tools on top of the same cycle.
//! - **Typed lifecycle hooks**: [`hooks::HookBus`] lets callers intercept
//!   before/after iteration, before/after tool dispatch, and tool
//!   registration, with priority ordering and a fail-open/fail-close policy.
//! - **Session memory**: [`memory::Memory`] plus a TTL+LRU
//!   [`memory::pool::MemoryPool`] for multi-session servers.
//! - **Optional sandboxed tool surface**: [`sandbox::SandboxCapability`]
//!   registers a fixed set of file/shell/package tools against any backend
//!   implementing the trait.
//!
//! ## Example
//!
//! ```rust,no_run
//! use open_agent_rt::agent::{Agent, AgentConfig};
//! use open_agent_rt::llm::LlmClient;
//! use open_agent_rt::llm::endpoints::{Backend, EndpointPool};
//! use open_agent_rt::streamer::SseStreamer;
//! use open_agent_rt::tools::registry::ToolRegistry;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let llm = LlmClient::new(EndpointPool::single(Backend::new(
//!         "http://localhost:1234/v1",
//!         "not-needed",
//!         "qwen2.5-32b-instruct",
//!     )));
//!     let streamer = Arc::new(SseStreamer::new("qwen2.5-32b-instruct", Duration::from_secs(60)));
//!     let registry = Arc::new(ToolRegistry::new());
//!     let agent = Agent::new(llm, "You are a helpful assistant.", streamer, registry, AgentConfig::default());
//!
//!     let answer = open_agent_rt::agent::react::run(&agent, "What's the capital of France?").await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **message**: conversation messages and content blocks (text, tool
//!   use/result, image/audio/video).
//! - **stream**: chunk events, the `ChunkStream` consumer API, and the
//!   postprocessor pipeline.
//! - **streamer**: per-request SSE multiplexer (`chat.completion.chunk`
//!   frames with the `content_type` extension).
//! - **llm**: request assembly, multi-endpoint round robin, streaming and
//!   non-streaming calls over OpenAI-compatible backends.
//! - **prompter**: template rendering, mode arbitration, and response
//!   aggregation over one streaming LLM call.
//! - **memory**: session-scoped conversation history and the multi-session
//!   pool.
//! - **tools**: tool definition, registry, and the dispatch executor.
//! - **skills**: directory-bundled capability discovery and exposure.
//! - **agent**: the `Agent` lifecycle and the ReAct/Skill iteration loops.
//! - **sandbox**: the sandboxed tool-surface contract.
//! - **hooks**: the typed lifecycle hook bus.
//! - **server** (feature `server`): the `POST /chat/completions` HTTP route.
//! - **config**: provider/runtime configuration helpers.
//! - **error**: the crate-wide `Error`/`Result` types.
//! - **retry**: exponential backoff with jitter for the LLM client.

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// Provider configuration helpers plus the enumerated `RuntimeConfig`
/// knobs.
pub mod config;

/// Error types and conversions used across the crate's public APIs.
pub mod error;

/// Typed lifecycle hook bus: priority, predicate, timeout, and
/// fail-open/fail-close error policy per registration.
pub mod hooks;

/// Conversation messages and content blocks (text, tool use/result,
/// image/audio/video).
pub mod message;

/// Tool definition, registry, and dispatch executor, with automatic JSON
/// schema generation.
pub mod tools;

/// Session-scoped conversation memory and the multi-session TTL+LRU pool.
pub mod memory;

/// LLM client: request assembly, round-robin multi-endpoint selection, and
/// streaming/non-streaming calls over OpenAI-compatible backends.
pub mod llm;

/// Stream quanta (`ChunkEvent`/`ChunkStream`) and the postprocessor
/// pipeline.
pub mod stream;

/// Minimal Jinja-like template renderer used by the prompter.
pub mod template;

/// Lenient JSON repair for force-JSON prompter calls.
pub mod json_repair;

/// Template rendering, mode arbitration, and response aggregation over a
/// streaming LLM call.
pub mod prompter;

/// Per-request SSE streamer that multiplexes agent activity to the client
/// frames with the `content_type` extension.
pub mod streamer;

/// Skill manager: discovers directory-bundled capabilities and exposes
/// them either as activation-mode tools or filesystem paths.
pub mod skills;

/// Agent core: lifecycle, derivation, and the ReAct/Skill iteration loops.
pub mod agent;

/// Sandbox adapter: the capability trait and the tool registrations built
/// over it.
pub mod sandbox;

/// Client-facing HTTP surface (`POST <base>/chat/completions`), behind the
/// `server` feature.
#[cfg(feature = "server")]
pub mod server;

/// Exponential backoff with jitter, used by the LLM client's retry policy.
pub mod retry;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

pub use config::{Provider, RuntimeConfig, get_base_url, get_model};
pub use error::{Error, Result};

pub use message::{
    AudioBlock, BackendContent, BackendPart, ContentBlock, ImageBlock, Message, MessageRole,
    TextBlock, ToolResultBlock, ToolUseBlock, VideoBlock,
};

pub use hooks::{ErrorPolicy, HookBus, HookContext, HookEvent, HookOutcome, HookRegistration};

pub use tools::executor::{ToolCall, ToolExecutor, ToolResult, ToolStatus};
pub use tools::registry::ToolRegistry;
pub use tools::{Tool, ToolBuilder, tool};

pub use memory::pool::MemoryPool;
pub use memory::{HistoryFormat, Memory};

pub use llm::endpoints::{Backend, EndpointPool};
pub use llm::{LlmClient, LlmInput, RequestParams};

pub use stream::postprocessors::{
    Composed, DynamicTypePP, FilterPP, JsonKeyExtractorPP, PatternMatcherPP, Postprocessor, ReplacePP,
    SplitterPP, TypeMapperPP,
};
pub use stream::{ChunkEvent, ChunkStream, ContentType, RoutingSentinel};

pub use prompter::{CallParams, Prompter, PrompterResponse, TextResponse, ToolCallResponse};
pub use streamer::{SseFrame, SseStreamer};

pub use json_repair::repair_parse;
pub use template::Template;

pub use skills::{Skill, SkillManager, SkillMode};
pub use agent::{Agent, AgentConfig};
pub use sandbox::{CommandResult, SandboxCapability, SandboxConfig, register_sandbox_tools};

#[cfg(feature = "server")]
pub use server::{AppState, router};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// Re-exports the pieces most callers assemble an agent from.
/// `use open_agent_rt::prelude::*;`.
pub mod prelude {
    pub use crate::agent::{Agent, AgentConfig};
    pub use crate::error::{Error, Result};
    pub use crate::hooks::{ErrorPolicy, HookBus, HookContext, HookEvent, HookOutcome};
    pub use crate::llm::endpoints::{Backend, EndpointPool};
    pub use crate::llm::LlmClient;
    pub use crate::memory::pool::MemoryPool;
    pub use crate::memory::Memory;
    pub use crate::message::{ContentBlock, Message, MessageRole, TextBlock};
    pub use crate::streamer::SseStreamer;
    pub use crate::tools::registry::ToolRegistry;
    pub use crate::tools::{Tool, ToolBuilder, tool};
}
