//! Prompter: template rendering, mode arbitration, and response
//! aggregation over a streaming LLM call.
//!
//! Two mutually exclusive construction modes. Rather than a runtime flag,
//! the mode is an enum variant, so "both modes at once" is unrepresentable;
//! the one remaining illegal combination — legacy mode with memory bound —
//! is rejected by [`Prompter::with_memory`] at construction time.

use crate::error::{Error, Result};
use crate::json_repair;
use crate::llm::{LlmClient, RequestParams};
use crate::memory::{HistoryFormat, Memory};
use crate::message::Message;
use crate::stream::postprocessors::Postprocessor;
use crate::stream::{ChunkStream, ContentType, RoutingSentinel};
use crate::streamer::SseStreamer;
use crate::template::Template;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

const FORCE_JSON_INSTRUCTION: &str =
    "Respond with a single JSON value only. Do not include prose, markdown fences, or explanation outside the JSON.";

enum PrompterMode {
    /// A single template that renders directly to the user message.
    Legacy { template: Template },
    /// A system-prompt template plus optional memory binding.
    New {
        system_template: Template,
        memory: Option<Arc<Mutex<Memory>>>,
        history_max_round: usize,
        auto_save: bool,
    },
}

/// One accumulated tool-call fragment stream, keyed by the model's `index`.
#[derive(Debug, Default, Clone)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// The non-tool-call outcome of [`Prompter::call`].
#[derive(Debug, Clone, Default)]
pub struct TextResponse {
    pub text: String,
    pub reasoning: Option<String>,
    pub finish_reason: Option<String>,
    pub continuation_count: u32,
}

/// The outcome of [`Prompter::call`] when the model requested tool use.
#[derive(Debug, Clone)]
pub struct ToolCallResponse {
    pub tool_calls: Vec<crate::tools::executor::ToolCall>,
    pub text: String,
}

/// Either shape [`Prompter::call`] can return.
#[derive(Debug, Clone)]
pub enum PrompterResponse {
    Text(TextResponse),
    ToolCalls(ToolCallResponse),
}

/// Per-call parameters.
pub struct CallParams {
    pub return_generator: bool,
    pub content_type: ContentType,
    pub postprocessor: Option<Box<dyn Postprocessor>>,
    pub enable_thinking: bool,
    pub force_json: bool,
    pub long_response: bool,
    pub runtime_system_prompt: Option<String>,
    pub tools: Option<Vec<serde_json::Value>>,
    pub save_to_memory: Option<bool>,
    pub streamer: Option<Arc<SseStreamer>>,
    pub long_response_max_continuations: u32,
}

impl Default for CallParams {
    fn default() -> Self {
        Self {
            return_generator: false,
            content_type: ContentType::Char,
            postprocessor: None,
            enable_thinking: false,
            force_json: false,
            long_response: false,
            runtime_system_prompt: None,
            tools: None,
            save_to_memory: None,
            streamer: None,
            long_response_max_continuations: 3,
        }
    }
}

pub struct Prompter {
    mode: PrompterMode,
    llm: LlmClient,
    placeholders: HashMap<String, String>,
}

impl Prompter {
    pub fn legacy(template_source: impl Into<String>, llm: LlmClient) -> Self {
        Self {
            mode: PrompterMode::Legacy {
                template: Template::new(template_source),
            },
            llm,
            placeholders: HashMap::new(),
        }
    }

    pub fn new_mode(system_prompt_source: impl Into<String>, llm: LlmClient) -> Self {
        Self {
            mode: PrompterMode::New {
                system_template: Template::new(system_prompt_source),
                memory: None,
                history_max_round: 10,
                auto_save: false,
            },
            llm,
            placeholders: HashMap::new(),
        }
    }

    /// Binds session memory. Hard error on a legacy-mode prompter: legacy
    /// mode has no history slot to inject into.
    pub fn with_memory(mut self, memory: Arc<Mutex<Memory>>) -> Result<Self> {
        match &mut self.mode {
            PrompterMode::Legacy { .. } => {
                Err(Error::config("legacy-mode prompters do not support memory binding"))
            }
            PrompterMode::New { memory: slot, .. } => {
                *slot = Some(memory);
                Ok(self)
            }
        }
    }

    pub fn with_history_max_round(mut self, max_round: usize) -> Self {
        if let PrompterMode::New { history_max_round, .. } = &mut self.mode {
            *history_max_round = max_round;
        }
        self
    }

    pub fn with_auto_save(mut self, enabled: bool) -> Self {
        if let PrompterMode::New { auto_save, .. } = &mut self.mode {
            *auto_save = enabled;
        }
        self
    }

    fn known_placeholders(&self) -> HashSet<String> {
        match &self.mode {
            PrompterMode::Legacy { template } => template.placeholders(),
            PrompterMode::New { system_template, .. } => system_template.placeholders(),
        }
    }

    /// Validates `kv`'s keys against the template's placeholder set.
    /// Unknown keys and, after merging, still-unset known placeholders are
    /// logged at `warn` but never block rendering.
    pub fn update_placeholder(&mut self, kv: HashMap<String, String>) {
        let known = self.known_placeholders();
        for key in kv.keys() {
            if key != "query" && !known.contains(key) {
                tracing::warn!(placeholder = %key, "update_placeholder: key is not referenced by this template");
            }
        }
        self.placeholders.extend(kv);
        for name in &known {
            if name != "query" && !self.placeholders.contains_key(name) {
                tracing::warn!(placeholder = %name, "template placeholder has no value set");
            }
        }
    }

    /// Builds the message list for one call. `query` is `None` for a
    /// continuation call (a post-tool-dispatch iteration where the next
    /// turn's content is already the tail of memory history rather than a
    /// fresh user message) — legacy mode has no such case and requires a
    /// query.
    async fn build_messages(&self, query: Option<&str>, params: &CallParams) -> Result<Vec<Message>> {
        match &self.mode {
            PrompterMode::Legacy { template } => {
                let query = query.ok_or_else(|| {
                    Error::config("legacy-mode prompters require a query; continuation calls are new-mode only")
                })?;
                let mut values = self.placeholders.clone();
                values.insert("query".to_string(), query.to_string());
                Ok(vec![Message::user(template.render(&values))])
            }
            PrompterMode::New {
                system_template,
                memory,
                history_max_round,
                ..
            } => {
                let mut messages = Vec::new();
                if params.force_json {
                    messages.push(Message::system(FORCE_JSON_INSTRUCTION));
                }

                let mut system_text = system_template.render(&self.placeholders);
                if let Some(amendment) = &params.runtime_system_prompt {
                    system_text.push('\n');
                    system_text.push_str(amendment);
                }
                messages.push(Message::system(system_text));

                if let Some(memory) = memory {
                    let guard = memory.lock().await;
                    let history = guard.build_history(HistoryFormat::Messages, *history_max_round, false);
                    messages.extend(history);
                }

                if let Some(query) = query {
                    messages.push(Message::user(query.to_string()));
                }
                Ok(messages)
            }
        }
    }

    fn request_params(&self, params: &CallParams) -> RequestParams {
        RequestParams {
            content_type: params.content_type.clone(),
            tools: params.tools.clone(),
            ..Default::default()
        }
    }

    async fn auto_save_enabled(&self, params: &CallParams) -> bool {
        match &self.mode {
            PrompterMode::New { auto_save, memory, .. } => {
                params.save_to_memory.unwrap_or(*auto_save) && memory.is_some()
            }
            PrompterMode::Legacy { .. } => false,
        }
    }

    /// Drives one streaming call through sentinel routing, think
    /// accumulation, and tool-call aggregation. Returns the aggregated
    /// text, reasoning, finish_reason, and any accumulated tool calls.
    async fn drive_stream(
        mut stream: ChunkStream,
        params: &CallParams,
    ) -> Result<(String, Option<String>, Option<String>, Vec<crate::tools::executor::ToolCall>)> {
        let mut content = String::new();
        let mut reasoning = String::new();
        let mut have_reasoning = false;
        let mut tool_calls: HashMap<u32, PartialToolCall> = HashMap::new();
        let mut finish_reason_seen: Option<String> = None;

        while let Some(event) = stream.next().await {
            let event = event?;
            match &event.content_type {
                ContentType::Think => {
                    if params.enable_thinking {
                        have_reasoning = true;
                        reasoning.push_str(&event.content);
                    }
                    if let Some(streamer) = &params.streamer {
                        streamer.send("think", event.content.clone()).await;
                    }
                }
                ContentType::Tool => {
                    if let Ok(fragment) = serde_json::from_str::<serde_json::Value>(&event.content) {
                        let index = fragment["index"].as_u64().unwrap_or(0) as u32;
                        let entry = tool_calls.entry(index).or_default();
                        if let Some(id) = fragment["id"].as_str() {
                            entry.id = Some(id.to_string());
                        }
                        if let Some(func) = fragment.get("function") {
                            if let Some(name) = func["name"].as_str() {
                                entry.name = Some(name.to_string());
                            }
                            if let Some(args) = func["arguments"].as_str() {
                                entry.arguments.push_str(args);
                            }
                        }
                    }
                }
                ContentType::Status => {
                    finish_reason_seen = Some(event.content.clone());
                }
                ContentType::Routing(RoutingSentinel::StreamIgnore) => {
                    content.push_str(&event.content);
                }
                ContentType::Routing(RoutingSentinel::ResponseIgnore) => {
                    if let Some(streamer) = &params.streamer {
                        streamer.send(event.content_type.as_str(), event.content.clone()).await;
                    }
                }
                ContentType::Routing(RoutingSentinel::BothIgnore) => {}
                ContentType::Char | ContentType::Custom(_) => {
                    content.push_str(&event.content);
                    if let Some(streamer) = &params.streamer {
                        streamer.send(event.content_type.as_str(), event.content.clone()).await;
                    }
                }
            }
        }

        let finish_reason = finish_reason_seen.or_else(|| stream.finish_reason().map(str::to_string));

        let calls: Vec<crate::tools::executor::ToolCall> = tool_calls
            .into_iter()
            .filter_map(|(_, partial)| {
                let id = partial.id?;
                let name = partial.name?;
                let arguments = serde_json::from_str(&partial.arguments).unwrap_or(serde_json::Value::Null);
                Some(crate::tools::executor::ToolCall::new(id, name, arguments))
            })
            .collect();

        Ok((content, have_reasoning.then_some(reasoning), finish_reason, calls))
    }

    /// Executes one prompter call end-to-end. Callers that set
    /// `return_generator` must use [`Prompter::call_stream`] instead — this
    /// method always aggregates.
    pub async fn call(&self, query: &str, mut params: CallParams) -> Result<PrompterResponse> {
        if params.return_generator {
            return Err(Error::config(
                "return_generator calls must use Prompter::call_stream, not call",
            ));
        }

        let messages = self.build_messages(Some(query), &params).await?;
        let request_params = self.request_params(&params);

        let mut stream = self.llm.stream(messages.clone(), request_params).await?;
        if let Some(pp) = params.postprocessor.take() {
            stream = pp.apply(stream);
        }

        let (mut text, reasoning, mut finish_reason, tool_calls) = Self::drive_stream(stream, &params).await?;

        let mut continuation_count = 0;
        if params.long_response {
            while finish_reason.as_deref() == Some("length")
                && continuation_count < params.long_response_max_continuations
            {
                let mut continued = messages.clone();
                continued.push(Message::assistant(vec![crate::message::ContentBlock::Text(
                    crate::message::TextBlock::new(text.clone()),
                )]));
                continued.push(Message::user("continue"));

                let next_params = self.request_params(&params);
                let next_stream = self.llm.stream(continued, next_params).await?;
                let (more_text, _, next_finish, _) = Self::drive_stream(next_stream, &params).await?;
                text.push_str(&more_text);
                finish_reason = next_finish;
                continuation_count += 1;
            }
        }

        if params.force_json {
            match json_repair::repair_parse(&text) {
                Ok(value) => text = value.to_string(),
                Err(raw) => {
                    tracing::warn!("force_json: repair failed, returning raw content");
                    text = raw;
                }
            }
        }

        if self.auto_save_enabled(&params).await {
            if let PrompterMode::New { memory: Some(memory), .. } = &self.mode {
                let mut guard = memory.lock().await;
                guard.add_user(query);
                guard.add_assistant_text(text.clone());
            }
        }

        if !tool_calls.is_empty() {
            return Ok(PrompterResponse::ToolCalls(ToolCallResponse { tool_calls, text }));
        }

        Ok(PrompterResponse::Text(TextResponse {
            text,
            reasoning,
            finish_reason,
            continuation_count,
        }))
    }

    /// Builds messages and issues the LLM call, returning the raw
    /// [`ChunkStream`] for callers that asked for `return_generator`. The
    /// caller owns sentinel routing and aggregation.
    pub async fn call_stream(&self, query: &str, params: CallParams) -> Result<ChunkStream> {
        let messages = self.build_messages(Some(query), &params).await?;
        let request_params = self.request_params(&params);
        let stream = self.llm.stream(messages, request_params).await?;
        Ok(match params.postprocessor {
            Some(pp) => pp.apply(stream),
            None => stream,
        })
    }

    /// Like [`Prompter::call`], but issues the request from memory history
    /// alone — no new user turn is appended first. Used by the agent loop's
    /// post-tool-dispatch iterations, where the next turn's content is
    /// already the tail of memory (the tool results the executor just
    /// appended) rather than a fresh question. New-mode with memory only;
    /// legacy mode and memory-less new-mode prompters have no history to
    /// continue from.
    pub async fn call_continuation(&self, mut params: CallParams) -> Result<PrompterResponse> {
        if params.return_generator {
            return Err(Error::config(
                "return_generator calls must use Prompter::call_stream, not call_continuation",
            ));
        }
        if !matches!(&self.mode, PrompterMode::New { memory: Some(_), .. }) {
            return Err(Error::config(
                "call_continuation requires a new-mode prompter bound to memory",
            ));
        }

        let messages = self.build_messages(None, &params).await?;
        let request_params = self.request_params(&params);

        let mut stream = self.llm.stream(messages, request_params).await?;
        if let Some(pp) = params.postprocessor.take() {
            stream = pp.apply(stream);
        }

        let (mut text, reasoning, finish_reason, tool_calls) = Self::drive_stream(stream, &params).await?;

        if params.force_json {
            match json_repair::repair_parse(&text) {
                Ok(value) => text = value.to_string(),
                Err(raw) => {
                    tracing::warn!("force_json: repair failed, returning raw content");
                    text = raw;
                }
            }
        }

        if self.auto_save_enabled(&params).await {
            if let PrompterMode::New { memory: Some(memory), .. } = &self.mode {
                let mut guard = memory.lock().await;
                guard.add_assistant_text(text.clone());
            }
        }

        if !tool_calls.is_empty() {
            return Ok(PrompterResponse::ToolCalls(ToolCallResponse { tool_calls, text }));
        }

        Ok(PrompterResponse::Text(TextResponse {
            text,
            reasoning,
            finish_reason,
            continuation_count: 0,
        }))
    }
}
