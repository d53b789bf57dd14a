//! LLM client: request assembly, streaming/non-streaming calls, round-robin
//! multi-endpoint selection, and multimodal routing.
//!
//! Rust's `async fn` already covers both a synchronous and an asynchronous
//! call path with a single method each; there is no separate sync call
//! path to carry.

pub mod endpoints;
pub mod wire;

use crate::error::{Error, Result};
use crate::message::{BackendContent, ContentBlock, Message, MessageRole};
use crate::retry::{RetryConfig, retry_with_backoff_conditional};
use crate::stream::{ChunkEvent, ChunkStream, ContentType};
use endpoints::{Backend, EndpointPool};
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use wire::*;

/// What to send: a bare string, a single [`Message`], or a pre-built list
/// (the shape the new-mode prompter hands the client).
pub enum LlmInput {
    Text(String),
    Message(Message),
    Messages(Vec<Message>),
}

impl From<&str> for LlmInput {
    fn from(s: &str) -> Self {
        LlmInput::Text(s.to_string())
    }
}

impl From<Message> for LlmInput {
    fn from(m: Message) -> Self {
        LlmInput::Message(m)
    }
}

impl From<Vec<Message>> for LlmInput {
    fn from(m: Vec<Message>) -> Self {
        LlmInput::Messages(m)
    }
}

/// Per-call request parameters, forwarded onto the wire request.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub tools: Option<Vec<serde_json::Value>>,
    /// Vendor-specific fields merged into the request body (e.g. Qwen's
    /// `enable_thinking`).
    pub extra_body: Option<serde_json::Value>,
    /// content_type assigned to non-reasoning chunks (caller-requested;
    /// defaults to `char`).
    pub content_type: ContentType,
}

/// Request assembly + transport over one or more OpenAI-compatible backends.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    endpoints: EndpointPool,
    retry: RetryConfig,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(endpoints: EndpointPool) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoints,
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn single_backend(backend: Backend) -> Self {
        Self::new(EndpointPool::single(backend))
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Appends `other`'s backends into this client's pool (the `+`
    /// composition of two clients), keeping this client's retry/timeout
    /// policy.
    pub fn combine(&self, other: &LlmClient) -> LlmClient {
        LlmClient {
            http: self.http.clone(),
            endpoints: self.endpoints.combine(&other.endpoints),
            retry: self.retry.clone(),
            timeout: self.timeout,
        }
    }

    fn to_messages(input: LlmInput) -> Vec<Message> {
        match input {
            LlmInput::Text(s) => vec![Message::user(s)],
            LlmInput::Message(m) => vec![m],
            LlmInput::Messages(m) => m,
        }
    }

    fn requires_multimodal(messages: &[Message]) -> bool {
        messages.iter().any(|m| {
            m.content.iter().any(|b| {
                matches!(
                    b,
                    ContentBlock::Image(_) | ContentBlock::Audio(_) | ContentBlock::Video(_)
                )
            })
        })
    }

    fn build_wire_message(message: &Message) -> Result<WireMessage> {
        let role = match message.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };

        let tool_calls: Vec<WireToolCall> = message
            .content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse(t) => Some(WireToolCall {
                    id: t.id.clone(),
                    call_type: "function".to_string(),
                    function: WireFunction {
                        name: t.name.clone(),
                        arguments: t.input.to_string(),
                    },
                }),
                _ => None,
            })
            .collect();

        let content = match message.to_backend(&message.role)? {
            BackendContent::Text(s) => Some(WireContent::Text(s)),
            BackendContent::Parts(parts) => Some(WireContent::Parts(parts)),
        };

        Ok(WireMessage {
            role: role.to_string(),
            content,
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            tool_call_id: message.tool_call_id.clone(),
        })
    }

    fn build_request(
        &self,
        backend: &Backend,
        messages: &[Message],
        params: &RequestParams,
    ) -> Result<WireRequest> {
        let mut wire_messages = Vec::with_capacity(messages.len() + 1);

        let has_system = messages.iter().any(|m| m.role == MessageRole::System);
        if !has_system {
            if let Some(system) = &params.system_prompt {
                wire_messages.push(WireMessage {
                    role: "system".to_string(),
                    content: Some(WireContent::Text(system.clone())),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
        }

        for m in messages {
            wire_messages.push(Self::build_wire_message(m)?);
        }

        Ok(WireRequest {
            model: params.model.clone().unwrap_or_else(|| backend.model.clone()),
            messages: wire_messages,
            stream: true,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            tools: params.tools.clone(),
            extra_body: params.extra_body.clone(),
        })
    }

    /// Issues a streaming chat-completion call, returning a [`ChunkStream`]
    /// of tagged chunks. `reasoning_content` deltas are tagged `think`;
    /// regular content is tagged `params.content_type`.
    pub async fn stream(&self, input: impl Into<LlmInput>, params: RequestParams) -> Result<ChunkStream> {
        let messages = Self::to_messages(input.into());
        let needs_multimodal = Self::requires_multimodal(&messages);
        let backend = self.endpoints.select(needs_multimodal)?;
        let request = self.build_request(&backend, &messages, &params)?;

        let url = format!("{}/chat/completions", backend.base_url.trim_end_matches('/'));
        let http = self.http.clone();
        let api_key = backend.api_key.clone();
        let timeout = self.timeout;
        let retry = self.retry.clone();
        let request_body = request;

        let response = retry_with_backoff_conditional(retry, || {
            let http = http.clone();
            let url = url.clone();
            let api_key = api_key.clone();
            let request_body = request_body.clone();
            async move {
                http.post(&url)
                    .header("Authorization", format!("Bearer {api_key}"))
                    .header("Content-Type", "application/json")
                    .timeout(timeout)
                    .json(&request_body)
                    .send()
                    .await
                    .map_err(Error::Http)
            }
        })
        .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::transport(format!("LLM transport error {status}: {body}")));
        }

        let content_type = params.content_type.clone();
        let inner = parse_sse_wire_stream(response, content_type);
        Ok(ChunkStream::new(Box::pin(inner)))
    }

    /// Non-streaming call: drains [`Self::stream`] into the final content
    /// string.
    pub async fn invoke(&self, input: impl Into<LlmInput>, params: RequestParams) -> Result<String> {
        self.stream(input, params).await?.collect().await
    }
}

fn parse_sse_wire_stream(
    body: reqwest::Response,
    content_type: ContentType,
) -> Pin<Box<dyn Stream<Item = Result<ChunkEvent>> + Send>> {
    let mut finished = false;
    let stream = body.bytes_stream().flat_map(move |result| {
        let bytes = match result {
            Ok(b) => b,
            Err(e) => {
                return futures::stream::iter(vec![Err(Error::Http(e))]);
            }
        };

        if finished {
            return futures::stream::iter(Vec::new());
        }

        let text = String::from_utf8_lossy(&bytes).to_string();
        let mut out = Vec::new();

        for line in text.lines() {
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            if data == "[DONE]" {
                finished = true;
                continue;
            }

            let chunk: WireChunk = match serde_json::from_str(data) {
                Ok(c) => c,
                Err(e) => {
                    out.push(Err(Error::protocol(format!("failed to parse SSE chunk: {e}"))));
                    continue;
                }
            };

            for choice in chunk.choices {
                if let Some(reasoning) = choice.delta.reasoning_content {
                    if !reasoning.is_empty() {
                        out.push(Ok(ChunkEvent::new(reasoning, ContentType::Think)));
                    }
                }
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        out.push(Ok(ChunkEvent::new(content, content_type.clone())));
                    }
                }
                if let Some(tool_calls) = choice.delta.tool_calls {
                    for tc in tool_calls {
                        let fragment = serde_json::json!({
                            "index": tc.index,
                            "id": tc.id,
                            "function": tc.function.map(|f| serde_json::json!({
                                "name": f.name,
                                "arguments": f.arguments,
                            })),
                        });
                        out.push(Ok(ChunkEvent::new(fragment.to_string(), ContentType::Tool)));
                    }
                }
                if let Some(reason) = choice.finish_reason {
                    out.push(Ok(ChunkEvent::new(reason, ContentType::Status)));
                }
            }
        }

        futures::stream::iter(out)
    });

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_wire_message_text_only() {
        let client = LlmClient::single_backend(Backend::new("http://x", "k", "m"));
        let msg = Message::user("hello");
        let wire = LlmClient::build_wire_message(&msg).unwrap();
        assert_eq!(wire.role, "user");
        assert!(matches!(wire.content, Some(WireContent::Text(ref s)) if s == "hello"));
        let _ = client;
    }

    #[test]
    fn test_requires_multimodal_detects_image() {
        let mut msg = Message::user("look");
        msg.add_image("aGVsbG8=", "png").unwrap();
        assert!(LlmClient::requires_multimodal(&[msg]));
    }

    #[test]
    fn test_requires_multimodal_false_for_text() {
        let msg = Message::user("hello");
        assert!(!LlmClient::requires_multimodal(&[msg]));
    }
}
