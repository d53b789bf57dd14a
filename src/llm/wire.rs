//! OpenAI-compatible chat-completions wire format.
//!
//! Covers the request/response shape plus two fields an OpenAI-compatible
//! deployment needs beyond the vanilla schema: `reasoning_content` on a
//! streamed delta, and an `extra_body` escape hatch on the request for
//! vendor-specific fields (Qwen's `enable_thinking` and friends).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<crate::message::BackendPart>),
}

#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: WireFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    /// Vendor-specific fields (e.g. Qwen's `enable_thinking`), flattened
    /// into the top-level request object at serialization time.
    #[serde(skip_serializing_if = "Option::is_none", flatten)]
    pub extra_body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireChunk {
    #[allow(dead_code)]
    pub id: String,
    pub choices: Vec<WireChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireChoice {
    pub delta: WireDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WireDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Present on backends that stream a reasoning/thinking channel
    /// alongside `content`. Mapped to `ContentType::Think`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireToolCallDelta {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<WireFunctionDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireFunctionDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Non-streaming response body shape (`invoke`/`ainvoke`).
#[derive(Debug, Clone, Deserialize)]
pub struct WireResponse {
    pub choices: Vec<WireResponseChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireResponseChoice {
    pub message: WireResponseMessage,
    #[allow(dead_code)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCall>>,
}
