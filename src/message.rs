//! Conversation messages and their content blocks.
//!
//! A [`Message`] is a role plus one or more [`ContentBlock`]s. Content can be
//! plain text, a tool invocation, a tool result, or a media attachment
//! (image/audio/video). [`Message::to_backend`] flattens a message into the
//! OpenAI wire shape: a plain string for text-only messages, or a list of
//! typed parts once any attachment is present.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

const IMAGE_FORMATS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp", "tiff", "icns"];
const AUDIO_FORMATS: &[&str] = &["mp3", "wav", "ogg", "flac", "aac", "m4a"];
const VIDEO_FORMATS: &[&str] = &["mp4", "webm", "mov", "avi", "mkv", "flv"];

/// Who sent a message.
///
/// Serializes to lowercase strings (`"system"`, `"user"`, etc.) to match the
/// OpenAI chat completions wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    /// Tool result message; must carry a `tool_call_id` linking it back to
    /// the `ToolUseBlock` that requested it.
    Tool,
}

/// Multi-modal content blocks that make up a message.
///
/// Externally tagged with a `"type"` field, matching the wire format used by
/// `ToolUseBlock`/`ToolResultBlock` elsewhere in the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    Image(ImageBlock),
    Audio(AudioBlock),
    Video(VideoBlock),
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
}

impl TextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

impl ToolUseBlock {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: serde_json::Value,
}

impl ToolResultBlock {
    pub fn new(tool_use_id: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content,
        }
    }
}

fn validate_base64(data: &str) -> Result<()> {
    // Cheap structural check: decode a small window with a base64 lib isn't
    // in the dependency set, so fall back to charset + padding validation,
    // which catches the malformed-payload cases that matter here.
    let trimmed = data.trim_end_matches('=');
    if data.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/') {
        return Err(Error::validation("invalid base64 payload"));
    }
    Ok(())
}

macro_rules! media_block {
    ($name:ident, $formats:ident, $mime_prefix:literal) => {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        pub struct $name {
            pub base64: String,
            pub format: String,
        }

        impl $name {
            pub fn new(base64: impl Into<String>, format: impl Into<String>) -> Result<Self> {
                let base64 = base64.into();
                let format = format.into().to_lowercase();
                validate_base64(&base64)?;
                if !$formats.contains(&format.as_str()) {
                    return Err(Error::validation(format!(
                        "unsupported {} format '{}'",
                        stringify!($name),
                        format
                    )));
                }
                Ok(Self { base64, format })
            }

            fn data_uri(&self) -> String {
                format!("data:{}/{};base64,{}", $mime_prefix, self.format, self.base64)
            }
        }
    };
}

media_block!(ImageBlock, IMAGE_FORMATS, "image");
media_block!(AudioBlock, AUDIO_FORMATS, "audio");
media_block!(VideoBlock, VIDEO_FORMATS, "video");

/// A single part of the flattened, wire-ready content produced by
/// [`Message::to_backend`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum BackendPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: BackendUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendUrl {
    pub url: String,
}

/// Either a plain string (text-only message) or a list of typed parts, the
/// two shapes the OpenAI chat completions wire format accepts for a
/// message's `content` field.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BackendContent {
    Text(String),
    Parts(Vec<BackendPart>),
}

/// A complete message in a conversation: a role plus one or more content
/// blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
    /// Required when `role == Tool`: the id of the `ToolUseBlock` this
    /// message answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn new(role: MessageRole, content: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content,
            tool_call_id: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, vec![ContentBlock::Text(TextBlock::new(text))])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, vec![ContentBlock::Text(TextBlock::new(text))])
    }

    pub fn user_with_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self::new(MessageRole::User, blocks)
    }

    pub fn assistant(blocks: Vec<ContentBlock>) -> Self {
        Self::new(MessageRole::Assistant, blocks)
    }

    /// Builds a tool-result message. `tool_call_id` must match the
    /// originating `ToolUseBlock.id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: serde_json::Value) -> Self {
        let tool_call_id = tool_call_id.into();
        Self {
            role: MessageRole::Tool,
            content: vec![ContentBlock::ToolResult(ToolResultBlock::new(
                tool_call_id.clone(),
                content,
            ))],
            tool_call_id: Some(tool_call_id),
        }
    }

    pub fn add_text(&mut self, text: impl Into<String>) {
        self.content.push(ContentBlock::Text(TextBlock::new(text)));
    }

    pub fn add_image(&mut self, base64: impl Into<String>, format: impl Into<String>) -> Result<()> {
        self.content
            .push(ContentBlock::Image(ImageBlock::new(base64, format)?));
        Ok(())
    }

    pub fn add_audio(&mut self, base64: impl Into<String>, format: impl Into<String>) -> Result<()> {
        self.content
            .push(ContentBlock::Audio(AudioBlock::new(base64, format)?));
        Ok(())
    }

    pub fn add_video(&mut self, base64: impl Into<String>, format: impl Into<String>) -> Result<()> {
        self.content
            .push(ContentBlock::Video(VideoBlock::new(base64, format)?));
        Ok(())
    }

    /// Flattens this message's content blocks into the OpenAI wire format.
    ///
    /// A message with only text blocks serializes to a plain string; any
    /// attachment promotes the whole message to the typed-parts list form.
    /// A `tool`-role message's content is the stringified tool result. An
    /// assistant message carrying only `tool_calls` (no text) serializes to
    /// an *empty string*, never an absent field — the OpenAI chat
    /// completions API requires `content` to be present even when the
    /// assistant's whole turn was a tool call. `role` is accepted but
    /// unused beyond validation — callers attach it separately when
    /// building the wire-level message envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the message carries no content
    /// blocks at all.
    pub fn to_backend(&self, _role: &MessageRole) -> Result<BackendContent> {
        if self.content.is_empty() {
            return Err(Error::validation(
                "message has neither text nor attachments",
            ));
        }

        let has_attachment = self.content.iter().any(|b| {
            matches!(
                b,
                ContentBlock::Image(_) | ContentBlock::Audio(_) | ContentBlock::Video(_)
            )
        });

        if !has_attachment {
            if let Some(ContentBlock::ToolResult(result)) =
                self.content.iter().find(|b| matches!(b, ContentBlock::ToolResult(_)))
            {
                let text = match &result.content {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return Ok(BackendContent::Text(text));
            }

            let text: String = self
                .content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text(t) => Some(t.text.clone()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("");
            return Ok(BackendContent::Text(text));
        }

        let mut parts = Vec::new();
        for block in &self.content {
            match block {
                ContentBlock::Text(t) => parts.push(BackendPart::Text { text: t.text.clone() }),
                ContentBlock::Image(img) => parts.push(BackendPart::ImageUrl {
                    image_url: BackendUrl { url: img.data_uri() },
                }),
                ContentBlock::Audio(a) => parts.push(BackendPart::ImageUrl {
                    image_url: BackendUrl { url: a.data_uri() },
                }),
                ContentBlock::Video(v) => parts.push(BackendPart::ImageUrl {
                    image_url: BackendUrl { url: v.data_uri() },
                }),
                ContentBlock::ToolUse(_) | ContentBlock::ToolResult(_) => {}
            }
        }
        Ok(BackendContent::Parts(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_to_backend_is_plain_string() {
        let msg = Message::user("hello");
        let backend = msg.to_backend(&MessageRole::User).unwrap();
        assert!(matches!(backend, BackendContent::Text(ref s) if s == "hello"));
    }

    #[test]
    fn test_message_with_image_promotes_to_parts() {
        let mut msg = Message::user("look at this");
        msg.add_image("aGVsbG8=", "png").unwrap();
        let backend = msg.to_backend(&MessageRole::User).unwrap();
        match backend {
            BackendContent::Parts(parts) => assert_eq!(parts.len(), 2),
            _ => panic!("expected parts"),
        }
    }

    #[test]
    fn test_rejects_unknown_image_format() {
        let result = ImageBlock::new("aGVsbG8=", "psd");
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_bad_base64() {
        let result = ImageBlock::new("not base64!!", "png");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_message_is_illegal() {
        let msg = Message::new(MessageRole::User, vec![]);
        assert!(msg.to_backend(&MessageRole::User).is_err());
    }

    #[test]
    fn test_tool_result_carries_tool_call_id() {
        let msg = Message::tool_result("call_123", serde_json::json!({"ok": true}));
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_123"));
        assert!(matches!(msg.role, MessageRole::Tool));
    }

    #[test]
    fn test_tool_calls_only_assistant_message_has_empty_string_content() {
        // An assistant turn that was purely a tool call still needs a
        // `content` field on the wire — empty string, not absent.
        let msg = Message::assistant(vec![ContentBlock::ToolUse(ToolUseBlock::new(
            "call_1",
            "add",
            serde_json::json!({"a": 1, "b": 2}),
        ))]);
        let backend = msg.to_backend(&MessageRole::Assistant).unwrap();
        assert!(matches!(backend, BackendContent::Text(ref s) if s.is_empty()));
    }

    #[test]
    fn test_tool_result_message_content_is_stringified_result() {
        let msg = Message::tool_result("call_1", serde_json::json!({"result": 5}));
        let backend = msg.to_backend(&MessageRole::Tool).unwrap();
        match backend {
            BackendContent::Text(s) => assert_eq!(s, r#"{"result":5}"#),
            _ => panic!("expected text content"),
        }
    }

    #[test]
    fn test_tool_result_string_content_is_not_double_quoted() {
        let msg = Message::tool_result("call_1", serde_json::json!("5"));
        let backend = msg.to_backend(&MessageRole::Tool).unwrap();
        assert!(matches!(backend, BackendContent::Text(ref s) if s == "5"));
    }

    #[test]
    fn test_audio_and_video_format_validation() {
        assert!(AudioBlock::new("aGVsbG8=", "mp3").is_ok());
        assert!(AudioBlock::new("aGVsbG8=", "mp4").is_err());
        assert!(VideoBlock::new("aGVsbG8=", "mp4").is_ok());
        assert!(VideoBlock::new("aGVsbG8=", "mp3").is_err());
    }
}
