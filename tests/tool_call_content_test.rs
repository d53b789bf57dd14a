//! Regression coverage for `Message::to_backend`'s content-shape rules: an
//! assistant turn that was purely a tool call must still carry an empty
//! string `content` on the wire (never an absent field), and a tool-result
//! message's content is the stringified result, not re-quoted JSON.

use open_agent_rt::{BackendContent, ContentBlock, Message, MessageRole, TextBlock, ToolUseBlock};
use serde_json::json;

#[test]
fn assistant_tool_calls_only_message_serializes_empty_string_content() {
    let msg = Message::assistant(vec![ContentBlock::ToolUse(ToolUseBlock::new(
        "call_1",
        "get_weather",
        json!({"location": "Boston"}),
    ))]);

    let backend = msg.to_backend(&MessageRole::Assistant).unwrap();
    match backend {
        BackendContent::Text(s) => assert_eq!(s, ""),
        BackendContent::Parts(_) => panic!("tool-calls-only message should not promote to parts"),
    }
}

#[test]
fn assistant_message_with_text_and_tool_call_keeps_the_text() {
    let msg = Message::assistant(vec![
        ContentBlock::Text(TextBlock::new("Let me check that for you.")),
        ContentBlock::ToolUse(ToolUseBlock::new("call_1", "get_weather", json!({"location": "Boston"}))),
    ]);

    let backend = msg.to_backend(&MessageRole::Assistant).unwrap();
    assert!(matches!(backend, BackendContent::Text(ref s) if s == "Let me check that for you."));
}

#[test]
fn tool_result_object_content_is_stringified_not_double_encoded() {
    let msg = Message::tool_result("call_1", json!({"temp": 72, "conditions": "sunny"}));
    let backend = msg.to_backend(&MessageRole::Tool).unwrap();
    match backend {
        BackendContent::Text(s) => {
            assert!(s.contains("\"temp\":72"));
            assert!(!s.starts_with('"'), "object content should not be wrapped in an extra string");
        }
        BackendContent::Parts(_) => panic!("tool result should never promote to parts"),
    }
}

#[test]
fn tool_result_string_content_is_not_double_quoted() {
    let msg = Message::tool_result("call_1", json!("sunny and 72"));
    let backend = msg.to_backend(&MessageRole::Tool).unwrap();
    assert!(matches!(backend, BackendContent::Text(ref s) if s == "sunny and 72"));
}

#[test]
fn tool_result_message_carries_its_call_id() {
    let msg = Message::tool_result("call_42", json!({"ok": true}));
    assert_eq!(msg.tool_call_id.as_deref(), Some("call_42"));
    assert_eq!(msg.role, MessageRole::Tool);
}

#[test]
fn empty_content_message_is_rejected_rather_than_silently_emitting_empty_string() {
    let msg = Message::new(MessageRole::Assistant, vec![]);
    assert!(msg.to_backend(&MessageRole::Assistant).is_err());
}
