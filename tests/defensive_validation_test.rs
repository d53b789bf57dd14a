//! Validation paths that sit between an untrusted model output and tool
//! execution or memory storage: missing required tool arguments, malformed
//! media payloads, and unsupported attachment formats are all rejected
//! before a handler or the wire ever sees them.

use open_agent_rt::{AudioBlock, ImageBlock, Tool, ToolCall, ToolExecutor, ToolRegistry, VideoBlock};
use serde_json::json;

fn registry_with_strict_tool() -> ToolRegistry {
    let registry = ToolRegistry::new();
    registry
        .register(
            Tool::new(
                "transfer_funds",
                "Moves money between accounts",
                json!({
                    "type": "object",
                    "properties": {
                        "from": {"type": "string"},
                        "to": {"type": "string"},
                        "amount": {"type": "number"},
                    },
                    "required": ["from", "to", "amount"],
                }),
                |args| Box::pin(async move { Ok(args) }),
            ),
            None,
        )
        .unwrap();
    registry
}

#[tokio::test]
async fn missing_required_argument_never_reaches_the_handler() {
    let registry = registry_with_strict_tool();
    let executor = ToolExecutor::default();
    let calls = vec![ToolCall::new(
        "c1",
        "transfer_funds",
        json!({"from": "checking", "amount": 500}), // "to" missing
    )];

    let results = executor.execute(&registry, calls, false, None).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, open_agent_rt::ToolStatus::ValidationError);
    assert!(results[0].content.contains("'to'"));
}

#[tokio::test]
async fn arguments_that_are_not_an_object_are_rejected_when_fields_are_required() {
    let registry = registry_with_strict_tool();
    let executor = ToolExecutor::default();
    let calls = vec![ToolCall::new("c1", "transfer_funds", json!("just a string"))];

    let results = executor.execute(&registry, calls, false, None).await;
    assert_eq!(results[0].status, open_agent_rt::ToolStatus::ValidationError);
}

#[tokio::test]
async fn unregistered_tool_name_is_reported_as_not_found_not_a_panic() {
    let registry = registry_with_strict_tool();
    let executor = ToolExecutor::default();
    let calls = vec![ToolCall::new("c1", "delete_everything", json!({}))];

    let results = executor.execute(&registry, calls, false, None).await;
    assert_eq!(results[0].status, open_agent_rt::ToolStatus::NotFound);
}

#[test]
fn image_block_rejects_base64_with_illegal_characters() {
    // CRLF injection attempts and similar: not valid base64 alphabet.
    let result = ImageBlock::new("aGVsbG8\r\n8gd29ybGQ=", "png");
    assert!(result.is_err());
}

#[test]
fn image_block_rejects_empty_payload() {
    assert!(ImageBlock::new("", "png").is_err());
}

#[test]
fn audio_and_video_blocks_reject_cross_media_formats() {
    // A video format string handed to the audio constructor (or vice versa)
    // must fail rather than silently accept it.
    assert!(AudioBlock::new("aGVsbG8=", "mp4").is_err());
    assert!(VideoBlock::new("aGVsbG8=", "mp3").is_err());
    assert!(AudioBlock::new("aGVsbG8=", "flac").is_ok());
    assert!(VideoBlock::new("aGVsbG8=", "webm").is_ok());
}
