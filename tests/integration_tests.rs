//! End-to-end smoke coverage: tool registration feeding the OpenAI tools
//! schema served on every request, and a complete single-turn ReAct run
//! against a mocked chat-completions backend, from the user query through
//! to the session transcript left in memory.

mod common;

use common::{client_for, mock_chat_completions, sse_body, Delta};
use open_agent_rt::agent::react;
use open_agent_rt::{Agent, AgentConfig, Message, MessageRole, SseStreamer, Tool, ToolRegistry};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn registered_tools_appear_in_the_openai_schema_export() {
    let registry = ToolRegistry::new();
    registry
        .register(
            Tool::new(
                "get_weather",
                "Get current weather for a location",
                json!({"location": "string"}),
                |_args| Box::pin(async move { Ok(json!({})) }),
            ),
            None,
        )
        .unwrap();

    let schema = registry.get_openai_tools_schema();
    assert_eq!(schema.len(), 1);
    assert_eq!(schema[0]["type"], "function");
    assert_eq!(schema[0]["function"]["name"], "get_weather");
    assert_eq!(schema[0]["function"]["parameters"]["required"], json!(["location"]));
}

#[test]
fn unregistering_a_tool_removes_it_from_the_schema() {
    let registry = ToolRegistry::new();
    registry
        .register(
            Tool::new("echo", "echoes input", json!({}), |args| Box::pin(async move { Ok(args) })),
            None,
        )
        .unwrap();
    registry.unregister("echo").unwrap();
    assert!(registry.get_openai_tools_schema().is_empty());
}

#[tokio::test]
async fn a_single_turn_run_against_a_mocked_backend_records_the_full_transcript() {
    let body = sse_body(&[Delta::text("Hi there! TASK_FINISHED"), Delta::finish("stop")]);
    let server = mock_chat_completions(vec![body]).await;
    let llm = client_for(&server);
    let registry = Arc::new(ToolRegistry::new());
    let streamer = Arc::new(SseStreamer::new("test-model", Duration::from_secs(5)));
    let agent = Agent::new(llm, "you are helpful", streamer, registry, AgentConfig::default());

    react::run(&agent, "hello there").await.unwrap();

    let memory = agent.memory_handle().lock().await;
    let messages: Vec<&Message> = memory.messages().iter().collect();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].role, MessageRole::Assistant);
}
