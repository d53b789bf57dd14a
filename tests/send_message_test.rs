//! Sending successive turns into one agent: the shared session memory keeps
//! accumulating across calls to `react::run`, and the SSE streamer surfaces
//! the same run's content chunks to a concurrent consumer in real time
//! rather than only after the run finishes.

mod common;

use common::{client_for, mock_chat_completions, sse_body, Delta};
use futures::StreamExt;
use open_agent_rt::agent::react;
use open_agent_rt::{Agent, AgentConfig, MessageRole, SseStreamer, ToolRegistry};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn two_successive_turns_on_one_agent_both_land_in_session_memory() {
    let first_turn = sse_body(&[Delta::text("Hi! TASK_FINISHED"), Delta::finish("stop")]);
    let second_turn = sse_body(&[Delta::text("Still here! TASK_FINISHED"), Delta::finish("stop")]);
    let server = mock_chat_completions(vec![first_turn, second_turn]).await;
    let llm = client_for(&server);
    let registry = Arc::new(ToolRegistry::new());
    let streamer = Arc::new(SseStreamer::new("test-model", Duration::from_secs(5)));
    let agent = Agent::new(llm, "you are helpful", streamer, registry, AgentConfig::default());

    react::run(&agent, "hello").await.unwrap();
    // The streamer already hit its terminal frame; further sends on the
    // second run are harmless no-ops, and memory accumulation is unaffected.
    react::run(&agent, "are you still there?").await.unwrap();

    let memory = agent.memory_handle().lock().await;
    let messages = memory.messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[2].role, MessageRole::User);
    assert_eq!(messages[3].role, MessageRole::Assistant);
}

#[tokio::test]
async fn streamer_surfaces_content_chunks_to_a_concurrent_consumer_before_the_run_finishes() {
    let body = sse_body(&[
        Delta::text("Hello, "),
        Delta::text("world. TASK_FINISHED"),
        Delta::finish("stop"),
    ]);
    let server = mock_chat_completions(vec![body]).await;
    let llm = client_for(&server);
    let registry = Arc::new(ToolRegistry::new());
    let streamer = Arc::new(SseStreamer::new("test-model", Duration::from_secs(5)));
    let agent = Agent::new(llm, "you are helpful", streamer.clone(), registry, AgentConfig::default());

    let frames_handle = {
        let streamer = streamer.clone();
        tokio::spawn(async move { streamer.start_streaming().await.collect::<Vec<_>>().await })
    };

    react::run(&agent, "say hello").await.unwrap();
    let frames = frames_handle.await.unwrap();

    let content: String = frames.iter().map(|f| f.choices[0].delta.content.clone()).collect();
    assert!(content.contains("Hello, "));
    assert!(content.contains("world."));
    assert_eq!(frames.last().unwrap().choices[0].finish_reason.as_deref(), Some("stop"));
}
