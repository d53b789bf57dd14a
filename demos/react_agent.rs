//! Simple ReAct agent example
//!
//! Demonstrates the minimal path: build an `Agent` around a single
//! backend, run the ReAct loop to completion, and print what streamed
//! through the SSE channel along the way.

use open_agent_rt::agent::react;
use open_agent_rt::llm::endpoints::{Backend, EndpointPool};
use open_agent_rt::{Agent, AgentConfig, LlmClient, SseStreamer, ToolRegistry};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let llm = LlmClient::new(EndpointPool::single(Backend::new(
        "http://localhost:11434/v1",
        "not-needed",
        "qwen3:8b",
    )));
    let streamer = Arc::new(SseStreamer::new("qwen3:8b", Duration::from_secs(60)));
    let registry = Arc::new(ToolRegistry::new());
    let agent = Agent::new(
        llm,
        "You are a helpful assistant. Be brief.",
        streamer.clone(),
        registry,
        AgentConfig::default(),
    );

    // Drain the streamer concurrently with the loop so the frames the
    // agent emits mid-run are printed as they arrive rather than only at
    // the end.
    let mut frames = Box::pin(streamer.start_streaming().await);
    let printer = tokio::spawn(async move {
        use futures::StreamExt;
        while let Some(frame) = frames.next().await {
            if let Some(choice) = frame.choices.first() {
                if !choice.delta.content.is_empty() {
                    print!("{}", choice.delta.content);
                    std::io::Write::flush(&mut std::io::stdout()).ok();
                }
            }
        }
    });

    let answer = react::run(&agent, "What's the capital of France? Please be brief.").await?;
    printer.await.ok();

    if !answer.is_empty() {
        println!("\n{answer}");
    }

    Ok(())
}
