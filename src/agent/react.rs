//! ReAct loop: the plain tool-use iteration cycle.
//!
//! Appends the query once, then iterates LLM call → (tool dispatch |
//! terminal text), hook-wired at every step, capped at `max_iterations`.

use super::{Agent, MAX_ITERATIONS_MESSAGE, TASK_FINISHED_SENTINEL};
use crate::error::Result;
use crate::hooks::{HookContext, HookEvent};
use crate::prompter::{CallParams, PrompterResponse};
use crate::tools::executor::{ToolCall, ToolResult};

/// The runtime amendment appended to the system prompt on every iteration,
/// telling the model how to signal completion.
fn finish_sentinel_amendment() -> String {
    format!(
        "When you have fully completed the user's request and no further tool calls are \
         needed, include the literal token {TASK_FINISHED_SENTINEL} in your reply and make \
         no further tool calls."
    )
}

/// What happened in one loop iteration, for [`run_steps`]'s step-wise view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    ToolCall,
    Respond,
    MaxIterations,
}

/// One per-iteration record, for [`run_steps`]'s step-wise contract.
#[derive(Debug, Clone)]
pub struct AgentStep {
    pub iteration: u32,
    pub action: StepAction,
    pub content: String,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub tool_results: Option<Vec<ToolResult>>,
    pub is_final: bool,
}

fn call_params(agent: &Agent) -> CallParams {
    let tools_schema = agent.registry.get_openai_tools_schema();
    CallParams {
        runtime_system_prompt: Some(finish_sentinel_amendment()),
        tools: (!tools_schema.is_empty()).then_some(tools_schema),
        streamer: Some(agent.streamer.clone()),
        save_to_memory: Some(false), // the loop appends to memory itself.
        ..CallParams::default()
    }
}

/// Runs the full ReAct loop to completion and returns the final answer text.
/// On success the full response has already been streamed to
/// the client chunk-by-chunk via the agent's streamer; the return value here
/// is empty once a [`TASK_FINISHED_SENTINEL`] reply closes the loop, since
/// nothing further needs reconstructing from it. The max-iterations fallback
/// is the one case with non-empty content, since no terminal LLM reply ever
/// produced it.
pub async fn run(agent: &Agent, query: &str) -> Result<String> {
    {
        let mut memory = agent.memory.lock().await;
        memory.add_user(query);
    }
    agent
        .hooks
        .emit(HookContext::new(HookEvent::AgentBeforeRun, "agent").with("query", query))
        .await?;

    for iteration in 0..agent.config.max_iterations {
        agent
            .hooks
            .emit(HookContext::new(HookEvent::AgentBeforeIteration, "agent").with("iteration", iteration))
            .await?;

        let response = if iteration == 0 {
            agent.prompter.call(query, call_params(agent)).await
        } else {
            agent.prompter.call_continuation(call_params(agent)).await
        };

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                agent.streamer.stop(format!("error: {error}")).await;
                return Err(error);
            }
        };

        match response {
            PrompterResponse::ToolCalls(tool_calls) => {
                append_assistant_tool_calls(agent, &tool_calls.text, &tool_calls.tool_calls).await;

                agent
                    .hooks
                    .emit(HookContext::new(HookEvent::ToolsBeforeExecute, "executor"))
                    .await?;
                agent
                    .executor
                    .execute(&agent.registry, tool_calls.tool_calls.clone(), agent.config.tool_parallel, Some(agent.memory.clone()))
                    .await;
                agent
                    .hooks
                    .emit(HookContext::new(HookEvent::ToolsAfterExecute, "executor"))
                    .await?;

                agent
                    .hooks
                    .emit(HookContext::new(HookEvent::AgentAfterIteration, "agent").with("iteration", iteration))
                    .await?;
            }
            PrompterResponse::Text(text) => {
                {
                    let mut memory = agent.memory.lock().await;
                    memory.add_assistant_text(text.text.clone());
                }

                if text.text.contains(TASK_FINISHED_SENTINEL) {
                    agent.hooks.emit(HookContext::new(HookEvent::AgentAfterRun, "agent")).await?;
                    agent.streamer.stop("stop").await;
                    return Ok(String::new());
                }

                agent
                    .hooks
                    .emit(HookContext::new(HookEvent::AgentAfterIteration, "agent").with("iteration", iteration))
                    .await?;
            }
        }
    }

    agent.streamer.send("status", MAX_ITERATIONS_MESSAGE).await;
    agent.hooks.emit(HookContext::new(HookEvent::AgentAfterRun, "agent")).await?;
    agent.streamer.stop("stop").await;
    Ok(MAX_ITERATIONS_MESSAGE.to_string())
}

async fn append_assistant_tool_calls(agent: &Agent, text: &str, tool_calls: &[ToolCall]) {
    use crate::message::{ContentBlock, Message, TextBlock, ToolUseBlock};

    let mut blocks = Vec::new();
    if !text.is_empty() {
        blocks.push(ContentBlock::Text(TextBlock::new(text.to_string())));
    }
    for call in tool_calls {
        blocks.push(ContentBlock::ToolUse(ToolUseBlock::new(
            call.id.clone(),
            call.name.clone(),
            call.arguments.clone(),
        )));
    }
    let mut memory = agent.memory.lock().await;
    memory.add_assistant(Message::assistant(blocks));
}

/// Step-wise variant of [`run`]: drives the same loop but returns every
/// iteration's record instead of only the final answer, for callers that
/// want to observe (or relay) intermediate tool activity.
pub async fn run_steps(agent: &Agent, query: &str) -> Result<Vec<AgentStep>> {
    let mut steps = Vec::new();

    {
        let mut memory = agent.memory.lock().await;
        memory.add_user(query);
    }
    agent
        .hooks
        .emit(HookContext::new(HookEvent::AgentBeforeRun, "agent").with("query", query))
        .await?;

    for iteration in 0..agent.config.max_iterations {
        agent
            .hooks
            .emit(HookContext::new(HookEvent::AgentBeforeIteration, "agent").with("iteration", iteration))
            .await?;

        let response = if iteration == 0 {
            agent.prompter.call(query, call_params(agent)).await
        } else {
            agent.prompter.call_continuation(call_params(agent)).await
        };

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                agent.streamer.stop(format!("error: {error}")).await;
                return Err(error);
            }
        };

        match response {
            PrompterResponse::ToolCalls(tool_calls) => {
                append_assistant_tool_calls(agent, &tool_calls.text, &tool_calls.tool_calls).await;

                agent
                    .hooks
                    .emit(HookContext::new(HookEvent::ToolsBeforeExecute, "executor"))
                    .await?;
                let results = agent
                    .executor
                    .execute(&agent.registry, tool_calls.tool_calls.clone(), agent.config.tool_parallel, Some(agent.memory.clone()))
                    .await;
                agent
                    .hooks
                    .emit(HookContext::new(HookEvent::ToolsAfterExecute, "executor"))
                    .await?;
                agent
                    .hooks
                    .emit(HookContext::new(HookEvent::AgentAfterIteration, "agent").with("iteration", iteration))
                    .await?;

                steps.push(AgentStep {
                    iteration,
                    action: StepAction::ToolCall,
                    content: tool_calls.text,
                    tool_calls: Some(tool_calls.tool_calls),
                    tool_results: Some(results),
                    is_final: false,
                });
            }
            PrompterResponse::Text(text) => {
                {
                    let mut memory = agent.memory.lock().await;
                    memory.add_assistant_text(text.text.clone());
                }

                let finished = text.text.contains(TASK_FINISHED_SENTINEL);
                steps.push(AgentStep {
                    iteration,
                    action: StepAction::Respond,
                    content: text.text,
                    tool_calls: None,
                    tool_results: None,
                    is_final: finished,
                });

                if finished {
                    agent.hooks.emit(HookContext::new(HookEvent::AgentAfterRun, "agent")).await?;
                    agent.streamer.stop("stop").await;
                    return Ok(steps);
                }

                agent
                    .hooks
                    .emit(HookContext::new(HookEvent::AgentAfterIteration, "agent").with("iteration", iteration))
                    .await?;
            }
        }
    }

    agent.streamer.send("status", MAX_ITERATIONS_MESSAGE).await;
    agent.hooks.emit(HookContext::new(HookEvent::AgentAfterRun, "agent")).await?;
    agent.streamer.stop("stop").await;
    steps.push(AgentStep {
        iteration: agent.config.max_iterations,
        action: StepAction::MaxIterations,
        content: MAX_ITERATIONS_MESSAGE.to_string(),
        tool_calls: None,
        tool_results: None,
        is_final: true,
    });
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;
    use crate::llm::endpoints::{Backend, EndpointPool};
    use crate::llm::LlmClient;
    use crate::streamer::SseStreamer;
    use crate::tools::registry::ToolRegistry;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_agent() -> Agent {
        let llm = LlmClient::new(EndpointPool::single(Backend::new("http://localhost:1", "key", "m")));
        let streamer = Arc::new(SseStreamer::new("m", Duration::from_secs(5)));
        let registry = Arc::new(ToolRegistry::new());
        Agent::new(llm, "you are helpful", streamer, registry, AgentConfig { max_iterations: 2, ..AgentConfig::default() })
    }

    #[test]
    fn test_finish_sentinel_amendment_mentions_the_token() {
        assert!(finish_sentinel_amendment().contains(TASK_FINISHED_SENTINEL));
    }

    #[tokio::test]
    async fn test_run_against_unreachable_backend_propagates_error() {
        let agent = test_agent();
        let result = run(&agent, "hello").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_user_query_is_recorded_before_the_first_call() {
        let agent = test_agent();
        let _ = run(&agent, "hello").await;
        let memory = agent.memory_handle().lock().await;
        assert!(!memory.messages().is_empty());
    }
}
