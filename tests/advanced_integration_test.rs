//! Hooks and the ReAct loop together: a `ToolsBeforeExecute`/`ToolsAfterExecute`
//! pair counts every dispatch across a multi-iteration run, and
//! `run_steps`'s step-wise view lines up with what actually happened when the
//! loop exhausts its iteration budget.

mod common;

use common::{client_for, mock_chat_completions, sse_body, Delta};
use open_agent_rt::agent::react::{self, StepAction};
use open_agent_rt::{Agent, AgentConfig, HookBus, HookEvent, HookOutcome, Tool, ToolRegistry};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn before_and_after_execute_hooks_both_fire_once_per_tool_dispatching_iteration() {
    let lookup_call = sse_body(&[
        Delta::tool_call(0, "call_1", "lookup", r#"{"key":"answer"}"#),
        Delta::finish("tool_calls"),
    ]);
    let final_reply = sse_body(&[Delta::text("Found it. TASK_FINISHED"), Delta::finish("stop")]);
    let server = mock_chat_completions(vec![lookup_call, final_reply]).await;
    let llm = client_for(&server);

    let registry = Arc::new(ToolRegistry::new());
    registry
        .register(
            Tool::new("lookup", "looks up a value", json!({"key": "string"}), |_args| {
                Box::pin(async move { Ok(json!({"value": 42})) })
            }),
            None,
        )
        .unwrap();

    let before_count = Arc::new(AtomicU32::new(0));
    let after_count = Arc::new(AtomicU32::new(0));
    let hooks = Arc::new(HookBus::default());

    let before = before_count.clone();
    hooks.on(HookEvent::ToolsBeforeExecute, move |_ctx| {
        let before = before.clone();
        async move {
            before.fetch_add(1, Ordering::SeqCst);
            Ok(HookOutcome::continue_())
        }
    });
    let after = after_count.clone();
    hooks.on(HookEvent::ToolsAfterExecute, move |_ctx| {
        let after = after.clone();
        async move {
            after.fetch_add(1, Ordering::SeqCst);
            Ok(HookOutcome::continue_())
        }
    });

    let streamer = Arc::new(open_agent_rt::SseStreamer::new("test-model", Duration::from_secs(5)));
    let config = AgentConfig { max_iterations: 5, ..AgentConfig::default() };
    let agent = Agent::new(llm, "you are helpful", streamer, registry, config).with_hooks(hooks);

    react::run(&agent, "what is the answer?").await.unwrap();

    assert_eq!(before_count.load(Ordering::SeqCst), 1);
    assert_eq!(after_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn run_steps_reports_a_max_iterations_step_when_the_model_never_signals_completion() {
    // Every turn replies with plain text but never includes the finish
    // sentinel, so the loop must exhaust max_iterations and run_steps must
    // report that as its final, synthetic step.
    let wandering_reply = sse_body(&[Delta::text("Still thinking..."), Delta::finish("stop")]);
    let bodies = vec![wandering_reply.clone(), wandering_reply.clone(), wandering_reply];
    let server = mock_chat_completions(bodies).await;
    let llm = client_for(&server);

    let registry = Arc::new(ToolRegistry::new());
    let streamer = Arc::new(open_agent_rt::SseStreamer::new("test-model", Duration::from_secs(5)));
    let config = AgentConfig { max_iterations: 3, ..AgentConfig::default() };
    let agent = Agent::new(llm, "you are helpful", streamer, registry, config);

    let steps = react::run_steps(&agent, "solve it").await.unwrap();

    assert_eq!(steps.len(), 4);
    for step in &steps[..3] {
        assert_eq!(step.action, StepAction::Respond);
        assert!(!step.is_final);
    }
    let last = steps.last().unwrap();
    assert_eq!(last.action, StepAction::MaxIterations);
    assert!(last.is_final);
}
