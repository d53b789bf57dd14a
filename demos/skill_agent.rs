//! Skill-augmented agent example
//!
//! Discovers skill directories under `./demos/fixtures/skills`, layers
//! their catalogue onto the system prompt, and runs the skill loop
//! step-by-step so the activated skills can be printed alongside the
//! model's tool calls.
//!
//! Usage:
//!   cargo run --example skill_agent
//!
//! Requires a local OpenAI-compatible backend (e.g. Ollama on
//! localhost:11434) and at least one `SKILL.md`-bearing directory under
//! `demos/fixtures/skills/`.

use open_agent_rt::agent::skill_loop;
use open_agent_rt::llm::endpoints::{Backend, EndpointPool};
use open_agent_rt::skills::SkillMode;
use open_agent_rt::{Agent, AgentConfig, LlmClient, SkillManager, SseStreamer, ToolRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let skill_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/fixtures/skills");
    let skills = Arc::new(SkillManager::discover(&[skill_root], SkillMode::Activation)?);

    println!("Discovered {} skill(s):", skills.skills().len());
    for skill in skills.skills() {
        println!("  - {}: {}", skill.name, skill.description);
    }
    println!();

    let llm = LlmClient::new(EndpointPool::single(Backend::new(
        "http://localhost:11434/v1",
        "not-needed",
        "qwen3:8b",
    )));
    let streamer = Arc::new(SseStreamer::new("qwen3:8b", Duration::from_secs(60)));
    let registry = Arc::new(ToolRegistry::new());
    let agent = Agent::new(
        llm,
        "You are a helpful assistant with access to skills for specialized tasks.",
        streamer,
        registry,
        AgentConfig::default(),
    );

    let steps = skill_loop::run_steps(&agent, &skills, "Draft a commit message for my staged changes.").await?;

    for step in &steps {
        println!("iteration {}: {:?}", step.step.iteration, step.step.action);
        if !step.activated_skills.is_empty() {
            println!("  activated skills: {:?}", step.activated_skills);
        }
        if step.step.is_final {
            println!("  final answer: {}", step.step.content);
        }
    }

    Ok(())
}
