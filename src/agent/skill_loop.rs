//! Skill-augmented loop: the same ReAct cycle over an agent whose system
//! prompt carries a skill catalogue and whose registry is pre-populated
//! with skill-access tools.
//!
//! Skills are not a separate loop, they are a system-prompt amendment plus
//! extra tools layered onto the same [`super::react`] cycle. This module's
//! only job is building that layered [`Agent`] and reporting which skills
//! got read during the run.

use super::react::{self, AgentStep, StepAction};
use super::Agent;
use crate::error::Result;
use crate::skills::SkillManager;
use crate::tools::registry::ToolRegistry;
use std::sync::Arc;

/// Builds a derived agent whose system prompt is amended with the skill
/// catalogue and whose registry additionally carries the skill manager's
/// tools (`list_skills`/`read_skill`/... or the filesystem equivalents,
/// depending on [`crate::skills::SkillMode`]).
pub fn build_skill_agent(agent: &Agent, skills: &Arc<SkillManager>) -> Result<Agent> {
    let catalogue = skills.catalogue();
    let system_prompt = if catalogue.is_empty() {
        agent.system_prompt.clone()
    } else {
        format!("{}\n\n{catalogue}", agent.system_prompt)
    };

    let registry = ToolRegistry::new();
    for tool in agent.registry.get_all_tools() {
        registry.register(tool, None)?;
    }
    skills.register_tools(&registry)?;

    agent.derive(system_prompt, Arc::new(registry))
}

/// Runs the skill-augmented loop to completion, returning the final answer
/// text with the same semantics as [`react::run`].
pub async fn run(agent: &Agent, skills: &Arc<SkillManager>, query: &str) -> Result<String> {
    let skill_agent = build_skill_agent(agent, skills)?;
    react::run(&skill_agent, query).await
}

/// Step-wise variant reporting, on top of [`react::run_steps`]'s records,
/// which skills were read via `read_skill` (or listed for read) during each
/// tool-call step.
pub async fn run_steps(agent: &Agent, skills: &Arc<SkillManager>, query: &str) -> Result<Vec<SkillStep>> {
    let skill_agent = build_skill_agent(agent, skills)?;
    let steps = react::run_steps(&skill_agent, query).await?;
    Ok(steps.into_iter().map(SkillStep::from_agent_step).collect())
}

/// An [`AgentStep`] annotated with the skills the call activated, if any.
#[derive(Debug, Clone)]
pub struct SkillStep {
    pub step: AgentStep,
    pub activated_skills: Vec<String>,
}

impl SkillStep {
    fn from_agent_step(step: AgentStep) -> Self {
        let activated_skills = if step.action == StepAction::ToolCall {
            step.tool_calls
                .as_deref()
                .unwrap_or(&[])
                .iter()
                .filter(|call| call.name == "read_skill")
                .filter_map(|call| call.arguments.get("name").and_then(|v| v.as_str()).map(str::to_string))
                .collect()
        } else {
            Vec::new()
        };
        Self { step, activated_skills }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;
    use crate::llm::endpoints::{Backend, EndpointPool};
    use crate::llm::LlmClient;
    use crate::skills::SkillMode;
    use crate::streamer::SseStreamer;
    use std::time::Duration;

    fn write_skill(root: &std::path::Path, name: &str, description: &str, body: &str) {
        use std::io::Write;
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let mut f = std::fs::File::create(dir.join("SKILL.md")).unwrap();
        write!(f, "---\nname: {name}\ndescription: {description}\n---\n{body}").unwrap();
    }

    fn test_agent() -> Agent {
        let llm = LlmClient::new(EndpointPool::single(Backend::new("http://localhost:1", "key", "m")));
        let streamer = Arc::new(SseStreamer::new("m", Duration::from_secs(5)));
        let registry = Arc::new(ToolRegistry::new());
        Agent::new(llm, "you are helpful", streamer, registry, AgentConfig::default())
    }

    #[test]
    fn test_build_skill_agent_amends_system_prompt_with_catalogue() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "git-commit", "Draft commit messages", "body");
        let manager = Arc::new(SkillManager::discover(&[tmp.path().to_path_buf()], SkillMode::Activation).unwrap());

        let agent = test_agent();
        let skill_agent = build_skill_agent(&agent, &manager).unwrap();
        assert!(skill_agent.system_prompt.contains("git-commit"));
        assert!(skill_agent.registry().get("read_skill").is_some());
    }

    #[test]
    fn test_build_skill_agent_with_no_skills_leaves_prompt_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = Arc::new(SkillManager::discover(&[tmp.path().to_path_buf()], SkillMode::Activation).unwrap());

        let agent = test_agent();
        let skill_agent = build_skill_agent(&agent, &manager).unwrap();
        assert_eq!(skill_agent.system_prompt, agent.system_prompt);
    }

    #[test]
    fn test_skill_step_extracts_activated_skill_names() {
        use crate::tools::executor::ToolCall;
        let step = AgentStep {
            iteration: 0,
            action: StepAction::ToolCall,
            content: String::new(),
            tool_calls: Some(vec![ToolCall::new("c1", "read_skill", serde_json::json!({"name": "git-commit"}))]),
            tool_results: None,
            is_final: false,
        };
        let skill_step = SkillStep::from_agent_step(step);
        assert_eq!(skill_step.activated_skills, vec!["git-commit".to_string()]);
    }
}
