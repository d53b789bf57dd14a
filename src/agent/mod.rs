//! Agent core: lifecycle, derivation, and the hook-wired ReAct/Skill
//! iteration loops.
//!
//! [`Agent`] owns (or shares, via [`Agent::derive`]) an [`LlmClient`], a
//! session [`Memory`] handle, an [`SseStreamer`], a [`ToolRegistry`], and a
//! [`HookBus`]. The loop bodies themselves live in [`react`] and
//! [`skill_loop`]; this module is the shared plumbing both drive through.

pub mod react;
pub mod skill_loop;

use crate::config::RuntimeConfig;
use crate::hooks::HookBus;
use crate::llm::LlmClient;
use crate::memory::Memory;
use crate::prompter::Prompter;
use crate::streamer::SseStreamer;
use crate::tools::executor::ToolExecutor;
use crate::tools::registry::ToolRegistry;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The terminal sentinel the ReAct/Skill loops amend into the system prompt
/// and check for in a text-only assistant response.
pub const TASK_FINISHED_SENTINEL: &str = "TASK_FINISHED";

/// The message returned when the loop exhausts `max_iterations` without the
/// model emitting [`TASK_FINISHED_SENTINEL`] or a final text answer.
pub const MAX_ITERATIONS_MESSAGE: &str =
    "Sorry, I could not complete the task within the iteration budget.";

/// Loop-shaping knobs, narrowed to the subset the agent loop itself
/// consults from the runtime configuration surface.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_iterations: u32,
    pub history_max_round: usize,
    pub tool_parallel: bool,
    pub auto_save_to_memory: bool,
    pub long_response_max_continuations: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            history_max_round: 10,
            tool_parallel: false,
            auto_save_to_memory: true,
            long_response_max_continuations: 3,
        }
    }
}

impl AgentConfig {
    /// Derives loop knobs from the runtime-wide [`RuntimeConfig`].
    pub fn from_runtime(config: &RuntimeConfig) -> Self {
        Self {
            max_iterations: config.max_iterations as u32,
            long_response_max_continuations: config.long_response_max_continuations as u32,
            ..Self::default()
        }
    }
}

/// One agent instance.
///
/// Cloning is explicit: construct once, then call [`Agent::derive`] for a
/// related agent. Shared fields are `Arc`s so derived agents observe the
/// same session transcript and emit into the same SSE stream as their
/// parent without copying either.
pub struct Agent {
    pub(crate) llm: LlmClient,
    pub(crate) system_prompt: String,
    pub(crate) memory: Arc<Mutex<Memory>>,
    pub(crate) streamer: Arc<SseStreamer>,
    pub(crate) registry: Arc<ToolRegistry>,
    pub(crate) hooks: Arc<HookBus>,
    pub(crate) executor: ToolExecutor,
    pub(crate) prompter: Prompter,
    pub(crate) config: AgentConfig,
}

impl Agent {
    /// Builds a fresh agent with its own memory, a default hook bus, and a
    /// new-mode prompter rendering `system_prompt`.
    pub fn new(
        llm: LlmClient,
        system_prompt: impl Into<String>,
        streamer: Arc<SseStreamer>,
        registry: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        let system_prompt = system_prompt.into();
        let memory = Arc::new(Mutex::new(Memory::new()));
        let prompter = Prompter::new_mode(system_prompt.clone(), llm.clone())
            .with_memory(memory.clone())
            .expect("new-mode prompter accepts memory binding")
            .with_history_max_round(config.history_max_round)
            .with_auto_save(false); // the loop appends explicitly; auto-save would double-write.

        Self {
            llm,
            system_prompt,
            memory,
            streamer,
            registry,
            hooks: Arc::new(HookBus::default()),
            executor: ToolExecutor::default(),
            prompter,
            config,
        }
    }

    /// Rebinds this agent's memory, reconstructing the prompter so it reads
    /// history from the new handle.
    pub fn with_memory(mut self, memory: Arc<Mutex<Memory>>) -> crate::error::Result<Self> {
        self.memory = memory.clone();
        self.prompter = Prompter::new_mode(self.system_prompt.clone(), self.llm.clone())
            .with_memory(memory)?
            .with_history_max_round(self.config.history_max_round);
        Ok(self)
    }

    pub fn with_hooks(mut self, hooks: Arc<HookBus>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_executor(mut self, executor: ToolExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn memory_handle(&self) -> Arc<Mutex<Memory>> {
        self.memory.clone()
    }

    pub fn streamer(&self) -> Arc<SseStreamer> {
        self.streamer.clone()
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        self.registry.clone()
    }

    pub fn hooks(&self) -> Arc<HookBus> {
        self.hooks.clone()
    }

    /// Produces a related agent sharing this agent's streamer, memory, and
    /// hook bus: this is not a deep copy of memory, since memory is shared
    /// by reference so derived agents contribute to the same session
    /// transcript. `system_prompt` and `registry` are the overrides a
    /// derived agent typically needs; everything else — loop config,
    /// executor timeout — is inherited from the parent.
    pub fn derive(&self, system_prompt: impl Into<String>, registry: Arc<ToolRegistry>) -> crate::error::Result<Self> {
        let system_prompt = system_prompt.into();
        let prompter = Prompter::new_mode(system_prompt.clone(), self.llm.clone())
            .with_memory(self.memory.clone())?
            .with_history_max_round(self.config.history_max_round);

        Ok(Self {
            llm: self.llm.clone(),
            system_prompt,
            memory: self.memory.clone(),
            streamer: self.streamer.clone(),
            registry,
            hooks: self.hooks.clone(),
            executor: self.executor.clone(),
            prompter,
            config: self.config.clone(),
        })
    }
}
