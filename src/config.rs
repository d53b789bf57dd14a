//! # Configuration for the agent runtime
//!
//! Two layers live here. [`Provider`]/[`get_base_url`]/[`get_model`] are
//! unchanged convenience helpers for pointing a client at a local
//! OpenAI-compatible server. [`RuntimeConfig`] is the runtime-wide knob set:
//! memory pool sizing, iteration/timeout limits, and continuation behavior,
//! each overridable by an `OPEN_AGENT_*` environment variable.
//!
//! ## Supported Providers
//!
//! - **LM Studio**: Popular local model server with GUI
//! - **Ollama**: Command-line focused local model server
//! - **llama.cpp**: C++ inference engine with server mode
//! - **vLLM**: High-performance inference server
//!
//! ## Environment Variables
//!
//! - `OPEN_AGENT_BASE_URL`: Override base URL for any provider
//! - `OPEN_AGENT_MODEL`: Override model name (when prefer_env is true)
//! - `OPEN_AGENT_MEMORY_TTL_SECONDS`, `OPEN_AGENT_MAX_MEMORY_ITEMS`,
//!   `OPEN_AGENT_AUTO_CLEAN_INTERVAL_SECONDS`, `OPEN_AGENT_MAX_ITERATIONS`,
//!   `OPEN_AGENT_REQUEST_IDLE_TIMEOUT_SECONDS`,
//!   `OPEN_AGENT_LLM_REQUEST_TIMEOUT_SECONDS`,
//!   `OPEN_AGENT_TOOL_DEFAULT_TIMEOUT_SECONDS`,
//!   `OPEN_AGENT_HOOK_DEFAULT_TIMEOUT_SECONDS`,
//!   `OPEN_AGENT_LONG_RESPONSE_MAX_CONTINUATIONS`: override the matching
//!   [`RuntimeConfig`] field.
//!
//! ## Examples
//!
//! ```rust
//! use open_agent_rt::config::{Provider, get_base_url, get_model, RuntimeConfig};
//!
//! // Quick setup with provider defaults
//! let url = get_base_url(Some(Provider::Ollama), None);
//! let model = get_model(Some("llama3:8b"), false);
//!
//! // Runtime-wide knobs, defaults plus env overrides
//! let runtime = RuntimeConfig::from_env();
//! assert!(runtime.max_iterations > 0);
//! ```

use crate::error::{Error, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// PROVIDER ENUM
// ============================================================================

/// Enum representing supported local LLM server providers.
///
/// Each provider has a default base URL where its API server typically runs.
/// These are convenience shortcuts to avoid hardcoding URLs in application code.
///
/// ## Provider Details
///
/// | Provider | Default URL | Port | Description |
/// |----------|-------------|------|-------------|
/// | LMStudio | http://localhost:1234/v1 | 1234 | GUI-based local server |
/// | Ollama | http://localhost:11434/v1 | 11434 | CLI-focused server |
/// | LlamaCpp | http://localhost:8080/v1 | 8080 | C++ inference engine |
/// | VLLM | http://localhost:8000/v1 | 8000 | High-performance server |
///
/// All providers implement the OpenAI-compatible API standard, making them
/// interchangeable from the runtime's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// LM Studio - Popular GUI-based local model server (default port 1234)
    LMStudio,

    /// Ollama - Command-line focused local model server (default port 11434)
    Ollama,

    /// llama.cpp - C++ inference engine with server mode (default port 8080)
    LlamaCpp,

    /// vLLM - High-performance inference server (default port 8000)
    VLLM,
}

impl Provider {
    /// Get the default base URL for this provider.
    pub fn default_url(&self) -> &'static str {
        match self {
            Provider::LMStudio => "http://localhost:1234/v1",
            Provider::Ollama => "http://localhost:11434/v1",
            Provider::LlamaCpp => "http://localhost:8080/v1",
            Provider::VLLM => "http://localhost:8000/v1",
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    /// Parse a provider name from a string (case-insensitive, several
    /// separator conventions accepted).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lmstudio" | "lm-studio" | "lm_studio" => Ok(Provider::LMStudio),
            "ollama" => Ok(Provider::Ollama),
            "llamacpp" | "llama-cpp" | "llama_cpp" | "llama.cpp" => Ok(Provider::LlamaCpp),
            "vllm" => Ok(Provider::VLLM),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

// ============================================================================
// CONFIGURATION HELPER FUNCTIONS
// ============================================================================

/// Resolve the base URL for API requests.
///
/// Priority: `OPEN_AGENT_BASE_URL` env var, then `provider`'s default, then
/// `fallback`, then LM Studio's default.
pub fn get_base_url(provider: Option<Provider>, fallback: Option<&str>) -> String {
    if let Ok(url) = env::var("OPEN_AGENT_BASE_URL") {
        return url;
    }
    if let Some(p) = provider {
        return p.default_url().to_string();
    }
    fallback
        .unwrap_or(Provider::LMStudio.default_url())
        .to_string()
}

/// Resolve the model name, optionally preferring the `OPEN_AGENT_MODEL`
/// environment variable over `fallback`.
pub fn get_model(fallback: Option<&str>, prefer_env: bool) -> Option<String> {
    if prefer_env {
        if let Ok(model) = env::var("OPEN_AGENT_MODEL") {
            return Some(model);
        }
    }
    fallback.map(|s| s.to_string())
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|_| Error::config(format!("{key} must be a non-negative integer, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}

fn env_usize(key: &str, default: usize) -> Result<usize> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<usize>()
            .map_err(|_| Error::config(format!("{key} must be a non-negative integer, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}

// ============================================================================
// RUNTIME CONFIG
// ============================================================================

/// Runtime-wide knobs shared by every component: the memory pool's TTL/LRU
/// sweep, the ReAct/Skill loop's iteration cap, and the timeouts applied to
/// LLM calls, tool dispatch, and hook handlers.
///
/// Every field has a default and an `OPEN_AGENT_*` environment override,
/// applied by [`RuntimeConfig::from_env`]. Construct directly (or via
/// [`RuntimeConfig::default`]) to bypass the environment entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// How long a session's memory entry may sit idle before the pool's
    /// cleanup sweep evicts it. Default 3600s.
    pub memory_ttl_seconds: u64,
    /// Max number of memory units tracked per session before decay-based
    /// eviction kicks in. Default 500.
    pub max_memory_items: usize,
    /// Interval between automatic memory pool cleanup sweeps. Default 300s.
    pub auto_clean_interval_seconds: u64,
    /// Max ReAct/Skill loop iterations before the fallback message fires.
    /// Default 10.
    pub max_iterations: usize,
    /// How long a streaming request may sit with no forward progress before
    /// the streamer emits a timeout frame and closes. Default 60s.
    pub request_idle_timeout_seconds: u64,
    /// Per-call timeout applied to the LLM backend. Default 120s.
    pub llm_request_timeout_seconds: u64,
    /// Default per-tool dispatch timeout, overridable per tool. Default 30s.
    pub tool_default_timeout_seconds: u64,
    /// Default per-handler hook timeout, overridable per hook registration.
    /// Default 5s.
    pub hook_default_timeout_seconds: u64,
    /// Max number of automatic continuation calls the prompter's
    /// long-response wrapper will issue for a single logical reply.
    /// Default 3.
    pub long_response_max_continuations: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            memory_ttl_seconds: 3600,
            max_memory_items: 500,
            auto_clean_interval_seconds: 300,
            max_iterations: 10,
            request_idle_timeout_seconds: 60,
            llm_request_timeout_seconds: 120,
            tool_default_timeout_seconds: 30,
            hook_default_timeout_seconds: 5,
            long_response_max_continuations: 3,
        }
    }
}

impl RuntimeConfig {
    /// Start from [`RuntimeConfig::default`] and apply any of the nine
    /// `OPEN_AGENT_*` environment overrides that are set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a set environment variable fails
    /// to parse as the field's integer type.
    pub fn from_env() -> Result<Self> {
        let defaults = RuntimeConfig::default();
        Ok(RuntimeConfig {
            memory_ttl_seconds: env_u64(
                "OPEN_AGENT_MEMORY_TTL_SECONDS",
                defaults.memory_ttl_seconds,
            )?,
            max_memory_items: env_usize(
                "OPEN_AGENT_MAX_MEMORY_ITEMS",
                defaults.max_memory_items,
            )?,
            auto_clean_interval_seconds: env_u64(
                "OPEN_AGENT_AUTO_CLEAN_INTERVAL_SECONDS",
                defaults.auto_clean_interval_seconds,
            )?,
            max_iterations: env_usize("OPEN_AGENT_MAX_ITERATIONS", defaults.max_iterations)?,
            request_idle_timeout_seconds: env_u64(
                "OPEN_AGENT_REQUEST_IDLE_TIMEOUT_SECONDS",
                defaults.request_idle_timeout_seconds,
            )?,
            llm_request_timeout_seconds: env_u64(
                "OPEN_AGENT_LLM_REQUEST_TIMEOUT_SECONDS",
                defaults.llm_request_timeout_seconds,
            )?,
            tool_default_timeout_seconds: env_u64(
                "OPEN_AGENT_TOOL_DEFAULT_TIMEOUT_SECONDS",
                defaults.tool_default_timeout_seconds,
            )?,
            hook_default_timeout_seconds: env_u64(
                "OPEN_AGENT_HOOK_DEFAULT_TIMEOUT_SECONDS",
                defaults.hook_default_timeout_seconds,
            )?,
            long_response_max_continuations: env_usize(
                "OPEN_AGENT_LONG_RESPONSE_MAX_CONTINUATIONS",
                defaults.long_response_max_continuations,
            )?,
        })
    }

    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_seconds)
    }

    pub fn auto_clean_interval(&self) -> Duration {
        Duration::from_secs(self.auto_clean_interval_seconds)
    }

    pub fn request_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.request_idle_timeout_seconds)
    }

    pub fn llm_request_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_request_timeout_seconds)
    }

    pub fn tool_default_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_default_timeout_seconds)
    }

    pub fn hook_default_timeout(&self) -> Duration {
        Duration::from_secs(self.hook_default_timeout_seconds)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variable tests mutate global process state; serialize them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_provider_default_urls() {
        assert_eq!(Provider::LMStudio.default_url(), "http://localhost:1234/v1");
        assert_eq!(Provider::Ollama.default_url(), "http://localhost:11434/v1");
        assert_eq!(Provider::LlamaCpp.default_url(), "http://localhost:8080/v1");
        assert_eq!(Provider::VLLM.default_url(), "http://localhost:8000/v1");
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("lmstudio".parse::<Provider>(), Ok(Provider::LMStudio));
        assert_eq!("LM-Studio".parse::<Provider>(), Ok(Provider::LMStudio));
        assert_eq!("ollama".parse::<Provider>(), Ok(Provider::Ollama));
        assert_eq!("llamacpp".parse::<Provider>(), Ok(Provider::LlamaCpp));
        assert_eq!("llama.cpp".parse::<Provider>(), Ok(Provider::LlamaCpp));
        assert_eq!("vllm".parse::<Provider>(), Ok(Provider::VLLM));
        assert!("unknown".parse::<Provider>().is_err());
    }

    #[test]
    fn test_get_base_url_with_provider() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::remove_var("OPEN_AGENT_BASE_URL");
        }
        let url = get_base_url(Some(Provider::Ollama), None);
        assert_eq!(url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_get_base_url_with_fallback() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::remove_var("OPEN_AGENT_BASE_URL");
        }
        let url = get_base_url(None, Some("http://custom:8080/v1"));
        assert_eq!(url, "http://custom:8080/v1");
    }

    #[test]
    fn test_runtime_config_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.memory_ttl_seconds, 3600);
        assert_eq!(config.long_response_max_continuations, 3);
    }

    #[test]
    fn test_runtime_config_from_env_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::set_var("OPEN_AGENT_MAX_ITERATIONS", "25");
        }
        let config = RuntimeConfig::from_env().unwrap();
        assert_eq!(config.max_iterations, 25);
        unsafe {
            env::remove_var("OPEN_AGENT_MAX_ITERATIONS");
        }
    }

    #[test]
    fn test_runtime_config_from_env_rejects_garbage() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::set_var("OPEN_AGENT_MAX_ITERATIONS", "not-a-number");
        }
        let result = RuntimeConfig::from_env();
        assert!(result.is_err());
        unsafe {
            env::remove_var("OPEN_AGENT_MAX_ITERATIONS");
        }
    }

    #[test]
    fn test_runtime_config_duration_helpers() {
        let config = RuntimeConfig::default();
        assert_eq!(config.memory_ttl(), Duration::from_secs(3600));
        assert_eq!(config.llm_request_timeout(), Duration::from_secs(120));
    }
}
