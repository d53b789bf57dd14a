//! Sandboxed agent example
//!
//! Wires a minimal local-process [`SandboxCapability`] (shell commands via
//! `std::process::Command`, files under a scratch directory) into the
//! agent's tool registry, then lets the ReAct loop drive it.
//!
//! Usage:
//!   cargo run --example sandboxed_agent
//!
//! This demo's `LocalProcessSandbox` is illustrative only: a production
//! sandbox backend (container-isolated, resource-limited) is out of scope
//! for this crate — it specifies only the tool surface in
//! [`open_agent_rt::sandbox`].

use async_trait::async_trait;
use open_agent_rt::agent::react;
use open_agent_rt::llm::endpoints::{Backend, EndpointPool};
use open_agent_rt::sandbox::{register_sandbox_tools, CommandResult, SandboxCapability, SandboxConfig};
use open_agent_rt::{Agent, AgentConfig, Error, LlmClient, Result, SseStreamer, ToolRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct LocalProcessSandbox {
    root: PathBuf,
}

impl LocalProcessSandbox {
    fn new(root: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl SandboxCapability for LocalProcessSandbox {
    async fn run_python_code(&self, code: &str, timeout: Option<Duration>) -> Result<CommandResult> {
        let script = self.root.join("__snippet.py");
        std::fs::write(&script, code).map_err(|e| Error::other(e.to_string()))?;
        self.run_python_file(script.to_string_lossy().as_ref(), None, timeout).await
    }

    async fn run_python_file(
        &self,
        path: &str,
        args: Option<Vec<String>>,
        _timeout: Option<Duration>,
    ) -> Result<CommandResult> {
        let started = Instant::now();
        let output = std::process::Command::new("python3")
            .arg(path)
            .args(args.unwrap_or_default())
            .current_dir(&self.root)
            .output();
        Ok(match output {
            Ok(out) => CommandResult {
                success: out.status.success(),
                output: String::from_utf8_lossy(&out.stdout).into_owned(),
                error: String::from_utf8_lossy(&out.stderr).into_owned(),
                execution_time: started.elapsed().as_secs_f64(),
                return_code: out.status.code().unwrap_or(-1),
            },
            Err(e) => CommandResult::err(e.to_string()),
        })
    }

    async fn run_shell_command(&self, command: &str, _timeout: Option<Duration>) -> Result<CommandResult> {
        let started = Instant::now();
        let output = std::process::Command::new("sh").arg("-c").arg(command).current_dir(&self.root).output();
        Ok(match output {
            Ok(out) => CommandResult {
                success: out.status.success(),
                output: String::from_utf8_lossy(&out.stdout).into_owned(),
                error: String::from_utf8_lossy(&out.stderr).into_owned(),
                execution_time: started.elapsed().as_secs_f64(),
                return_code: out.status.code().unwrap_or(-1),
            },
            Err(e) => CommandResult::err(e.to_string()),
        })
    }

    async fn save_file(&self, path: &str, content: &str) -> Result<CommandResult> {
        Ok(match std::fs::write(self.resolve(path), content) {
            Ok(()) => CommandResult::ok("saved", 0.0, 0),
            Err(e) => CommandResult::err(e.to_string()),
        })
    }

    async fn read_file(&self, path: &str) -> Result<CommandResult> {
        Ok(match std::fs::read_to_string(self.resolve(path)) {
            Ok(content) => CommandResult::ok(content, 0.0, 0),
            Err(e) => CommandResult::err(e.to_string()),
        })
    }

    async fn delete_file(&self, path: &str) -> Result<CommandResult> {
        Ok(match std::fs::remove_file(self.resolve(path)) {
            Ok(()) => CommandResult::ok("deleted", 0.0, 0),
            Err(e) => CommandResult::err(e.to_string()),
        })
    }

    async fn list_files(&self, path: Option<&str>, _recursive: bool) -> Result<CommandResult> {
        let dir = path.map(|p| self.resolve(p)).unwrap_or_else(|| self.root.clone());
        let entries = std::fs::read_dir(&dir).map_err(|e| Error::other(e.to_string()))?;
        let names: Vec<String> = entries.flatten().map(|e| e.file_name().to_string_lossy().into_owned()).collect();
        Ok(CommandResult::ok(names.join(","), 0.0, 0))
    }

    async fn file_exists(&self, path: &str) -> Result<CommandResult> {
        Ok(CommandResult::ok(self.resolve(path).exists().to_string(), 0.0, 0))
    }

    async fn copy_file(&self, src: &str, dst: &str) -> Result<CommandResult> {
        Ok(match std::fs::copy(self.resolve(src), self.resolve(dst)) {
            Ok(_) => CommandResult::ok("copied", 0.0, 0),
            Err(e) => CommandResult::err(e.to_string()),
        })
    }

    async fn move_file(&self, src: &str, dst: &str) -> Result<CommandResult> {
        Ok(match std::fs::rename(self.resolve(src), self.resolve(dst)) {
            Ok(()) => CommandResult::ok("moved", 0.0, 0),
            Err(e) => CommandResult::err(e.to_string()),
        })
    }

    async fn install_pip_package(&self, package: &str, version: Option<&str>) -> Result<CommandResult> {
        let spec = match version {
            Some(v) => format!("{package}=={v}"),
            None => package.to_string(),
        };
        self.run_shell_command(&format!("pip install {spec}"), None).await
    }

    async fn list_installed_packages(&self) -> Result<CommandResult> {
        self.run_shell_command("pip list --format=freeze", None).await
    }

    async fn check_package_installed(&self, package: &str) -> Result<CommandResult> {
        self.run_shell_command(&format!("pip show {package}"), None).await
    }

    async fn set_environment_variable(&self, key: &str, value: &str) -> Result<CommandResult> {
        // SAFETY: demo runs single-threaded at this point in `main`, before
        // any tool dispatch reads the environment concurrently.
        unsafe { std::env::set_var(key, value) };
        Ok(CommandResult::ok("set", 0.0, 0))
    }

    async fn get_environment_variable(&self, key: &str) -> Result<CommandResult> {
        Ok(match std::env::var(key) {
            Ok(value) => CommandResult::ok(value, 0.0, 0),
            Err(_) => CommandResult::err(format!("{key} is not set")),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _config = SandboxConfig::default();
    let scratch = std::env::temp_dir().join("open-agent-rt-sandbox-demo");
    let sandbox = Arc::new(LocalProcessSandbox::new(scratch)?);

    let registry = Arc::new(ToolRegistry::new());
    register_sandbox_tools(&registry, sandbox)?;

    let llm = LlmClient::new(EndpointPool::single(Backend::new(
        "http://localhost:11434/v1",
        "not-needed",
        "qwen3:8b",
    )));
    let streamer = Arc::new(SseStreamer::new("qwen3:8b", Duration::from_secs(60)));
    let agent = Agent::new(
        llm,
        "You are a coding assistant with a sandboxed shell and filesystem. Use the tools to \
         complete the user's request, then summarize what you did.",
        streamer,
        registry,
        AgentConfig::default(),
    );

    let answer = react::run(
        &agent,
        "Save a file called hello.txt containing 'hi there', then read it back to confirm.",
    )
    .await?;

    if !answer.is_empty() {
        println!("{answer}");
    }

    Ok(())
}
