//! Sandbox adapter: turns a sandbox capability into registered tools.
//!
//! The sandbox backend itself (local process vs container) is out of
//! scope; this module specifies only the tool-surface
//! contract a backend must satisfy ([`SandboxCapability`]) and the glue
//! that registers one tool per operation on a [`ToolRegistry`].

use crate::error::Result;
use crate::tools::registry::ToolRegistry;
use crate::tools::Tool;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Pure configuration for a sandbox backend. The docker image is ordinary
/// data, never a bundled asset: a hardcoded image name with no matching
/// Dockerfile is resolved here by treating the image as caller-supplied
/// config with a reasonable default, not an assumption of a shipped image.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub image: String,
    pub default_timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "python:3.11-slim".to_string(),
            default_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome shape returned by every sandbox tool: every tool return value
/// is `{success, output, error, ...}`.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub output: String,
    pub error: String,
    pub execution_time: f64,
    pub return_code: i32,
}

impl CommandResult {
    pub fn ok(output: impl Into<String>, execution_time: f64, return_code: i32) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: String::new(),
            execution_time,
            return_code,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: error.into(),
            execution_time: 0.0,
            return_code: -1,
        }
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// The capability interface a sandbox backend (local process or
/// container) must implement. The adapter never constructs a backend
/// itself — the agent owner supplies one.
#[async_trait]
pub trait SandboxCapability: Send + Sync {
    async fn run_python_code(&self, code: &str, timeout: Option<Duration>) -> Result<CommandResult>;
    async fn run_python_file(
        &self,
        path: &str,
        args: Option<Vec<String>>,
        timeout: Option<Duration>,
    ) -> Result<CommandResult>;
    async fn run_shell_command(&self, command: &str, timeout: Option<Duration>) -> Result<CommandResult>;

    async fn save_file(&self, path: &str, content: &str) -> Result<CommandResult>;
    async fn read_file(&self, path: &str) -> Result<CommandResult>;
    async fn delete_file(&self, path: &str) -> Result<CommandResult>;
    async fn list_files(&self, path: Option<&str>, recursive: bool) -> Result<CommandResult>;
    async fn file_exists(&self, path: &str) -> Result<CommandResult>;
    async fn copy_file(&self, src: &str, dst: &str) -> Result<CommandResult>;
    async fn move_file(&self, src: &str, dst: &str) -> Result<CommandResult>;

    async fn install_pip_package(&self, package: &str, version: Option<&str>) -> Result<CommandResult>;
    async fn list_installed_packages(&self) -> Result<CommandResult>;
    async fn check_package_installed(&self, package: &str) -> Result<CommandResult>;

    async fn set_environment_variable(&self, key: &str, value: &str) -> Result<CommandResult>;
    async fn get_environment_variable(&self, key: &str) -> Result<CommandResult>;
}

/// Registers one sandbox-backed tool on `registry`. `body` receives the
/// cloned `Arc<dyn SandboxCapability>` and the call's raw arguments and
/// returns a [`CommandResult`] — never an `Err`, since a sandbox operation
/// failure (e.g. "file not found") is a normal outcome the model should
/// see and reason about, not an executor-level fault.
fn register_one<F, Fut>(
    registry: &ToolRegistry,
    sandbox: &Arc<dyn SandboxCapability>,
    name: &'static str,
    description: &'static str,
    schema: Value,
    body: F,
) -> Result<()>
where
    F: Fn(Arc<dyn SandboxCapability>, Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = CommandResult> + Send + 'static,
{
    let sandbox = sandbox.clone();
    registry.register(
        Tool::new(name, description, schema, move |args: Value| {
            let sandbox = sandbox.clone();
            let result_future = body(sandbox, args);
            Box::pin(async move { Ok(result_future.await.to_value()) })
        }),
        None,
    )
}

/// Registers the full sandbox tool surface against `sandbox` on
/// `registry`.
pub fn register_sandbox_tools(registry: &ToolRegistry, sandbox: Arc<dyn SandboxCapability>) -> Result<()> {
    register_one(
        registry,
        &sandbox,
        "run_python_code",
        "Execute Python code in the sandbox and return its output.",
        serde_json::json!({
            "type": "object",
            "properties": {"code": {"type": "string"}, "timeout": {"type": "number"}},
            "required": ["code"],
        }),
        |sandbox, args| async move {
            let code = args["code"].as_str().unwrap_or_default();
            let timeout = args["timeout"].as_f64().map(Duration::from_secs_f64);
            sandbox.run_python_code(code, timeout).await.unwrap_or_else(CommandResult::err)
        },
    )?;

    register_one(
        registry,
        &sandbox,
        "run_python_file",
        "Execute a Python file already present in the sandbox.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "args": {"type": "array", "items": {"type": "string"}},
                "timeout": {"type": "number"},
            },
            "required": ["path"],
        }),
        |sandbox, args| async move {
            let path = args["path"].as_str().unwrap_or_default();
            let cli_args = args["args"]
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect());
            let timeout = args["timeout"].as_f64().map(Duration::from_secs_f64);
            sandbox
                .run_python_file(path, cli_args, timeout)
                .await
                .unwrap_or_else(CommandResult::err)
        },
    )?;

    register_one(
        registry,
        &sandbox,
        "run_shell_command",
        "Execute a shell command in the sandbox.",
        serde_json::json!({
            "type": "object",
            "properties": {"command": {"type": "string"}, "timeout": {"type": "number"}},
            "required": ["command"],
        }),
        |sandbox, args| async move {
            let command = args["command"].as_str().unwrap_or_default();
            let timeout = args["timeout"].as_f64().map(Duration::from_secs_f64);
            sandbox.run_shell_command(command, timeout).await.unwrap_or_else(CommandResult::err)
        },
    )?;

    register_one(
        registry,
        &sandbox,
        "save_file",
        "Write content to a file in the sandbox workspace.",
        serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}, "content": {"type": "string"}},
            "required": ["path", "content"],
        }),
        |sandbox, args| async move {
            let path = args["path"].as_str().unwrap_or_default();
            let content = args["content"].as_str().unwrap_or_default();
            sandbox.save_file(path, content).await.unwrap_or_else(CommandResult::err)
        },
    )?;

    register_one(
        registry,
        &sandbox,
        "read_file",
        "Read a file's content from the sandbox workspace.",
        serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"],
        }),
        |sandbox, args| async move {
            let path = args["path"].as_str().unwrap_or_default();
            sandbox.read_file(path).await.unwrap_or_else(CommandResult::err)
        },
    )?;

    register_one(
        registry,
        &sandbox,
        "delete_file",
        "Delete a file from the sandbox workspace.",
        serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"],
        }),
        |sandbox, args| async move {
            let path = args["path"].as_str().unwrap_or_default();
            sandbox.delete_file(path).await.unwrap_or_else(CommandResult::err)
        },
    )?;

    register_one(
        registry,
        &sandbox,
        "list_files",
        "List files in the sandbox workspace, optionally recursively.",
        serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}, "recursive": {"type": "boolean"}},
        }),
        |sandbox, args| async move {
            let recursive = args["recursive"].as_bool().unwrap_or(false);
            match args["path"].as_str() {
                Some(path) => sandbox.list_files(Some(path), recursive).await.unwrap_or_else(CommandResult::err),
                None => sandbox.list_files(None, recursive).await.unwrap_or_else(CommandResult::err),
            }
        },
    )?;

    register_one(
        registry,
        &sandbox,
        "file_exists",
        "Check whether a path exists in the sandbox workspace.",
        serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"],
        }),
        |sandbox, args| async move {
            let path = args["path"].as_str().unwrap_or_default();
            sandbox.file_exists(path).await.unwrap_or_else(CommandResult::err)
        },
    )?;

    register_one(
        registry,
        &sandbox,
        "copy_file",
        "Copy a file within the sandbox workspace.",
        serde_json::json!({
            "type": "object",
            "properties": {"src": {"type": "string"}, "dst": {"type": "string"}},
            "required": ["src", "dst"],
        }),
        |sandbox, args| async move {
            let src = args["src"].as_str().unwrap_or_default();
            let dst = args["dst"].as_str().unwrap_or_default();
            sandbox.copy_file(src, dst).await.unwrap_or_else(CommandResult::err)
        },
    )?;

    register_one(
        registry,
        &sandbox,
        "move_file",
        "Move or rename a file within the sandbox workspace.",
        serde_json::json!({
            "type": "object",
            "properties": {"src": {"type": "string"}, "dst": {"type": "string"}},
            "required": ["src", "dst"],
        }),
        |sandbox, args| async move {
            let src = args["src"].as_str().unwrap_or_default();
            let dst = args["dst"].as_str().unwrap_or_default();
            sandbox.move_file(src, dst).await.unwrap_or_else(CommandResult::err)
        },
    )?;

    register_one(
        registry,
        &sandbox,
        "install_pip_package",
        "Install a Python package into the sandbox environment.",
        serde_json::json!({
            "type": "object",
            "properties": {"package": {"type": "string"}, "version": {"type": "string"}},
            "required": ["package"],
        }),
        |sandbox, args| async move {
            let package = args["package"].as_str().unwrap_or_default();
            match args["version"].as_str() {
                Some(version) => sandbox
                    .install_pip_package(package, Some(version))
                    .await
                    .unwrap_or_else(CommandResult::err),
                None => sandbox.install_pip_package(package, None).await.unwrap_or_else(CommandResult::err),
            }
        },
    )?;

    register_one(
        registry,
        &sandbox,
        "list_installed_packages",
        "List Python packages installed in the sandbox environment.",
        serde_json::json!({"type": "object", "properties": {}}),
        |sandbox, _args| async move { sandbox.list_installed_packages().await.unwrap_or_else(CommandResult::err) },
    )?;

    register_one(
        registry,
        &sandbox,
        "check_package_installed",
        "Check whether a Python package is installed in the sandbox environment.",
        serde_json::json!({
            "type": "object",
            "properties": {"package": {"type": "string"}},
            "required": ["package"],
        }),
        |sandbox, args| async move {
            let package = args["package"].as_str().unwrap_or_default();
            sandbox.check_package_installed(package).await.unwrap_or_else(CommandResult::err)
        },
    )?;

    register_one(
        registry,
        &sandbox,
        "set_environment_variable",
        "Set an environment variable in the sandbox.",
        serde_json::json!({
            "type": "object",
            "properties": {"key": {"type": "string"}, "value": {"type": "string"}},
            "required": ["key", "value"],
        }),
        |sandbox, args| async move {
            let key = args["key"].as_str().unwrap_or_default();
            let value = args["value"].as_str().unwrap_or_default();
            sandbox.set_environment_variable(key, value).await.unwrap_or_else(CommandResult::err)
        },
    )?;

    register_one(
        registry,
        &sandbox,
        "get_environment_variable",
        "Get an environment variable's value from the sandbox.",
        serde_json::json!({
            "type": "object",
            "properties": {"key": {"type": "string"}},
            "required": ["key"],
        }),
        |sandbox, args| async move {
            let key = args["key"].as_str().unwrap_or_default();
            sandbox.get_environment_variable(key).await.unwrap_or_else(CommandResult::err)
        },
    )?;

    Ok(())
}
