//! Tool call data model and the dispatch executor.
//!
//! Lookup → validate → dispatch with a per-tool timeout → normalize the
//! return value to a string → optionally run all calls concurrently,
//! preserving input order in the output regardless.

use super::registry::ToolRegistry;
use crate::memory::Memory;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of one dispatched [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    Success,
    Error,
    Timeout,
    Cancelled,
    NotFound,
    ValidationError,
}

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub status: ToolStatus,
    pub content: String,
    pub error_type: Option<String>,
}

impl ToolResult {
    fn success(call_id: String, tool_name: String, content: String) -> Self {
        Self {
            call_id,
            tool_name,
            status: ToolStatus::Success,
            content,
            error_type: None,
        }
    }

    fn not_found(call: &ToolCall) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status: ToolStatus::NotFound,
            content: format!("tool '{}' is not registered", call.name),
            error_type: Some("NotFoundError".to_string()),
        }
    }

    fn validation_error(call: &ToolCall, message: String) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status: ToolStatus::ValidationError,
            content: message,
            error_type: Some("ValidationError".to_string()),
        }
    }

    fn timeout(call: &ToolCall) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status: ToolStatus::Timeout,
            content: format!("tool '{}' timed out", call.name),
            error_type: Some("TimeoutError".to_string()),
        }
    }

    fn error(call: &ToolCall, error_type: &str, message: String) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status: ToolStatus::Error,
            content: message,
            error_type: Some(error_type.to_string()),
        }
    }

    /// The JSON payload appended to memory as a `tool`-role message.
    pub fn as_memory_content(&self) -> Value {
        serde_json::json!({
            "status": status_label(&self.status),
            "content": self.content,
        })
    }
}

fn status_label(status: &ToolStatus) -> &'static str {
    match status {
        ToolStatus::Success => "success",
        ToolStatus::Error => "error",
        ToolStatus::Timeout => "timeout",
        ToolStatus::Cancelled => "cancelled",
        ToolStatus::NotFound => "not_found",
        ToolStatus::ValidationError => "validation_error",
    }
}

/// Validates `arguments` against a tool's declared JSON-Schema-like
/// `input_schema`: every property listed under `required` must be present.
/// Deliberately shallow (no type-checking beyond presence) — the handler is
/// expected to reject malformed values itself and surface that as a
/// `ToolStatus::Error`.
fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), String> {
    let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
        return Ok(());
    };
    let Some(obj) = arguments.as_object() else {
        if required.is_empty() {
            return Ok(());
        }
        return Err("arguments must be a JSON object".to_string());
    };
    for name in required {
        let Some(name) = name.as_str() else { continue };
        if !obj.contains_key(name) {
            return Err(format!("missing required argument '{name}'"));
        }
    }
    Ok(())
}

/// Dispatches [`ToolCall`]s against a [`ToolRegistry`].
#[derive(Clone)]
pub struct ToolExecutor {
    timeout: Duration,
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ToolExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { timeout: default_timeout }
    }

    async fn dispatch_one(registry: &ToolRegistry, call: ToolCall, timeout: Duration) -> ToolResult {
        let Some(tool) = registry.get(&call.name) else {
            return ToolResult::not_found(&call);
        };

        if let Err(message) = validate_arguments(tool.input_schema(), &call.arguments) {
            return ToolResult::validation_error(&call, message);
        }

        let args = call.arguments.clone();
        let handler_future = tool.call(args);

        match tokio::time::timeout(timeout, handler_future).await {
            Ok(Ok(value)) => {
                let content = match &value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                ToolResult::success(call.id, call.name, content)
            }
            Ok(Err(e)) => ToolResult::error(&call, "ToolError", e.to_string()),
            Err(_) => ToolResult::timeout(&call),
        }
    }

    /// Executes `calls` against `registry`. When `parallel`, all handlers
    /// run concurrently; otherwise sequentially in call order. The returned
    /// list always matches the input order regardless. When `memory` is
    /// given, appends one `tool`-role message per result.
    pub async fn execute(
        &self,
        registry: &ToolRegistry,
        calls: Vec<ToolCall>,
        parallel: bool,
        memory: Option<Arc<Mutex<Memory>>>,
    ) -> Vec<ToolResult> {
        let results = if parallel {
            let futures = calls
                .into_iter()
                .map(|call| Self::dispatch_one(registry, call, self.timeout));
            futures::future::join_all(futures).await
        } else {
            let mut out = Vec::new();
            for call in calls {
                out.push(Self::dispatch_one(registry, call, self.timeout).await);
            }
            out
        };

        if let Some(memory) = memory {
            let mut guard = memory.lock().await;
            for result in &results {
                guard.add_tool_result(result.call_id.clone(), result.as_memory_content());
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry_with_add() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry
            .register(
                super::super::Tool::new(
                    "add",
                    "adds two numbers",
                    json!({"type": "object", "properties": {"a": {"type": "number"}, "b": {"type": "number"}}, "required": ["a", "b"]}),
                    |args| {
                        Box::pin(async move {
                            let a = args["a"].as_f64().unwrap_or(0.0);
                            let b = args["b"].as_f64().unwrap_or(0.0);
                            Ok(json!((a + b).to_string()))
                        })
                    },
                ),
                None,
            )
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_execute_single_success() {
        let registry = registry_with_add();
        let executor = ToolExecutor::default();
        let calls = vec![ToolCall::new("c1", "add", json!({"a": 2, "b": 3}))];
        let results = executor.execute(&registry, calls, false, None).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ToolStatus::Success);
        assert_eq!(results[0].content, "5");
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_not_found() {
        let registry = registry_with_add();
        let executor = ToolExecutor::default();
        let calls = vec![ToolCall::new("c1", "missing", json!({}))];
        let results = executor.execute(&registry, calls, false, None).await;
        assert_eq!(results[0].status, ToolStatus::NotFound);
    }

    #[tokio::test]
    async fn test_execute_validation_error_on_missing_required_arg() {
        let registry = registry_with_add();
        let executor = ToolExecutor::default();
        let calls = vec![ToolCall::new("c1", "add", json!({"a": 1}))];
        let results = executor.execute(&registry, calls, false, None).await;
        assert_eq!(results[0].status, ToolStatus::ValidationError);
    }

    #[tokio::test]
    async fn test_execute_preserves_input_order_in_parallel_mode() {
        let registry = registry_with_add();
        let executor = ToolExecutor::default();
        let calls = vec![
            ToolCall::new("c1", "add", json!({"a": 1, "b": 1})),
            ToolCall::new("c2", "add", json!({"a": 2, "b": 2})),
            ToolCall::new("c3", "add", json!({"a": 3, "b": 3})),
        ];
        let results = executor.execute(&registry, calls, true, None).await;
        assert_eq!(results.iter().map(|r| r.call_id.as_str()).collect::<Vec<_>>(), vec!["c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn test_execute_appends_tool_messages_to_memory() {
        let registry = registry_with_add();
        let executor = ToolExecutor::default();
        let memory = Arc::new(Mutex::new(Memory::new()));
        let calls = vec![ToolCall::new("c1", "add", json!({"a": 1, "b": 1}))];
        executor.execute(&registry, calls, false, Some(memory.clone())).await;
        let guard = memory.lock().await;
        assert_eq!(guard.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let registry = ToolRegistry::new();
        registry
            .register(
                super::super::Tool::new("slow", "sleeps", json!({}), |_args| {
                    Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(json!("done"))
                    })
                }),
                None,
            )
            .unwrap();
        let executor = ToolExecutor::new(Duration::from_millis(1));
        let calls = vec![ToolCall::new("c1", "slow", json!({}))];
        let results = executor.execute(&registry, calls, false, None).await;
        assert_eq!(results[0].status, ToolStatus::Timeout);
    }
}
