//! Tool registry: registration, lookup, and OpenAI-schema export.
//!
//! Wraps [`super::Tool`]/[`super::ToolBuilder`] with a
//! register/unregister/get/get_all_tools/get_openai_tools_schema
//! collection, with name-conflict rejection unless an override name is
//! supplied.

use super::Tool;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// Thread-safe tool collection. Registration takes a write lock;
/// lookup/listing take a read lock.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `tool` under its own name, or under `name_override` if
    /// given. Returns [`Error::Configuration`] on a name conflict when no
    /// override is supplied.
    pub fn register(&self, tool: Tool, name_override: Option<&str>) -> Result<()> {
        let name = name_override.unwrap_or_else(|| tool.name()).to_string();
        let mut guard = self.tools.write().map_err(|_| Error::other("tool registry lock poisoned"))?;
        if guard.contains_key(&name) {
            return Err(Error::config(format!(
                "tool '{name}' is already registered; pass a name_override to replace it"
            )));
        }
        let tool = if name_override.is_some() {
            tool.renamed(name.clone())
        } else {
            tool
        };
        guard.insert(name, tool);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Result<()> {
        let mut guard = self.tools.write().map_err(|_| Error::other("tool registry lock poisoned"))?;
        guard
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("tool '{name}' is not registered")))
    }

    pub fn get(&self, name: &str) -> Option<Tool> {
        self.tools.read().ok()?.get(name).cloned()
    }

    pub fn get_all_tools(&self) -> Vec<Tool> {
        self.tools
            .read()
            .map(|g| g.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The OpenAI-compatible `tools` array served to the model.
    pub fn get_openai_tools_schema(&self) -> Vec<serde_json::Value> {
        self.get_all_tools().iter().map(|t| t.to_openai_format()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_tool(name: &str) -> Tool {
        Tool::new(name, "a test tool", json!({}), |_args| Box::pin(async move { Ok(json!({})) }))
    }

    #[test]
    fn test_register_and_get() {
        let registry = ToolRegistry::new();
        registry.register(noop_tool("echo"), None).unwrap();
        assert!(registry.get("echo").is_some());
    }

    #[test]
    fn test_duplicate_registration_without_override_errors() {
        let registry = ToolRegistry::new();
        registry.register(noop_tool("echo"), None).unwrap();
        let err = registry.register(noop_tool("echo"), None).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_name_override_resolves_conflict() {
        let registry = ToolRegistry::new();
        registry.register(noop_tool("echo"), None).unwrap();
        registry.register(noop_tool("echo"), Some("echo_v2")).unwrap();
        assert!(registry.get("echo_v2").is_some());
    }

    #[test]
    fn test_unregister_removes_tool() {
        let registry = ToolRegistry::new();
        registry.register(noop_tool("echo"), None).unwrap();
        registry.unregister("echo").unwrap();
        assert!(registry.get("echo").is_none());
    }

    #[test]
    fn test_unregister_unknown_tool_not_found() {
        let registry = ToolRegistry::new();
        assert!(matches!(registry.unregister("ghost").unwrap_err(), Error::NotFound(_)));
    }

    #[test]
    fn test_openai_schema_export() {
        let registry = ToolRegistry::new();
        registry.register(noop_tool("echo"), None).unwrap();
        let schema = registry.get_openai_tools_schema();
        assert_eq!(schema.len(), 1);
        assert_eq!(schema[0]["function"]["name"], "echo");
    }
}
