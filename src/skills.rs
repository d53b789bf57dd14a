//! Skill manager: discovers directory-bundled capabilities and exposes
//! them to the model either through tools that read them on demand
//! (activation mode) or through plain filesystem paths (filesystem mode).
//!
//! A skill is a directory containing a manifest file (`SKILL.md`) whose
//! header is simple `key: value` front matter between two `---` lines,
//! followed by the skill's full instruction body.

use crate::error::{Error, Result};
use crate::tools::registry::ToolRegistry;
use crate::tools::Tool;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MANIFEST_FILENAME: &str = "SKILL.md";

/// One discovered skill: parsed manifest metadata plus the directory it
/// lives in (resource reads are resolved within this directory only).
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub license: Option<String>,
    pub metadata: HashMap<String, String>,
    pub path: PathBuf,
    body: String,
}

impl Skill {
    /// Parses a skill directory's manifest. The manifest's front matter is
    /// `---\nkey: value\n...\n---\n<body>`; `name` and `description` are
    /// required.
    fn load(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILENAME);
        let text = std::fs::read_to_string(&manifest_path).map_err(|e| {
            Error::not_found(format!("skill manifest at {}: {e}", manifest_path.display()))
        })?;

        let (front_matter, body) = split_front_matter(&text)?;
        let mut fields = HashMap::new();
        for line in front_matter.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }

        let name = fields
            .remove("name")
            .ok_or_else(|| Error::validation(format!("skill manifest {} missing 'name'", manifest_path.display())))?;
        let description = fields.remove("description").ok_or_else(|| {
            Error::validation(format!("skill manifest {} missing 'description'", manifest_path.display()))
        })?;
        let license = fields.remove("license");

        Ok(Skill {
            name,
            description,
            license,
            metadata: fields,
            path: dir.to_path_buf(),
            body: body.to_string(),
        })
    }

    /// Resolves `relative` within this skill's directory, rejecting any
    /// path that escapes it: resource paths are resolved within the skill
    /// directory only, traversal is rejected.
    pub fn resolve_resource(&self, relative: &str) -> Result<PathBuf> {
        let candidate = self.path.join(relative);
        let root = self
            .path
            .canonicalize()
            .map_err(|e| Error::other(format!("cannot canonicalize skill dir: {e}")))?;

        // The resource may not exist yet on disk in test fixtures; resolve
        // lexically against the canonical root rather than requiring the
        // target to already exist.
        let mut resolved = root.clone();
        for part in candidate.components().skip(self.path.components().count()) {
            use std::path::Component;
            match part {
                Component::ParentDir => {
                    if !resolved.pop() || !resolved.starts_with(&root) {
                        return Err(Error::validation(format!(
                            "resource path '{relative}' escapes skill directory"
                        )));
                    }
                }
                Component::Normal(seg) => resolved.push(seg),
                _ => {}
            }
        }

        if !resolved.starts_with(&root) {
            return Err(Error::validation(format!(
                "resource path '{relative}' escapes skill directory"
            )));
        }
        Ok(resolved)
    }
}

fn split_front_matter(text: &str) -> Result<(&str, &str)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let rest = text
        .strip_prefix("---\n")
        .ok_or_else(|| Error::validation("skill manifest must start with '---' front matter"))?;
    let end = rest
        .find("\n---")
        .ok_or_else(|| Error::validation("skill manifest front matter is not terminated with '---'"))?;
    let front_matter = &rest[..end];
    let body = rest[end..]
        .trim_start_matches("\n---")
        .trim_start_matches('\n');
    Ok((front_matter, body))
}

/// Runtime mode controlling how discovered skills are exposed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillMode {
    /// Register `list_skills`/`read_skill`/`read_skill_resource` tools; the
    /// model reads a skill's full body through a tool call.
    Activation,
    /// Register filesystem-facing tools; the model is expected to read the
    /// skill's files directly (paired with a sandbox).
    Filesystem,
}

/// Discovers and serves skills under one or more search roots.
pub struct SkillManager {
    skills: Vec<Skill>,
    mode: SkillMode,
}

impl SkillManager {
    /// Walks `roots` one level deep; every immediate subdirectory
    /// containing a `SKILL.md` is loaded as a skill. A directory whose
    /// manifest fails to parse is skipped with a warning rather than
    /// aborting discovery for the rest.
    pub fn discover(roots: &[PathBuf], mode: SkillMode) -> Result<Self> {
        let mut skills = Vec::new();
        for root in roots {
            let entries = match std::fs::read_dir(root) {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(root = %root.display(), error = %e, "skill search root unreadable");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                match Skill::load(&path) {
                    Ok(skill) => skills.push(skill),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping invalid skill manifest");
                    }
                }
            }
        }
        Ok(Self { skills, mode })
    }

    pub fn skills(&self) -> &[Skill] {
        &self.skills
    }

    fn find(&self, name: &str) -> Option<&Skill> {
        self.skills.iter().find(|s| s.name == name)
    }

    /// The "available skills" catalogue injected into the system prompt:
    /// one `- name: description` line per registered skill.
    pub fn catalogue(&self) -> String {
        if self.skills.is_empty() {
            return String::new();
        }
        let mut out = String::from("Available skills:\n");
        for skill in &self.skills {
            out.push_str(&format!("- {}: {}\n", skill.name, skill.description));
        }
        out
    }

    /// Registers the mode-appropriate tools into `registry`.
    pub fn register_tools(self: &Arc<Self>, registry: &ToolRegistry) -> Result<()> {
        match self.mode {
            SkillMode::Activation => self.register_activation_tools(registry),
            SkillMode::Filesystem => self.register_filesystem_tools(registry),
        }
    }

    fn register_activation_tools(self: &Arc<Self>, registry: &ToolRegistry) -> Result<()> {
        let manager = self.clone();
        registry.register(
            Tool::new(
                "list_skills",
                "List the names and descriptions of every available skill.",
                serde_json::json!({"type": "object", "properties": {}}),
                move |_args| {
                    let manager = manager.clone();
                    Box::pin(async move {
                        let listing: Vec<Value> = manager
                            .skills
                            .iter()
                            .map(|s| serde_json::json!({"name": s.name, "description": s.description}))
                            .collect();
                        Ok(Value::Array(listing))
                    })
                },
            ),
            None,
        )?;

        let manager = self.clone();
        registry.register(
            Tool::new(
                "read_skill",
                "Read the full instruction body of a named skill.",
                serde_json::json!({
                    "type": "object",
                    "properties": {"name": {"type": "string"}},
                    "required": ["name"],
                }),
                move |args| {
                    let manager = manager.clone();
                    Box::pin(async move {
                        let name = args["name"].as_str().unwrap_or_default();
                        let skill = manager
                            .find(name)
                            .ok_or_else(|| Error::not_found(format!("skill '{name}' is not registered")))?;
                        Ok(Value::String(skill.body.clone()))
                    })
                },
            ),
            None,
        )?;

        let manager = self.clone();
        registry.register(
            Tool::new(
                "read_skill_resource",
                "Read an auxiliary resource file bundled with a named skill.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "path": {"type": "string"},
                    },
                    "required": ["name", "path"],
                }),
                move |args| {
                    let manager = manager.clone();
                    Box::pin(async move {
                        let name = args["name"].as_str().unwrap_or_default();
                        let path = args["path"].as_str().unwrap_or_default();
                        let skill = manager
                            .find(name)
                            .ok_or_else(|| Error::not_found(format!("skill '{name}' is not registered")))?;
                        let resolved = skill.resolve_resource(path)?;
                        let content = std::fs::read_to_string(&resolved)
                            .map_err(|e| Error::other(format!("reading skill resource: {e}")))?;
                        Ok(Value::String(content))
                    })
                },
            ),
            None,
        )?;

        Ok(())
    }

    fn register_filesystem_tools(self: &Arc<Self>, registry: &ToolRegistry) -> Result<()> {
        let manager = self.clone();
        registry.register(
            Tool::new(
                "list_skill_paths",
                "List the filesystem paths of every available skill's manifest, for direct reading.",
                serde_json::json!({"type": "object", "properties": {}}),
                move |_args| {
                    let manager = manager.clone();
                    Box::pin(async move {
                        let listing: Vec<Value> = manager
                            .skills
                            .iter()
                            .map(|s| {
                                serde_json::json!({
                                    "name": s.name,
                                    "description": s.description,
                                    "manifest_path": s.path.join(MANIFEST_FILENAME).display().to_string(),
                                })
                            })
                            .collect();
                        Ok(Value::Array(listing))
                    })
                },
            ),
            None,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_skill(root: &Path, name: &str, description: &str, body: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let mut f = std::fs::File::create(dir.join(MANIFEST_FILENAME)).unwrap();
        write!(f, "---\nname: {name}\ndescription: {description}\n---\n{body}").unwrap();
    }

    #[test]
    fn test_discover_loads_skill_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "git-commit", "Draft git commit messages", "Full instructions here.");

        let manager = SkillManager::discover(&[tmp.path().to_path_buf()], SkillMode::Activation).unwrap();
        assert_eq!(manager.skills().len(), 1);
        assert_eq!(manager.skills()[0].name, "git-commit");
    }

    #[test]
    fn test_discover_skips_invalid_manifest_without_aborting() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "good", "a good skill", "body");
        let bad_dir = tmp.path().join("bad");
        std::fs::create_dir_all(&bad_dir).unwrap();
        std::fs::write(bad_dir.join(MANIFEST_FILENAME), "not front matter at all").unwrap();

        let manager = SkillManager::discover(&[tmp.path().to_path_buf()], SkillMode::Activation).unwrap();
        assert_eq!(manager.skills().len(), 1);
        assert_eq!(manager.skills()[0].name, "good");
    }

    #[test]
    fn test_catalogue_lists_every_skill() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "a", "desc a", "body a");
        write_skill(tmp.path(), "b", "desc b", "body b");
        let manager = SkillManager::discover(&[tmp.path().to_path_buf()], SkillMode::Activation).unwrap();
        let catalogue = manager.catalogue();
        assert!(catalogue.contains("a: desc a"));
        assert!(catalogue.contains("b: desc b"));
    }

    #[test]
    fn test_resolve_resource_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "s", "d", "b");
        let manager = SkillManager::discover(&[tmp.path().to_path_buf()], SkillMode::Activation).unwrap();
        let skill = &manager.skills()[0];
        assert!(skill.resolve_resource("../../etc/passwd").is_err());
        assert!(skill.resolve_resource("notes.md").is_ok());
    }

    #[tokio::test]
    async fn test_activation_tools_registered_and_callable() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "git-commit", "Draft commits", "Step 1. Step 2.");
        let manager = Arc::new(
            SkillManager::discover(&[tmp.path().to_path_buf()], SkillMode::Activation).unwrap(),
        );
        let registry = ToolRegistry::new();
        manager.register_tools(&registry).unwrap();

        assert!(registry.get("list_skills").is_some());
        let read_skill = registry.get("read_skill").unwrap();
        let result = read_skill
            .call(serde_json::json!({"name": "git-commit"}))
            .await
            .unwrap();
        assert_eq!(result, Value::String("Step 1. Step 2.".to_string()));
    }
}
