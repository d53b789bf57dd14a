//! Minimal Jinja-like template renderer.
//!
//! Covers exactly what the prompter needs: `{{name}}` substitution,
//! `{% if cond %}…{% endif %}` (truthy on any non-empty, non-"false"
//! placeholder value), and whitespace cleanup that collapses runs of 3+
//! blank lines down to 2. Not a general template language — if a future
//! caller needs loops or filters, that belongs in a real template crate,
//! not grown here.

use std::collections::{HashMap, HashSet};

/// A parsed template: the raw source plus its statically-collected
/// placeholder names (used by the prompter to validate `update_placeholder`
/// keys before rendering).
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
}

impl Template {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into() }
    }

    /// All `{{name}}` placeholders referenced anywhere in the template,
    /// including inside `{% if %}` conditions.
    pub fn placeholders(&self) -> HashSet<String> {
        let mut names = HashSet::new();
        let mut rest = self.source.as_str();
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            if let Some(end) = after.find("}}") {
                names.insert(after[..end].trim().to_string());
                rest = &after[end + 2..];
            } else {
                break;
            }
        }
        let mut rest = self.source.as_str();
        while let Some(start) = rest.find("{% if ") {
            let after = &rest[start + 6..];
            if let Some(end) = after.find("%}") {
                names.insert(after[..end].trim().to_string());
                rest = &after[end + 2..];
            } else {
                break;
            }
        }
        names
    }

    /// Renders `{{name}}` substitutions and `{% if cond %}…{% endif %}`
    /// blocks, then collapses 3+ consecutive blank lines to 2. Missing
    /// placeholders render as an empty string; the prompter is responsible
    /// for warning about unknown/missing keys, not this renderer.
    pub fn render(&self, values: &HashMap<String, String>) -> String {
        let after_conditionals = render_conditionals(&self.source, values);
        let substituted = substitute(&after_conditionals, values);
        collapse_blank_lines(&substituted)
    }
}

fn substitute(source: &str, values: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                out.push_str(values.get(name).map(String::as_str).unwrap_or(""));
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_truthy(name: &str, values: &HashMap<String, String>) -> bool {
    match values.get(name) {
        Some(v) => !v.is_empty() && v != "false",
        None => false,
    }
}

fn render_conditionals(source: &str, values: &HashMap<String, String>) -> String {
    let mut out = String::new();
    let mut rest = source;
    while let Some(start) = rest.find("{% if ") {
        out.push_str(&rest[..start]);
        let after_tag = &rest[start + 6..];
        let Some(cond_end) = after_tag.find("%}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let cond = after_tag[..cond_end].trim();
        let body_start = &after_tag[cond_end + 2..];
        let Some(endif_pos) = body_start.find("{% endif %}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let body = &body_start[..endif_pos];
        if is_truthy(cond, values) {
            out.push_str(&render_conditionals(body, values));
        }
        rest = &body_start[endif_pos + "{% endif %}".len()..];
    }
    out.push_str(rest);
    out
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = Vec::new();
    let mut blank_run = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run <= 2 {
                out.push(line);
            }
        } else {
            blank_run = 0;
            out.push(line);
        }
    }
    out.join("\n")
}
