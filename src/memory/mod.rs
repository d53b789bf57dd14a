//! Session-scoped conversation memory.
//!
//! [`Memory`] holds one session's ordered message list plus the three
//! timestamps a session carries (`created_at`, `last_access_at`,
//! `turn_counter`). [`build_history`](Memory::build_history)
//! is the one operation the prompter and the agent loop both depend on: it
//! returns the most recent N "rounds" (user + assistant + trailing tool
//! messages) with the invariant that no returned history ever ends on an
//! orphan tool message.
//!
//! [`pool`] layers a multi-session TTL+LRU pool on top, for the HTTP layer.

pub mod pool;

use crate::message::{Message, MessageRole};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// How [`Memory::build_history`] should shape its return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryFormat {
    /// Return as a list of [`Message`].
    Messages,
    /// Flatten into one newline-joined transcript string.
    Text,
}

/// One session's ordered message list and access bookkeeping.
///
/// Cheap to construct; not internally synchronized — callers that need
/// cross-task sharing wrap it in a mutex (see [`pool::MemoryPool`], which
/// does exactly that to serialize writes per session).
#[derive(Debug, Clone)]
pub struct Memory {
    messages: VecDeque<Message>,
    created_at: DateTime<Utc>,
    last_access_at: DateTime<Utc>,
    turn_counter: u64,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            messages: VecDeque::new(),
            created_at: now,
            last_access_at: now,
            turn_counter: 0,
        }
    }

    fn touch(&mut self) {
        self.last_access_at = Utc::now();
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_access_at(&self) -> DateTime<Utc> {
        self.touch();
        self.last_access_at
    }

    pub fn turn_counter(&self) -> u64 {
        self.turn_counter
    }

    pub fn add_system(&mut self, content: impl Into<String>) {
        self.messages.push_back(Message::system(content));
        self.touch();
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.messages.push_back(Message::user(content));
        self.turn_counter += 1;
        self.touch();
    }

    pub fn add_user_message(&mut self, message: Message) {
        self.messages.push_back(message);
        self.turn_counter += 1;
        self.touch();
    }

    /// Appends an assistant message, either from rendered text or a
    /// pre-built [`Message`] (e.g. one carrying `tool_calls`).
    pub fn add_assistant(&mut self, message: Message) {
        self.messages.push_back(message);
        self.touch();
    }

    pub fn add_assistant_text(&mut self, content: impl Into<String>) {
        self.add_assistant(Message::assistant(vec![crate::message::ContentBlock::Text(
            crate::message::TextBlock::new(content),
        )]));
    }

    /// Appends one `tool`-role message per result, each carrying its
    /// originating `call_id` as `tool_call_id`.
    pub fn add_tool_result(&mut self, call_id: impl Into<String>, content: serde_json::Value) {
        self.messages.push_back(Message::tool_result(call_id, content));
        self.touch();
    }

    pub fn messages(&self) -> &VecDeque<Message> {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.touch();
    }

    /// Returns the most recent `max_round` rounds. A round is one user
    /// message, at most one following assistant message, and any tool
    /// messages that follow the assistant turn. Never returns a history
    /// ending on an orphan tool message — if a round is cut mid-round by the
    /// round limit, the partial trailing tool messages belonging to an
    /// earlier, excluded round are never included.
    pub fn build_history(
        &self,
        format: HistoryFormat,
        max_round: usize,
        include_timestamp: bool,
    ) -> Vec<Message> {
        let round_starts: Vec<usize> = self
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == MessageRole::User)
            .map(|(i, _)| i)
            .collect();

        let start_index = if max_round == 0 || round_starts.is_empty() {
            0
        } else {
            let take = max_round.min(round_starts.len());
            round_starts[round_starts.len() - take]
        };

        let mut out: Vec<Message> = self
            .messages
            .iter()
            .skip(start_index)
            .cloned()
            .collect();

        if include_timestamp {
            let stamp = format!("[{}] ", self.last_access_at.to_rfc3339());
            for m in out.iter_mut() {
                if let Some(crate::message::ContentBlock::Text(t)) = m.content.first_mut() {
                    t.text = format!("{stamp}{}", t.text);
                }
            }
        }

        // format == Text is handled by the caller via `render_history_text`;
        // Messages is the native return shape.
        let _ = format;
        out
    }

    /// Flattens a message list into the `text` history format: one line per
    /// message, `role: content`.
    pub fn render_history_text(history: &[Message]) -> String {
        history
            .iter()
            .map(|m| {
                let text: String = m
                    .content
                    .iter()
                    .filter_map(|b| match b {
                        crate::message::ContentBlock::Text(t) => Some(t.text.clone()),
                        crate::message::ContentBlock::ToolResult(r) => Some(r.content.to_string()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("{}: {}", role_label(&m.role), text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Keyword-overlap search fallback; scores by token overlap. No
    /// embeddings — that's handled by a separate vector memory layer.
    pub fn search(&self, query: &str, k: usize) -> Vec<(Message, f64)> {
        let query_tokens: std::collections::HashSet<String> = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(Message, f64)> = self
            .messages
            .iter()
            .filter_map(|m| {
                let text = message_text(m);
                let tokens = tokenize(&text);
                if tokens.is_empty() {
                    return None;
                }
                let overlap = query_tokens.intersection(&tokens).count();
                if overlap == 0 {
                    return None;
                }
                let score = overlap as f64 / query_tokens.union(&tokens).count() as f64;
                Some((m.clone(), score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// Dumps the session transcript as the `text` history format.
    pub fn save_history(&self, path: impl AsRef<std::path::Path>) -> crate::error::Result<()> {
        let all: Vec<Message> = self.messages.iter().cloned().collect();
        let text = Self::render_history_text(&all);
        std::fs::write(path, text).map_err(|e| crate::error::Error::other(e.to_string()))
    }

    /// Loads a text dump back as a flat sequence of user messages (the text
    /// format is lossy: role boundaries are line-based, not round-aware).
    pub fn load_history(&mut self, path: impl AsRef<std::path::Path>) -> crate::error::Result<()> {
        let text =
            std::fs::read_to_string(path).map_err(|e| crate::error::Error::other(e.to_string()))?;
        for line in text.lines() {
            if let Some((role, content)) = line.split_once(": ") {
                match role {
                    "system" => self.add_system(content),
                    "assistant" => self.add_assistant_text(content),
                    _ => self.add_user(content),
                }
            }
        }
        Ok(())
    }
}

fn role_label(role: &MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

fn message_text(m: &Message) -> String {
    m.content
        .iter()
        .filter_map(|b| match b {
            crate::message::ContentBlock::Text(t) => Some(t.text.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokenize(s: &str) -> std::collections::HashSet<String> {
    s.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}
