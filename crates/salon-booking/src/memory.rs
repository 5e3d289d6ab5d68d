//! Per-conversation chat history kept in process memory.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A tool invocation requested by the model. `arguments` is the raw JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role("assistant", content)
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role("tool", content)
        }
    }
}

pub trait MemoryStore: Send + Sync {
    fn get_history(&self, conversation_id: &str) -> Vec<Message>;
    /// Append a completed exchange. Implementations may drop old messages.
    fn append(&self, conversation_id: &str, messages: Vec<Message>);
    fn clear_history(&self, conversation_id: &str);
}

/// DashMap-backed history capped at `max_messages` per conversation.
#[derive(Clone)]
pub struct InMemoryMemoryStore {
    store: Arc<DashMap<String, Vec<Message>>>,
    max_messages: usize,
}

impl InMemoryMemoryStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            max_messages: max_messages.max(1),
        }
    }

    pub fn conversation_count(&self) -> usize {
        self.store.len()
    }
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new(40)
    }
}

/// Drop the oldest messages until at most `max` remain and the history starts at a
/// user turn, so no tool result is left without the call that produced it.
fn trim_history(history: &mut Vec<Message>, max: usize) {
    let mut cut = history.len().saturating_sub(max);
    while cut < history.len() && history[cut].role != "user" {
        cut += 1;
    }
    if cut > 0 {
        history.drain(..cut);
    }
}

impl MemoryStore for InMemoryMemoryStore {
    fn get_history(&self, conversation_id: &str) -> Vec<Message> {
        match self.store.get(conversation_id) {
            Some(history) => history.clone(),
            None => Vec::new(),
        }
    }

    fn append(&self, conversation_id: &str, messages: Vec<Message>) {
        let mut entry = self.store.entry(conversation_id.to_string()).or_default();
        entry.extend(messages);
        trim_history(&mut entry, self.max_messages);
    }

    fn clear_history(&self, conversation_id: &str) {
        self.store.remove(conversation_id);
    }
}
