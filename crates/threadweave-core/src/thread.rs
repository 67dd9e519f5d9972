//! In-process conversation threads.
//!
//! A [`Thread`] is the append-only record an agent drives turn by turn.
//! [`handoff`] and [`fork`] never touch their source: they copy the selected
//! history into a fresh thread that points back at its parent only through the
//! `parentThreadId` metadata entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::message::{Message, Role};

/// Metadata key holding the id of the thread a handoff or fork came from.
pub const PARENT_THREAD_ID: &str = "parentThreadId";

/// Append-only conversation record.
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    id: String,
    messages: Vec<Message>,
    metadata: BTreeMap<String, serde_json::Value>,
}

/// Serialized form of a [`Thread`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadExport {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Thread {
    /// Create an empty thread with a generated id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Create an empty thread with a caller-supplied id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages_by_role(&self, role: Role) -> Vec<&Message> {
        self.messages.iter().filter(|m| m.role == role).collect()
    }

    /// The last `count` messages, oldest first.
    pub fn recent_messages(&self, count: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(count);
        &self.messages[start..]
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    pub fn metadata_entries(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Id of the thread this one was derived from, if any.
    pub fn parent_id(&self) -> Option<&str> {
        self.metadata(PARENT_THREAD_ID).and_then(|v| v.as_str())
    }

    pub fn export(&self) -> ThreadExport {
        ThreadExport {
            id: self.id.clone(),
            messages: self.messages.clone(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn import(data: ThreadExport) -> Self {
        Self {
            id: data.id,
            messages: data.messages,
            metadata: data.metadata,
        }
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ThreadExport> for Thread {
    fn from(data: ThreadExport) -> Self {
        Thread::import(data)
    }
}

/// Filters for an in-process handoff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffOptions {
    /// Keep only the last N messages (applied after the role filter)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_n: Option<usize>,
    /// Keep only messages with this role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl HandoffOptions {
    pub fn last_n(n: usize) -> Self {
        Self {
            last_n: Some(n),
            role: None,
        }
    }

    pub fn role(role: Role) -> Self {
        Self {
            last_n: None,
            role: Some(role),
        }
    }
}

/// Derive a narrowed thread from `source`.
///
/// Metadata is copied and `parentThreadId` is set to the source id.
pub fn handoff(source: &Thread, options: HandoffOptions) -> Thread {
    let mut thread = Thread::new();
    thread.metadata = source.metadata.clone();
    thread.set_metadata(PARENT_THREAD_ID, serde_json::Value::from(source.id()));

    let mut messages: Vec<&Message> = match options.role {
        Some(role) => source.messages_by_role(role),
        None => source.messages.iter().collect(),
    };

    if let Some(n) = options.last_n {
        let start = messages.len().saturating_sub(n);
        messages.drain(..start);
    }

    thread.messages = messages.into_iter().cloned().collect();
    thread
}

/// Copy `source` in full under a fresh id.
pub fn fork(source: &Thread) -> Thread {
    let mut thread = Thread::new();
    thread.messages = source.messages.clone();
    thread.metadata = source.metadata.clone();
    thread.set_metadata(PARENT_THREAD_ID, serde_json::Value::from(source.id()));
    thread
}
