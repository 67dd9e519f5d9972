//! Persistent thread records and the pluggable store behind
//! [`ThreadManager`](crate::manager::ThreadManager).
//!
//! # Features
//!
//! - **ThreadStore trait**: async get/save/list/delete
//! - **InMemoryThreadStore**: process-local storage, the default
//! - **FileThreadStore**: one JSON file per thread
//!
//! Stores do not serialize concurrent writers to the same thread; callers
//! sharing a store must order their mutations themselves.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{ThreadError, ThreadResult};
use crate::message::{ArtifactRef, Message, TokenUsage};

/// Who can see a thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Workspace,
    Unlisted,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Private => write!(f, "private"),
            Visibility::Workspace => write!(f, "workspace"),
            Visibility::Unlisted => write!(f, "unlisted"),
        }
    }
}

/// Lightweight handle to a stored thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
}

impl ThreadRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            visibility: None,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }
}

/// A thread as persisted by a [`ThreadStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRecord {
    pub id: String,
    /// Owning user
    pub created_by: String,
    pub visibility: Visibility,
    pub messages: Vec<Message>,
    /// Distinct tool names referenced by the thread's tool calls, first use first
    pub tools_used: Vec<String>,
    pub artifacts: Vec<ArtifactRef>,
    /// Accumulated token usage; absent until the first cost update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThreadRecord {
    /// Empty record owned by `created_by`.
    pub fn new(id: impl Into<String>, created_by: impl Into<String>, visibility: Visibility) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_by: created_by.into(),
            visibility,
            messages: Vec::new(),
            tools_used: Vec::new(),
            artifacts: Vec::new(),
            cost: None,
            trace_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message, stamping `updated_at` and recording new tool names.
    pub fn push_message(&mut self, message: Message) {
        for name in message.tool_names() {
            if !self.tools_used.iter().any(|t| t == name) {
                self.tools_used.push(name.to_string());
            }
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    pub fn as_ref(&self) -> ThreadRef {
        ThreadRef::new(self.id.clone()).with_visibility(self.visibility)
    }
}

/// Filters for [`ThreadStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
}

impl ThreadQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_by(mut self, user: impl Into<String>) -> Self {
        self.created_by = Some(user.into());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn matches(&self, record: &ThreadRecord) -> bool {
        if self
            .created_by
            .as_ref()
            .is_some_and(|user| &record.created_by != user)
        {
            return false;
        }

        if let Some(visibility) = self.visibility
            && record.visibility != visibility
        {
            return false;
        }

        true
    }
}

/// Async storage contract for thread records.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Get a thread by id.
    async fn get(&self, id: &str) -> ThreadResult<Option<ThreadRecord>>;

    /// Save or replace a thread.
    async fn save(&self, record: &ThreadRecord) -> ThreadResult<()>;

    /// List threads matching a query, oldest first.
    async fn list(&self, query: &ThreadQuery) -> ThreadResult<Vec<ThreadRecord>>;

    /// Delete a thread. Deleting an unknown id is not an error.
    async fn delete(&self, id: &str) -> ThreadResult<bool>;

    /// Check if a thread exists.
    async fn exists(&self, id: &str) -> ThreadResult<bool> {
        Ok(self.get(id).await?.is_some())
    }
}

fn sort_oldest_first(records: &mut [ThreadRecord]) {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// In-memory thread store.
///
/// Threads live as long as the store; cloning the `Arc` from
/// [`InMemoryThreadStore::shared`] lets several managers see the same data.
#[derive(Debug, Default)]
pub struct InMemoryThreadStore {
    threads: RwLock<HashMap<String, ThreadRecord>>,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store wrapped in Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn len(&self) -> usize {
        self.threads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.threads.read().await.is_empty()
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn get(&self, id: &str) -> ThreadResult<Option<ThreadRecord>> {
        Ok(self.threads.read().await.get(id).cloned())
    }

    async fn save(&self, record: &ThreadRecord) -> ThreadResult<()> {
        debug!(thread_id = %record.id, messages = record.messages.len(), "Saving thread to memory");
        self.threads
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn list(&self, query: &ThreadQuery) -> ThreadResult<Vec<ThreadRecord>> {
        let threads = self.threads.read().await;
        let mut results: Vec<_> = threads
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();
        sort_oldest_first(&mut results);
        Ok(results)
    }

    async fn delete(&self, id: &str) -> ThreadResult<bool> {
        Ok(self.threads.write().await.remove(id).is_some())
    }
}

/// File-based thread store, one `<id>.json` file per thread.
#[derive(Debug)]
pub struct FileThreadStore {
    directory: PathBuf,
}

impl FileThreadStore {
    /// Create a store rooted at `directory`, creating it if needed.
    pub fn new(directory: impl Into<PathBuf>) -> ThreadResult<Self> {
        let dir = directory.into();
        std::fs::create_dir_all(&dir)?;
        info!(directory = %dir.display(), "Created file thread store");
        Ok(Self { directory: dir })
    }

    fn thread_path(&self, id: &str) -> PathBuf {
        self.directory.join(format!("{}.json", id))
    }

    fn check_id(id: &str) -> ThreadResult<()> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(ThreadError::Storage(format!("Invalid thread id: {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ThreadStore for FileThreadStore {
    async fn get(&self, id: &str) -> ThreadResult<Option<ThreadRecord>> {
        Self::check_id(id)?;
        let path = self.thread_path(id);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, record: &ThreadRecord) -> ThreadResult<()> {
        Self::check_id(&record.id)?;
        let path = self.thread_path(&record.id);
        let content = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&path, content).await?;
        debug!(thread_id = %record.id, path = %path.display(), "Saved thread to file");
        Ok(())
    }

    async fn list(&self, query: &ThreadQuery) -> ThreadResult<Vec<ThreadRecord>> {
        let mut entries = tokio::fs::read_dir(&self.directory).await?;
        let mut results = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read thread file");
                    continue;
                }
            };
            match serde_json::from_str::<ThreadRecord>(&content) {
                Ok(record) if query.matches(&record) => results.push(record),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse thread file");
                }
            }
        }

        sort_oldest_first(&mut results);
        Ok(results)
    }

    async fn delete(&self, id: &str) -> ThreadResult<bool> {
        Self::check_id(id)?;
        match tokio::fs::remove_file(self.thread_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
