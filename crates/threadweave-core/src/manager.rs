//! Store-backed thread lifecycle.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ThreadError, ThreadResult};
use crate::message::{ArtifactRef, Message, TokenUsage};
use crate::store::{
    InMemoryThreadStore, ThreadQuery, ThreadRecord, ThreadRef, ThreadStore, Visibility,
};

/// User id used when a manager is built without one.
pub const DEFAULT_USER: &str = "default-user";

/// Context selection for [`ThreadManager::handoff`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffFilters {
    /// Keep only the last N source messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_messages: Option<usize>,
    /// Keep tool-calling messages only when they call one of these tools
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_tools: Vec<String>,
    /// Start from an empty history
    #[serde(default)]
    pub exclude_context: bool,
}

impl HandoffFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(mut self, n: usize) -> Self {
        self.include_messages = Some(n);
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.include_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn without_context(mut self) -> Self {
        self.exclude_context = true;
        self
    }

    fn select<'a>(&self, messages: &'a [Message]) -> Vec<&'a Message> {
        if self.exclude_context {
            return Vec::new();
        }

        let start = self
            .include_messages
            .map_or(0, |n| messages.len().saturating_sub(n));

        messages[start..]
            .iter()
            .filter(|msg| {
                self.include_tools.is_empty()
                    || msg.tool_calls.is_none()
                    || msg.calls_any_tool(&self.include_tools)
            })
            .collect()
    }
}

/// Lifecycle operations over a [`ThreadStore`], scoped to one user.
///
/// # Example
///
/// ```rust
/// use threadweave_core::{Message, ThreadManager};
///
/// # tokio_test::block_on(async {
/// let manager = ThreadManager::in_memory("alice");
/// let thread = manager.create(None).await.unwrap();
/// manager.add_message(&thread.id, Message::user("hello")).await.unwrap();
/// # });
/// ```
#[derive(Clone)]
pub struct ThreadManager {
    store: Arc<dyn ThreadStore>,
    user_id: String,
}

impl std::fmt::Debug for ThreadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadManager")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl Default for ThreadManager {
    fn default() -> Self {
        Self::in_memory(DEFAULT_USER)
    }
}

impl ThreadManager {
    pub fn new(store: Arc<dyn ThreadStore>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
        }
    }

    /// Manager over a fresh [`InMemoryThreadStore`].
    pub fn in_memory(user_id: impl Into<String>) -> Self {
        Self::new(InMemoryThreadStore::shared(), user_id)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn store(&self) -> &Arc<dyn ThreadStore> {
        &self.store
    }

    async fn load(&self, id: &str) -> ThreadResult<ThreadRecord> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ThreadError::NotFound(id.to_string()))
    }

    /// Create and persist an empty thread. The id and visibility come from
    /// `thread_ref` when given.
    pub async fn create(&self, thread_ref: Option<ThreadRef>) -> ThreadResult<ThreadRecord> {
        let (id, visibility) = match thread_ref {
            Some(r) => (r.id, r.visibility.unwrap_or_default()),
            None => (Uuid::new_v4().to_string(), Visibility::default()),
        };

        let record = ThreadRecord::new(id, self.user_id.clone(), visibility);
        self.store.save(&record).await?;
        info!(thread_id = %record.id, user = %self.user_id, "Created thread");
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> ThreadResult<Option<ThreadRecord>> {
        self.store.get(id).await
    }

    pub async fn add_message(&self, thread_id: &str, message: Message) -> ThreadResult<()> {
        let mut record = self.load(thread_id).await?;
        record.push_message(message);
        self.store.save(&record).await
    }

    /// Add `delta` to the thread's token totals.
    pub async fn update_cost(&self, thread_id: &str, delta: TokenUsage) -> ThreadResult<()> {
        let mut record = self.load(thread_id).await?;
        match record.cost.as_mut() {
            Some(cost) => *cost += delta,
            None => record.cost = Some(delta),
        }
        record.updated_at = Utc::now();
        self.store.save(&record).await
    }

    pub async fn add_artifact(&self, thread_id: &str, artifact: ArtifactRef) -> ThreadResult<()> {
        let mut record = self.load(thread_id).await?;
        record.artifacts.push(artifact);
        record.updated_at = Utc::now();
        self.store.save(&record).await
    }

    /// Start a fresh thread focused on `goal`.
    ///
    /// The selected slice of the source history is copied first, then `goal`
    /// is appended as a user message. Source metadata is not carried over.
    pub async fn handoff(
        &self,
        source_id: &str,
        goal: &str,
        filters: HandoffFilters,
    ) -> ThreadResult<ThreadRef> {
        let source = self.load(source_id).await?;
        let mut record = self
            .create(Some(
                ThreadRef::new(Uuid::new_v4().to_string()).with_visibility(source.visibility),
            ))
            .await?;

        for message in filters.select(&source.messages) {
            record.push_message(message.clone());
        }
        record.push_message(Message::user(goal));
        self.store.save(&record).await?;

        debug!(
            source = %source_id,
            thread_id = %record.id,
            messages = record.messages.len(),
            "Handed off thread"
        );
        Ok(record.as_ref())
    }

    /// Copy a thread under a new id.
    pub async fn fork(&self, source_id: &str) -> ThreadResult<ThreadRef> {
        let source = self.load(source_id).await?;
        let now = Utc::now();
        let record = ThreadRecord {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            ..source
        };
        self.store.save(&record).await?;

        debug!(source = %source_id, thread_id = %record.id, "Forked thread");
        Ok(record.as_ref())
    }

    /// This user's threads, optionally narrowed by visibility.
    pub async fn list(&self, visibility: Option<Visibility>) -> ThreadResult<Vec<ThreadRecord>> {
        let mut query = ThreadQuery::new().created_by(self.user_id.clone());
        query.visibility = visibility;
        self.store.list(&query).await
    }

    pub async fn delete(&self, thread_id: &str) -> ThreadResult<bool> {
        let deleted = self.store.delete(thread_id).await?;
        if deleted {
            info!(thread_id = %thread_id, "Deleted thread");
        }
        Ok(deleted)
    }
}
