//! # Scripted Provider Adapter
//!
//! A [`ProviderAdapter`] that replays predefined event sequences, for testing
//! agents without a live model.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use threadweave_core::{AgentError, AgentEvent, AgentResult, Message, TokenUsage, ToolCall};

use crate::adapter::{ProviderAdapter, ProviderStream};
use crate::options::AgentOptions;

type Script = Vec<AgentResult<AgentEvent>>;

#[derive(Debug, Default)]
struct ScriptState {
    turns: VecDeque<Script>,
    fallback: Option<Script>,
    received: Vec<Vec<Message>>,
}

/// Replays one scripted event sequence per `send`.
///
/// Turns are consumed in order; once they run out the last turn is repeated.
/// Clones share the same script and call history.
#[derive(Debug, Clone)]
pub struct ScriptedAdapter {
    name: String,
    structured: bool,
    parallel: bool,
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            structured: false,
            parallel: false,
            state: Arc::new(Mutex::new(ScriptState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue the events for the next unscripted turn.
    pub fn with_turn(self, events: Vec<AgentEvent>) -> Self {
        self.state().turns.push_back(events.into_iter().map(Ok).collect());
        self
    }

    /// Queue a turn whose stream fails after `events`.
    pub fn with_failing_turn(self, events: Vec<AgentEvent>, error: AgentError) -> Self {
        let mut script: Script = events.into_iter().map(Ok).collect();
        script.push(Err(error));
        self.state().turns.push_back(script);
        self
    }

    /// Queue a turn that streams `text` in `chunks` fragments then reports usage.
    pub fn with_text_reply(self, text: &str, usage: TokenUsage) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let size = chars.len().div_ceil(3).max(1);
        let pieces: Vec<String> = chars.chunks(size).map(|c| c.iter().collect()).collect();
        let last = pieces.len().saturating_sub(1);

        let mut events: Vec<AgentEvent> = pieces
            .into_iter()
            .enumerate()
            .map(|(i, piece)| AgentEvent::text(piece, i == last))
            .collect();
        events.push(AgentEvent::final_event(None, Vec::new(), Some(usage)));
        self.with_turn(events)
    }

    /// Queue a turn that requests `calls` then reports usage.
    pub fn with_tool_calls(self, calls: Vec<ToolCall>, usage: TokenUsage) -> Self {
        self.with_turn(vec![
            AgentEvent::tool_calls(calls),
            AgentEvent::final_event(None, Vec::new(), Some(usage)),
        ])
    }

    pub fn with_structured_output(mut self, supported: bool) -> Self {
        self.structured = supported;
        self
    }

    pub fn with_parallel_tools(mut self, supported: bool) -> Self {
        self.parallel = supported;
        self
    }

    /// Number of `send` calls so far.
    pub fn call_count(&self) -> usize {
        self.state().received.len()
    }

    /// Message histories passed to each `send`, oldest first.
    pub fn received(&self) -> Vec<Vec<Message>> {
        self.state().received.clone()
    }

    fn next_script(&self, messages: Vec<Message>) -> Script {
        let mut state = self.state();
        state.received.push(messages);
        match state.turns.pop_front() {
            Some(script) => {
                state.fallback = Some(script.clone());
                script
            }
            None => state.fallback.clone().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(
        &self,
        messages: Vec<Message>,
        _options: &AgentOptions,
    ) -> AgentResult<ProviderStream> {
        let script = self.next_script(messages);
        let stream = async_stream::stream! {
            for item in script {
                tokio::task::yield_now().await;
                yield item;
            }
        };
        Ok(Box::pin(stream))
    }

    fn supports_structured_output(&self) -> bool {
        self.structured
    }

    fn supports_parallel_tools(&self) -> bool {
        self.parallel
    }
}
