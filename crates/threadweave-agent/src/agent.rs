//! # Agent
//!
//! The orchestration core. One call to [`Agent::send`] runs a turn:
//!
//! 1. the input is appended to the thread (created on first use)
//! 2. the adapter's event stream is drained, forwarding `assistant` events
//! 3. requested tool calls run one at a time behind the permission engine
//! 4. the turn closes with a `final` event, or an `error` event on failure
//!
//! Errors never escape as `Err`; every outcome is an event on the stream.

use futures::{FutureExt, Stream, StreamExt};
use serde_json::{Value, json};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

use threadweave_core::{
    AgentError, AgentEvent, Attachment, HandoffOptions, Message, Thread, ToolCall, ToolResult,
    repair_structured, validate_structured,
};
use threadweave_policy::{PermissionAction, PermissionEngine, Redactor, ToolInvocation};

use crate::adapter::ProviderAdapter;
use crate::options::AgentOptions;
use crate::tool::ToolDefinition;

/// Events of one turn, in delivery order.
pub type EventStream<'a> = Pin<Box<dyn Stream<Item = AgentEvent> + Send + 'a>>;

/// Where a turn currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TurnPhase {
    #[default]
    Idle,
    ThreadReady,
    StreamingFromProvider,
    AccumulatingDeltas,
    ExecutingTools,
    Finalizing,
    Completed,
    Errored,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnPhase::Idle => "idle",
            TurnPhase::ThreadReady => "thread_ready",
            TurnPhase::StreamingFromProvider => "streaming_from_provider",
            TurnPhase::AccumulatingDeltas => "accumulating_deltas",
            TurnPhase::ExecutingTools => "executing_tools",
            TurnPhase::Finalizing => "finalizing",
            TurnPhase::Completed => "completed",
            TurnPhase::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Input to a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentInput {
    User {
        text: String,
        attachments: Vec<Attachment>,
    },
    /// Results for tool calls the caller executed itself.
    ToolResults(Vec<ToolResult>),
}

impl AgentInput {
    pub fn user(text: impl Into<String>) -> Self {
        AgentInput::User {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        AgentInput::User {
            text: text.into(),
            attachments,
        }
    }

    fn into_message(self) -> Message {
        match self {
            AgentInput::User { text, attachments } => {
                Message::user(text).with_attachments(attachments)
            }
            AgentInput::ToolResults(results) => Message::tool_results(results),
        }
    }
}

impl From<&str> for AgentInput {
    fn from(text: &str) -> Self {
        AgentInput::user(text)
    }
}

impl From<String> for AgentInput {
    fn from(text: String) -> Self {
        AgentInput::user(text)
    }
}

impl From<Vec<ToolResult>> for AgentInput {
    fn from(results: Vec<ToolResult>) -> Self {
        AgentInput::ToolResults(results)
    }
}

/// Lifetime counters for an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentMetrics {
    /// Number of `send` calls, including failed turns
    pub total_requests: u64,
}

enum CallOutcome {
    Finished(ToolResult),
    /// Rejected by policy; ends the batch.
    Denied { result: ToolResult, error: AgentError },
}

/// A conversation with one provider, its tools and its permission rules.
///
/// Callers must not drive two turns of the same agent at once; `send`
/// borrows the agent mutably for the lifetime of the returned stream.
pub struct Agent {
    options: AgentOptions,
    adapter: Arc<dyn ProviderAdapter>,
    thread: Option<Thread>,
    permissions: PermissionEngine,
    redactor: Redactor,
    total_requests: u64,
    phase: TurnPhase,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("provider", &self.adapter.name())
            .field("model", &self.options.model)
            .field("thread_id", &self.thread.as_ref().map(Thread::id))
            .field("total_requests", &self.total_requests)
            .field("phase", &self.phase)
            .finish()
    }
}

impl Agent {
    pub fn with_adapter(options: AgentOptions, adapter: Arc<dyn ProviderAdapter>) -> Self {
        let permissions = PermissionEngine::new(options.permissions.clone());
        Self {
            options,
            adapter,
            thread: None,
            permissions,
            redactor: Redactor::default(),
            total_requests: 0,
            phase: TurnPhase::Idle,
        }
    }

    /// Continue on an existing thread.
    pub fn with_thread(mut self, thread: Thread) -> Self {
        self.thread = Some(thread);
        self
    }

    /// Replace the redactor used for logged tool arguments.
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    pub fn adapter(&self) -> &Arc<dyn ProviderAdapter> {
        &self.adapter
    }

    pub fn permissions(&self) -> &PermissionEngine {
        &self.permissions
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn metrics(&self) -> AgentMetrics {
        AgentMetrics {
            total_requests: self.total_requests,
        }
    }

    /// The thread, created on first access.
    pub fn thread(&mut self) -> &Thread {
        self.thread_mut()
    }

    pub fn thread_mut(&mut self) -> &mut Thread {
        self.thread.get_or_insert_with(Thread::new)
    }

    /// The thread if a turn or accessor has created one.
    pub fn current_thread(&self) -> Option<&Thread> {
        self.thread.as_ref()
    }

    /// Register more tools for subsequent turns.
    pub fn add_tools(&mut self, tools: impl IntoIterator<Item = ToolDefinition>) {
        for tool in tools {
            debug!(tool = %tool.name, "Adding tool");
            self.options.tools.push(tool);
        }
    }

    /// A new agent over a narrowed copy of this agent's thread.
    pub fn handoff(&mut self, options: HandoffOptions) -> Agent {
        let thread = threadweave_core::handoff(self.thread(), options);
        self.derive(thread)
    }

    /// A new agent over a full copy of this agent's thread.
    pub fn fork(&mut self) -> Agent {
        let thread = threadweave_core::fork(self.thread());
        self.derive(thread)
    }

    fn derive(&self, thread: Thread) -> Agent {
        Agent {
            options: self.options.clone(),
            adapter: Arc::clone(&self.adapter),
            thread: Some(thread),
            permissions: self.permissions.clone(),
            redactor: self.redactor.clone(),
            total_requests: 0,
            phase: TurnPhase::Idle,
        }
    }

    fn transition(&mut self, phase: TurnPhase) {
        debug!(from = %self.phase, to = %phase, "Turn phase");
        self.phase = phase;
    }

    fn panic_error(&self, payload: &(dyn Any + Send)) -> AgentError {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        AgentError::agent(
            format!("Provider {} panicked: {}", self.adapter.name(), detail),
            Some(self.adapter.name().to_string()),
        )
    }

    fn provider_code(&self) -> String {
        format!("{}_ERROR", self.adapter.name().to_uppercase())
    }

    /// Run one turn.
    ///
    /// The stream yields, in order: a `system` event on the thread's first
    /// message, the provider's `assistant` events, one `tool_result` event per
    /// executed call, then exactly one `final` or `error` event.
    pub fn send(&mut self, input: impl Into<AgentInput>) -> EventStream<'_> {
        let input = input.into();
        let agent = self;

        let stream = async_stream::stream! {
            agent.total_requests += 1;
            agent.transition(TurnPhase::Idle);

            let first_message = agent.thread.as_ref().is_none_or(Thread::is_empty);
            let thread = agent.thread_mut();
            thread.add_message(input.into_message());
            let thread_id = thread.id().to_string();
            let history = thread.messages().to_vec();
            agent.transition(TurnPhase::ThreadReady);

            if first_message {
                yield AgentEvent::system(
                    thread_id.clone(),
                    agent.options.tool_names(),
                    Some(agent.options.model.clone()),
                );
            }

            agent.transition(TurnPhase::StreamingFromProvider);
            let started = AssertUnwindSafe(agent.adapter.send(history, &agent.options))
                .catch_unwind()
                .await;
            let mut provider = match started {
                Ok(Ok(provider)) => provider,
                Ok(Err(err)) => {
                    warn!(thread_id = %thread_id, error = %err, "Provider adapter failed to start");
                    agent.transition(TurnPhase::Errored);
                    yield AgentEvent::from_error(&err);
                    return;
                }
                Err(payload) => {
                    let err = agent.panic_error(payload.as_ref());
                    warn!(thread_id = %thread_id, error = %err, "Provider adapter panicked on start");
                    agent.transition(TurnPhase::Errored);
                    yield AgentEvent::from_error(&err);
                    return;
                }
            };

            let mut text = String::new();
            let mut pending: Vec<ToolCall> = Vec::new();
            let mut artifacts = Vec::new();
            let mut usage = None;
            let mut failure = None;

            loop {
                let polled = AssertUnwindSafe(provider.next()).catch_unwind().await;
                let item = match polled {
                    Ok(Some(item)) => item,
                    Ok(None) => break,
                    Err(payload) => {
                        failure = Some(AgentEvent::from_error(&agent.panic_error(payload.as_ref())));
                        break;
                    }
                };
                match item {
                    Ok(AgentEvent::Assistant { text: fragment, tool_calls, done }) => {
                        if agent.phase != TurnPhase::AccumulatingDeltas {
                            agent.transition(TurnPhase::AccumulatingDeltas);
                        }
                        if let Some(fragment) = &fragment {
                            text.push_str(fragment);
                        }
                        if let Some(calls) = &tool_calls {
                            pending.extend(calls.iter().cloned());
                        }
                        yield AgentEvent::Assistant { text: fragment, tool_calls, done };
                    }
                    Ok(AgentEvent::Final { artifacts: reported, usage: reported_usage, .. }) => {
                        artifacts.extend(reported);
                        if reported_usage.is_some() {
                            usage = reported_usage;
                        }
                    }
                    Ok(AgentEvent::Error { error, code }) => {
                        let code = code.unwrap_or_else(|| agent.provider_code());
                        failure = Some(AgentEvent::error(error, Some(code)));
                        break;
                    }
                    Ok(other) => {
                        debug!(kind = other.kind(), "Ignoring provider event");
                    }
                    Err(err) => {
                        failure = Some(AgentEvent::from_error(&err));
                        break;
                    }
                }
            }
            drop(provider);

            if !text.is_empty() || !pending.is_empty() {
                let mut message = Message::assistant(text.clone());
                if !pending.is_empty() {
                    message = message.with_tool_calls(pending.clone());
                }
                agent.thread_mut().add_message(message);
            }

            if let Some(event) = failure {
                warn!(thread_id = %thread_id, provider = %agent.adapter.name(), "Provider stream failed");
                agent.transition(TurnPhase::Errored);
                yield event;
                return;
            }

            if !pending.is_empty() {
                agent.transition(TurnPhase::ExecutingTools);
                for call in &pending {
                    let outcome = agent.execute_call(call).await;
                    match outcome {
                        CallOutcome::Finished(result) => {
                            yield AgentEvent::tool_result(vec![result]);
                        }
                        CallOutcome::Denied { result, error } => {
                            agent.transition(TurnPhase::Errored);
                            yield AgentEvent::tool_result(vec![result]);
                            yield AgentEvent::from_error(&error);
                            return;
                        }
                    }
                }
            }

            agent.transition(TurnPhase::Finalizing);
            let output = agent.resolve_output(&text);
            agent.transition(TurnPhase::Completed);
            yield AgentEvent::final_event(output, artifacts, usage);
        };

        Box::pin(stream)
    }

    async fn execute_call(&self, call: &ToolCall) -> CallOutcome {
        let arguments = if call.arguments.is_null() {
            json!({})
        } else {
            call.arguments.clone()
        };
        let invocation = ToolInvocation::new(&call.name, arguments.clone());
        let decision = self.permissions.evaluate(&invocation);
        debug!(
            tool = %call.name,
            call_id = %call.id,
            action = %decision.action,
            arguments = %self.redactor.redact_value(&arguments),
            "Evaluated tool call"
        );

        match decision.action {
            PermissionAction::Allow => CallOutcome::Finished(self.run_tool(call, arguments).await),
            PermissionAction::Reject => {
                warn!(tool = %call.name, call_id = %call.id, "Tool call rejected by policy");
                let error =
                    AgentError::permission_denied(&call.name, Some(self.adapter.name().to_string()));
                CallOutcome::Denied {
                    result: ToolResult::failure(&call.id, error.to_string()),
                    error,
                }
            }
            PermissionAction::Ask | PermissionAction::Delegate => {
                CallOutcome::Finished(ToolResult::failure(
                    &call.id,
                    format!("Tool {} requires permission ({})", call.name, decision.action),
                ))
            }
        }
    }

    async fn run_tool(&self, call: &ToolCall, arguments: Value) -> ToolResult {
        let Some(handler) = self
            .options
            .find_tool(&call.name)
            .and_then(|tool| tool.handler.clone())
        else {
            return ToolResult::failure(
                &call.id,
                format!("Tool {} not found or has no handler", call.name),
            );
        };

        match AssertUnwindSafe(handler.call(arguments)).catch_unwind().await {
            Ok(Ok(value)) => ToolResult::success(&call.id, value),
            Ok(Err(err)) => {
                debug!(tool = %call.name, error = %err, "Tool handler failed");
                ToolResult::failure(&call.id, err.to_string())
            }
            Err(_) => {
                warn!(tool = %call.name, "Tool handler panicked");
                ToolResult::failure(&call.id, format!("Tool {} panicked", call.name))
            }
        }
    }

    fn resolve_output(&self, text: &str) -> Option<Value> {
        let raw = || (!text.is_empty()).then(|| Value::String(text.to_string()));
        let Some(config) = &self.options.structured else {
            return raw();
        };

        let parsed: Value = match serde_json::from_str(text) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "Structured output is not valid JSON, using raw text");
                return raw();
            }
        };

        match validate_structured(&parsed, &config.schema) {
            Ok(()) => Some(parsed),
            Err(err) => {
                debug!(errors = ?err.errors, "Repairing structured output");
                let repaired = repair_structured(&parsed, &config.schema);
                if let Err(err) = validate_structured(&repaired, &config.schema) {
                    warn!(errors = ?err.errors, "Repaired output still violates schema");
                }
                Some(repaired)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ProviderStream;
    use crate::error::ToolError;
    use crate::mock::ScriptedAdapter;
    use async_trait::async_trait;
    use threadweave_core::{
        AgentResult, ArtifactRef, JsonSchema, Role, StructuredOutputConfig, TokenUsage,
    };
    use threadweave_policy::PermissionRule;

    fn calc_tool() -> ToolDefinition {
        ToolDefinition::from_fn("calc", "Calculator", JsonSchema::object(), |args| async move {
            let a = args["a"].as_i64().unwrap_or(0);
            let b = args["b"].as_i64().unwrap_or(0);
            Ok(json!(a + b))
        })
    }

    /// Panics either inside `send` or after streaming one text fragment.
    struct PanickingAdapter {
        on_start: bool,
    }

    #[async_trait]
    impl ProviderAdapter for PanickingAdapter {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn send(
            &self,
            _messages: Vec<Message>,
            _options: &AgentOptions,
        ) -> AgentResult<ProviderStream> {
            if self.on_start {
                panic!("no connection");
            }
            let stream = async_stream::stream! {
                yield Ok::<_, AgentError>(AgentEvent::text("partial", false));
                panic!("socket closed");
            };
            Ok(Box::pin(stream))
        }
    }

    fn allow_all() -> Vec<PermissionRule> {
        vec![PermissionRule::allow("*")]
    }

    async fn run(agent: &mut Agent, input: impl Into<AgentInput>) -> Vec<AgentEvent> {
        agent.send(input).collect().await
    }

    fn kinds(events: &[AgentEvent]) -> Vec<&'static str> {
        events.iter().map(AgentEvent::kind).collect()
    }

    #[tokio::test]
    async fn test_text_turn_emits_system_then_final() {
        let adapter = ScriptedAdapter::new("mock").with_text_reply("hello there", TokenUsage::new(3, 4, 7));
        let mut agent = Agent::with_adapter(AgentOptions::new("mock", "m-1"), Arc::new(adapter));

        let events = run(&mut agent, "hi").await;
        assert_eq!(
            kinds(&events),
            vec!["system", "assistant", "assistant", "assistant", "final"]
        );

        match &events[0] {
            AgentEvent::System { session_id, model, .. } => {
                assert_eq!(session_id, agent.thread().id());
                assert_eq!(model.as_deref(), Some("m-1"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        match events.last().unwrap() {
            AgentEvent::Final { output, usage, .. } => {
                assert_eq!(output, &Some(json!("hello there")));
                assert_eq!(usage, &Some(TokenUsage::new(3, 4, 7)));
            }
            other => panic!("unexpected event {:?}", other),
        }

        let thread = agent.thread();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread.messages()[1].role, Role::Assistant);
        assert_eq!(thread.messages()[1].content.as_deref(), Some("hello there"));
        assert_eq!(agent.phase(), TurnPhase::Completed);
    }

    #[tokio::test]
    async fn test_system_event_only_on_first_turn() {
        let adapter = ScriptedAdapter::new("mock").with_text_reply("ok", TokenUsage::default());
        let mut agent = Agent::with_adapter(AgentOptions::new("mock", "m"), Arc::new(adapter));

        let first = run(&mut agent, "one").await;
        let second = run(&mut agent, "two").await;
        assert_eq!(first[0].kind(), "system");
        assert!(second.iter().all(|e| e.kind() != "system"));
        assert_eq!(agent.metrics().total_requests, 2);
    }

    #[tokio::test]
    async fn test_tool_call_is_executed_after_stream() {
        let adapter = ScriptedAdapter::new("mock").with_tool_calls(
            vec![ToolCall::new("call_1", "calc", json!({"a": 2, "b": 3}))],
            TokenUsage::new(1, 1, 2),
        );
        let options = AgentOptions::new("mock", "m")
            .with_tool(calc_tool())
            .with_permissions(allow_all());
        let mut agent = Agent::with_adapter(options, Arc::new(adapter));

        let events = run(&mut agent, "add").await;
        assert_eq!(kinds(&events), vec!["system", "assistant", "tool_result", "final"]);

        match &events[2] {
            AgentEvent::ToolResult { results } => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].id, "call_1");
                assert_eq!(results[0].result, Some(json!(5)));
            }
            other => panic!("unexpected event {:?}", other),
        }

        let assistant = &agent.thread().messages()[1];
        assert_eq!(assistant.tool_calls.as_ref().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_rejected_call_aborts_batch() {
        let adapter = ScriptedAdapter::new("mock").with_tool_calls(
            vec![
                ToolCall::new("call_1", "calc", json!({})),
                ToolCall::new("call_2", "calc", json!({})),
            ],
            TokenUsage::default(),
        );
        let options = AgentOptions::new("mock", "m")
            .with_tool(calc_tool())
            .with_permissions(vec![PermissionRule::reject("calc")]);
        let mut agent = Agent::with_adapter(options, Arc::new(adapter));

        let events = run(&mut agent, "add").await;
        assert_eq!(kinds(&events), vec!["system", "assistant", "tool_result", "error"]);

        match &events[2] {
            AgentEvent::ToolResult { results } => {
                assert_eq!(results[0].id, "call_1");
                assert!(results[0].is_error());
            }
            other => panic!("unexpected event {:?}", other),
        }
        match &events[3] {
            AgentEvent::Error { code, .. } => assert_eq!(code.as_deref(), Some("PERMISSION_DENIED")),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(agent.phase(), TurnPhase::Errored);
    }

    #[tokio::test]
    async fn test_ask_and_missing_tools_do_not_abort() {
        let adapter = ScriptedAdapter::new("mock").with_tool_calls(
            vec![
                ToolCall::new("call_1", "Bash", json!({"cmd": "ls"})),
                ToolCall::new("call_2", "missing", json!({})),
                ToolCall::new("call_3", "calc", json!({"a": 1, "b": 1})),
            ],
            TokenUsage::default(),
        );
        let options = AgentOptions::new("mock", "m")
            .with_tool(calc_tool())
            .with_permissions(vec![PermissionRule::ask("Bash"), PermissionRule::allow("*")]);
        let mut agent = Agent::with_adapter(options, Arc::new(adapter));

        let events = run(&mut agent, "go").await;
        let results: Vec<&ToolResult> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::ToolResult { results } => results.first(),
                _ => None,
            })
            .collect();

        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0].error.as_deref(),
            Some("Tool Bash requires permission (ask)")
        );
        assert_eq!(
            results[1].error.as_deref(),
            Some("Tool missing not found or has no handler")
        );
        assert_eq!(results[2].result, Some(json!(2)));
        assert!(events.last().unwrap().is_final());
    }

    #[tokio::test]
    async fn test_unmatched_call_defaults_to_ask() {
        let adapter = ScriptedAdapter::new("mock")
            .with_tool_calls(vec![ToolCall::new("c", "calc", json!({}))], TokenUsage::default());
        let options = AgentOptions::new("mock", "m").with_tool(calc_tool());
        let mut agent = Agent::with_adapter(options, Arc::new(adapter));

        let events = run(&mut agent, "go").await;
        match &events[2] {
            AgentEvent::ToolResult { results } => {
                assert!(results[0].error.as_deref().unwrap().contains("(ask)"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handler_errors_and_panics_become_results() {
        let failing = ToolDefinition::from_fn("fail", "Fails", JsonSchema::object(), |_| async {
            Err(ToolError::execution("disk full"))
        });
        let panicking = ToolDefinition::from_fn("boom", "Panics", JsonSchema::object(), |args| async move {
            if args.is_object() {
                panic!("handler exploded");
            }
            Ok(json!(null))
        });
        let adapter = ScriptedAdapter::new("mock").with_tool_calls(
            vec![
                ToolCall::new("a", "fail", json!({})),
                ToolCall::new("b", "boom", json!({})),
            ],
            TokenUsage::default(),
        );
        let options = AgentOptions::new("mock", "m")
            .with_tool(failing)
            .with_tool(panicking)
            .with_permissions(allow_all());
        let mut agent = Agent::with_adapter(options, Arc::new(adapter));

        let events = run(&mut agent, "go").await;
        assert_eq!(
            kinds(&events),
            vec!["system", "assistant", "tool_result", "tool_result", "final"]
        );
        match &events[2] {
            AgentEvent::ToolResult { results } => {
                assert_eq!(results[0].error.as_deref(), Some("disk full"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        match &events[3] {
            AgentEvent::ToolResult { results } => {
                assert_eq!(results[0].error.as_deref(), Some("Tool boom panicked"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_provider_error_event_ends_turn() {
        let adapter = ScriptedAdapter::new("openai").with_turn(vec![
            AgentEvent::text("partial", false),
            AgentEvent::error("rate limited", None),
        ]);
        let mut agent = Agent::with_adapter(AgentOptions::new("openai", "gpt"), Arc::new(adapter));

        let events = run(&mut agent, "hi").await;
        assert_eq!(kinds(&events), vec!["system", "assistant", "error"]);
        match &events[2] {
            AgentEvent::Error { error, code } => {
                assert_eq!(error, "rate limited");
                assert_eq!(code.as_deref(), Some("OPENAI_ERROR"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(agent.thread().len(), 2);
    }

    #[tokio::test]
    async fn test_stream_failure_becomes_error_event() {
        let adapter = ScriptedAdapter::new("mock").with_failing_turn(
            Vec::new(),
            AgentError::provider("mock", "connection reset"),
        );
        let mut agent = Agent::with_adapter(AgentOptions::new("mock", "m"), Arc::new(adapter));

        let events = run(&mut agent, "hi").await;
        match events.last().unwrap() {
            AgentEvent::Error { error, code } => {
                assert_eq!(error, "connection reset");
                assert_eq!(code.as_deref(), Some("MOCK_ERROR"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!events.iter().any(AgentEvent::is_final));
    }

    #[tokio::test]
    async fn test_adapter_panic_mid_stream_becomes_agent_error() {
        let adapter = PanickingAdapter { on_start: false };
        let mut agent = Agent::with_adapter(AgentOptions::new("flaky", "m"), Arc::new(adapter));

        let events = run(&mut agent, "hi").await;
        assert_eq!(kinds(&events), vec!["system", "assistant", "error"]);
        match &events[2] {
            AgentEvent::Error { error, code } => {
                assert_eq!(code.as_deref(), Some("AGENT_ERROR"));
                assert!(error.contains("socket closed"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(agent.phase(), TurnPhase::Errored);
        // The partial reply is still recorded
        assert_eq!(agent.thread().len(), 2);
    }

    #[tokio::test]
    async fn test_adapter_panic_on_start_becomes_agent_error() {
        let adapter = PanickingAdapter { on_start: true };
        let mut agent = Agent::with_adapter(AgentOptions::new("flaky", "m"), Arc::new(adapter));

        let events = run(&mut agent, "hi").await;
        assert_eq!(kinds(&events), vec!["system", "error"]);
        match &events[1] {
            AgentEvent::Error { error, code } => {
                assert_eq!(code.as_deref(), Some("AGENT_ERROR"));
                assert_eq!(error, "Provider flaky panicked: no connection");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(agent.thread().len(), 1);
    }

    #[tokio::test]
    async fn test_delegate_does_not_abort_batch() {
        let adapter = ScriptedAdapter::new("mock").with_tool_calls(
            vec![
                ToolCall::new("call_1", "Deploy", json!({"env": "prod"})),
                ToolCall::new("call_2", "calc", json!({"a": 2, "b": 3})),
            ],
            TokenUsage::default(),
        );
        let options = AgentOptions::new("mock", "m")
            .with_tool(calc_tool())
            .with_permissions(vec![
                PermissionRule::delegate("Deploy", "ops"),
                PermissionRule::allow("*"),
            ]);
        let mut agent = Agent::with_adapter(options, Arc::new(adapter));

        let events = run(&mut agent, "ship it").await;
        assert_eq!(
            kinds(&events),
            vec!["system", "assistant", "tool_result", "tool_result", "final"]
        );
        match &events[2] {
            AgentEvent::ToolResult { results } => assert_eq!(
                results[0].error.as_deref(),
                Some("Tool Deploy requires permission (delegate)")
            ),
            other => panic!("unexpected event {:?}", other),
        }
        match &events[3] {
            AgentEvent::ToolResult { results } => assert_eq!(results[0].result, Some(json!(5))),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_structured_output_is_repaired() {
        let schema = JsonSchema::object()
            .with_property("age", JsonSchema::number())
            .with_required("age");
        let adapter = ScriptedAdapter::new("mock").with_turn(vec![
            AgentEvent::text(r#"{"age": "#, false),
            AgentEvent::text(r#""25"}"#, true),
        ]);
        let options = AgentOptions::new("mock", "m")
            .with_structured(StructuredOutputConfig::new(schema));
        let mut agent = Agent::with_adapter(options, Arc::new(adapter));

        let events = run(&mut agent, "age?").await;
        match events.last().unwrap() {
            AgentEvent::Final { output, .. } => assert_eq!(output, &Some(json!({"age": 25}))),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_structured_output_falls_back_to_raw_text() {
        let adapter = ScriptedAdapter::new("mock").with_turn(vec![AgentEvent::text("not json", true)]);
        let options = AgentOptions::new("mock", "m")
            .with_structured(StructuredOutputConfig::new(JsonSchema::object()));
        let mut agent = Agent::with_adapter(options, Arc::new(adapter));

        let events = run(&mut agent, "hi").await;
        match events.last().unwrap() {
            AgentEvent::Final { output, usage, .. } => {
                assert_eq!(output, &Some(json!("not json")));
                assert_eq!(usage, &None);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_provider_artifacts_reach_final() {
        let adapter = ScriptedAdapter::new("mock").with_turn(vec![AgentEvent::final_event(
            None,
            vec![ArtifactRef::new("a1", "file", "file:///tmp/out.txt")],
            Some(TokenUsage::new(1, 0, 1)),
        )]);
        let mut agent = Agent::with_adapter(AgentOptions::new("mock", "m"), Arc::new(adapter));

        let events = run(&mut agent, "hi").await;
        assert_eq!(kinds(&events), vec!["system", "final"]);
        match &events[1] {
            AgentEvent::Final { output, artifacts, .. } => {
                assert_eq!(output, &None);
                assert_eq!(artifacts.len(), 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tool_results_input_is_stored_as_tool_message() {
        let adapter = ScriptedAdapter::new("mock").with_text_reply("thanks", TokenUsage::default());
        let mut agent = Agent::with_adapter(AgentOptions::new("mock", "m"), Arc::new(adapter.clone()));

        run(&mut agent, vec![ToolResult::success("call_9", json!("done"))]).await;

        let first = &agent.thread().messages()[0];
        assert_eq!(first.role, Role::Tool);
        assert_eq!(first.tool_results.as_ref().map(Vec::len), Some(1));
        assert_eq!(adapter.received()[0].len(), 1);
    }

    #[tokio::test]
    async fn test_add_tools_visible_next_turn() {
        let adapter = ScriptedAdapter::new("mock").with_text_reply("ok", TokenUsage::default());
        let mut agent = Agent::with_adapter(AgentOptions::new("mock", "m"), Arc::new(adapter));
        assert!(agent.options().tools.is_empty());

        agent.add_tools([calc_tool()]);
        let events = run(&mut agent, "hi").await;
        match &events[0] {
            AgentEvent::System { tools, .. } => assert_eq!(tools, &vec!["calc".to_string()]),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fork_and_handoff_are_independent() {
        let adapter = ScriptedAdapter::new("mock").with_text_reply("reply", TokenUsage::default());
        let mut agent = Agent::with_adapter(AgentOptions::new("mock", "m"), Arc::new(adapter));
        run(&mut agent, "one").await;
        run(&mut agent, "two").await;
        assert_eq!(agent.thread().len(), 4);

        let mut forked = agent.fork();
        let mut narrowed = agent.handoff(HandoffOptions::last_n(1));
        assert_eq!(narrowed.thread().len(), 1);
        assert_eq!(narrowed.metrics().total_requests, 0);

        run(&mut forked, "three").await;
        assert_eq!(forked.thread().len(), 6);
        assert_eq!(agent.thread().len(), 4);

        let parent = agent.thread().id().to_string();
        assert_eq!(forked.thread().parent_id(), Some(parent.as_str()));
    }
}
