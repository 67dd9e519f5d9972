//! The uniform event stream produced by an agent turn.
//!
//! Provider adapters normalize their native output into [`AgentEvent`]s and the
//! agent re-emits a subset of them to the caller, so both sides of the adapter
//! boundary speak the same five event kinds.

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::message::{ArtifactRef, TokenUsage, ToolCall, ToolResult};

/// A single event in a turn's output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AgentEvent {
    /// One-time session announcement on the first message of a thread.
    System {
        session_id: String,
        tools: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// A text fragment and/or tool calls from the model.
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
        /// `false` while more fragments follow
        #[serde(default)]
        done: bool,
    },
    /// Results of executed tool calls.
    ToolResult { results: Vec<ToolResult> },
    /// End of a successful turn.
    Final {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<serde_json::Value>,
        #[serde(default)]
        artifacts: Vec<ArtifactRef>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    /// A turn-level failure.
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl AgentEvent {
    pub fn system(
        session_id: impl Into<String>,
        tools: Vec<String>,
        model: Option<String>,
    ) -> Self {
        AgentEvent::System {
            session_id: session_id.into(),
            tools,
            model,
        }
    }

    /// Text fragment; `done` marks the last fragment.
    pub fn text(text: impl Into<String>, done: bool) -> Self {
        AgentEvent::Assistant {
            text: Some(text.into()),
            tool_calls: None,
            done,
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        AgentEvent::Assistant {
            text: None,
            tool_calls: Some(calls),
            done: false,
        }
    }

    pub fn tool_result(results: Vec<ToolResult>) -> Self {
        AgentEvent::ToolResult { results }
    }

    pub fn final_event(
        output: Option<serde_json::Value>,
        artifacts: Vec<ArtifactRef>,
        usage: Option<TokenUsage>,
    ) -> Self {
        AgentEvent::Final {
            output,
            artifacts,
            usage,
        }
    }

    pub fn error(error: impl Into<String>, code: Option<String>) -> Self {
        AgentEvent::Error {
            error: error.into(),
            code,
        }
    }

    /// Error event for an [`AgentError`], carrying its code.
    pub fn from_error(err: &AgentError) -> Self {
        AgentEvent::Error {
            error: err.to_string(),
            code: Some(err.code()),
        }
    }

    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::System { .. } => "system",
            AgentEvent::Assistant { .. } => "assistant",
            AgentEvent::ToolResult { .. } => "tool_result",
            AgentEvent::Final { .. } => "final",
            AgentEvent::Error { .. } => "error",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, AgentEvent::Final { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AgentEvent::Error { .. })
    }
}

/// Everything a finished event sequence amounts to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulatedResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub artifacts: Vec<ArtifactRef>,
    pub usage: Option<TokenUsage>,
    pub output: Option<serde_json::Value>,
}

/// Fold a sequence of events into a single response.
pub fn accumulate_events(events: &[AgentEvent]) -> AccumulatedResponse {
    let mut acc = AccumulatedResponse::default();

    for event in events {
        match event {
            AgentEvent::Assistant {
                text, tool_calls, ..
            } => {
                if let Some(text) = text {
                    acc.text.push_str(text);
                }
                if let Some(calls) = tool_calls {
                    acc.tool_calls.extend(calls.iter().cloned());
                }
            }
            AgentEvent::Final {
                output,
                artifacts,
                usage,
            } => {
                acc.usage = *usage;
                acc.output = output.clone();
                acc.artifacts.extend(artifacts.iter().cloned());
            }
            _ => {}
        }
    }

    acc
}

#[derive(Debug, Clone, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Buffers incremental text and tool-call fragments from a provider stream.
///
/// Providers deliver tool-call arguments as JSON text split across several
/// chunks; fragments are keyed by call id and kept in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct DeltaAccumulator {
    text: String,
    calls: Vec<PartialToolCall>,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_text(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    /// Record a tool-call fragment. A `name` replaces any earlier one.
    pub fn append_tool_call(&mut self, id: &str, name: Option<&str>, args_delta: Option<&str>) {
        let idx = match self.calls.iter().position(|c| c.id == id) {
            Some(idx) => idx,
            None => {
                self.calls.push(PartialToolCall {
                    id: id.to_string(),
                    ..Default::default()
                });
                self.calls.len() - 1
            }
        };

        let call = &mut self.calls[idx];
        if let Some(name) = name {
            call.name = name.to_string();
        }
        if let Some(delta) = args_delta {
            call.arguments.push_str(delta);
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Completed tool calls. Arguments that are not valid JSON become `{}`.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.calls
            .iter()
            .map(|c| {
                let arguments = if c.arguments.trim().is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(&c.arguments).unwrap_or_else(|e| {
                        tracing::warn!(call_id = %c.id, error = %e, "Discarding unparseable tool arguments");
                        serde_json::json!({})
                    })
                };
                ToolCall::new(c.id.clone(), c.name.clone(), arguments)
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.calls.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shapes() {
        let event = AgentEvent::system("s-1", vec!["calc".to_string()], Some("m".to_string()));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "system", "sessionId": "s-1", "tools": ["calc"], "model": "m"})
        );

        let event = AgentEvent::tool_calls(vec![ToolCall::new("call_1", "calc", json!({}))]);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "assistant");
        assert_eq!(value["toolCalls"][0]["id"], "call_1");
        assert_eq!(value["done"], false);

        let event = AgentEvent::tool_result(vec![ToolResult::failure("call_1", "nope")]);
        assert_eq!(serde_json::to_value(&event).unwrap()["type"], "tool_result");

        let event = AgentEvent::final_event(None, vec![], Some(TokenUsage::new(1, 2, 3)));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["usage"]["totalTokens"], 3);
        assert_eq!(value["artifacts"], json!([]));
    }

    #[test]
    fn test_event_from_wire() {
        let event: AgentEvent =
            serde_json::from_value(json!({"type": "assistant", "text": "hi"})).unwrap();
        assert_eq!(event, AgentEvent::text("hi", false));
    }

    #[test]
    fn test_from_error_carries_code() {
        let event = AgentEvent::from_error(&AgentError::permission_denied("calc", None));
        assert_eq!(
            event,
            AgentEvent::error(
                "Permission denied for tool: calc",
                Some("PERMISSION_DENIED".to_string())
            )
        );
    }

    #[test]
    fn test_accumulate_events() {
        let events = vec![
            AgentEvent::text("Hello", false),
            AgentEvent::text(" world", true),
            AgentEvent::tool_calls(vec![ToolCall::new("1", "calc", json!({}))]),
            AgentEvent::final_event(
                Some(json!("Hello world")),
                vec![ArtifactRef::new("a", "file", "file:///tmp/a")],
                Some(TokenUsage::new(3, 4, 7)),
            ),
        ];

        let acc = accumulate_events(&events);
        assert_eq!(acc.text, "Hello world");
        assert_eq!(acc.tool_calls.len(), 1);
        assert_eq!(acc.artifacts.len(), 1);
        assert_eq!(acc.usage, Some(TokenUsage::new(3, 4, 7)));
        assert_eq!(acc.output, Some(json!("Hello world")));
    }

    #[test]
    fn test_delta_accumulator_tool_fragments() {
        let mut acc = DeltaAccumulator::new();
        acc.append_text("Let me ");
        acc.append_text("check");
        acc.append_tool_call("call_1", Some("calc"), Some("{\"a\":"));
        acc.append_tool_call("call_2", Some("search"), None);
        acc.append_tool_call("call_1", None, Some(" 2}"));

        assert_eq!(acc.text(), "Let me check");
        let calls = acc.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "calc");
        assert_eq!(calls[0].arguments, json!({"a": 2}));
        assert_eq!(calls[1].arguments, json!({}));

        acc.clear();
        assert!(acc.text().is_empty());
        assert!(acc.tool_calls().is_empty());
    }

    #[test]
    fn test_delta_accumulator_bad_json() {
        let mut acc = DeltaAccumulator::new();
        acc.append_tool_call("c", Some("x"), Some("{not json"));
        assert_eq!(acc.tool_calls()[0].arguments, json!({}));
    }
}
