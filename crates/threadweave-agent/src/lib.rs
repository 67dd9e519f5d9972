//! # Threadweave Agent
//!
//! Multi-turn conversations with a pluggable model provider that may request
//! tool calls.
//!
//! ## Core Components
//!
//! - **Agent**: runs turns as a stream of [`AgentEvent`](threadweave_core::AgentEvent)s
//! - **ProviderAdapter**: the uniform provider contract
//! - **AdapterRegistry**: explicit provider name to adapter factory map
//! - **ToolDefinition / ToolHandler**: tools the model may call
//! - **AgentOptions / AgentConfig**: per-agent settings, loadable from TOML
//! - **ScriptedAdapter**: a replaying adapter for tests and demos
//!
//! ## Example
//!
//! ```rust
//! use futures::StreamExt;
//! use serde_json::json;
//! use std::sync::Arc;
//! use threadweave_agent::{Agent, AgentOptions, ScriptedAdapter, ToolDefinition};
//! use threadweave_core::{AgentEvent, JsonSchema, TokenUsage, ToolCall};
//! use threadweave_policy::PermissionRule;
//!
//! # tokio_test::block_on(async {
//! let adapter = ScriptedAdapter::new("mock").with_tool_calls(
//!     vec![ToolCall::new("call_1", "calc", json!({}))],
//!     TokenUsage::new(5, 2, 7),
//! );
//! let options = AgentOptions::new("mock", "mock-model")
//!     .with_tool(ToolDefinition::from_fn("calc", "Calculator", JsonSchema::object(), |_| async {
//!         Ok(json!(42))
//!     }))
//!     .with_permissions(vec![PermissionRule::allow("calc")]);
//!
//! let mut agent = Agent::with_adapter(options, Arc::new(adapter));
//! let events: Vec<AgentEvent> = agent.send("what is the answer?").collect().await;
//! let kinds: Vec<_> = events.iter().map(AgentEvent::kind).collect();
//! assert_eq!(kinds, ["system", "assistant", "tool_result", "final"]);
//! # });
//! ```

pub mod adapter;
pub mod agent;
pub mod error;
pub mod mock;
pub mod options;
pub mod tool;

pub use adapter::{AdapterFactory, AdapterRegistry, ProviderAdapter, ProviderStream};
pub use agent::{Agent, AgentInput, AgentMetrics, EventStream, TurnPhase};
pub use error::{ConfigError, RegistryError, ToolError};
pub use mock::ScriptedAdapter;
pub use options::{AgentConfig, AgentOptions, ParallelTools};
pub use tool::{FnHandler, ToolDefinition, ToolHandler, ToolRuntime};
