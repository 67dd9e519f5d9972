//! Threadweave: streaming LLM agents with gated tool calls.
//!
//! This crate re-exports the workspace crates so applications can depend on a
//! single package; the member crates stay available for everything else.

pub use threadweave_agent::{
    AdapterRegistry, Agent, AgentInput, AgentOptions, ProviderAdapter, ToolDefinition,
};
pub use threadweave_core::{AgentEvent, Message, Thread, ThreadManager};
pub use threadweave_policy::{PermissionEngine, PermissionRule, Redactor};
