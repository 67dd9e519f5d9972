//! # Threadweave Core - Conversation Data Model
//!
//! Shared building blocks for threadweave agents.
//!
//! ## Features
//!
//! - **Messages and Threads**: append-only conversation records with export/import
//! - **Handoff and Fork**: derive narrowed or copied threads without touching the source
//! - **Agent Events**: the five-kind event union every turn is expressed in
//! - **Structured Output**: JSON-Schema subset validation and best-effort repair
//! - **Thread Manager**: store-backed lifecycle over in-memory or file storage
//!
//! ## Example: Deriving Threads
//!
//! ```rust
//! use threadweave_core::{HandoffOptions, Message, Thread, fork, handoff};
//!
//! let mut thread = Thread::new();
//! thread.add_message(Message::user("plan the trip"));
//! thread.add_message(Message::assistant("Sure, where to?"));
//!
//! let narrowed = handoff(&thread, HandoffOptions::last_n(1));
//! assert_eq!(narrowed.parent_id(), Some(thread.id()));
//!
//! let copy = fork(&thread);
//! assert_eq!(copy.messages(), thread.messages());
//! ```
//!
//! ## Example: Structured Output
//!
//! ```rust
//! use serde_json::json;
//! use threadweave_core::{JsonSchema, repair_structured, validate_structured};
//!
//! let schema = JsonSchema::object().with_property("age", JsonSchema::number());
//! let repaired = repair_structured(&json!({"age": "25"}), &schema);
//! assert_eq!(repaired, json!({"age": 25}));
//! assert!(validate_structured(&repaired, &schema).is_ok());
//! ```

pub mod error;
pub mod event;
pub mod manager;
pub mod message;
pub mod store;
pub mod structured;
pub mod thread;

pub use error::{AgentError, AgentResult, SchemaValidationError, ThreadError, ThreadResult};
pub use event::{AccumulatedResponse, AgentEvent, DeltaAccumulator, accumulate_events};
pub use manager::{HandoffFilters, ThreadManager};
pub use message::{
    ArtifactRef, Attachment, AttachmentKind, Message, Role, TokenUsage, ToolCall, ToolResult,
};
pub use store::{
    FileThreadStore, InMemoryThreadStore, ThreadQuery, ThreadRecord, ThreadRef, ThreadStore,
    Visibility,
};
pub use structured::{
    CompiledSchema, JsonSchema, StructuredOutputConfig, ValidationResult, compile_schema,
    normalize_schema, repair_structured, to_anthropic_schema, to_gemini_schema, to_openai_schema,
    validate_structured,
};
pub use thread::{HandoffOptions, PARENT_THREAD_ID, Thread, ThreadExport, fork, handoff};
