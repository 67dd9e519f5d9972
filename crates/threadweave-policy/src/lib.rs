//! # Threadweave Policy
//!
//! Permission decisions and secret redaction for tool calls.
//!
//! - **PermissionEngine**: ordered rules over tool-name globs and argument patterns
//! - **InteractivePermissionEngine**: the engine plus an async resolver for `ask`
//! - **Redactor**: scrubs credential-shaped strings from text, JSON and env maps
//! - **PolicyConfig / PolicyManager**: TOML or JSON policies, presets, per-workspace engines
//!
//! ```rust
//! use serde_json::json;
//! use threadweave_policy::{PermissionAction, PermissionEngine, PermissionRule, ToolInvocation};
//!
//! let engine = PermissionEngine::new(vec![
//!     PermissionRule::reject("Bash").with_match("cmd", "*rm -rf*"),
//!     PermissionRule::ask("Bash"),
//! ]);
//! let decision = engine.evaluate(&ToolInvocation::new("Bash", json!({"cmd": "rm -rf /"})));
//! assert_eq!(decision.action, PermissionAction::Reject);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod redaction;

pub use config::{PolicyConfig, PolicyManager, PolicyMetadata, PolicyPreset};
pub use engine::{
    FnResolver, InteractivePermissionEngine, PermissionAction, PermissionDecision,
    PermissionEngine, PermissionResolver, PermissionRule, ToolInvocation,
};
pub use error::{PolicyError, PolicyResult};
pub use matcher::{is_more_specific, match_args, match_glob};
pub use redaction::{
    DEFAULT_REPLACEMENT, RedactionOptions, Redactor, contains_secrets, redact_env,
    redact_secrets, redact_secrets_from_object,
};
