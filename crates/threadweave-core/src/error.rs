//! Error types for threads and agent turns.

use thiserror::Error;

/// Errors surfaced to callers of an agent turn.
///
/// Every variant maps onto a string code through [`AgentError::code`], which is
/// what ends up in the `code` field of an `error` event.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    /// A permission rule rejected a tool invocation.
    #[error("Permission denied for tool: {tool}")]
    PermissionDenied {
        tool: String,
        provider: Option<String>,
    },

    /// The provider adapter reported a failure.
    #[error("{message}")]
    Provider {
        provider: String,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Anything else that went wrong during a turn.
    #[error("{message}")]
    Agent {
        message: String,
        provider: Option<String>,
        details: Option<serde_json::Value>,
    },
}

impl AgentError {
    pub fn permission_denied(tool: impl Into<String>, provider: Option<String>) -> Self {
        AgentError::PermissionDenied {
            tool: tool.into(),
            provider,
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        AgentError::Provider {
            provider: provider.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn agent(message: impl Into<String>, provider: Option<String>) -> Self {
        AgentError::Agent {
            message: message.into(),
            provider,
            details: None,
        }
    }

    /// Attach structured details to the error.
    pub fn with_details(mut self, value: serde_json::Value) -> Self {
        match &mut self {
            AgentError::Provider { details, .. } | AgentError::Agent { details, .. } => {
                *details = Some(value);
            }
            AgentError::PermissionDenied { .. } => {}
        }
        self
    }

    /// Error code suitable for events and logs.
    pub fn code(&self) -> String {
        match self {
            AgentError::PermissionDenied { .. } => "PERMISSION_DENIED".to_string(),
            AgentError::Provider { provider, .. } => {
                format!("{}_ERROR", provider.to_uppercase())
            }
            AgentError::Agent { .. } => "AGENT_ERROR".to_string(),
        }
    }

    pub fn provider_name(&self) -> Option<&str> {
        match self {
            AgentError::PermissionDenied { provider, .. } | AgentError::Agent { provider, .. } => {
                provider.as_deref()
            }
            AgentError::Provider { provider, .. } => Some(provider),
        }
    }

    pub fn details(&self) -> Option<&serde_json::Value> {
        match self {
            AgentError::Provider { details, .. } | AgentError::Agent { details, .. } => {
                details.as_ref()
            }
            AgentError::PermissionDenied { .. } => None,
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, AgentError::PermissionDenied { .. })
    }
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors raised by thread stores and the thread manager.
#[derive(Debug, Error)]
pub enum ThreadError {
    /// No thread with the given id exists.
    #[error("Thread {0} not found")]
    NotFound(String),

    /// The backing store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A thread record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for thread operations.
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Structured data failed validation against its schema.
///
/// Only raised by [`validate_structured`](crate::structured::validate_structured);
/// the agent never converts it into an event on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SchemaValidationError {
    pub message: String,
    /// Individual violations, path-qualified
    pub errors: Vec<String>,
}

impl SchemaValidationError {
    pub fn new(errors: Vec<String>) -> Self {
        Self {
            message: format!("Schema validation failed: {}", errors.join(", ")),
            errors,
        }
    }
}

impl From<serde_json::Error> for ThreadError {
    fn from(err: serde_json::Error) -> Self {
        ThreadError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ThreadError {
    fn from(err: std::io::Error) -> Self {
        ThreadError::Storage(format!("IO error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AgentError::permission_denied("calc", None).code(),
            "PERMISSION_DENIED"
        );
        assert_eq!(
            AgentError::provider("openai", "rate limited").code(),
            "OPENAI_ERROR"
        );
        assert_eq!(AgentError::agent("boom", None).code(), "AGENT_ERROR");
    }

    #[test]
    fn test_error_display() {
        let err = AgentError::permission_denied("calc", Some("mock".to_string()));
        assert_eq!(err.to_string(), "Permission denied for tool: calc");
        assert_eq!(err.provider_name(), Some("mock"));

        let err = ThreadError::NotFound("t-1".to_string());
        assert_eq!(err.to_string(), "Thread t-1 not found");
    }

    #[test]
    fn test_with_details() {
        let err = AgentError::agent("boom", None).with_details(serde_json::json!({"k": 1}));
        assert_eq!(err.details(), Some(&serde_json::json!({"k": 1})));

        let err = AgentError::permission_denied("x", None).with_details(serde_json::json!(1));
        assert!(err.details().is_none());
    }
}
