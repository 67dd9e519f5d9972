//! Error types for tools, the adapter registry and agent configuration.

use thiserror::Error;

/// Failure reported by a tool handler.
///
/// The agent turns these into `ToolResult.error`; they never end a turn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Execution(String),
}

impl ToolError {
    pub fn execution(message: impl Into<String>) -> Self {
        ToolError::Execution(message.into())
    }
}

/// Errors from [`AdapterRegistry`](crate::adapter::AdapterRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Provider '{provider}' not registered. Available providers: {}", available.join(", "))]
    UnknownProvider {
        provider: String,
        available: Vec<String>,
    },
}

/// Errors loading an [`AgentConfig`](crate::options::AgentConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Agent configuration error: {message}")]
    Invalid { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            message: message.into(),
        }
    }
}
