//! Policy error types

use thiserror::Error;

/// Errors raised while loading or validating permission policies.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Policy configuration error: {message}")]
    Config { message: String },

    #[error("Invalid rule #{index}: {reason}")]
    InvalidRule { index: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PolicyError {
    pub fn config(message: impl Into<String>) -> Self {
        PolicyError::Config {
            message: message.into(),
        }
    }

    /// Error code suitable for logs and CLI output.
    pub fn error_code(&self) -> &'static str {
        match self {
            PolicyError::Config { .. } => "POLICY_CONFIG",
            PolicyError::InvalidRule { .. } => "POLICY_INVALID_RULE",
            PolicyError::Io(_) => "POLICY_IO",
        }
    }
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
