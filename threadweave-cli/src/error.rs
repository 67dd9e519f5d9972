use thiserror::Error;

use threadweave_core::SchemaValidationError;
use threadweave_policy::PolicyError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Schema(#[from] SchemaValidationError),
}

impl CliError {
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Io(_) => "IO",
            CliError::Json(_) => "INVALID_JSON",
            CliError::Policy(e) => e.error_code(),
            CliError::Schema(_) => "SCHEMA_VALIDATION",
        }
    }
}
