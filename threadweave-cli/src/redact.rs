//! `threadweave redact`

use serde_json::Value;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

use threadweave_policy::{RedactionOptions, Redactor, contains_secrets};

use crate::error::CliError;

pub fn run_redact(json: bool, replacement: Option<String>, file: Option<&Path>) -> Result<(), CliError> {
    let input = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let redactor = Redactor::new(RedactionOptions {
        replacement,
        ..RedactionOptions::default()
    });
    print!("{}", redact(&redactor, &input, json)?);
    Ok(())
}

/// Redact `input` as plain text, or as a JSON document when `json` is set.
pub fn redact(redactor: &Redactor, input: &str, json: bool) -> Result<String, CliError> {
    if contains_secrets(input) {
        warn!(bytes = input.len(), "Input contains secret-shaped values");
    }

    if json {
        let value: Value = serde_json::from_str(input)?;
        let mut output = serde_json::to_string_pretty(&redactor.redact_value(&value))?;
        output.push('\n');
        Ok(output)
    } else {
        debug!(bytes = input.len(), "Redacting text input");
        Ok(redactor.redact_text(input))
    }
}
