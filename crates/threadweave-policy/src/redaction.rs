//! Credential scrubbing for text, JSON values and environment maps.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Placeholder written over detected secrets.
pub const DEFAULT_REPLACEMENT: &str = "***REDACTED***";

/// Applied in order; earlier patterns win on overlap.
static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    let patterns = [
        // OpenAI-style keys (sk-, sk-proj-, sk-test-)
        r"sk-[a-zA-Z0-9_-]+",
        // AWS access key id
        r"AKIA[0-9A-Z]{16}",
        // AWS secret key and other long base64-like tokens
        r"[a-zA-Z0-9/+=]{40,}",
        // GitHub tokens
        r"ghp_[a-zA-Z0-9]+",
        r"gho_[a-zA-Z0-9]+",
        r"ghu_[a-zA-Z0-9]+",
        // JWTs
        r"eyJ[a-zA-Z0-9_-]+\.eyJ[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+",
    ];

    patterns
        .into_iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

/// Lowercase substrings marking a field name as sensitive.
const SENSITIVE_FIELD_NAMES: &[&str] = &[
    "token",
    "secret",
    "password",
    "api_key",
    "apikey",
    "access_token",
    "accesstoken",
    "private_key",
    "privatekey",
];

/// Whether a field or variable name looks like it holds a credential.
pub fn is_sensitive_field(name: &str) -> bool {
    let lower = name.to_lowercase();
    SENSITIVE_FIELD_NAMES.iter().any(|s| lower.contains(s))
}

/// Redaction settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionOptions {
    /// Placeholder; empty means [`DEFAULT_REPLACEMENT`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for RedactionOptions {
    fn default() -> Self {
        Self {
            replacement: None,
            enabled: true,
        }
    }
}

/// Scrubs credential-shaped strings.
///
/// A disabled redactor returns every input unchanged.
#[derive(Debug, Clone)]
pub struct Redactor {
    replacement: String,
    enabled: bool,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(RedactionOptions::default())
    }
}

impl Redactor {
    pub fn new(options: RedactionOptions) -> Self {
        let replacement = options
            .replacement
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REPLACEMENT.to_string());
        Self {
            replacement,
            enabled: options.enabled,
        }
    }

    pub fn with_replacement(replacement: impl Into<String>) -> Self {
        Self::new(RedactionOptions {
            replacement: Some(replacement.into()),
            enabled: true,
        })
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    pub fn redact_text(&self, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }

        SECRET_PATTERNS.iter().fold(text.to_string(), |acc, re| {
            re.replace_all(&acc, self.replacement.as_str()).into_owned()
        })
    }

    /// Recursively redact a JSON value. Sensitive keys are replaced whatever
    /// their value; string leaves go through [`Redactor::redact_text`].
    pub fn redact_value(&self, value: &Value) -> Value {
        if !self.enabled {
            return value.clone();
        }

        match value {
            Value::String(s) => Value::String(self.redact_text(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_value(v)).collect()),
            Value::Object(map) => {
                let redacted: Map<String, Value> = map
                    .iter()
                    .map(|(key, v)| {
                        let v = if is_sensitive_field(key) {
                            Value::String(self.replacement.clone())
                        } else {
                            self.redact_value(v)
                        };
                        (key.clone(), v)
                    })
                    .collect();
                Value::Object(redacted)
            }
            other => other.clone(),
        }
    }

    /// Replace whole values whose name is sensitive or whose content holds a secret.
    pub fn redact_env(&self, env: &HashMap<String, String>) -> HashMap<String, String> {
        if !self.enabled {
            return env.clone();
        }

        env.iter()
            .map(|(key, value)| {
                let value = if is_sensitive_field(key) || contains_secrets(value) {
                    self.replacement.clone()
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect()
    }
}

/// Redact `text` with the default placeholder.
pub fn redact_secrets(text: &str) -> String {
    Redactor::default().redact_text(text)
}

/// Redact a JSON value with the default placeholder.
pub fn redact_secrets_from_object(value: &Value) -> Value {
    Redactor::default().redact_value(value)
}

/// Redact an environment map with the default placeholder.
pub fn redact_env(env: &HashMap<String, String>) -> HashMap<String, String> {
    Redactor::default().redact_env(env)
}

/// Whether any secret pattern occurs in `text`.
pub fn contains_secrets(text: &str) -> bool {
    SECRET_PATTERNS.iter().any(|re| re.is_match(text))
}
