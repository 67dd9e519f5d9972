//! Policy configuration loading, built-in presets and per-workspace engines.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::engine::{PermissionAction, PermissionEngine, PermissionRule};
use crate::error::{PolicyError, PolicyResult};
use crate::matcher::regex_body;

/// Descriptive policy metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A versioned, ordered rule list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub version: String,
    pub rules: Vec<PermissionRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PolicyMetadata>,
}

impl PolicyConfig {
    /// Load a policy file; `.json` files are read as JSON, anything else as TOML.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> PolicyResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PolicyError::config(format!("Failed to read policy file {}: {}", path.display(), e))
        })?;

        let config = if path.extension().is_some_and(|ext| ext == "json") {
            Self::load_from_json(&content)?
        } else {
            Self::load_from_toml(&content)?
        };
        debug!(path = %path.display(), rules = config.rules.len(), "Loaded policy file");
        Ok(config)
    }

    pub fn load_from_toml(toml_content: &str) -> PolicyResult<Self> {
        let config: Self = toml::from_str(toml_content)
            .map_err(|e| PolicyError::config(format!("Failed to parse TOML policy: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_json(json_content: &str) -> PolicyResult<Self> {
        let config: Self = serde_json::from_str(json_content)
            .map_err(|e| PolicyError::config(format!("Failed to parse JSON policy: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> PolicyResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PolicyError::config(format!("Failed to serialize policy: {}", e)))
    }

    /// Reject configurations the engine would evaluate surprisingly.
    pub fn validate(&self) -> PolicyResult<()> {
        if self.version.trim().is_empty() {
            return Err(PolicyError::config("Policy version cannot be empty"));
        }

        for (index, rule) in self.rules.iter().enumerate() {
            if rule.tool.is_empty() {
                return Err(PolicyError::InvalidRule {
                    index,
                    reason: "tool pattern cannot be empty".to_string(),
                });
            }

            if rule.action == PermissionAction::Delegate && rule.to.is_none() {
                return Err(PolicyError::InvalidRule {
                    index,
                    reason: format!("delegate rule for '{}' has no target", rule.tool),
                });
            }

            for (arg, pattern) in rule.matches.iter().flatten() {
                if let Some(body) = regex_body(pattern)
                    && let Err(e) = regex::Regex::new(body)
                {
                    return Err(PolicyError::InvalidRule {
                        index,
                        reason: format!("invalid regex for argument '{}': {}", arg, e),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn engine(&self) -> PermissionEngine {
        PermissionEngine::new(self.rules.clone())
    }

    /// Safe defaults for development.
    ///
    /// The broad `Bash` ask comes before the `Bash` rejects and shadows them
    /// under first-match-wins; the order is kept as published.
    pub fn default_policy() -> Self {
        Self {
            version: "1.0".to_string(),
            rules: vec![
                PermissionRule::allow("File.read"),
                PermissionRule::allow("File.list"),
                PermissionRule::ask("File.write"),
                PermissionRule::ask("File.delete"),
                PermissionRule::ask("Bash"),
                PermissionRule::reject("Bash").with_match("cmd", "*rm -rf*"),
                PermissionRule::reject("Bash").with_match("cmd", "*git push --force*"),
                PermissionRule::ask("*"),
            ],
            metadata: Some(PolicyMetadata {
                name: Some("Default Policy".to_string()),
                description: Some("Safe defaults for development".to_string()),
                ..Default::default()
            }),
        }
    }

    /// Read-only file access, everything else rejected.
    pub fn strict() -> Self {
        Self {
            version: "1.0".to_string(),
            rules: vec![
                PermissionRule::allow("File.read"),
                PermissionRule::allow("File.list"),
                PermissionRule::reject("*"),
            ],
            metadata: Some(PolicyMetadata {
                name: Some("Strict Policy".to_string()),
                description: Some("Minimal permissions for maximum security".to_string()),
                ..Default::default()
            }),
        }
    }

    /// Everything allowed except a couple of destructive shell commands.
    pub fn permissive() -> Self {
        Self {
            version: "1.0".to_string(),
            rules: vec![
                PermissionRule::reject("Bash").with_match("cmd", "*rm -rf /*"),
                PermissionRule::reject("Bash").with_match("cmd", "*format*"),
                PermissionRule::allow("*"),
            ],
            metadata: Some(PolicyMetadata {
                name: Some("Permissive Policy".to_string()),
                description: Some("Allow most operations with minimal friction".to_string()),
                ..Default::default()
            }),
        }
    }
}

/// Named built-in policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyPreset {
    #[default]
    Default,
    Strict,
    Permissive,
}

impl PolicyPreset {
    pub fn config(self) -> PolicyConfig {
        match self {
            PolicyPreset::Default => PolicyConfig::default_policy(),
            PolicyPreset::Strict => PolicyConfig::strict(),
            PolicyPreset::Permissive => PolicyConfig::permissive(),
        }
    }
}

impl FromStr for PolicyPreset {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(PolicyPreset::Default),
            "strict" => Ok(PolicyPreset::Strict),
            "permissive" => Ok(PolicyPreset::Permissive),
            other => Err(PolicyError::config(format!(
                "Unknown policy preset '{}' (expected default, strict or permissive)",
                other
            ))),
        }
    }
}

/// A default engine plus per-workspace overrides.
#[derive(Debug, Clone)]
pub struct PolicyManager {
    default_engine: PermissionEngine,
    workspaces: HashMap<String, PermissionEngine>,
}

impl Default for PolicyManager {
    fn default() -> Self {
        Self::new(PolicyPreset::Default)
    }
}

impl PolicyManager {
    pub fn new(preset: PolicyPreset) -> Self {
        Self::from_config(&preset.config())
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            default_engine: config.engine(),
            workspaces: HashMap::new(),
        }
    }

    /// Engine for `workspace`, falling back to the default engine.
    pub fn engine(&self, workspace: Option<&str>) -> &PermissionEngine {
        workspace
            .and_then(|id| self.workspaces.get(id))
            .unwrap_or(&self.default_engine)
    }

    pub fn load_workspace_policy(
        &mut self,
        workspace: impl Into<String>,
        config: &PolicyConfig,
    ) -> PolicyResult<()> {
        config.validate()?;
        let workspace = workspace.into();
        info!(workspace = %workspace, rules = config.rules.len(), "Loaded workspace policy");
        self.workspaces.insert(workspace, config.engine());
        Ok(())
    }

    pub fn remove_workspace_policy(&mut self, workspace: &str) -> bool {
        self.workspaces.remove(workspace).is_some()
    }

    pub fn workspaces(&self) -> impl Iterator<Item = &str> {
        self.workspaces.keys().map(String::as_str)
    }
}
