//! Per-turn agent options and their file-backed configuration form.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use threadweave_core::StructuredOutputConfig;
use threadweave_policy::PermissionRule;

use crate::error::ConfigError;
use crate::tool::ToolDefinition;

/// How the provider may batch tool calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParallelTools {
    #[default]
    Auto,
    Force,
    Disable,
}

/// Everything an adapter needs to run one turn.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Registered provider name
    pub provider: String,
    pub model: String,
    /// System prompt
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub parallel_tools: ParallelTools,
    pub structured: Option<StructuredOutputConfig>,
    pub tools: Vec<ToolDefinition>,
    pub permissions: Vec<PermissionRule>,
}

impl AgentOptions {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            system: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            parallel_tools: ParallelTools::default(),
            structured: None,
            tools: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_parallel_tools(mut self, mode: ParallelTools) -> Self {
        self.parallel_tools = mode;
        self
    }

    pub fn with_structured(mut self, config: StructuredOutputConfig) -> Self {
        self.structured = Some(config);
        self
    }

    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_permissions(mut self, rules: Vec<PermissionRule>) -> Self {
        self.permissions = rules;
        self
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    pub fn find_tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }
}

/// Serializable subset of [`AgentOptions`]; tools are attached in code.
///
/// ```toml
/// provider = "openai"
/// model = "gpt-4o"
/// temperature = 0.2
///
/// [[permissions]]
/// tool = "File.read"
/// action = "allow"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub parallel_tools: ParallelTools,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<StructuredOutputConfig>,
    #[serde(default)]
    pub permissions: Vec<PermissionRule>,
}

impl AgentConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::load_from_toml(&content)?;
        debug!(path = %path.display(), provider = %config.provider, "Loaded agent config");
        Ok(config)
    }

    pub fn load_from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_content)
            .map_err(|e| ConfigError::invalid(format!("Failed to parse TOML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.trim().is_empty() {
            return Err(ConfigError::invalid("provider cannot be empty"));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::invalid("model cannot be empty"));
        }
        if let Some(t) = self.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ConfigError::invalid(format!(
                "temperature {} outside 0.0..=2.0",
                t
            )));
        }
        if let Some(p) = self.top_p
            && !(0.0..=1.0).contains(&p)
        {
            return Err(ConfigError::invalid(format!("top_p {} outside 0.0..=1.0", p)));
        }
        Ok(())
    }

    pub fn into_options(self) -> AgentOptions {
        AgentOptions {
            provider: self.provider,
            model: self.model,
            system: self.system,
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            parallel_tools: self.parallel_tools,
            structured: self.structured,
            tools: Vec::new(),
            permissions: self.permissions,
        }
    }
}

impl From<AgentConfig> for AgentOptions {
    fn from(config: AgentConfig) -> Self {
        config.into_options()
    }
}
