//! Provider adapter contract and the explicit adapter registry.

use async_trait::async_trait;
use futures::Stream;
use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use tracing::info;

use threadweave_core::{AgentEvent, AgentResult, Message};

use crate::agent::Agent;
use crate::error::RegistryError;
use crate::options::AgentOptions;

/// Normalized event stream returned by an adapter for one turn.
pub type ProviderStream = Pin<Box<dyn Stream<Item = AgentResult<AgentEvent>> + Send>>;

/// A model provider behind the uniform event protocol.
///
/// Adapters translate their native streaming output into `assistant` events
/// (text fragments and/or tool calls), an optional `final` event carrying
/// usage, and `error` events for provider-side failures.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name, used in error codes
    fn name(&self) -> &str;

    /// Start a turn over the full message history.
    async fn send(&self, messages: Vec<Message>, options: &AgentOptions)
    -> AgentResult<ProviderStream>;

    fn supports_structured_output(&self) -> bool {
        false
    }

    fn supports_parallel_tools(&self) -> bool {
        false
    }
}

/// Builds a fresh adapter instance.
pub type AdapterFactory = Arc<dyn Fn() -> Arc<dyn ProviderAdapter> + Send + Sync>;

/// Provider name to adapter factory, owned by whoever composes the system.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    factories: BTreeMap<String, AdapterFactory>,
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one for `provider`.
    /// Returns `true` when a factory was replaced.
    pub fn register<F>(&mut self, provider: impl Into<String>, factory: F) -> bool
    where
        F: Fn() -> Arc<dyn ProviderAdapter> + Send + Sync + 'static,
    {
        let provider = provider.into();
        info!(provider = %provider, "Registering provider adapter");
        self.factories
            .insert(provider, Arc::new(factory))
            .is_some()
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.factories.contains_key(provider)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn create_adapter(&self, provider: &str) -> Result<Arc<dyn ProviderAdapter>, RegistryError> {
        self.factories
            .get(provider)
            .map(|factory| factory())
            .ok_or_else(|| RegistryError::UnknownProvider {
                provider: provider.to_string(),
                available: self.providers().into_iter().map(String::from).collect(),
            })
    }

    /// Build an agent for `options.provider`.
    pub fn create_agent(&self, options: AgentOptions) -> Result<Agent, RegistryError> {
        let adapter = self.create_adapter(&options.provider)?;
        Ok(Agent::with_adapter(options, adapter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedAdapter;

    #[test]
    fn test_register_and_create() {
        let mut registry = AdapterRegistry::new();
        assert!(!registry.register("mock", || Arc::new(ScriptedAdapter::new("mock"))));
        assert!(registry.register("mock", || Arc::new(ScriptedAdapter::new("mock"))));
        registry.register("alt", || Arc::new(ScriptedAdapter::new("alt")));

        assert_eq!(registry.providers(), vec!["alt", "mock"]);
        assert_eq!(registry.len(), 2);

        let agent = registry.create_agent(AgentOptions::new("mock", "m")).unwrap();
        assert_eq!(agent.adapter().name(), "mock");
    }

    #[test]
    fn test_unknown_provider_lists_available() {
        let mut registry = AdapterRegistry::new();
        registry.register("mock", || Arc::new(ScriptedAdapter::new("mock")));

        let err = registry
            .create_agent(AgentOptions::new("openai", "gpt"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Provider 'openai' not registered. Available providers: mock"
        );
    }

    #[test]
    fn test_registries_are_independent() {
        let mut a = AdapterRegistry::new();
        let b = AdapterRegistry::new();
        a.register("mock", || Arc::new(ScriptedAdapter::new("mock")));
        assert!(a.contains("mock"));
        assert!(!b.contains("mock"));
        assert!(b.is_empty());
    }
}
