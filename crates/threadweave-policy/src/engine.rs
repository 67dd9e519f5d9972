//! Ordered-rule permission decisions for tool invocations.
//!
//! Rules are evaluated in list order and the first matching rule decides.
//! When nothing matches the decision is [`PermissionAction::Ask`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::matcher::{match_args, match_glob};

/// What to do with a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Allow,
    Ask,
    Reject,
    Delegate,
}

impl fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionAction::Allow => write!(f, "allow"),
            PermissionAction::Ask => write!(f, "ask"),
            PermissionAction::Reject => write!(f, "reject"),
            PermissionAction::Delegate => write!(f, "delegate"),
        }
    }
}

/// A single permission rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    /// Glob over the tool name
    pub tool: String,
    /// Argument name to glob or `/regex/` pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<BTreeMap<String, String>>,
    pub action: PermissionAction,
    /// Delegate target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl PermissionRule {
    pub fn new(tool: impl Into<String>, action: PermissionAction) -> Self {
        Self {
            tool: tool.into(),
            matches: None,
            action,
            to: None,
        }
    }

    pub fn allow(tool: impl Into<String>) -> Self {
        Self::new(tool, PermissionAction::Allow)
    }

    pub fn ask(tool: impl Into<String>) -> Self {
        Self::new(tool, PermissionAction::Ask)
    }

    pub fn reject(tool: impl Into<String>) -> Self {
        Self::new(tool, PermissionAction::Reject)
    }

    pub fn delegate(tool: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            to: Some(to.into()),
            ..Self::new(tool, PermissionAction::Delegate)
        }
    }

    /// Require argument `key` to match `pattern`.
    pub fn with_match(mut self, key: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.matches
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), pattern.into());
        self
    }

    pub fn matches(&self, invocation: &ToolInvocation) -> bool {
        if !match_glob(&invocation.tool, &self.tool) {
            return false;
        }

        match &self.matches {
            Some(patterns) => match_args(&invocation.args, patterns),
            None => true,
        }
    }
}

/// The verdict for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDecision {
    pub action: PermissionAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<PermissionRule>,
}

impl PermissionDecision {
    /// Decision used when no rule matches.
    pub fn unmatched() -> Self {
        Self {
            action: PermissionAction::Ask,
            delegate_to: None,
            matched_rule: None,
        }
    }

    fn from_rule(rule: &PermissionRule) -> Self {
        Self {
            action: rule.action,
            delegate_to: rule.to.clone(),
            matched_rule: Some(rule.clone()),
        }
    }
}

/// A tool name plus its arguments, as seen by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// First-match-wins rule evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionEngine {
    rules: Vec<PermissionRule>,
}

impl PermissionEngine {
    pub fn new(rules: Vec<PermissionRule>) -> Self {
        Self { rules }
    }

    pub fn evaluate(&self, invocation: &ToolInvocation) -> PermissionDecision {
        let decision = self
            .rules
            .iter()
            .find(|rule| rule.matches(invocation))
            .map(PermissionDecision::from_rule)
            .unwrap_or_else(PermissionDecision::unmatched);

        debug!(
            tool = %invocation.tool,
            action = %decision.action,
            matched = decision.matched_rule.is_some(),
            "Evaluated tool permission"
        );
        decision
    }

    pub fn add_rules(&mut self, rules: impl IntoIterator<Item = PermissionRule>) {
        self.rules.extend(rules);
    }

    pub fn set_rules(&mut self, rules: Vec<PermissionRule>) {
        self.rules = rules;
    }

    pub fn rules(&self) -> &[PermissionRule] {
        &self.rules
    }

    pub fn clear_rules(&mut self) {
        self.rules.clear();
    }
}

/// Decides invocations the rules left open (`ask`, `delegate`).
#[async_trait]
pub trait PermissionResolver: Send + Sync {
    async fn resolve(&self, invocation: &ToolInvocation, decision: &PermissionDecision) -> bool;
}

/// Adapter turning an async closure into a [`PermissionResolver`].
pub struct FnResolver<F> {
    f: F,
}

impl<F, Fut> FnResolver<F>
where
    F: Fn(ToolInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> PermissionResolver for FnResolver<F>
where
    F: Fn(ToolInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    async fn resolve(&self, invocation: &ToolInvocation, _decision: &PermissionDecision) -> bool {
        (self.f)(invocation.clone()).await
    }
}

/// A [`PermissionEngine`] plus an optional resolver for open decisions.
///
/// `allow` and `reject` never reach the resolver. `delegate` is resolved the
/// same way as `ask`. Without a resolver every open decision is denied.
#[derive(Clone, Default)]
pub struct InteractivePermissionEngine {
    engine: PermissionEngine,
    resolver: Option<Arc<dyn PermissionResolver>>,
}

impl fmt::Debug for InteractivePermissionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractivePermissionEngine")
            .field("engine", &self.engine)
            .field("has_resolver", &self.resolver.is_some())
            .finish()
    }
}

impl InteractivePermissionEngine {
    pub fn new(engine: PermissionEngine) -> Self {
        Self {
            engine,
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn PermissionResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn engine(&self) -> &PermissionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PermissionEngine {
        &mut self.engine
    }

    pub fn evaluate(&self, invocation: &ToolInvocation) -> PermissionDecision {
        self.engine.evaluate(invocation)
    }

    /// Whether the invocation may proceed.
    pub async fn evaluate_interactive(&self, invocation: &ToolInvocation) -> bool {
        let decision = self.engine.evaluate(invocation);
        match decision.action {
            PermissionAction::Allow => true,
            PermissionAction::Reject => false,
            PermissionAction::Ask | PermissionAction::Delegate => match &self.resolver {
                Some(resolver) => resolver.resolve(invocation, &decision).await,
                None => false,
            },
        }
    }
}
