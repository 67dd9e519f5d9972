//! Tool definitions and the async handler contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use threadweave_core::JsonSchema;

use crate::error::ToolError;

/// Executes a tool call.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// Handler backed by an async closure.
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        (self.f)(arguments).await
    }
}

/// Where a tool runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolRuntime {
    #[default]
    Builtin,
    Mcp,
    Toolbox,
    Http,
}

/// A tool the model may call.
///
/// Tools without a handler are advertised to the provider but fail when
/// called.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: JsonSchema,
    #[serde(default)]
    pub runtime: ToolRuntime,
    #[serde(skip)]
    pub handler: Option<Arc<dyn ToolHandler>>,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("runtime", &self.runtime)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: JsonSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            runtime: ToolRuntime::default(),
            handler: None,
        }
    }

    /// Tool backed by an async closure.
    ///
    /// ```rust
    /// use serde_json::json;
    /// use threadweave_agent::ToolDefinition;
    /// use threadweave_core::JsonSchema;
    ///
    /// let echo = ToolDefinition::from_fn("echo", "Echo arguments", JsonSchema::object(), |args| async move {
    ///     Ok(json!({"echo": args}))
    /// });
    /// assert!(echo.has_handler());
    /// ```
    pub fn from_fn<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: JsonSchema,
        f: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self::new(name, description, input_schema).with_handler(Arc::new(FnHandler { f }))
    }

    pub fn with_handler(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_runtime(mut self, runtime: ToolRuntime) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_from_fn_handler() {
        let tool = ToolDefinition::from_fn("add", "Add numbers", JsonSchema::object(), |args| async move {
            let a = args["a"].as_i64().ok_or_else(|| ToolError::InvalidArguments("a".into()))?;
            let b = args["b"].as_i64().unwrap_or(0);
            Ok(json!(a + b))
        });

        let handler = tool.handler.clone().unwrap();
        assert_eq!(handler.call(json!({"a": 2, "b": 3})).await.unwrap(), json!(5));
        assert_eq!(
            handler.call(json!({})).await.unwrap_err(),
            ToolError::InvalidArguments("a".into())
        );
    }

    #[test]
    fn test_definition_serializes_without_handler() {
        let tool = ToolDefinition::from_fn("calc", "Calculator", JsonSchema::object(), |_| async {
            Ok(json!(null))
        })
        .with_runtime(ToolRuntime::Mcp);

        let value = serde_json::to_value(&tool).unwrap();
        assert_eq!(value["name"], "calc");
        assert_eq!(value["runtime"], "mcp");
        assert_eq!(value["inputSchema"]["type"], "object");
        assert!(value.get("handler").is_none());

        let back: ToolDefinition = serde_json::from_value(value).unwrap();
        assert!(!back.has_handler());
    }
}
