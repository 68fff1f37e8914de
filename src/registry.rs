//! Tool registry: name-keyed lookup, capability advertisement and fault-contained execution.

use crate::tools::{Tool, ToolSpec};
use crate::Error;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of [`ToolRegistry::execute`].
///
/// Serialized as `{"success":true,"result":..}` or `{"success":false,"error":".."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireResult", try_from = "WireResult")]
pub enum ToolExecutionResult {
    Success(Value),
    Failure(String),
}

impl ToolExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolExecutionResult::Success(_))
    }

    /// Text fed back to the model in the tool-role message.
    pub fn to_message_content(&self) -> String {
        match self {
            ToolExecutionResult::Success(value) => value.to_string(),
            ToolExecutionResult::Failure(error) => serde_json::json!({ "error": error }).to_string(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireResult {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<ToolExecutionResult> for WireResult {
    fn from(outcome: ToolExecutionResult) -> Self {
        match outcome {
            ToolExecutionResult::Success(result) => WireResult {
                success: true,
                result: Some(result),
                error: None,
            },
            ToolExecutionResult::Failure(error) => WireResult {
                success: false,
                result: None,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<WireResult> for ToolExecutionResult {
    type Error = String;

    fn try_from(wire: WireResult) -> std::result::Result<Self, Self::Error> {
        match (wire.success, wire.error) {
            (true, _) => Ok(ToolExecutionResult::Success(wire.result.unwrap_or(Value::Null))),
            (false, Some(error)) => Ok(ToolExecutionResult::Failure(error)),
            (false, None) => Err("failed tool result is missing 'error'".to_string()),
        }
    }
}

/// Name-keyed collection of tools.
///
/// Populated during bootstrap, then shared read-only (`Arc<ToolRegistry>`)
/// across concurrent agent loops. Iteration follows registration order;
/// re-registering a name replaces the tool in its original slot.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any existing tool with the same name.
    pub fn register(&mut self, tool: Tool) -> &mut Self {
        let name = tool.name().to_string();
        let tool = Arc::new(tool);
        match self.index.get(&name) {
            Some(&slot) => {
                debug!(event_name = "registry.tool.replaced", tool = %name);
                self.tools[slot] = tool;
            }
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
        self
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Tool>> {
        self.index.get(name).map(|&slot| &self.tools[slot])
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All tools in registration order.
    pub fn all(&self) -> &[Arc<Tool>] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Capability list passed to the provider on every iteration.
    pub fn specs_for_llm(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|tool| tool.spec()).collect()
    }

    /// Look up, validate and run a tool.
    ///
    /// Every failure mode (unknown name, contract violation, handler error,
    /// handler panic) is converted into [`ToolExecutionResult::Failure`] so
    /// the agent loop can feed it back to the model.
    pub async fn execute(&self, name: &str, params: Value) -> ToolExecutionResult {
        let Some(tool) = self.get(name) else {
            warn!(event_name = "registry.tool.unknown", tool = %name);
            return ToolExecutionResult::Failure(Error::tool_not_found(name).to_string());
        };

        let args = match tool.validate(&params) {
            Ok(args) => args,
            Err(message) => {
                debug!(event_name = "registry.tool.invalid_params", tool = %name, error = %message);
                return ToolExecutionResult::Failure(message);
            }
        };

        match AssertUnwindSafe(tool.execute(args)).catch_unwind().await {
            Ok(Ok(value)) => ToolExecutionResult::Success(value),
            Ok(Err(e)) => ToolExecutionResult::Failure(e.to_string()),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(event_name = "registry.tool.panicked", tool = %name, error = %message);
                ToolExecutionResult::Failure(message)
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tool;
    use crate::Error;
    use serde_json::json;

    fn add_tool() -> Tool {
        tool("add", "Add two integers")
            .param("a", "integer")
            .param("b", "integer")
            .build(|args| async move {
                let a = args["a"].as_i64().unwrap_or_default();
                let b = args["b"].as_i64().unwrap_or_default();
                Ok(json!(a + b))
            })
    }

    async fn unreachable_handler(_: Value) -> crate::Result<Value> {
        panic!("handler must not run")
    }

    async fn exploding_handler(_: Value) -> crate::Result<Value> {
        panic!("kaboom")
    }

    #[test]
    fn test_register_keeps_insertion_order() {
        let mut registry = ToolRegistry::new();
        registry
            .register(add_tool())
            .register(tool("echo", "Echo").build(|args| async move { Ok(args) }));

        let names: Vec<_> = registry.all().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["add", "echo"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.has("echo"));
        assert!(!registry.has("subtract"));
    }

    #[test]
    fn test_register_overwrites_in_place() {
        let mut registry = ToolRegistry::new();
        registry
            .register(add_tool())
            .register(tool("echo", "Echo").build(|args| async move { Ok(args) }))
            .register(tool("add", "Add, v2").build(|_| async { Ok(json!(0)) }));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.all()[0].description(), "Add, v2");
        assert_eq!(registry.get("add").map(|t| t.description()), Some("Add, v2"));
    }

    #[test]
    fn test_specs_for_llm() {
        let registry = ToolRegistry::new().with_tool(add_tool());
        let specs = registry.specs_for_llm();

        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "add");
        assert_eq!(specs[0].parameters["required"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_execute_success() {
        let registry = ToolRegistry::new().with_tool(add_tool());
        let outcome = registry.execute("add", json!({"a": 2, "b": 3})).await;
        assert_eq!(outcome, ToolExecutionResult::Success(json!(5)));
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let registry = ToolRegistry::new();
        let outcome = registry.execute("subtract", json!({})).await;
        assert_eq!(
            outcome,
            ToolExecutionResult::Failure("Unknown tool: subtract".to_string())
        );
    }

    #[tokio::test]
    async fn test_execute_invalid_params_skips_handler() {
        let registry = ToolRegistry::new().with_tool(
            tool("strict", "Never runs")
                .param("a", "number")
                .build(unreachable_handler),
        );

        let outcome = registry.execute("strict", json!({"a": "x"})).await;
        match outcome {
            ToolExecutionResult::Failure(msg) => assert!(msg.contains("is not of type"), "{}", msg),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_handler_error() {
        let registry = ToolRegistry::new().with_tool(
            tool("divide", "Divide")
                .build(|_| async { Err(Error::tool("Division by zero")) }),
        );

        let outcome = registry.execute("divide", json!({})).await;
        assert_eq!(
            outcome,
            ToolExecutionResult::Failure("Tool execution error: Division by zero".to_string())
        );
    }

    #[tokio::test]
    async fn test_execute_handler_panic_is_contained() {
        let registry = ToolRegistry::new()
            .with_tool(tool("boom", "Panics").build(exploding_handler));

        let outcome = registry.execute("boom", json!({})).await;
        assert_eq!(outcome, ToolExecutionResult::Failure("kaboom".to_string()));
    }

    #[test]
    fn test_execution_result_wire_format() {
        let ok = serde_json::to_value(ToolExecutionResult::Success(json!(5))).unwrap();
        assert_eq!(ok, json!({"success": true, "result": 5}));

        let failed = serde_json::to_value(ToolExecutionResult::Failure("nope".into())).unwrap();
        assert_eq!(failed, json!({"success": false, "error": "nope"}));

        assert!(serde_json::from_value::<ToolExecutionResult>(json!({"success": false})).is_err());
    }

    #[test]
    fn test_message_content() {
        assert_eq!(ToolExecutionResult::Success(json!(5)).to_message_content(), "5");
        assert_eq!(
            ToolExecutionResult::Failure("Unknown tool: x".into()).to_message_content(),
            r#"{"error":"Unknown tool: x"}"#
        );
    }
}
