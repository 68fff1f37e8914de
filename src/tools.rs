//! # Tool definitions and parameter contracts
//!
//! A [`Tool`] bundles four things: a unique name, a description the model
//! reads when deciding whether to call it, a **parameter contract** that
//! arguments must satisfy, and an async handler that does the work.
//!
//! ## Parameter contracts
//!
//! Contracts are expressed through the [`ParameterValidator`] trait so the
//! registry can validate arguments without knowing the tool's concrete
//! parameter type. Two implementations ship with the crate:
//!
//! - [`SchemaValidator`] compiles the schema with `jsonschema` and reports
//!   every violation. It is built from the flexible schema notation accepted
//!   by [`Tool::new`].
//! - [`TypedValidator`] deserializes into a concrete `P: DeserializeOwned`
//!   and reports serde's error. Used by [`ToolBuilder::build_typed`].
//!
//! ## Schema notation
//!
//! - **Simple notation**: `{"location": "string", "units": "string"}`
//! - **Typed properties**: `{"limit": {"type": "integer", "optional": true}}`
//! - **Full JSON Schema**: anything with `"type"` and `"properties"` passes through
//!
//! ## Examples
//!
//! ```rust,no_run
//! use agent_runtime::{tool, Error};
//! use serde_json::json;
//!
//! let add = tool("add", "Add two numbers")
//!     .param("a", "number")
//!     .param("b", "number")
//!     .build(|args| async move {
//!         let a = args["a"].as_f64().ok_or_else(|| Error::tool("'a' must be a number"))?;
//!         let b = args["b"].as_f64().ok_or_else(|| Error::tool("'b' must be a number"))?;
//!         Ok(json!(a + b))
//!     });
//! ```
//!
//! Typed handlers receive their parameters already deserialized:
//!
//! ```rust,no_run
//! use agent_runtime::tool;
//! use serde::Deserialize;
//! use serde_json::json;
//!
//! #[derive(Deserialize)]
//! struct AddParams { a: i64, b: i64 }
//!
//! let add = tool("add", "Add two integers")
//!     .param("a", "integer")
//!     .param("b", "integer")
//!     .build_typed(|p: AddParams| async move { Ok(json!(p.a + p.b)) });
//! ```

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for tool handler functions.
///
/// ```text
/// Arc<                                      // shared by every clone of the tool
///   dyn Fn(Value)                           // validated JSON arguments
///     -> Pin<Box<dyn Future<Output = Result<Value>> + Send>>
///     + Send + Sync>
/// ```
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// A tool's parameter contract.
///
/// Implementations must be stateless across calls: many agent loops may
/// validate against the same tool concurrently.
pub trait ParameterValidator: Send + Sync {
    /// Check raw arguments, returning the normalized value to hand to the
    /// handler or a human-readable message describing the violation.
    fn validate(&self, params: &Value) -> std::result::Result<Value, String>;

    /// JSON Schema advertised to the model.
    fn json_schema(&self) -> &Value;
}

/// Validates arguments against a JSON Schema.
///
/// The schema is normalized from any accepted notation and compiled once with
/// `jsonschema`. A schema that fails to compile rejects every call with the
/// compile error.
#[derive(Clone)]
pub struct SchemaValidator {
    schema: Value,
    compiled: std::result::Result<Arc<jsonschema::Validator>, String>,
}

impl SchemaValidator {
    /// Build from any of the notations accepted by [`Tool::new`].
    pub fn new(schema: Value) -> Self {
        let schema = normalize_schema(schema);
        let compiled = jsonschema::validator_for(&schema)
            .map(Arc::new)
            .map_err(|e| format!("Invalid tool schema: {}", e));
        Self { schema, compiled }
    }
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("schema", &self.schema)
            .field("compiled", &self.compiled.is_ok())
            .finish()
    }
}

impl ParameterValidator for SchemaValidator {
    fn validate(&self, params: &Value) -> std::result::Result<Value, String> {
        let validator = self.compiled.as_ref().map_err(Clone::clone)?;

        // Models frequently send `null` for zero-argument calls
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };

        let errors: Vec<String> = validator
            .iter_errors(&params)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(params)
        } else {
            Err(format!("Invalid parameters: {}", errors.join("; ")))
        }
    }

    fn json_schema(&self) -> &Value {
        &self.schema
    }
}

/// Validates arguments by deserializing them into `P`.
pub struct TypedValidator<P> {
    schema: Value,
    _params: PhantomData<fn() -> P>,
}

impl<P> TypedValidator<P> {
    pub fn new(schema: Value) -> Self {
        Self {
            schema: normalize_schema(schema),
            _params: PhantomData,
        }
    }
}

impl<P: DeserializeOwned> ParameterValidator for TypedValidator<P> {
    fn validate(&self, params: &Value) -> std::result::Result<Value, String> {
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        P::deserialize(&params).map_err(|e| format!("Invalid parameters: {}", e))?;
        Ok(params)
    }

    fn json_schema(&self) -> &Value {
        &self.schema
    }
}

/// Capability advertisement sent to the provider: `{name, description, parameters}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A named capability the model can invoke.
///
/// Cloning is cheap: the handler and validator are shared behind `Arc`.
#[derive(Clone)]
pub struct Tool {
    /// Unique key within a registry. Prefer snake_case: `get_weather`, `search_documents`.
    name: String,

    /// Read by the model when deciding whether to call the tool, so it should
    /// state what the tool does and what its parameters control.
    description: String,

    validator: Arc<dyn ParameterValidator>,

    handler: ToolHandler,
}

impl Tool {
    /// Create a tool whose arguments are checked by a [`SchemaValidator`].
    ///
    /// `input_schema` may use simple notation, typed properties, or full JSON
    /// Schema (see the module docs). Parameters are required unless marked
    /// `"optional": true`, `"required": false`, or given a `"default"`.
    ///
    /// ```rust,no_run
    /// use agent_runtime::Tool;
    /// use serde_json::json;
    ///
    /// let search = Tool::new(
    ///     "search",
    ///     "Search the knowledge base",
    ///     json!({
    ///         "query": {"type": "string", "description": "Search query"},
    ///         "max_results": {"type": "integer", "optional": true}
    ///     }),
    ///     |args| async move { Ok(json!({"results": [], "query": args["query"]})) },
    /// );
    /// ```
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::with_validator(
            name,
            description,
            Arc::new(SchemaValidator::new(input_schema)),
            handler,
        )
    }

    /// Create a tool with a caller-supplied parameter contract.
    pub fn with_validator<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        validator: Arc<dyn ParameterValidator>,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            validator,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    /// Check `params` against the tool's contract.
    pub fn validate(&self, params: &Value) -> std::result::Result<Value, String> {
        self.validator.validate(params)
    }

    /// Run the handler. Arguments are assumed to be validated already;
    /// errors are returned as-is and converted by the registry.
    pub async fn execute(&self, arguments: Value) -> Result<Value> {
        (self.handler)(arguments).await
    }

    /// Projection advertised to the provider.
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.validator.json_schema().clone(),
        }
    }

    /// Returns the tool's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tool's description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the JSON Schema advertised for the tool's parameters.
    pub fn input_schema(&self) -> &Value {
        self.validator.json_schema()
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", self.validator.json_schema())
            .finish()
    }
}

/// Normalize the accepted schema notations into a JSON Schema object.
///
/// Full schemas (with `"type"` and `"properties"`) pass through unchanged.
/// Flat maps are expanded: string values become `{"type": ...}` and are
/// required; object values keep their metadata, with the non-standard
/// `"optional"` / per-property `"required"` flags folded into the
/// top-level `required` array. A property with a `"default"` is optional.
/// Anything else yields an empty object schema.
fn normalize_schema(schema: Value) -> Value {
    let Value::Object(obj) = schema else {
        return empty_schema();
    };

    if obj.contains_key("type") && obj.contains_key("properties") {
        return Value::Object(obj);
    }

    let mut properties = Map::new();
    let mut required = Vec::new();

    for (param_name, param_type) in obj {
        match param_type {
            Value::String(type_str) => {
                properties.insert(param_name.clone(), type_to_json_schema(&type_str));
                required.push(Value::String(param_name));
            }
            Value::Object(mut prop) => {
                let is_optional = prop
                    .remove("optional")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                // An array here is a nested object's own `required` list
                let is_required = match prop.get("required") {
                    Some(Value::Bool(flag)) => {
                        let flag = *flag;
                        prop.remove("required");
                        Some(flag)
                    }
                    _ => None,
                };
                let has_default = prop.contains_key("default");

                properties.insert(param_name.clone(), Value::Object(prop));

                match is_required {
                    Some(true) => required.push(Value::String(param_name)),
                    Some(false) => {}
                    None if is_optional || has_default => {}
                    None => required.push(Value::String(param_name)),
                }
            }
            _ => {}
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

fn empty_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

/// Map friendly type names (`str`, `i64`, `vec`, `dict`, ...) to JSON Schema.
/// Unknown names fall back to `"string"`.
fn type_to_json_schema(type_str: &str) -> Value {
    let json_type = match type_str {
        "string" | "str" => "string",
        "integer" | "int" | "i32" | "i64" | "u32" | "u64" => "integer",
        "number" | "float" | "f32" | "f64" => "number",
        "boolean" | "bool" => "boolean",
        "array" | "list" | "vec" => "array",
        "object" | "dict" | "map" => "object",
        _ => "string",
    };

    serde_json::json!({ "type": json_type })
}

/// Builder for creating tools with a fluent API.
///
/// Use either [`.param()`](ToolBuilder::param) for simple flat schemas or
/// [`.schema()`](ToolBuilder::schema) for richer ones; a later `.schema()`
/// replaces earlier params.
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Value,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: serde_json::json!({}),
        }
    }

    /// Set the complete input schema, replacing any params added so far.
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Add one required parameter with a simple type string.
    ///
    /// A non-object schema set earlier via `.schema()` is reset first.
    pub fn param(mut self, name: &str, type_str: &str) -> Self {
        if let Some(obj) = self.schema.as_object_mut() {
            obj.insert(name.to_string(), Value::String(type_str.to_string()));
        } else {
            let mut obj = Map::new();
            obj.insert(name.to_string(), Value::String(type_str.to_string()));
            self.schema = Value::Object(obj);
        }
        self
    }

    /// Finish with a handler receiving validated JSON arguments.
    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Tool::new(self.name, self.description, self.schema, handler)
    }

    /// Finish with a handler receiving deserialized parameters.
    ///
    /// The contract is [`TypedValidator<P>`]: arguments that do not
    /// deserialize into `P` are rejected before the handler runs. The schema
    /// built so far is still what the model sees.
    pub fn build_typed<P, F, Fut>(self, handler: F) -> Tool
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let validator: Arc<dyn ParameterValidator> = Arc::new(TypedValidator::<P>::new(self.schema));
        Tool::with_validator(self.name, self.description, validator, move |args: Value| {
            let call = serde_json::from_value::<P>(args).map(&handler);
            async move {
                match call {
                    Ok(fut) => fut.await,
                    Err(e) => Err(Error::tool_validation(format!("Invalid parameters: {}", e))),
                }
            }
        })
    }
}

/// Create a tool using the builder pattern.
///
/// ```rust,no_run
/// use agent_runtime::tool;
/// use serde_json::json;
///
/// let echo = tool("echo", "Echo back the input")
///     .param("message", "string")
///     .build(|args| async move { Ok(args["message"].clone()) });
/// ```
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}
