//! Tool System
//!
//! Extensible tool framework for agent capabilities. Handlers are registered
//! at runtime in a shared [`ToolRegistry`] together with their metadata, and
//! invoked by the reasoning loop or the agent loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{AgentError, Result};

pub mod builtin;
pub mod registry;

pub use builtin::{register_builtin_tools, CalculatorTool, DateTimeTool, EchoTool};
pub use registry::{ToolMetadata, ToolRegistry};

/// Arguments passed to a tool handler
pub type ToolArgs = HashMap<String, Value>;

/// Tool call request (from the LLM or from an agent action)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    #[serde(alias = "tool")]
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default, alias = "parameters")]
    pub arguments: ToolArgs,

    /// Optional call ID for tracking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: ToolArgs) -> Self {
        Self {
            name: name.into(),
            arguments,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// How a tool call ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    /// No handler registered under the requested name
    NotFound,
    /// Validation failed, or the handler returned an error or panicked
    Failed,
}

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Call ID (if provided in request)
    pub id: Option<String>,

    /// Outcome
    pub status: ToolStatus,

    /// Rendered handler output, or the error description
    pub output: String,

    /// Raw handler value (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            status: ToolStatus::Success,
            output: output.into(),
            data: None,
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            output: format!("Tool '{}' not found in the tool registry", name),
            name,
            id: None,
            status: ToolStatus::NotFound,
            data: None,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            status: ToolStatus::Failed,
            output: error.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    /// A required parameter
    pub fn required(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    /// An optional parameter
    pub fn optional(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }
}

/// A callable tool implementation.
///
/// The registry stores handlers as `Arc<dyn ToolHandler>` next to their
/// [`ToolMetadata`], so a handler can be hot-swapped without touching the
/// description, schema, tags or version.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool. The returned value is rendered to text for the
    /// conversation (strings verbatim, everything else as JSON).
    async fn call(&self, args: &ToolArgs) -> Result<Value>;

    /// Label of the code that provides this handler
    fn origin(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Handler backed by a synchronous closure. Created with [`tool_fn`].
pub struct FnTool<F> {
    f: F,
}

/// Wrap a plain function as a [`ToolHandler`]
///
/// ```rust,ignore
/// registry.register(
///     ToolMetadata::new("echo", "Echo text back"),
///     tool_fn(|args| Ok(args.get("text").cloned().unwrap_or_default())),
/// );
/// ```
pub fn tool_fn<F>(f: F) -> FnTool<F>
where
    F: Fn(&ToolArgs) -> Result<Value> + Send + Sync + 'static,
{
    FnTool { f }
}

#[async_trait]
impl<F> ToolHandler for FnTool<F>
where
    F: Fn(&ToolArgs) -> Result<Value> + Send + Sync + 'static,
{
    async fn call(&self, args: &ToolArgs) -> Result<Value> {
        (self.f)(args)
    }
}

/// Render a handler value as conversation text
pub fn render_output(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Fetch a required string argument
pub fn required_str<'a>(args: &'a ToolArgs, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::ToolValidation(format!("Missing string parameter: {}", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_tool_calls_closure() {
        let echo = tool_fn(|args| Ok(json!(required_str(args, "text")?)));
        let mut args = ToolArgs::new();
        args.insert("text".into(), json!("hi"));

        assert_eq!(echo.call(&args).await.unwrap(), json!("hi"));
        assert!(echo.call(&ToolArgs::new()).await.is_err());
    }

    #[test]
    fn test_render_output() {
        assert_eq!(render_output(&json!("plain")), "plain");
        assert_eq!(render_output(&json!(42)), "42");
        assert_eq!(render_output(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(render_output(&Value::Null), "");
    }

    #[test]
    fn test_tool_call_accepts_tool_alias() {
        let call: ToolCall =
            serde_json::from_str(r#"{"tool": "calculate", "arguments": {"expression": "2 + 2"}}"#)
                .unwrap();
        assert_eq!(call.name, "calculate");
        assert_eq!(call.arguments["expression"], "2 + 2");
    }

    #[test]
    fn test_origin_names_handler_type() {
        assert!(EchoTool.origin().ends_with("EchoTool"));
    }
}
