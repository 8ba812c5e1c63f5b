//! The built-in `echo` tool.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::mcp::handler::RequestContext;
use crate::mcp::protocol::{Tool, ToolResult};
use crate::tools::{success_result, ToolHandler};

/// Echoes `message` back as text.
///
/// Scalars are stringified as-is; arrays and objects are JSON-serialized.
#[derive(Debug, Default, Clone)]
pub struct EchoTool;

impl EchoTool {
    pub fn new() -> Self {
        Self
    }
}

/// Render a value the way `echo` returns it.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        compound => compound.to_string(),
    }
}

#[async_trait]
impl ToolHandler for EchoTool {
    fn definition(&self) -> Tool {
        let mut input_schema = crate::tool_schema! {
            "message": {
                "description": "Value to echo back"
            }
        };
        input_schema["required"] = serde_json::json!(["message"]);

        Tool {
            name: "echo".to_string(),
            description: "Echo back the provided message".to_string(),
            input_schema,
        }
    }

    async fn execute(
        &self,
        _ctx: &RequestContext,
        arguments: Map<String, Value>,
    ) -> Result<ToolResult> {
        let message = arguments.get("message").unwrap_or(&Value::Null);
        Ok(success_result(stringify(message)))
    }
}
