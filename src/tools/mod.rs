//! Tool strategies.
//!
//! A tool is a definition (name, description, input schema) plus the code
//! that runs when `tools/call` selects it. Built-in tools:
//!
//! - `echo` - returns its `message` argument as text

pub mod echo;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::mcp::handler::RequestContext;
use crate::mcp::protocol::{ContentBlock, Tool, ToolResult};

pub use echo::EchoTool;

/// Handler for MCP tool calls.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Get the tool definition.
    fn definition(&self) -> Tool;

    /// Execute the tool with the given arguments.
    async fn execute(&self, ctx: &RequestContext, arguments: Map<String, Value>)
        -> Result<ToolResult>;
}

/// Check that every `required` parameter of `tool` is present and non-null.
pub fn validate_required(tool: &Tool, arguments: &Map<String, Value>) -> Result<()> {
    for name in tool.required_params() {
        match arguments.get(name) {
            None | Some(Value::Null) => {
                return Err(Error::InvalidParams(format!(
                    "Missing required parameter: {}",
                    name
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Helper macro for creating tool input schemas.
#[macro_export]
macro_rules! tool_schema {
    ($($json:tt)+) => {
        serde_json::json!({
            "type": "object",
            "properties": {
                $($json)+
            }
        })
    };
}

/// Helper to create a text content block.
pub fn text_content(text: impl Into<String>) -> ContentBlock {
    ContentBlock::Text { text: text.into() }
}

/// Helper to create a successful tool result.
pub fn success_result(text: impl Into<String>) -> ToolResult {
    ToolResult {
        content: vec![text_content(text)],
        is_error: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(required: Value) -> Tool {
        Tool {
            name: "t".to_string(),
            description: "test".to_string(),
            input_schema: json!({"type": "object", "required": required}),
        }
    }

    #[test]
    fn test_validate_required() {
        let t = tool(json!(["a", "b"]));
        let ok = json!({"a": 1, "b": false}).as_object().cloned().unwrap();
        assert!(validate_required(&t, &ok).is_ok());

        let null = json!({"a": 1, "b": null}).as_object().cloned().unwrap();
        let err = validate_required(&t, &null).unwrap_err();
        assert_eq!(err.code(), -32602);
        assert!(err.to_string().contains("b"));

        let missing = json!({"b": 1}).as_object().cloned().unwrap();
        assert!(validate_required(&t, &missing).is_err());
    }

    #[test]
    fn test_validate_without_required_list() {
        let t = Tool {
            name: "free".to_string(),
            description: "no schema requirements".to_string(),
            input_schema: tool_schema! { "x": { "type": "string" } },
        };
        assert!(validate_required(&t, &Map::new()).is_ok());
    }

    #[test]
    fn test_success_result() {
        let ok = success_result("done");
        assert!(!ok.is_error);
        assert_eq!(ok.content, vec![text_content("done")]);
    }
}
