//! MCP protocol types, message definitions and the JSON-RPC codec.
//!
//! Based on the Model Context Protocol specification (2024-11-05).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// JSON-RPC version.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version.
pub const MCP_VERSION: &str = "2024-11-05";

/// Method prefix marking client-to-server one-way messages.
pub const NOTIFICATION_PREFIX: &str = "notifications/";

// ===== JSON-RPC Base Types =====

/// Request ID (string, number or explicit null).
///
/// Absence of an id is modelled one level up as `Option<RequestId>`, so
/// `{"id": null}` and a missing `id` stay distinguishable when echoed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(serde_json::Number),
    Null,
}

impl RequestId {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::Null => Some(Self::Null),
            _ => None,
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// A JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC response. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Build a success response.
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn failure(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Build an error response from an engine error.
    pub fn from_error(id: Option<RequestId>, err: &Error) -> Self {
        Self::failure(id, err.to_rpc_error())
    }
}

/// A JSON-RPC notification (no id, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A server-to-client notification before it is put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Map<String, Value>,
}

impl Notification {
    /// Create a notification with empty params.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: Map::new(),
        }
    }

    /// Add a param.
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// `<kind>/list/changed` with empty params.
    pub fn list_changed(kind: ListKind) -> Self {
        Self::new(format!("{}/list/changed", kind.as_str()))
    }

    /// Wire representation.
    pub fn to_jsonrpc(&self) -> JsonRpcNotification {
        JsonRpcNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: self.method.clone(),
            params: Some(Value::Object(self.params.clone())),
        }
    }
}

/// Entity kinds that advertise list-changed notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Resources,
    Tools,
    Prompts,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Resources => "resources",
            ListKind::Tools => "tools",
            ListKind::Prompts => "prompts",
        }
    }
}

// ===== Codec =====

/// A decoded inbound message.
#[derive(Debug, Clone)]
pub enum Incoming {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
}

impl Incoming {
    pub fn method(&self) -> &str {
        match self {
            Incoming::Request(req) => &req.method,
            Incoming::Notification(notif) => &notif.method,
        }
    }
}

/// Why an inbound payload could not be decoded.
#[derive(Debug, Clone)]
pub enum DecodeError {
    /// Not valid JSON at all.
    Parse(String),
    /// Valid JSON but not a usable request; carries whatever id was parsed.
    InvalidRequest {
        id: Option<RequestId>,
        reason: String,
    },
}

impl DecodeError {
    /// The error response the client gets for this payload.
    pub fn into_response(self) -> JsonRpcResponse {
        match self {
            DecodeError::Parse(reason) => {
                JsonRpcResponse::from_error(Some(RequestId::Null), &Error::Parse(reason))
            }
            DecodeError::InvalidRequest { id, reason } => {
                JsonRpcResponse::from_error(id, &Error::InvalidRequest(reason))
            }
        }
    }
}

/// Decode one JSON-RPC message.
///
/// Only `jsonrpc`, `id`, `method` and `params` are looked at; extra fields
/// are ignored.
pub fn decode(bytes: &[u8]) -> std::result::Result<Incoming, DecodeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Parse(e.to_string()))?;

    let Value::Object(mut obj) = value else {
        return Err(DecodeError::InvalidRequest {
            id: Some(RequestId::Null),
            reason: "message must be a JSON object".to_string(),
        });
    };

    let id = match obj.get("id") {
        None => None,
        Some(raw) => match RequestId::from_value(raw) {
            Some(id) => Some(id),
            None => {
                return Err(DecodeError::InvalidRequest {
                    id: Some(RequestId::Null),
                    reason: "id must be a string, number or null".to_string(),
                })
            }
        },
    };

    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        Some(other) => {
            return Err(DecodeError::InvalidRequest {
                id,
                reason: format!("unsupported jsonrpc version '{}'", other),
            })
        }
        None => {
            return Err(DecodeError::InvalidRequest {
                id,
                reason: "missing jsonrpc version".to_string(),
            })
        }
    }

    let method = match obj.remove("method") {
        Some(Value::String(m)) if !m.is_empty() => m,
        _ => {
            return Err(DecodeError::InvalidRequest {
                id,
                reason: "missing method".to_string(),
            })
        }
    };

    let params = obj.remove("params");

    if id.is_none() && method.starts_with(NOTIFICATION_PREFIX) {
        return Ok(Incoming::Notification(JsonRpcNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method,
            params,
        }));
    }

    Ok(Incoming::Request(JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        method,
        params,
    }))
}

/// Last-resort reply when even the internal error document cannot be encoded.
const ENCODE_FAILURE: &[u8] =
    br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error: response could not be encoded"}}"#;

/// Serialize a response to bytes.
///
/// A result that fails to serialize is replaced by a `-32603` error for
/// the same id, so callers always have a complete document to write.
pub fn encode_response(response: &JsonRpcResponse) -> Vec<u8> {
    encode_or_internal_error(response, response.id.as_ref())
}

fn encode_or_internal_error<T: Serialize>(message: &T, id: Option<&RequestId>) -> Vec<u8> {
    match serde_json::to_vec(message) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("Failed to encode response: {}", e);
            let fallback = JsonRpcResponse::from_error(id.cloned(), &Error::Json(e));
            serde_json::to_vec(&fallback).unwrap_or_else(|_| ENCODE_FAILURE.to_vec())
        }
    }
}

/// Serialize a notification to bytes.
pub fn encode_notification(notification: &Notification) -> crate::error::Result<Vec<u8>> {
    Ok(serde_json::to_vec(&notification.to_jsonrpc())?)
}

// ===== MCP-Specific Types =====

/// Server capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
}

impl ServerCapabilities {
    /// The fixed descriptor this engine advertises.
    pub fn list_changed_everywhere() -> Self {
        Self {
            tools: Some(ToolsCapability { list_changed: true }),
            resources: Some(ResourcesCapability {
                subscribe: false,
                list_changed: true,
            }),
            prompts: Some(PromptsCapability { list_changed: true }),
        }
    }
}

/// Tools capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

/// Resources capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapability {
    #[serde(default)]
    pub subscribe: bool,
    #[serde(default)]
    pub list_changed: bool,
}

/// Prompts capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

/// Server info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Initialize result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl Tool {
    /// Names listed under `inputSchema.required`.
    pub fn required_params(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Tool call result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
}

/// Content block in a tool result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
}

/// List tools result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
}

// ===== Error Codes =====

/// Standard JSON-RPC error codes plus the domain pass-through codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const NOT_FOUND: i32 = 404;
    pub const VALIDATION_FAILED: i32 = 400;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_json(response: &JsonRpcResponse) -> Value {
        serde_json::from_slice(&encode_response(response)).unwrap()
    }

    #[test]
    fn test_decode_request() {
        let msg = decode(br#"{"jsonrpc":"2.0","id":1,"method":"ping","extra":true}"#).unwrap();
        match msg {
            Incoming::Request(req) => {
                assert_eq!(req.method, "ping");
                assert_eq!(req.id, Some(RequestId::from(1)));
                assert!(req.params.is_none());
            }
            Incoming::Notification(_) => panic!("Expected request"),
        }
    }

    #[test]
    fn test_decode_notification_requires_prefix_and_no_id() {
        let notif = decode(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(matches!(notif, Incoming::Notification(_)));

        // An id turns it back into a request.
        let with_id =
            decode(br#"{"jsonrpc":"2.0","id":3,"method":"notifications/initialized"}"#).unwrap();
        assert!(matches!(with_id, Incoming::Request(_)));

        // No id but no prefix: still a request that gets answered.
        let bare = decode(br#"{"jsonrpc":"2.0","method":"ping"}"#).unwrap();
        match bare {
            Incoming::Request(req) => assert!(req.id.is_none()),
            Incoming::Notification(_) => panic!("Expected request"),
        }
    }

    #[test]
    fn test_decode_parse_error_has_null_id() {
        let err = decode(br#"{"jsonrpc":"#).unwrap_err();
        let json = to_json(&err.into_response());
        assert_eq!(json["error"]["code"], -32700);
        assert_eq!(json["id"], Value::Null);
        assert!(json.as_object().unwrap().contains_key("id"));
    }

    #[test]
    fn test_decode_wrong_version_echoes_id() {
        let err = decode(br#"{"jsonrpc":"1.0","id":"abc","method":"ping"}"#).unwrap_err();
        let json = to_json(&err.into_response());
        assert_eq!(json["error"]["code"], -32600);
        assert_eq!(json["id"], "abc");

        let missing = decode(br#"{"id":7,"method":"ping"}"#).unwrap_err();
        let json = to_json(&missing.into_response());
        assert_eq!(json["error"]["code"], -32600);
        assert_eq!(json["id"], 7);
    }

    #[test]
    fn test_explicit_null_id_is_kept() {
        let msg = decode(br#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).unwrap();
        let Incoming::Request(req) = msg else {
            panic!("Expected request");
        };
        assert_eq!(req.id, Some(RequestId::Null));

        let json = to_json(&JsonRpcResponse::success(req.id, json!({})));
        assert!(json.as_object().unwrap().contains_key("id"));
        assert_eq!(json["id"], Value::Null);
    }

    #[test]
    fn test_absent_id_is_not_invented() {
        let json = to_json(&JsonRpcResponse::success(None, json!({})));
        assert!(!json.as_object().unwrap().contains_key("id"));
    }

    #[test]
    fn test_fractional_id_round_trips_verbatim() {
        let msg = decode(br#"{"jsonrpc":"2.0","id":1.5,"method":"ping"}"#).unwrap();
        let Incoming::Request(req) = msg else {
            panic!("Expected request");
        };
        let json = to_json(&JsonRpcResponse::success(req.id, json!({})));
        assert_eq!(json["id"], json!(1.5));
    }

    #[test]
    fn test_object_id_is_invalid() {
        let err = decode(br#"{"jsonrpc":"2.0","id":{"a":1},"method":"ping"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidRequest { .. }));
    }

    #[test]
    fn test_response_has_exactly_one_of_result_or_error() {
        let ok = to_json(&JsonRpcResponse::success(Some(1.into()), json!({"a": 1})));
        assert!(ok.get("result").is_some());
        assert!(ok.get("error").is_none());

        let err = to_json(&JsonRpcResponse::from_error(
            Some(1.into()),
            &Error::MethodNotFound("x".into()),
        ));
        assert!(err.get("result").is_none());
        assert_eq!(err["error"]["code"], -32601);
    }

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refused"))
        }
    }

    #[test]
    fn test_encode_failure_becomes_internal_error() {
        let id = RequestId::from(9);
        let bytes = encode_or_internal_error(&Unencodable, Some(&id));
        assert!(!bytes.is_empty());

        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 9);
        assert_eq!(json["error"]["code"], -32603);
        assert!(json["error"]["message"].as_str().unwrap().contains("refused"));
    }

    #[test]
    fn test_encode_failure_fallback_is_valid_json() {
        let json: Value = serde_json::from_slice(ENCODE_FAILURE).unwrap();
        assert_eq!(json["error"]["code"], -32603);
    }

    #[test]
    fn test_encode_notification() {
        let n = Notification::list_changed(ListKind::Tools);
        let json: Value = serde_json::from_slice(&encode_notification(&n).unwrap()).unwrap();
        assert_eq!(
            json,
            json!({"jsonrpc": "2.0", "method": "tools/list/changed", "params": {}})
        );
    }

    #[test]
    fn test_initialize_result_shape() {
        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ServerCapabilities::list_changed_everywhere(),
            server_info: ServerInfo {
                name: "mcp-engine".to_string(),
                version: "0.3.0".to_string(),
            },
            instructions: None,
        };

        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["protocolVersion"], "2024-11-05");
        assert_eq!(json["capabilities"]["tools"]["listChanged"], true);
        assert_eq!(json["capabilities"]["resources"]["listChanged"], true);
        assert_eq!(json["capabilities"]["prompts"]["listChanged"], true);
        assert!(json.get("instructions").is_none());
    }

    #[test]
    fn test_tool_required_params() {
        let tool = Tool {
            name: "echo".to_string(),
            description: "Echo".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "message": {} },
                "required": ["message"]
            }),
        };
        assert_eq!(tool.required_params(), vec!["message"]);

        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("\"inputSchema\""));
    }

    #[test]
    fn test_tool_result_wire_shape() {
        let result = ToolResult {
            content: vec![ContentBlock::Text {
                text: "hi".to_string(),
            }],
            is_error: false,
        };
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["content"], json!([{"type": "text", "text": "hi"}]));
        assert_eq!(json["isError"], false);
    }
}
