//! JSON-RPC 2.0 and MCP wire types.
//!
//! Dynamic-shaped payloads (tool schemas, call arguments, descriptors) are
//! kept as `serde_json::Value`; only the fields the aggregator reads or
//! rewrites structurally (`jsonrpc`, `id`, `method`, `name`, `description`)
//! are modeled.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request ID - can be string, number, or null.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum JsonRpcId {
    String(String),
    Number(i64),
    Null,
}

/// Incoming JSON-RPC 2.0 request (or notification, when `id` is absent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: JsonRpcId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Outgoing JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<JsonRpcId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<JsonRpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl JsonRpcError {
    // Standard JSON-RPC error codes.
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // Aggregator-specific error codes (spec §6).
    pub const NO_UPSTREAMS: i32 = -32000;
    pub const UPSTREAM_REQUEST_FAILED: i32 = -32001;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn no_upstreams() -> Self {
        Self::new(Self::NO_UPSTREAMS, "No upstreams available")
    }

    pub fn upstream_request_failed(detail: impl std::fmt::Display) -> Self {
        Self::new(
            Self::UPSTREAM_REQUEST_FAILED,
            format!("Upstream request failed: {detail}"),
        )
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(Self::METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn tool_not_allowed(name: &str) -> Self {
        Self::new(Self::METHOD_NOT_FOUND, format!("Tool not allowed: {name}"))
    }

    pub fn tool_excluded(name: &str) -> Self {
        Self::new(Self::METHOD_NOT_FOUND, format!("Tool excluded: {name}"))
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAMS, msg)
    }
}

/// Capabilities advertised by a client or server: three independent
/// name -> descriptor maps, merged last-writer-wins across upstreams.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Capabilities {
    #[serde(default)]
    pub tools: serde_json::Map<String, Value>,
    #[serde(default)]
    pub prompts: serde_json::Map<String, Value>,
    #[serde(default)]
    pub resources: serde_json::Map<String, Value>,
}

/// Server info returned during initialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// initialize response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    pub capabilities: Capabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// A tool descriptor as advertised by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "default_schema")]
    pub input_schema: Value,
    /// Any other fields the upstream attached; preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn default_schema() -> Value {
    serde_json::json!({"type": "object"})
}

/// tools/list response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsListResult {
    pub tools: Vec<Tool>,
}

/// tools/call request params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// A named prompt template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// prompts/list response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptsListResult {
    pub prompts: Vec<Prompt>,
}

/// A resource descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// resources/list response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResourcesListResult {
    pub resources: Vec<Resource>,
}

/// The `{ result: ... }` or `{ error: ... }` shape a completed request
/// yields, shared between upstream sessions and the controller.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

impl Envelope {
    pub fn ok(result: Value) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    pub fn err(error: JsonRpcError) -> Self {
        Self {
            result: None,
            error: Some(error),
        }
    }

    pub fn from_response(result: Option<Value>, error: Option<Value>) -> Self {
        let error = error.and_then(|v| serde_json::from_value::<JsonRpcError>(v).ok());
        Self { result, error }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn json_rpc_request_parsing() {
        let json = r#"{
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/list",
            "params": {}
        }"#;

        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.method, "tools/list");
        assert_eq!(req.id, Some(JsonRpcId::Number(1)));
        assert!(!req.is_notification());
    }

    #[test]
    fn notification_has_no_id() {
        let json = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn json_rpc_response_success() {
        let resp = JsonRpcResponse::success(Some(JsonRpcId::Number(1)), serde_json::json!({"tools": []}));
        assert!(resp.result.is_some());
        assert!(resp.error.is_none());
    }

    #[test]
    fn json_rpc_response_error() {
        let resp = JsonRpcResponse::error(Some(JsonRpcId::Number(1)), JsonRpcError::method_not_found("unknown"));
        assert!(resp.is_error());
        assert_eq!(resp.error.unwrap().code, JsonRpcError::METHOD_NOT_FOUND);
    }

    #[test]
    fn tool_call_params_parsing() {
        let json = r#"{"name":"u1_create_issue","arguments":{"repo":"owner/repo"}}"#;
        let params: ToolCallParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.name, "u1_create_issue");
    }

    #[test]
    fn tool_round_trips_extra_fields() {
        let json = r#"{"name":"a","inputSchema":{"type":"object"},"annotations":{"readOnly":true}}"#;
        let tool: Tool = serde_json::from_str(json).unwrap();
        assert_eq!(tool.name, "a");
        assert!(tool.extra.contains_key("annotations"));
    }
}
