//! Tool-provider wire protocol: one JSON object per line on stdin/stdout.
//!
//! This crate defines the request/response shapes spoken between the agent's
//! tool registry and a tool-provider subprocess. It does not depend on tempo;
//! both sides serialize through these types and frame them as single lines.
//!
//! Methods:
//! - `list_tools` — params ignored; result is `{ "tools": [ToolDescriptor] }`.
//! - `call_tool` — params `{ "name": str, "args": object }`; result is
//!   `{ "content": str }` on success. Failures are carried in the response
//!   `error` field, never as a transport-level break.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request from the agent to a provider. `id` is echoed in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl ProviderRequest {
    pub fn list_tools(id: u64) -> Self {
        Self {
            id,
            method: "list_tools".to_string(),
            params: Value::Null,
        }
    }

    pub fn call_tool(id: u64, name: impl Into<String>, args: Value) -> Self {
        Self {
            id,
            method: "call_tool".to_string(),
            params: serde_json::json!({ "name": name.into(), "args": args }),
        }
    }
}

/// A response from a provider. Exactly one of `result` / `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProviderError>,
}

impl ProviderResponse {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ProviderError {
                message: message.into(),
            }),
        }
    }
}

/// Error payload of a failed provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderError {
    pub message: String,
}

/// One advertised tool: name, description, JSON schema of the parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Result payload of `list_tools`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDescriptor>,
}

/// Result payload of a successful `call_tool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: String,
}

/// Parameters of `call_tool`, as decoded by the provider side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: a call_tool request round-trips through one JSON line.
    #[test]
    fn call_tool_request_roundtrip() {
        let req = ProviderRequest::call_tool(7, "read_file", serde_json::json!({"path": "a.txt"}));
        let line = serde_json::to_string(&req).unwrap();
        assert!(!line.contains('\n'));
        let back: ProviderRequest = serde_json::from_str(&line).unwrap();
        assert_eq!(back.id, 7);
        assert_eq!(back.method, "call_tool");
        let params: CallToolParams = serde_json::from_value(back.params).unwrap();
        assert_eq!(params.name, "read_file");
        assert_eq!(params.args["path"], "a.txt");
    }

    /// **Scenario**: error responses keep `result` absent and carry the message.
    #[test]
    fn error_response_shape() {
        let resp = ProviderResponse::err(3, "no such tool");
        let v = serde_json::to_value(&resp).unwrap();
        assert!(v.get("result").is_none());
        assert_eq!(v["error"]["message"], "no such tool");
        let back: ProviderResponse = serde_json::from_value(v).unwrap();
        assert_eq!(back.error.unwrap().message, "no such tool");
    }

    /// **Scenario**: a descriptor without a schema gets the empty object schema default.
    #[test]
    fn descriptor_defaults_schema() {
        let d: ToolDescriptor =
            serde_json::from_str(r#"{"name":"ping","description":"pong"}"#).unwrap();
        assert_eq!(d.parameters_schema["type"], "object");
    }
}
