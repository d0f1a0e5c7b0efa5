//! JSON-RPC 2.0 envelope types. Deliberately untyped in `params`/`result`:
//! each method's shape is validated where it's interpreted, in `engine.rs`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use skillforge_types::Error;

pub const JSONRPC_VERSION: &str = "2.0";

/// A decoded request or notification. The distinction is structural, not a
/// separate type: `id` absent (or explicitly `null`) means a notification,
/// per the JSON-RPC 2.0 spec, and gets no response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none() || matches!(self.id, Some(Value::Null))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: &Error) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError::from_error(error)),
        }
    }
}

/// §7's taxonomy mapped onto the wire: `code` is `Error::rpc_code()`,
/// `message` is the `Display` text, and `data.kind` carries the stable
/// taxonomy token for clients that want to match on it without parsing
/// the message string.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn from_error(err: &Error) -> Self {
        Self {
            code: err.rpc_code(),
            message: err.to_string(),
            data: Some(serde_json::json!({ "kind": err.kind() })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_without_id_is_a_notification() {
        let req: JsonRpcRequest =
            serde_json::from_value(serde_json::json!({ "jsonrpc": "2.0", "method": "initialized" }))
                .unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn request_with_null_id_is_also_a_notification() {
        let req: JsonRpcRequest = serde_json::from_value(
            serde_json::json!({ "jsonrpc": "2.0", "id": null, "method": "initialized" }),
        )
        .unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn request_with_an_id_is_not_a_notification() {
        let req: JsonRpcRequest =
            serde_json::from_value(serde_json::json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }))
                .unwrap();
        assert!(!req.is_notification());
    }

    #[test]
    fn failure_response_carries_the_taxonomy_kind_in_data() {
        let resp = JsonRpcResponse::failure(serde_json::json!(1), &Error::SessionNotFound);
        let error = resp.error.unwrap();
        assert_eq!(error.code, -32002);
        assert_eq!(error.data.unwrap()["kind"], "session-not-found");
    }

    #[test]
    fn success_response_omits_error_field() {
        let resp = JsonRpcResponse::success(serde_json::json!(1), serde_json::json!({ "ok": true }));
        let serialized = serde_json::to_value(&resp).unwrap();
        assert!(serialized.get("error").is_none());
    }
}
