// Copyright 2025 rpcpool Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! JSON-RPC 2.0 Protocol Types
//!
//! Wire types spoken by the reference HTTP base client.
//!
//! - Request format: `{"jsonrpc": "2.0", "method": "...", "params": [...], "id": ...}`
//! - Response format: `{"jsonrpc": "2.0", "result": ..., "error": ..., "id": ...}`
//! - Error format: `{"code": ..., "message": "...", "data": ...}`
//!
//! # Error Codes
//!
//! Standard JSON-RPC 2.0 error codes:
//! - `-32700`: Parse error
//! - `-32600`: Invalid request
//! - `-32601`: Method not found
//! - `-32602`: Invalid params
//! - `-32603`: Internal error
//! - `-32005`: Limit exceeded (widely used by hosted providers for rate limiting)

use crate::error::{PoolError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0")
    pub jsonrpc: String,
    /// Name of the method to invoke
    pub method: String,
    /// Positional parameter values
    pub params: Value,
    /// Request identifier
    pub id: Value,
}

impl JsonRpcRequest {
    /// Builds a request with positional parameters.
    pub fn new(method: &str, params: Vec<Value>, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params: Value::Array(params),
            id: Value::from(id),
        }
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (must be "2.0")
    pub jsonrpc: String,
    /// Result value on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error object on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request identifier (must match the request id)
    #[serde(default)]
    pub id: Value,
}

/// JSON-RPC 2.0 error
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    /// Error code (standard codes are negative integers)
    pub code: i64,
    /// Short description of the error
    pub message: String,
    /// Additional data (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Invalid JSON was received by the server
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid Request object
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist / is not available
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameter(s)
pub const INVALID_PARAMS: i64 = -32602;
/// Internal JSON-RPC error
pub const INTERNAL_ERROR: i64 = -32603;
/// Provider-side request limit exceeded
pub const LIMIT_EXCEEDED: i64 = -32005;

impl JsonRpcError {
    /// Create a method not found error (-32601)
    pub fn method_not_found() -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: "Method not found".into(),
            data: None,
        }
    }

    /// Create an invalid params error (-32602)
    pub fn invalid_params(msg: &str) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: msg.into(),
            data: None,
        }
    }

    /// Create an internal error (-32603)
    pub fn internal_error(msg: &str) -> Self {
        Self {
            code: INTERNAL_ERROR,
            message: msg.into(),
            data: None,
        }
    }

    /// Create a limit exceeded error (-32005)
    pub fn limit_exceeded(msg: &str) -> Self {
        Self {
            code: LIMIT_EXCEEDED,
            message: msg.into(),
            data: None,
        }
    }
}

impl From<JsonRpcError> for PoolError {
    fn from(err: JsonRpcError) -> Self {
        PoolError::Rpc {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response
    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// Converts the envelope into the call outcome.
    ///
    /// An absent or `null` result without an error object is a legitimate
    /// `null` result (e.g. a receipt for a pending transaction).
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_jsonrpc_request_serialization() {
        let req = JsonRpcRequest::new("eth_getBalance", vec![json!("0xabc"), json!("latest")], 7);
        let serialized = serde_json::to_string(&req).unwrap();
        assert!(serialized.contains("\"jsonrpc\":\"2.0\""));
        assert!(serialized.contains("\"method\":\"eth_getBalance\""));
        assert!(serialized.contains("\"params\":[\"0xabc\",\"latest\"]"));
        assert!(serialized.contains("\"id\":7"));
    }

    #[test]
    fn test_jsonrpc_response_success_into_result() {
        let res = JsonRpcResponse::success(json!(1), json!("0x10"));
        assert_eq!(res.into_result().unwrap(), json!("0x10"));
    }

    #[test]
    fn test_jsonrpc_response_error_into_result() {
        let res = JsonRpcResponse::error(json!(1), JsonRpcError::limit_exceeded("slow down"));
        match res.into_result() {
            Err(PoolError::Rpc { code, message, .. }) => {
                assert_eq!(code, LIMIT_EXCEEDED);
                assert_eq!(message, "slow down");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_jsonrpc_null_result_is_success() {
        let json = r#"{"jsonrpc":"2.0","result":null,"id":1}"#;
        let res: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert_eq!(res.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_jsonrpc_response_with_error_deserialization() {
        let json = r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":1}"#;
        let res: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert_eq!(res.result, None);
        assert_eq!(res.error, Some(JsonRpcError::method_not_found()));
    }

    #[test]
    fn test_jsonrpc_error_codes() {
        assert_eq!(JsonRpcError::method_not_found().code, -32601);
        assert_eq!(JsonRpcError::invalid_params("test").code, -32602);
        assert_eq!(JsonRpcError::internal_error("test").code, -32603);
        assert_eq!(JsonRpcError::limit_exceeded("test").code, -32005);
    }
}
