use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolErrorType, SerializableProtocolError};
use crate::ProtocolError;

/// The id field name used by the request and response.
pub const ID_KEY: &str = "id";
/// The method field name used by the request and notification.
pub const METHOD_KEY: &str = "method";
/// The version of JSON-RPC used by this crate.
pub const JSON_RPC_VERSION: &str = "2.0";
/// Notification method used by a caller to abort one of its calls.
pub const CANCEL_METHOD: &str = "$/cancelRequest";

/// Data structure for a JSON-RPC request. Opens a call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(rename = "jsonrpc")]
    pub jsonrpc_version: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: Value,
    /// Time the caller is still willing to wait for the outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Data structure for a JSON-RPC response. Carries the terminal outcome of
/// a call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(rename = "jsonrpc")]
    pub jsonrpc_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcResponseError>,
    pub id: Value,
}

/// Data structure for a JSON-RPC notification.
///
/// Stream items are sent as notifications whose method is the call id.
/// The same notification without params closes the sender's direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(rename = "jsonrpc")]
    pub jsonrpc_version: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Parameters of a [`CANCEL_METHOD`] notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelParams {
    pub id: u64,
}

/// Data structure for the error in a JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponseError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC error codes used on the wire.
#[derive(Clone, Copy, PartialEq, Debug)]
#[repr(i32)]
pub enum JsonRpcErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
    NotFound = -32004,
    DeadlineExceeded = -32008,
    RequestCancelled = -32800,
}

impl From<i32> for JsonRpcErrorCode {
    fn from(value: i32) -> Self {
        match value {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32004 => Self::NotFound,
            -32008 => Self::DeadlineExceeded,
            -32800 => Self::RequestCancelled,
            _ => Self::InternalError,
        }
    }
}

impl From<ProtocolErrorType> for JsonRpcErrorCode {
    fn from(value: ProtocolErrorType) -> Self {
        match value {
            ProtocolErrorType::InvalidArgument => JsonRpcErrorCode::InvalidParams,
            ProtocolErrorType::NotFound => JsonRpcErrorCode::NotFound,
            ProtocolErrorType::Internal => JsonRpcErrorCode::InternalError,
            ProtocolErrorType::DeadlineExceeded => JsonRpcErrorCode::DeadlineExceeded,
            ProtocolErrorType::Cancelled => JsonRpcErrorCode::RequestCancelled,
        }
    }
}

impl From<JsonRpcErrorCode> for ProtocolErrorType {
    fn from(value: JsonRpcErrorCode) -> Self {
        match value {
            JsonRpcErrorCode::ParseError
            | JsonRpcErrorCode::InvalidRequest
            | JsonRpcErrorCode::InvalidParams => ProtocolErrorType::InvalidArgument,
            JsonRpcErrorCode::MethodNotFound | JsonRpcErrorCode::NotFound => {
                ProtocolErrorType::NotFound
            }
            JsonRpcErrorCode::InternalError => ProtocolErrorType::Internal,
            JsonRpcErrorCode::DeadlineExceeded => ProtocolErrorType::DeadlineExceeded,
            JsonRpcErrorCode::RequestCancelled => ProtocolErrorType::Cancelled,
        }
    }
}

/// All supported types of JSON-RPC messages.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

impl JsonRpcRequest {
    pub fn new(method: String, params: Option<Value>) -> Self {
        Self {
            jsonrpc_version: JSON_RPC_VERSION.to_string(),
            method,
            params,
            id: Value::Null,
            timeout_ms: None,
        }
    }
}

impl JsonRpcResponse {
    pub fn new(result: Result<Value, ProtocolError>, id: Value) -> Self {
        let (result, error) = match result {
            Ok(result) => (Some(result), None),
            Err(e) => (
                None,
                Some(JsonRpcResponseError {
                    code: JsonRpcErrorCode::from(e.error_type) as i32,
                    message: e.to_string(),
                    data: None,
                }),
            ),
        };
        JsonRpcResponse {
            jsonrpc_version: JSON_RPC_VERSION.to_string(),
            result,
            error,
            id,
        }
    }

    /// Evaluates `result` and `error` from the response and returns
    /// a `Result`. A missing or `null` result is `Value::Null`.
    pub fn get_result(self) -> Result<Value, SerializableProtocolError> {
        if let Some(error) = self.error {
            let jsonrpc_error_type = JsonRpcErrorCode::from(error.code);
            return Err(SerializableProtocolError {
                error_type: jsonrpc_error_type.into(),
                description: error.message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

impl JsonRpcNotification {
    pub fn new(method: String, params: Option<Value>) -> Self {
        JsonRpcNotification {
            jsonrpc_version: JSON_RPC_VERSION.to_string(),
            method,
            params,
        }
    }

    /// A stream item of call `id`.
    pub fn stream_item(id: u64, item: Value) -> Self {
        Self::new(id.to_string(), Some(item))
    }

    /// Closes the sender's direction of call `id`.
    pub fn stream_end(id: u64) -> Self {
        Self::new(id.to_string(), None)
    }

    /// Aborts call `id`.
    pub fn cancel(id: u64) -> Self {
        Self::new(
            CANCEL_METHOD.to_string(),
            Some(serde_json::json!({ ID_KEY: id })),
        )
    }
}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(value: JsonRpcRequest) -> Self {
        Self::Request(value)
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(value: JsonRpcResponse) -> Self {
        Self::Response(value)
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(value: JsonRpcNotification) -> Self {
        Self::Notification(value)
    }
}

impl TryFrom<serde_json::Value> for JsonRpcMessage {
    type Error = serde_json::Error;

    fn try_from(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match value.get(METHOD_KEY).is_some() {
            true => match value.get(ID_KEY).is_some() {
                true => JsonRpcMessage::Request(serde_json::from_value(value)?),
                false => JsonRpcMessage::Notification(serde_json::from_value(value)?),
            },
            false => JsonRpcMessage::Response(serde_json::from_value(value)?),
        })
    }
}
