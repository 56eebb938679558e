//! Request/response envelope of the agent protocol.
//!
//! The envelope is JSON-RPC 2.0 shaped. `id` is opaque and echoed verbatim;
//! an absent `id` marks a notification, which never produces a transmitted
//! response. Explicit `"id": null` is *not* a notification.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ParamsError, codes};
use crate::mcp::ToolCallResult;

/// The only accepted value of the envelope's `jsonrpc` field.
pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "jsonrpc", alias = "version")]
    pub version: String,
    pub method: String,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Request {
    /// Decode a single request envelope. Any decoding failure, including a
    /// well-formed JSON value that is not a request object, is a ParseError.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(|_| ProtocolError::parse_error())
    }

    pub fn is_valid_version(&self) -> bool {
        self.version == JSONRPC_VERSION
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Deserialize `params`, treating a missing or null value as `None`.
    pub fn params<T: DeserializeOwned>(&self) -> Result<Option<T>, ParamsError> {
        if self.params.is_null() {
            return Ok(None);
        }
        Ok(Some(T::deserialize(&self.params)?))
    }

    pub fn required_params<T: DeserializeOwned>(&self) -> Result<T, ParamsError> {
        self.params()?.ok_or(ParamsError::Missing)
    }
}

/// Keeps `"id": null` distinguishable from a missing `id`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProtocolError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(codes::PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(codes::INVALID_REQUEST, "Invalid Request")
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("Method '{method}' not found"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }
}

/// Payload of a successful response. A tool-call result is kept typed so the
/// transports can tell a logically failed tool call from a plain success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseResult {
    ToolCall(ToolCallResult),
    Value(Value),
}

impl From<Value> for ResponseResult {
    fn from(value: Value) -> Self {
        ResponseResult::Value(value)
    }
}

impl From<ToolCallResult> for ResponseResult {
    fn from(result: ToolCallResult) -> Self {
        ResponseResult::ToolCall(result)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "jsonrpc")]
    pub version: String,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResponseResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProtocolError>,
}

impl Response {
    pub fn success(id: Option<Value>, result: impl Into<ResponseResult>) -> Self {
        Self {
            version: JSONRPC_VERSION.to_string(),
            id: Some(id.unwrap_or(Value::Null)),
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        let mut error = ProtocolError::new(code, message);
        error.data = data;
        Self::from_error(id, error)
    }

    pub fn from_error(id: Option<Value>, error: ProtocolError) -> Self {
        Self {
            version: JSONRPC_VERSION.to_string(),
            id: Some(id.unwrap_or(Value::Null)),
            result: None,
            error: Some(error),
        }
    }

    /// Sentinel meaning "transmit nothing".
    pub fn empty() -> Self {
        Self {
            version: JSONRPC_VERSION.to_string(),
            id: None,
            result: None,
            error: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_none() && self.error.is_none()
    }

    /// True for protocol errors and for tool-call results flagged `isError`.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
            || matches!(
                &self.result,
                Some(ResponseResult::ToolCall(ToolCallResult { is_error: true, .. }))
            )
    }
}
