//! JSON-RPC 2.0 message types and codec for the MCP protocol.
//!
//! # Message Types
//!
//! - **Request**: a message expecting a response (`jsonrpc == "2.0"`, has
//!   `method` and `id`)
//! - **Notification**: a one-way message (`jsonrpc == "2.0"`, `method`,
//!   no `id`)
//! - **Response**: a reply to a request (`id` plus one of `result`/`error`)
//! - **Batch**: a non-empty array of any of the above
//!
//! Parsing and classification are pure: malformed input yields a structured
//! error object, never a panic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC 2.0 request ID.
///
/// Per the MCP specification, IDs must be strings or integers, never `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// Unique request identifier.
    pub id: RequestId,

    /// The method to invoke.
    pub method: String,

    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Validates that this is a well-formed JSON-RPC 2.0 request.
    ///
    /// Returns an error message if validation fails.
    #[must_use]
    pub fn validate(&self) -> Option<&'static str> {
        if self.jsonrpc != "2.0" {
            return Some("jsonrpc field must be \"2.0\"");
        }
        if self.method.is_empty() {
            return Some("method field cannot be empty");
        }
        None
    }
}

/// A JSON-RPC 2.0 notification message (incoming).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// The notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(default)]
    pub params: Option<Value>,
}

/// An outgoing JSON-RPC 2.0 notification (server to client).
///
/// Pushed over the SSE channel to connected clients.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingNotification {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl OutgoingNotification {
    /// Creates a new outgoing notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// A successful JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this response corresponds to.
    pub id: RequestId,

    /// The result of the method call.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a new success response.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// JSON-RPC 2.0 error codes, standard plus MCP server extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
    /// Request was not authorised (reserved).
    Unauthorized,
    /// Rate limit exceeded (reserved).
    RateLimit,
    /// A referenced resource does not exist (reserved).
    ResourceNotFound,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::Unauthorized => -32000,
            Self::RateLimit => -32001,
            Self::ResourceNotFound => -32002,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::Unauthorized => "Unauthorized",
            Self::RateLimit => "Rate limit exceeded",
            Self::ResourceNotFound => "Resource not found",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Creates a new error from an error code.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.default_message().to_string(),
            data: None,
        }
    }

    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Adds additional data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A JSON-RPC 2.0 error response.
///
/// The `id` is serialised as `null` when the original request id could not
/// be recovered.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this error corresponds to, or `null` if unknown.
    pub id: Option<RequestId>,

    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates a new error response.
    #[must_use]
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error,
        }
    }

    /// Creates a parse error response (ID cannot be determined).
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(None, JsonRpcErrorData::from_code(ErrorCode::ParseError))
    }

    /// Creates an invalid request error response.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(id, JsonRpcErrorData::from_code(ErrorCode::InvalidRequest))
    }

    /// Creates a method not found error response.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// Creates an invalid params error response.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }

    /// Creates an internal error response with unknown id.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(
            None,
            JsonRpcErrorData::with_message(ErrorCode::InternalError, message),
        )
    }
}

/// Structural classification of one parsed JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Request: `jsonrpc == "2.0"` with both `method` and `id`.
    Request,
    /// Notification: `jsonrpc == "2.0"` with `method`, lacks `id`.
    Notification,
    /// Response: has `id` and either `result` or `error`.
    Response,
    /// Batch: a non-empty array.
    Batch,
    /// Anything else.
    Invalid,
}

/// Classifies a JSON value by message kind.
#[must_use]
pub fn classify(value: &Value) -> MessageKind {
    if let Some(items) = value.as_array() {
        return if items.is_empty() {
            MessageKind::Invalid
        } else {
            MessageKind::Batch
        };
    }

    let Some(obj) = value.as_object() else {
        return MessageKind::Invalid;
    };

    let has_method = obj.get("method").is_some_and(Value::is_string);
    let has_id = obj.contains_key("id");
    let version_ok = obj.get("jsonrpc").and_then(Value::as_str) == Some("2.0");

    if has_method {
        // Requests and notifications alike must carry the version marker.
        if !version_ok {
            MessageKind::Invalid
        } else if has_id {
            MessageKind::Request
        } else {
            MessageKind::Notification
        }
    } else if has_id && (obj.contains_key("result") || obj.contains_key("error")) {
        MessageKind::Response
    } else {
        MessageKind::Invalid
    }
}

/// An incoming message that could be either a request or notification.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A request expecting a response.
    Request(JsonRpcRequest),
    /// A notification (no response expected).
    Notification(JsonRpcNotification),
}

impl IncomingMessage {
    /// Returns the method name of this message.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Request(req) => &req.method,
            Self::Notification(notif) => &notif.method,
        }
    }

    /// Returns the request ID if this is a request.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Notification(_) => None,
        }
    }
}

/// Extracts a request id from a raw JSON value, if one is present and valid.
#[must_use]
pub fn extract_id(value: &Value) -> Option<RequestId> {
    value
        .get("id")
        .and_then(|id| serde_json::from_value(id.clone()).ok())
}

/// Parses one already-deserialised JSON value into an incoming message.
///
/// # Errors
///
/// Returns a `JsonRpcError` if the value is not a valid request or
/// notification.
pub fn parse_value(value: Value) -> Result<IncomingMessage, JsonRpcError> {
    match classify(&value) {
        MessageKind::Request => {
            let id = extract_id(&value);
            let request: JsonRpcRequest = serde_json::from_value(value)
                .map_err(|_| JsonRpcError::invalid_request(id))?;
            if request.validate().is_some() {
                return Err(JsonRpcError::invalid_request(Some(request.id)));
            }
            Ok(IncomingMessage::Request(request))
        }
        MessageKind::Notification => {
            let notification: JsonRpcNotification = serde_json::from_value(value)
                .map_err(|_| JsonRpcError::invalid_request(None))?;
            Ok(IncomingMessage::Notification(notification))
        }
        MessageKind::Response | MessageKind::Batch | MessageKind::Invalid => {
            Err(JsonRpcError::invalid_request(extract_id(&value)))
        }
    }
}

/// Parses a JSON string into a single incoming message.
///
/// Used by tests and single-message callers; the dispatch core parses to a
/// raw value first so batches can be handled.
///
/// # Errors
///
/// Returns a `JsonRpcError` if the JSON is malformed or not a valid message.
pub fn parse_message(json: &str) -> Result<IncomingMessage, JsonRpcError> {
    let value: Value = serde_json::from_str(json).map_err(|_| JsonRpcError::parse_error())?;
    parse_value(value)
}
