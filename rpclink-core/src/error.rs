//! Error types for rpclink
//!
//! Two layers of error live here:
//!
//! - **ErrorObject**: the wire-format `{code, message, data}` body carried by
//!   an ErrorResponse, plus the normalizer that coerces arbitrary values into it
//! - **Error**: the crate-level error enum returned by every fallible operation
//!
//! # Standard Error Codes
//!
//! | Code     | Name                | Default message       |
//! |----------|---------------------|-----------------------|
//! | `-32700` | ParseError          | Parse error           |
//! | `-32600` | InvalidRequest      | Invalid Request       |
//! | `-32601` | MethodNotFound      | Method not found      |
//! | `-32602` | InvalidParams       | Invalid params        |
//! | `-32603` | InternalError       | Internal error        |
//! | `-32000` | CommunicationFailed | Communication failed  |
//!
//! # Examples
//!
//! ```rust
//! use rpclink_core::{Error, ErrorCode, ErrorObject};
//!
//! let error = ErrorObject::method_not_found();
//! assert_eq!(error.code, -32601);
//!
//! // Every crate error can be rendered as a wire error object
//! let timeout = Error::Timeout.to_error_object();
//! assert_eq!(timeout.code, ErrorCode::CommunicationFailed.code());
//! assert_eq!(timeout.message, "Request timeout");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result type for rpclink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Standard JSON-RPC error codes recognized by rpclink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Invalid JSON was received
    ParseError,
    /// The JSON is not a valid payload object
    InvalidRequest,
    /// The method does not exist or is not available
    MethodNotFound,
    /// Invalid method parameters
    InvalidParams,
    /// Internal JSON-RPC error
    InternalError,
    /// The underlying channel failed (open, send, HTTP call, timeout)
    CommunicationFailed,
}

impl ErrorCode {
    /// All standard codes, in table order
    pub const ALL: [ErrorCode; 6] = [
        ErrorCode::ParseError,
        ErrorCode::InvalidRequest,
        ErrorCode::MethodNotFound,
        ErrorCode::InvalidParams,
        ErrorCode::InternalError,
        ErrorCode::CommunicationFailed,
    ];

    /// Numeric wire value of the code
    pub fn code(self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::CommunicationFailed => -32000,
        }
    }

    /// Message used when an error object carries no message of its own
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid Request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
            ErrorCode::CommunicationFailed => "Communication failed",
        }
    }

    /// Look up a standard code by its numeric value
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

impl From<ErrorCode> for i64 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// JSON-RPC 2.0 error body
///
/// This is the exact wire shape found in the `error` member of an
/// ErrorResponse. Application errors may use any integer code; the standard
/// codes are available through [`ErrorCode`] and the named constructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Numeric error code
    pub code: i64,

    /// Short human-readable description
    pub message: String,

    /// Optional structured detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Create an error with an arbitrary code and message
    pub fn new(code: impl Into<i64>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }

    /// Create an error carrying additional data
    pub fn with_data(code: impl Into<i64>, message: impl Into<String>, data: Value) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: Some(data),
        }
    }

    /// Create a standard error, falling back to the code's default message
    pub fn standard(code: ErrorCode, message: Option<String>, data: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: message.unwrap_or_else(|| code.default_message().to_string()),
            data,
        }
    }

    /// Parse error (-32700)
    pub fn parse_error() -> Self {
        Self::standard(ErrorCode::ParseError, None, None)
    }

    /// Invalid Request (-32600) with a specific reason
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::standard(ErrorCode::InvalidRequest, Some(msg.into()), None)
    }

    /// Method not found (-32601)
    pub fn method_not_found() -> Self {
        Self::standard(ErrorCode::MethodNotFound, None, None)
    }

    /// Invalid params (-32602) with a specific reason
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::standard(ErrorCode::InvalidParams, Some(msg.into()), None)
    }

    /// Internal error (-32603) with a specific reason
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::standard(ErrorCode::InternalError, Some(msg.into()), None)
    }

    /// Communication failed (-32000)
    ///
    /// The channel-level message is kept both as the error message and in
    /// `data`, so callers matching on the default message can still find the
    /// underlying cause.
    pub fn communication_failed(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        Self::standard(
            ErrorCode::CommunicationFailed,
            Some(msg.clone()),
            Some(Value::String(msg)),
        )
    }

    /// The standard code this error uses, if any
    pub fn standard_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }

    /// Coerce an arbitrary JSON value into a well-formed error object
    ///
    /// - `null` (or any non-object, non-string value) becomes InternalError
    /// - a string becomes InternalError with that string as message
    /// - an object keeps an integer `code`, otherwise InternalError is used;
    ///   a missing `message` is filled from the standard table when the code
    ///   is standard; `data` is passed through unchanged
    pub fn normalize(value: &Value) -> Self {
        match value {
            Value::String(message) => {
                Self::standard(ErrorCode::InternalError, Some(message.clone()), None)
            }
            Value::Object(map) => {
                let code = map
                    .get("code")
                    .and_then(Value::as_i64)
                    .unwrap_or_else(|| ErrorCode::InternalError.code());
                let message = match map.get("message").and_then(Value::as_str) {
                    Some(message) => message.to_string(),
                    None => ErrorCode::from_code(code)
                        .unwrap_or(ErrorCode::InternalError)
                        .default_message()
                        .to_string(),
                };
                Self {
                    code,
                    message,
                    data: map.get("data").cloned(),
                }
            }
            _ => Self::standard(ErrorCode::InternalError, None, None),
        }
    }
}

impl std::fmt::Display for ErrorObject {
    /// Formats as "[code] message"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorObject {}

impl From<&str> for ErrorObject {
    fn from(message: &str) -> Self {
        Self::internal_error(message)
    }
}

impl From<String> for ErrorObject {
    fn from(message: String) -> Self {
        Self::internal_error(message)
    }
}

impl From<ErrorCode> for ErrorObject {
    fn from(code: ErrorCode) -> Self {
        Self::standard(code, None, None)
    }
}

impl From<Error> for ErrorObject {
    fn from(error: Error) -> Self {
        error.to_error_object()
    }
}

/// Crate-level error type
///
/// # Error Categories
///
/// - **Protocol**: `Rpc` (already a wire error, local or remote), `Serialization`
/// - **Channel**: `WebSocket`, `Http`, `NotConnected`, `ConnectionClosed`
/// - **Construction**: `InvalidUrl`
/// - **Operational**: `Timeout`, `Internal`
///
/// Every variant can be rendered as an [`ErrorObject`]; channel failures map
/// to CommunicationFailed so no raw transport error needs to leak further.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// JSON-RPC error object, either received from the peer or synthesized
    #[error("JSON-RPC error: {0}")]
    Rpc(#[from] ErrorObject),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// WebSocket channel error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// HTTP channel error
    #[error("HTTP error: {0}")]
    Http(String),

    /// URL cannot be served by the requested connection kind
    #[error("{0}")]
    InvalidUrl(String),

    /// The connection has no open channel
    #[error("Connection is not open")]
    NotConnected,

    /// The connection was closed while the operation was outstanding
    #[error("Connection closed")]
    ConnectionClosed,

    /// No response arrived within the configured timeout
    #[error("Request timeout")]
    Timeout,

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Render this error as a wire error object
    pub fn to_error_object(&self) -> ErrorObject {
        match self {
            Error::Rpc(error) => error.clone(),
            Error::Serialization(msg) => ErrorObject::standard(
                ErrorCode::ParseError,
                None,
                Some(Value::String(msg.clone())),
            ),
            Error::WebSocket(msg) | Error::Http(msg) => ErrorObject::communication_failed(msg.clone()),
            Error::InvalidUrl(msg) => ErrorObject::communication_failed(msg.clone()),
            Error::NotConnected | Error::ConnectionClosed | Error::Timeout => {
                ErrorObject::communication_failed(self.to_string())
            }
            Error::Internal(msg) => ErrorObject::internal_error(msg.clone()),
        }
    }

    /// Numeric code of [`Error::to_error_object`]
    pub fn code(&self) -> i64 {
        match self {
            Error::Rpc(error) => error.code,
            other => other.to_error_object().code,
        }
    }

    /// Convert into the `Rpc` variant, keeping `Timeout` distinguishable
    ///
    /// Used at the transport boundary: whatever the channel reported, the
    /// caller receives something exposing `code`, `message` and `data`.
    pub fn into_rpc(self) -> Self {
        match self {
            Error::Rpc(_) | Error::Timeout => self,
            other => Error::Rpc(other.to_error_object()),
        }
    }

    /// The wire error object, if this error already is one
    pub fn as_rpc(&self) -> Option<&ErrorObject> {
        match self {
            Error::Rpc(error) => Some(error),
            _ => None,
        }
    }
}
