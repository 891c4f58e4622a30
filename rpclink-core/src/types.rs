//! JSON-RPC 2.0 payload model
//!
//! Every message exchanged by rpclink is one of four shapes:
//!
//! 1. **Request**: a call that expects a response, correlated by `id`
//! 2. **Notification**: a call without `id`; no response is possible
//! 3. **ResultResponse**: the successful outcome of a request
//! 4. **ErrorResponse**: the failed outcome of a request
//!
//! The shapes carry no tag field on the wire. [`Payload`] serializes each
//! variant untagged and deserializes through [`crate::validate::classify`],
//! so a value is assigned its variant exactly once, at the boundary.
//!
//! # Request IDs
//!
//! Ids generated locally are always numbers drawn from a per-transport
//! counter. Ids received from a peer may be strings, numbers or null and are
//! echoed back unchanged by `resolve`/`reject`.

use crate::error::{Error, ErrorObject, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Protocol version string carried by every payload
pub const JSONRPC_VERSION: &str = "2.0";

fn version() -> String {
    JSONRPC_VERSION.to_string()
}

/// JSON-RPC 2.0 request ID
///
/// Serialized untagged, so `Id::Number(7)` is the bare JSON number `7`.
///
/// # Examples
///
/// ```rust
/// use rpclink_core::Id;
///
/// let id1: Id = "req-123".into();
/// let id2: Id = 42i64.into();
///
/// assert_eq!(id1.to_string(), "\"req-123\"");
/// assert_eq!(id2.to_string(), "42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// String identifier
    String(String),
    /// Numeric identifier, used for every locally generated id
    Number(i64),
    /// Null identifier, used when the original id could not be determined
    Null,
}

impl Id {
    /// Read an id out of a raw JSON value
    ///
    /// Floats and structured values are not valid ids and yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Id::String(s.clone())),
            Value::Number(n) => n.as_i64().map(Id::Number),
            Value::Null => Some(Id::Null),
            _ => None,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => write!(f, "\"{}\"", s),
            Id::Number(n) => write!(f, "{}", n),
            Id::Null => write!(f, "null"),
        }
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::String(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_string())
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n)
    }
}

impl From<u64> for Id {
    /// Values above `i64::MAX` wrap; the transport counter never gets there.
    fn from(n: u64) -> Self {
        Id::Number(n as i64)
    }
}

/// Call parameters: a positional list or a keyed mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    /// Positional parameters
    Array(Vec<Value>),
    /// Named parameters
    Object(Map<String, Value>),
}

impl Params {
    /// Convert a raw JSON value into optional params
    ///
    /// `null` means "no params". Any other scalar cannot be sent as params
    /// and is rejected with InvalidParams.
    pub fn from_value(value: Value) -> Result<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::Array(items) => Ok(Some(Params::Array(items))),
            Value::Object(map) => Ok(Some(Params::Object(map))),
            other => Err(Error::Rpc(ErrorObject::invalid_params(format!(
                "params must be an array or an object, got {}",
                other
            )))),
        }
    }

    /// Serialize any value and convert it into optional params
    ///
    /// `()` and `None` both serialize to `null` and produce no params.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rpclink_core::Params;
    /// use serde_json::json;
    ///
    /// assert!(Params::from_serialize(()).unwrap().is_none());
    /// assert!(matches!(Params::from_serialize([1, 2]).unwrap(), Some(Params::Array(_))));
    /// assert!(Params::from_serialize(json!({"a": 1})).unwrap().is_some());
    /// assert!(Params::from_serialize(5).is_err());
    /// ```
    pub fn from_serialize<T: Serialize>(params: T) -> Result<Option<Self>> {
        let value =
            serde_json::to_value(params).map_err(|e| Error::Serialization(e.to_string()))?;
        Self::from_value(value)
    }

    /// The params as a plain JSON value
    pub fn into_value(self) -> Value {
        match self {
            Params::Array(items) => Value::Array(items),
            Params::Object(map) => Value::Object(map),
        }
    }
}

impl From<Vec<Value>> for Params {
    fn from(items: Vec<Value>) -> Self {
        Params::Array(items)
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Params::Object(map)
    }
}

/// JSON-RPC 2.0 request
///
/// # Examples
///
/// ```rust
/// use rpclink_core::{Id, Request};
///
/// let request = Request::new(Id::Number(1), "ping", None);
/// assert_eq!(request.jsonrpc, "2.0");
/// assert_eq!(request.method, "ping");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Correlation id
    pub id: Id,
    /// Name of the remote method
    pub method: String,
    /// Optional parameters, omitted from the wire when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
}

impl Request {
    pub fn new(id: Id, method: impl Into<String>, params: Option<Params>) -> Self {
        Self {
            jsonrpc: version(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 notification
///
/// Same shape as [`Request`] without `id`. The peer must not answer it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Name of the method or event
    pub method: String,
    /// Optional parameters, omitted from the wire when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Params>) -> Self {
        Self {
            jsonrpc: version(),
            method: method.into(),
            params,
        }
    }
}

/// Successful response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultResponse {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Id of the request being answered
    pub id: Id,
    /// Result value; `null` is a valid result
    pub result: Value,
}

impl ResultResponse {
    pub fn new(id: Id, result: Value) -> Self {
        Self {
            jsonrpc: version(),
            id,
            result,
        }
    }
}

/// Failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Id of the request being answered, `Id::Null` if it was unreadable
    pub id: Id,
    /// Error body
    pub error: ErrorObject,
}

impl ErrorResponse {
    pub fn new(id: Id, error: ErrorObject) -> Self {
        Self {
            jsonrpc: version(),
            id,
            error,
        }
    }
}

/// Either kind of response, as delivered to a waiting caller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Result(ResultResponse),
    Error(ErrorResponse),
}

impl Response {
    /// Id of the request this response answers
    pub fn id(&self) -> &Id {
        match self {
            Response::Result(r) => &r.id,
            Response::Error(e) => &e.id,
        }
    }

    /// Check if the response carries a result
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Result(_))
    }

    /// Check if the response carries an error
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    /// Collapse into the result value or the remote error object
    pub fn into_result(self) -> std::result::Result<Value, ErrorObject> {
        match self {
            Response::Result(r) => Ok(r.result),
            Response::Error(e) => Err(e.error),
        }
    }
}

impl From<ResultResponse> for Response {
    fn from(response: ResultResponse) -> Self {
        Response::Result(response)
    }
}

impl From<ErrorResponse> for Response {
    fn from(response: ErrorResponse) -> Self {
        Response::Error(response)
    }
}

/// Any JSON-RPC 2.0 payload
///
/// Deserializing goes through structural classification: the order of the
/// checks is fixed and documented on [`crate::validate::classify`].
///
/// # Examples
///
/// ```rust
/// use rpclink_core::Payload;
///
/// let payload: Payload =
///     serde_json::from_str(r#"{"jsonrpc":"2.0","method":"tick","params":[1]}"#).unwrap();
/// assert!(payload.is_notification());
/// assert_eq!(payload.method(), Some("tick"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Request(Request),
    Notification(Notification),
    Result(ResultResponse),
    Error(ErrorResponse),
}

impl Payload {
    /// Id of the payload, `None` for notifications
    pub fn id(&self) -> Option<&Id> {
        match self {
            Payload::Request(r) => Some(&r.id),
            Payload::Notification(_) => None,
            Payload::Result(r) => Some(&r.id),
            Payload::Error(e) => Some(&e.id),
        }
    }

    /// Method name for requests and notifications
    pub fn method(&self) -> Option<&str> {
        match self {
            Payload::Request(r) => Some(&r.method),
            Payload::Notification(n) => Some(&n.method),
            _ => None,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, Payload::Request(_))
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, Payload::Notification(_))
    }

    /// True for both response shapes
    pub fn is_response(&self) -> bool {
        matches!(self, Payload::Result(_) | Payload::Error(_))
    }

    /// Split a response payload off from calls
    pub fn into_response(self) -> std::result::Result<Response, Payload> {
        match self {
            Payload::Result(r) => Ok(Response::Result(r)),
            Payload::Error(e) => Ok(Response::Error(e)),
            other => Err(other),
        }
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        crate::validate::classify(value).map_err(D::Error::custom)
    }
}

impl From<Request> for Payload {
    fn from(request: Request) -> Self {
        Payload::Request(request)
    }
}

impl From<Notification> for Payload {
    fn from(notification: Notification) -> Self {
        Payload::Notification(notification)
    }
}

impl From<ResultResponse> for Payload {
    fn from(response: ResultResponse) -> Self {
        Payload::Result(response)
    }
}

impl From<ErrorResponse> for Payload {
    fn from(response: ErrorResponse) -> Self {
        Payload::Error(response)
    }
}

impl From<Response> for Payload {
    fn from(response: Response) -> Self {
        match response {
            Response::Result(r) => Payload::Result(r),
            Response::Error(e) => Payload::Error(e),
        }
    }
}
