//! Strict JSON codec for payloads
//!
//! Every connection variant reads and writes through these functions, so
//! "received garbage" and "received valid JSON of the wrong shape" surface as
//! different errors:
//!
//! - invalid JSON: `-32700` (Parse error)
//! - valid JSON that is not a payload: `-32600` (Invalid Request)
//! - a value that cannot be serialized: `Error::Serialization`
//!
//! # Examples
//!
//! ```rust
//! use rpclink_core::{codec, Id, Request};
//!
//! let request = Request::new(Id::Number(1), "ping", None);
//! let json = codec::encode(&request.into()).unwrap();
//!
//! let decoded = codec::decode(&json).unwrap();
//! assert!(decoded.is_request());
//!
//! assert_eq!(codec::decode("{oops").unwrap_err().code(), -32700);
//! ```

use crate::error::{Error, ErrorObject, Result};
use crate::types::Payload;
use crate::validate;
use serde::Serialize;
use serde_json::Value;

/// Serialize any value to a JSON string
pub fn stringify<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Serialization(e.to_string()))
}

/// Parse a JSON string, failing with a ParseError object
pub fn parse(data: &str) -> Result<Value> {
    serde_json::from_str(data).map_err(|e| {
        Error::Rpc(ErrorObject::standard(
            crate::error::ErrorCode::ParseError,
            None,
            Some(Value::String(e.to_string())),
        ))
    })
}

/// Parse a JSON string, returning `default` when it is not valid JSON
pub fn parse_or(data: &str, default: Value) -> Value {
    serde_json::from_str(data).unwrap_or(default)
}

/// Parse and classify a payload
pub fn decode(data: &str) -> Result<Payload> {
    validate::classify(parse(data)?)
}

/// Serialize a payload
pub fn encode(payload: &Payload) -> Result<String> {
    stringify(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Id, Notification, Params};
    use serde_json::json;

    #[test]
    fn test_parse_error_code() {
        let err = parse("not json").unwrap_err();
        assert_eq!(err.code(), -32700);
        assert_eq!(err.to_error_object().message, "Parse error");
    }

    #[test]
    fn test_parse_or_default() {
        assert_eq!(parse_or("nope", Value::Null), Value::Null);
        assert_eq!(parse_or("[1]", Value::Null), json!([1]));
    }

    #[test]
    fn test_decode_wrong_shape_is_invalid_request() {
        let err = decode(r#"{"hello":"world"}"#).unwrap_err();
        assert_eq!(err.code(), -32600);
    }

    #[test]
    fn test_encode_notification() {
        let payload: Payload =
            Notification::new("tick", Some(Params::Array(vec![json!(1)]))).into();
        let json = encode(&payload).unwrap();
        assert_eq!(
            parse(&json).unwrap(),
            json!({"jsonrpc": "2.0", "method": "tick", "params": [1]})
        );
    }

    #[test]
    fn test_decode_keeps_string_id() {
        let payload = decode(r#"{"jsonrpc":"2.0","id":"abc","result":true}"#).unwrap();
        assert_eq!(payload.id(), Some(&Id::String("abc".into())));
    }
}
