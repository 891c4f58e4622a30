//! Structural classification of decoded JSON values
//!
//! Payloads have no tag field; their kind is decided by which members are
//! present. The checks run in a fixed order:
//!
//! 1. not an object with `"jsonrpc": "2.0"`: InvalidRequest
//! 2. `id` and `method`: Request
//! 3. `method` without `id`: Notification
//! 4. `result`: ResultResponse
//! 5. `error`: ErrorResponse
//! 6. anything else: InvalidRequest
//!
//! Presence is what counts, so `"result": null` is still a ResultResponse.

use crate::error::{Error, ErrorObject, Result};
use crate::types::{
    ErrorResponse, Id, Notification, Params, Payload, Request, ResultResponse, JSONRPC_VERSION,
};
use serde_json::{Map, Value};

/// Object carrying `"jsonrpc": "2.0"`
pub fn is_payload(value: &Value) -> bool {
    value
        .get("jsonrpc")
        .and_then(Value::as_str)
        .map_or(false, |v| v == JSONRPC_VERSION)
}

pub fn is_request(value: &Value) -> bool {
    is_payload(value) && has(value, "id") && has(value, "method")
}

pub fn is_notification(value: &Value) -> bool {
    is_payload(value) && !has(value, "id") && has(value, "method")
}

pub fn is_result(value: &Value) -> bool {
    is_payload(value) && has(value, "result")
}

pub fn is_error(value: &Value) -> bool {
    is_payload(value) && has(value, "error")
}

pub fn is_response(value: &Value) -> bool {
    is_result(value) || is_error(value)
}

fn has(value: &Value, key: &str) -> bool {
    value.as_object().map_or(false, |map| map.contains_key(key))
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::Rpc(ErrorObject::invalid_request(msg))
}

/// Classify a decoded value into one of the four payload shapes
///
/// The error body of an ErrorResponse is normalized, so a peer sending an
/// invalid code still produces a well-formed [`ErrorObject`].
///
/// # Examples
///
/// ```rust
/// use rpclink_core::{validate, Payload};
/// use serde_json::json;
///
/// let payload = validate::classify(json!({"jsonrpc": "2.0", "id": 1, "error": "boom"})).unwrap();
/// match payload {
///     Payload::Error(e) => assert_eq!(e.error.code, -32603),
///     _ => unreachable!(),
/// }
///
/// assert!(validate::classify(json!([1, 2])).is_err());
/// ```
pub fn classify(value: Value) -> Result<Payload> {
    if value.is_array() {
        return Err(invalid("Batch payloads are not supported"));
    }
    if !is_payload(&value) {
        return Err(invalid("Not a JSON-RPC 2.0 payload"));
    }
    let Value::Object(mut map) = value else {
        return Err(invalid("Payload must be an object"));
    };

    let has_id = map.contains_key("id");
    if map.contains_key("method") {
        let method = take_method(&mut map)?;
        let params = take_params(&mut map)?;
        return Ok(if has_id {
            Payload::Request(Request::new(take_id(&mut map)?, method, params))
        } else {
            Payload::Notification(Notification::new(method, params))
        });
    }

    if let Some(result) = map.remove("result") {
        return Ok(Payload::Result(ResultResponse::new(
            take_response_id(&mut map),
            result,
        )));
    }

    if let Some(error) = map.remove("error") {
        return Ok(Payload::Error(ErrorResponse::new(
            take_response_id(&mut map),
            ErrorObject::normalize(&error),
        )));
    }

    Err(invalid("Payload is neither a call nor a response"))
}

fn take_method(map: &mut Map<String, Value>) -> Result<String> {
    match map.remove("method") {
        Some(Value::String(method)) => Ok(method),
        _ => Err(invalid("method must be a string")),
    }
}

fn take_params(map: &mut Map<String, Value>) -> Result<Option<Params>> {
    match map.remove("params") {
        None => Ok(None),
        Some(value) => Params::from_value(value),
    }
}

fn take_id(map: &mut Map<String, Value>) -> Result<Id> {
    let value = map.remove("id").unwrap_or(Value::Null);
    Id::from_value(&value).ok_or_else(|| invalid(format!("invalid id {}", value)))
}

// Responses with an unreadable id still classify; they just cannot be
// correlated and end up dropped by the waiter table.
fn take_response_id(map: &mut Map<String, Value>) -> Id {
    map.remove("id")
        .as_ref()
        .and_then(Id::from_value)
        .unwrap_or(Id::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_payload() {
        assert!(is_payload(&json!({"jsonrpc": "2.0"})));
        assert!(!is_payload(&json!({"jsonrpc": "1.0"})));
        assert!(!is_payload(&json!({"method": "x"})));
        assert!(!is_payload(&json!("2.0")));
        assert!(!is_payload(&Value::Null));
    }

    #[test]
    fn test_predicates() {
        let request = json!({"jsonrpc": "2.0", "id": 1, "method": "m"});
        let notification = json!({"jsonrpc": "2.0", "method": "m"});
        let result = json!({"jsonrpc": "2.0", "id": 1, "result": null});
        let error = json!({"jsonrpc": "2.0", "id": 1, "error": {"code": 1, "message": "x"}});

        assert!(is_request(&request));
        assert!(!is_notification(&request));
        assert!(is_notification(&notification));
        assert!(!is_request(&notification));
        assert!(is_result(&result) && is_response(&result));
        assert!(is_error(&error) && is_response(&error));
        assert!(!is_response(&request));
    }

    #[test]
    fn test_classify_request() {
        let payload =
            classify(json!({"jsonrpc": "2.0", "id": "a", "method": "sum", "params": [1, 2]}))
                .unwrap();
        match payload {
            Payload::Request(r) => {
                assert_eq!(r.id, Id::String("a".into()));
                assert_eq!(r.method, "sum");
                assert_eq!(r.params, Some(Params::Array(vec![json!(1), json!(2)])));
            }
            other => panic!("Expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_notification() {
        let payload = classify(json!({"jsonrpc": "2.0", "method": "tick", "params": [1]})).unwrap();
        assert_eq!(
            payload,
            Payload::Notification(Notification::new(
                "tick",
                Some(Params::Array(vec![json!(1)]))
            ))
        );
    }

    #[test]
    fn test_method_wins_over_result() {
        let payload =
            classify(json!({"jsonrpc": "2.0", "id": 1, "method": "m", "result": 1})).unwrap();
        assert!(payload.is_request());
    }

    #[test]
    fn test_classify_null_result() {
        let payload = classify(json!({"jsonrpc": "2.0", "id": 9, "result": null})).unwrap();
        assert_eq!(payload, Payload::Result(ResultResponse::new(Id::Number(9), Value::Null)));
    }

    #[test]
    fn test_classify_error_is_normalized() {
        let payload =
            classify(json!({"jsonrpc": "2.0", "id": 2, "error": {"code": "bad"}})).unwrap();
        match payload {
            Payload::Error(e) => {
                assert_eq!(e.id, Id::Number(2));
                assert_eq!(e.error.code, -32603);
                assert_eq!(e.error.message, "Internal error");
            }
            other => panic!("Expected error response, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_response_without_id() {
        let payload = classify(json!({"jsonrpc": "2.0", "result": 1})).unwrap();
        assert_eq!(payload.id(), Some(&Id::Null));
    }

    #[test]
    fn test_classify_rejects() {
        let cases = [
            json!([{"jsonrpc": "2.0", "method": "m"}]),
            json!({"jsonrpc": "2.0"}),
            json!({"jsonrpc": "2.0", "method": 5}),
            json!({"jsonrpc": "2.0", "method": "m", "params": "scalar"}),
            json!({"jsonrpc": "2.0", "id": {"x": 1}, "method": "m"}),
            json!({"id": 1, "result": 1}),
        ];

        for case in cases {
            let err = classify(case.clone()).unwrap_err();
            assert!(
                err.code() == -32600 || err.code() == -32602,
                "unexpected code {} for {}",
                err.code(),
                case
            );
        }
    }
}
