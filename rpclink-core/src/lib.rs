//! Core JSON-RPC 2.0 model for rpclink
//!
//! This crate is channel-agnostic. It defines what travels over a connection
//! and how failures are described, but not how bytes move:
//!
//! - **Types**: the four payload shapes, ids and params
//! - **Validate**: structural classification of decoded JSON into payloads
//! - **Codec**: strict parse/stringify with distinct parse and shape errors
//! - **Error**: standard error codes, the wire error object and its normalizer
//! - **Observability**: tracing subscriber and OpenTelemetry bootstrap
//!
//! The `rpclink-client` crate builds connections and the transport on top.
//!
//! # Example
//!
//! ```rust
//! use rpclink_core::{codec, Id, Params, Payload, Request};
//! use serde_json::json;
//!
//! let params = Params::from_serialize(json!({"a": 5, "b": 3})).unwrap();
//! let request = Request::new(Id::Number(1), "add", params);
//!
//! let json = codec::encode(&request.into()).unwrap();
//! match codec::decode(&json).unwrap() {
//!     Payload::Request(decoded) => assert_eq!(decoded.method, "add"),
//!     _ => unreachable!(),
//! }
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod types;
pub mod validate;

pub use error::{Error, ErrorCode, ErrorObject, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{
    ErrorResponse, Id, Notification, Params, Payload, Request, Response, ResultResponse,
    JSONRPC_VERSION,
};
