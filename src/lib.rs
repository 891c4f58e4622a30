//! rpclink - JSON-RPC 2.0 over HTTP, WebSocket and message channels
//!
//! This is the convenience crate that re-exports the rpclink sub-crates.
//!
//! # Architecture
//!
//! - **rpclink-core**: payload types, classification, error taxonomy, codec,
//!   observability bootstrap
//! - **rpclink-client**: connections and the request-correlating transport
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rpclink::Transport;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Transport::builder("http://localhost:8545")
//!         .with_timeout(Duration::from_secs(5))
//!         .build()?;
//!
//!     let result: serde_json::Value = transport
//!         .request("add", serde_json::json!({"a": 5, "b": 3}))
//!         .await?;
//!     println!("Result: {}", result);
//!
//!     Ok(())
//! }
//! ```

pub use rpclink_client as client;
pub use rpclink_core as core;

pub use rpclink_client::{Connection, Transport, TransportBuilder};
pub use rpclink_core::{Error, ErrorCode, ErrorObject, Payload, Result};
