//! JSON-RPC 2.0 transport over interchangeable connections
//!
//! This crate moves JSON-RPC payloads over one of several channels and
//! correlates responses with the requests that caused them.
//!
//! # Core Features
//!
//! - **Connections**: HTTP POST, WebSocket, and host-supplied message channels
//!   behind one [`Connection`] trait; pick one by URL scheme with
//!   [`connection::from_url`] or build it directly
//! - **Request-Response**: `request` awaits the matching response by id, with
//!   an optional timeout
//! - **Both directions**: inbound requests can be answered with `resolve` /
//!   `reject`; inbound notifications reach subscribers and handlers
//! - **Auto-Reconnection**: configurable strategy after an unsolicited close
//! - **Observability**: `tracing` everywhere, OpenTelemetry metrics on demand
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rpclink_client::Transport;
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Transport::new("ws://localhost:8080")?;
//!
//!     let result: Value = transport.request("ping", ()).await?;
//!     println!("Result: {}", result);
//!
//!     transport.on_notification("tick", |n| async move {
//!         println!("Tick: {:?}", n.params);
//!     }).await;
//!
//!     transport.notify("hello", json!({"from": "client"})).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Answering the Peer
//!
//! Over a bidirectional channel the peer may call us too:
//!
//! ```rust,no_run
//! use rpclink_client::Transport;
//! use rpclink_core::ErrorObject;
//! use serde_json::json;
//!
//! # fn example(transport: Transport) {
//! transport.serve_requests(|request| async move {
//!     match request.method.as_str() {
//!         "version" => Ok(json!("1.0.0")),
//!         _ => Err(ErrorObject::method_not_found()),
//!     }
//! });
//! # }
//! ```

mod builder;
pub mod connection;
mod connection_state;
mod events;
mod metrics;
mod notification;
mod reconnect;
mod request;
mod transport;

pub use builder::TransportBuilder;
pub use connection::{
    from_url, Capabilities, Connection, ConnectionEvent, ConnectionOptions, Context,
    HttpConnection, MessageChannelConnection, WebSocketConnection,
};
pub use connection_state::{ConnectionManager, ConnectionState};
pub use events::{EventHub, Subscription, SubscriptionId};
pub use metrics::TransportMetrics;
pub use notification::NotificationHandler;
pub use reconnect::{ExponentialBackoff, FixedDelay, NoReconnect, ReconnectionStrategy};
pub use request::RequestManager;
pub use transport::{Transport, TransportEvent, TransportOptions};
