//! Connections: one physical channel each
//!
//! A [`Connection`] owns exactly one channel (an HTTP client, a WebSocket, or
//! a pair of message-port callbacks) and turns it into a stream of
//! [`ConnectionEvent`]s plus an async `send`.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected → Connecting → Connected → Disconnected
//! ```
//!
//! - `is_connected` is derived from the presence of the channel handle,
//!   never tracked as a separate flag
//! - `open` while already connecting joins the in-flight attempt
//! - `close` while disconnected is a no-op
//! - `Close` is emitted exactly once per successful open
//!
//! # Variants
//!
//! | Variant                 | URL schemes     | Handshake | Server push |
//! |-------------------------|-----------------|-----------|-------------|
//! | [`HttpConnection`]      | `http`, `https` | none      | no          |
//! | [`WebSocketConnection`] | `ws`, `wss`     | yes       | yes         |
//! | [`MessageChannelConnection`] | n/a        | none      | yes         |
//!
//! HTTP has no return channel, so it never delivers notifications the peer
//! did not answer a request with. [`Capabilities::server_push`] makes that
//! visible to callers.

mod http;
mod message_channel;
mod websocket;

pub use http::HttpConnection;
pub use message_channel::{
    AddMessageListener, Disposer, MessageChannelConnection, MessageListener, PostMessage,
};
pub use websocket::WebSocketConnection;

use crate::connection_state::ConnectionState;
use crate::events::{Subscription, SubscriptionId};
use async_trait::async_trait;
use rpclink_core::{Error, Payload, Result};
use std::sync::Arc;
use std::time::Duration;

/// Channel-specific metadata passed along with a send
///
/// The built-in connections ignore it; custom connections may use it for
/// routing hints or per-message headers.
pub type Context = serde_json::Value;

/// Default HTTP request timeout
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default message-channel topic
pub const DEFAULT_TOPIC: &str = "rpclink";

/// Events emitted by a connection
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The channel became usable
    Open,
    /// The channel went away, locally or remotely
    Close,
    /// A classified payload arrived
    Payload(Payload),
    /// A channel-level failure that is not tied to a pending request
    Error(String),
}

/// What a connection variant can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// The peer can send payloads that are not replies to our requests
    pub server_push: bool,
}

/// Options shared by the connection constructors
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// HTTP request timeout
    pub http_timeout: Duration,
    /// Extra HTTP headers sent with every POST
    pub headers: Vec<(String, String)>,
    /// Envelope topic for message channels
    pub topic: String,
    /// Log every sent and received message at info instead of debug
    pub log_traffic: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            headers: Vec::new(),
            topic: DEFAULT_TOPIC.to_string(),
            log_traffic: false,
        }
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_log_traffic(mut self, enabled: bool) -> Self {
        self.log_traffic = enabled;
        self
    }
}

/// One physical channel carrying JSON-RPC payloads
#[async_trait]
pub trait Connection: Send + Sync {
    /// Short variant name used in logs ("http", "websocket", "message-channel")
    fn kind(&self) -> &'static str;

    fn is_connected(&self) -> bool;

    fn is_connecting(&self) -> bool;

    /// Lifecycle state derived from the two flags above
    fn state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else if self.is_connecting() {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        }
    }

    fn capabilities(&self) -> Capabilities;

    /// Open the channel; concurrent callers share one attempt
    async fn open(&self) -> Result<()>;

    /// Tear the channel down; a no-op when already disconnected
    async fn close(&self) -> Result<()>;

    /// Serialize and write a payload
    async fn send(&self, payload: &Payload, context: Option<&Context>) -> Result<()>;

    /// Receive this connection's events
    fn subscribe(&self) -> Subscription<ConnectionEvent>;

    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Scheme check for `http:`/`https:` URLs
pub fn is_http_url(url: &str) -> bool {
    has_scheme(url, "http") || has_scheme(url, "https")
}

/// Scheme check for `ws:`/`wss:` URLs
pub fn is_websocket_url(url: &str) -> bool {
    has_scheme(url, "ws") || has_scheme(url, "wss")
}

fn has_scheme(url: &str, scheme: &str) -> bool {
    url.as_bytes().get(scheme.len()) == Some(&b':')
        && url
            .get(..scheme.len())
            .map_or(false, |prefix| prefix.eq_ignore_ascii_case(scheme))
}

/// Build the connection matching the URL scheme
///
/// # Examples
///
/// ```rust
/// use rpclink_client::connection::{from_url, ConnectionOptions};
///
/// let http = from_url("https://rpc.example.org", &ConnectionOptions::default()).unwrap();
/// assert_eq!(http.kind(), "http");
/// assert!(!http.capabilities().server_push);
///
/// let err = from_url("ftp://example.org", &ConnectionOptions::default()).err().unwrap();
/// assert!(err.to_string().contains("ftp://example.org"));
/// ```
pub fn from_url(url: &str, options: &ConnectionOptions) -> Result<Arc<dyn Connection>> {
    if is_http_url(url) {
        Ok(Arc::new(HttpConnection::new(url, options.clone())?))
    } else if is_websocket_url(url) {
        Ok(Arc::new(WebSocketConnection::new(url, options.clone())?))
    } else {
        Err(Error::InvalidUrl(format!(
            "Url is not compatible with any connection: {}",
            url
        )))
    }
}

/// Identity of a shared connection, independent of the vtable
pub(crate) fn same_connection(a: &Arc<dyn Connection>, b: &Arc<dyn Connection>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Log one message crossing the channel
pub(crate) fn log_traffic(options: &ConnectionOptions, kind: &str, direction: &str, text: &str) {
    if options.log_traffic {
        tracing::info!(connection = kind, "{}: {}", direction, text);
    } else {
        tracing::debug!(connection = kind, "{}: {}", direction, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_detection() {
        assert!(is_http_url("http://localhost:8545"));
        assert!(is_http_url("HTTPS://node.example"));
        assert!(!is_http_url("httpx://node"));
        assert!(!is_http_url("ws://node"));

        assert!(is_websocket_url("ws://localhost:9000"));
        assert!(is_websocket_url("wss://node.example"));
        assert!(!is_websocket_url("wsx://node"));
        assert!(!is_websocket_url("http://node"));
        assert!(!is_websocket_url("ws"));
    }

    #[test]
    fn test_from_url_routes_by_scheme() {
        let options = ConnectionOptions::default();

        let http = from_url("http://localhost:1", &options).unwrap();
        assert_eq!(http.kind(), "http");
        assert_eq!(http.state(), ConnectionState::Disconnected);

        let ws = from_url("wss://localhost:1", &options).unwrap();
        assert_eq!(ws.kind(), "websocket");
        assert!(ws.capabilities().server_push);
    }

    #[test]
    fn test_from_url_rejects_unknown_scheme() {
        let err = from_url("tcp://localhost:1", &ConnectionOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidUrl(ref msg) if msg.contains("tcp://localhost:1")));
    }

    #[test]
    fn test_same_connection() {
        let options = ConnectionOptions::default();
        let a = from_url("http://localhost:1", &options).unwrap();
        let b = from_url("http://localhost:1", &options).unwrap();
        assert!(same_connection(&a, &Arc::clone(&a)));
        assert!(!same_connection(&a, &b));
    }

    #[test]
    fn test_options_builder() {
        let options = ConnectionOptions::new()
            .with_http_timeout(Duration::from_secs(5))
            .with_header("Authorization", "Bearer t")
            .with_topic("wallet")
            .with_log_traffic(true);

        assert_eq!(options.http_timeout, Duration::from_secs(5));
        assert_eq!(options.headers.len(), 1);
        assert_eq!(options.topic, "wallet");
        assert!(options.log_traffic);
    }
}
