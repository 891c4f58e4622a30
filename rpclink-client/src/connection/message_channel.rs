//! Message-channel connection
//!
//! For embedding hosts that hand over a "post a string" function and a "listen
//! for strings" function instead of a socket: cross-frame messaging, worker
//! ports, in-process bridges. There is no handshake, so `open` registers the
//! listener and is connected immediately; `close` runs the disposer returned
//! by the registration.
//!
//! Messages are wrapped in a `{"topic", "payload"}` envelope so several
//! logical channels can share one physical port. Inbound messages with a
//! different topic, or whose payload does not classify, are ignored.

use super::{log_traffic, Capabilities, Connection, ConnectionEvent, ConnectionOptions, Context};
use crate::events::{EventHub, Subscription, SubscriptionId};
use async_trait::async_trait;
use rpclink_core::{codec, validate, Error, Payload, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

const KIND: &str = "message-channel";

/// Sends one serialized message to the peer
pub type PostMessage = Arc<dyn Fn(String) -> Result<()> + Send + Sync>;

/// Receives one serialized message from the peer
pub type MessageListener = Arc<dyn Fn(String) + Send + Sync>;

/// Undoes a listener registration
pub type Disposer = Box<dyn FnOnce() + Send>;

/// Registers a listener, optionally returning its disposer
pub type AddMessageListener = Arc<dyn Fn(MessageListener) -> Option<Disposer> + Send + Sync>;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    topic: String,
    payload: Value,
}

/// JSON-RPC over caller-supplied message primitives
#[derive(Clone)]
pub struct MessageChannelConnection {
    inner: Arc<ChannelInner>,
}

struct Registration {
    disposer: Option<Disposer>,
}

struct ChannelInner {
    post: PostMessage,
    add_listener: AddMessageListener,
    options: ConnectionOptions,
    events: EventHub<ConnectionEvent>,
    registration: Mutex<Option<Registration>>,
}

impl MessageChannelConnection {
    pub fn new(
        post: PostMessage,
        add_listener: AddMessageListener,
        options: ConnectionOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                post,
                add_listener,
                options,
                events: EventHub::new(),
                registration: Mutex::new(None),
            }),
        }
    }

    /// Build from plain closures
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rpclink_client::{Connection, ConnectionOptions, MessageChannelConnection};
    ///
    /// let conn = MessageChannelConnection::from_fns(
    ///     |message| {
    ///         println!("to peer: {}", message);
    ///         Ok(())
    ///     },
    ///     |_listener| None,
    ///     ConnectionOptions::default().with_topic("wallet"),
    /// );
    /// assert_eq!(conn.topic(), "wallet");
    /// assert!(!conn.is_connected());
    /// ```
    pub fn from_fns<P, L>(post: P, add_listener: L, options: ConnectionOptions) -> Self
    where
        P: Fn(String) -> Result<()> + Send + Sync + 'static,
        L: Fn(MessageListener) -> Option<Disposer> + Send + Sync + 'static,
    {
        Self::new(Arc::new(post), Arc::new(add_listener), options)
    }

    pub fn topic(&self) -> &str {
        &self.inner.options.topic
    }
}

impl ChannelInner {
    fn registration(&self) -> MutexGuard<'_, Option<Registration>> {
        self.registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn on_message(&self, message: &str) {
        // Listeners may outlive a close when no disposer was provided
        if self.registration().is_none() {
            return;
        }

        let envelope = match serde_json::from_value::<Envelope>(codec::parse_or(message, Value::Null))
        {
            Ok(envelope) if envelope.topic == self.options.topic => envelope,
            _ => return,
        };

        log_traffic(&self.options, KIND, "received", message);
        match validate::classify(envelope.payload) {
            Ok(payload) => {
                self.events.emit(ConnectionEvent::Payload(payload));
            }
            Err(e) => {
                tracing::debug!(topic = %self.options.topic, error = %e, "Dropping non-payload message");
            }
        }
    }
}

#[async_trait]
impl Connection for MessageChannelConnection {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn is_connected(&self) -> bool {
        self.inner.registration().is_some()
    }

    fn is_connecting(&self) -> bool {
        false
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { server_push: true }
    }

    async fn open(&self) -> Result<()> {
        {
            // Marked connected before the listener can fire
            let mut registration = self.inner.registration();
            if registration.is_some() {
                return Ok(());
            }
            *registration = Some(Registration { disposer: None });
        }

        let weak: Weak<ChannelInner> = Arc::downgrade(&self.inner);
        let listener: MessageListener = Arc::new(move |message: String| {
            if let Some(inner) = weak.upgrade() {
                inner.on_message(&message);
            }
        });

        // The host may deliver messages from inside the registration call,
        // so the lock is not held here
        let disposer = (self.inner.add_listener)(listener);

        let orphaned = match self.inner.registration().as_mut() {
            Some(current) => {
                current.disposer = disposer;
                None
            }
            None => Some(disposer),
        };
        if let Some(disposer) = orphaned {
            // Closed while registering
            if let Some(dispose) = disposer {
                dispose();
            }
            return Err(Error::ConnectionClosed);
        }

        tracing::debug!(topic = %self.inner.options.topic, "Message channel open");
        self.inner.events.emit(ConnectionEvent::Open);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let Some(registration) = self.inner.registration().take() else {
            return Ok(());
        };

        if let Some(dispose) = registration.disposer {
            dispose();
        }

        tracing::debug!(topic = %self.inner.options.topic, "Message channel closed");
        self.inner.events.emit(ConnectionEvent::Close);
        Ok(())
    }

    async fn send(&self, payload: &Payload, _context: Option<&Context>) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let envelope = Envelope {
            topic: self.inner.options.topic.clone(),
            payload: serde_json::to_value(payload)
                .map_err(|e| Error::Serialization(e.to_string()))?,
        };
        let message = codec::stringify(&envelope)?;
        log_traffic(&self.inner.options, KIND, "sending", &message);

        (self.inner.post)(message)
    }

    fn subscribe(&self) -> Subscription<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }
}
