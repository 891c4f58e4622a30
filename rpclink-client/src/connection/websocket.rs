//! WebSocket connection
//!
//! # Sessions
//!
//! Each successful handshake starts a session: the write half of the socket
//! behind a mutex, plus a reader task that classifies incoming frames. The
//! session is present exactly while the connection is connected. Whoever
//! removes it (a local `close` or the reader seeing the socket end) emits
//! `Close`, and the session id check guarantees only one of them does.
//!
//! # Concurrent opens
//!
//! The handshake runs on its own task behind a shared future. A second `open`
//! while the first is still in flight awaits the same attempt instead of
//! dialing again.

use super::{log_traffic, Capabilities, Connection, ConnectionEvent, ConnectionOptions, Context};
use crate::events::{EventHub, Subscription, SubscriptionId};
use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::stream::{SplitSink, SplitStream};
use futures::{FutureExt, SinkExt, StreamExt};
use rpclink_core::{codec, Error, Payload, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

const KIND: &str = "websocket";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = Arc<tokio::sync::Mutex<SplitSink<WsStream, Message>>>;
type OpenFuture = Shared<BoxFuture<'static, Result<()>>>;

/// JSON-RPC over a WebSocket
#[derive(Clone)]
pub struct WebSocketConnection {
    inner: Arc<WsInner>,
}

struct Session {
    id: u64,
    sink: WsSink,
    reader: JoinHandle<()>,
}

struct WsInner {
    url: String,
    options: ConnectionOptions,
    events: EventHub<ConnectionEvent>,
    session: Mutex<Option<Session>>,
    opening: Mutex<Option<OpenFuture>>,
    next_session: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WebSocketConnection {
    /// Create a connection for a `ws:`/`wss:` URL; nothing is dialed yet
    pub fn new(url: impl Into<String>, options: ConnectionOptions) -> Result<Self> {
        let url = url.into();
        if !super::is_websocket_url(&url) {
            return Err(Error::InvalidUrl(format!(
                "Url is not compatible with WebSocket connection: {}",
                url
            )));
        }

        Ok(Self {
            inner: Arc::new(WsInner {
                url,
                options,
                events: EventHub::new(),
                session: Mutex::new(None),
                opening: Mutex::new(None),
                next_session: AtomicU64::new(1),
            }),
        })
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    fn in_flight_open(&self) -> Option<OpenFuture> {
        lock(&self.inner.opening).clone()
    }
}

impl WsInner {
    async fn handshake(self: Arc<Self>) -> Result<()> {
        tracing::debug!(url = %self.url, "Opening WebSocket");

        let outcome = match connect_async(self.url.as_str()).await {
            Ok((stream, _)) => {
                self.start_session(stream);
                tracing::info!(url = %self.url, "WebSocket connected");
                self.events.emit(ConnectionEvent::Open);
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(url = %self.url, error = %message, "WebSocket handshake failed");
                self.events.emit(ConnectionEvent::Error(message.clone()));
                Err(Error::WebSocket(message))
            }
        };

        *lock(&self.opening) = None;
        outcome
    }

    fn start_session(self: &Arc<Self>, stream: WsStream) {
        let (sink, source) = stream.split();
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);

        // Held across the spawn so the reader cannot end the session before
        // it is stored
        let mut session = lock(&self.session);
        let reader = tokio::spawn(read_loop(Arc::downgrade(self), source, id));
        *session = Some(Session {
            id,
            sink: Arc::new(tokio::sync::Mutex::new(sink)),
            reader,
        });
    }

    fn receive(&self, text: &str) {
        log_traffic(&self.options, KIND, "received", text);
        match codec::decode(text) {
            Ok(payload) => {
                self.events.emit(ConnectionEvent::Payload(payload));
            }
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "Dropping non-payload frame");
            }
        }
    }

    /// Remove the session if it is still `id`, emitting `Close`
    fn end_session(&self, id: u64) {
        let ended = {
            let mut session = lock(&self.session);
            match session.as_ref() {
                Some(current) if current.id == id => session.take(),
                _ => None,
            }
        };

        if ended.is_some() {
            tracing::info!(url = %self.url, "WebSocket closed by peer");
            self.events.emit(ConnectionEvent::Close);
        }
    }
}

async fn read_loop(inner: Weak<WsInner>, mut source: SplitStream<WsStream>, id: u64) {
    while let Some(frame) = source.next().await {
        let Some(conn) = inner.upgrade() else {
            return;
        };

        match frame {
            Ok(Message::Text(text)) => conn.receive(&text),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => conn.receive(&text),
                Err(_) => tracing::debug!(url = %conn.url, "Dropping non-UTF-8 binary frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::error!(url = %conn.url, error = %e, "WebSocket error");
                conn.events.emit(ConnectionEvent::Error(e.to_string()));
                break;
            }
        }
    }

    if let Some(conn) = inner.upgrade() {
        conn.end_session(id);
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn is_connected(&self) -> bool {
        lock(&self.inner.session).is_some()
    }

    fn is_connecting(&self) -> bool {
        lock(&self.inner.opening).is_some()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { server_push: true }
    }

    async fn open(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let attempt = {
            let mut opening = lock(&self.inner.opening);
            match opening.as_ref() {
                Some(attempt) => attempt.clone(),
                None => {
                    // Spawned so the attempt finishes and clears `opening` even
                    // if every caller stops waiting
                    let handshake = tokio::spawn(Arc::clone(&self.inner).handshake());
                    let attempt = async move {
                        handshake
                            .await
                            .unwrap_or_else(|e| Err(Error::WebSocket(e.to_string())))
                    }
                    .boxed()
                    .shared();
                    *opening = Some(attempt.clone());
                    attempt
                }
            }
        };

        attempt.await
    }

    async fn close(&self) -> Result<()> {
        // Let an in-flight handshake finish so its session is torn down too
        if let Some(attempt) = self.in_flight_open() {
            let _ = attempt.await;
        }

        let Some(session) = lock(&self.inner.session).take() else {
            return Ok(());
        };

        session.reader.abort();
        if let Err(e) = session.sink.lock().await.close().await {
            tracing::debug!(url = %self.inner.url, error = %e, "Close frame not delivered");
        }

        tracing::info!(url = %self.inner.url, "WebSocket closed");
        self.inner.events.emit(ConnectionEvent::Close);
        Ok(())
    }

    async fn send(&self, payload: &Payload, _context: Option<&Context>) -> Result<()> {
        let sink = lock(&self.inner.session)
            .as_ref()
            .map(|session| Arc::clone(&session.sink))
            .ok_or(Error::NotConnected)?;

        let text = codec::encode(payload)?;
        log_traffic(&self.inner.options, KIND, "sending", &text);

        let mut writer = sink.lock().await;
        writer
            .send(Message::Text(text))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        Ok(())
    }

    fn subscribe(&self) -> Subscription<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }
}
