//! The JSON-RPC transport
//!
//! [`Transport`] sits on top of one [`Connection`] at a time and exposes the
//! protocol operations:
//!
//! - `request` / `notify`: calls towards the peer
//! - `resolve` / `reject`: answers to calls the peer made
//! - `connect` / `disconnect`: lifecycle, serialized by an async mutex
//!
//! # Correlation
//!
//! Every request gets a fresh numeric id from a counter owned by this
//! transport. A waiter is registered under that id before the request is
//! sent, and is removed exactly once: by the matching response, by the
//! timeout, or by a disconnect. A response that finds no waiter is dropped.
//!
//! # Inbound dispatch
//!
//! A task per active connection reads its events and fans payloads out:
//!
//! ```text
//! payload ─┬─► payloads()
//!          ├─ Request      ─► requests()        (answer with resolve/reject)
//!          ├─ Notification ─► notifications()   + on_notification handlers
//!          └─ Response     ─► pending waiter for its id
//! ```
//!
//! # Cloning
//!
//! `Transport` is a cheap handle around shared state; clones drive the same
//! connection and pending table.

use crate::connection::{
    from_url, same_connection, Connection, ConnectionEvent, ConnectionOptions, Context,
};
use crate::connection_state::{ConnectionManager, ConnectionState};
use crate::events::{EventHub, Subscription, SubscriptionId};
use crate::metrics::TransportMetrics;
use crate::notification::NotificationHandler;
use crate::request::RequestManager;
use crate::TransportBuilder;
use futures::future::BoxFuture;
use futures::FutureExt;
use rpclink_core::{
    Error, ErrorObject, ErrorResponse, Id, Notification, Params, Payload, Request,
    Response, Result, ResultResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Transport-level lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection was opened and is now active
    Connect,
    /// The active connection was closed, locally or by the peer
    Disconnect,
    /// The active connection reported a failure not tied to a request
    Error(String),
}

/// Transport settings
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// Per-request timeout; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Options for connections the transport builds from a URL
    pub connection: ConnectionOptions,
}

impl TransportOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection = options;
        self
    }
}

struct ActiveLink {
    connection: Arc<dyn Connection>,
    subscription: SubscriptionId,
    pump: JoinHandle<()>,
}

pub(crate) struct TransportInner {
    options: TransportOptions,
    configured: RwLock<Arc<dyn Connection>>,
    /// Lifecycle lock; held for the whole of every connect/disconnect
    link: Mutex<Option<ActiveLink>>,
    /// Mirror of the active connection for sends, written under `link`
    active: RwLock<Option<Arc<dyn Connection>>>,
    pending: RequestManager,
    notification_handler: NotificationHandler,
    events: EventHub<TransportEvent>,
    requests: EventHub<Request>,
    notifications: EventHub<Notification>,
    payloads: EventHub<Payload>,
    state: ConnectionManager,
    reconnect: bool,
    metrics: Option<Arc<TransportMetrics>>,
}

/// JSON-RPC 2.0 transport over any [`Connection`]
///
/// # Examples
///
/// ```rust,no_run
/// use rpclink_client::Transport;
/// use serde_json::{json, Value};
///
/// # async fn example() -> rpclink_core::Result<()> {
/// let transport = Transport::new("https://rpc.example.org")?;
///
/// // Connects lazily on first use
/// let height: u64 = transport.request("getBlockCount", ()).await?;
/// let block: Value = transport.request("getBlock", json!([height])).await?;
///
/// transport.notify("log", json!({"seen": block})).await?;
/// transport.disconnect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

impl Transport {
    /// Transport over the connection matching `url`'s scheme
    pub fn new(url: &str) -> Result<Self> {
        Self::with_options(url, TransportOptions::default())
    }

    pub fn with_options(url: &str, options: TransportOptions) -> Result<Self> {
        let connection = from_url(url, &options.connection)?;
        Ok(Self::from_parts(
            connection,
            options,
            ConnectionManager::default(),
            false,
            None,
        ))
    }

    /// Transport over an existing connection
    pub fn with_connection(connection: Arc<dyn Connection>) -> Self {
        Self::from_parts(
            connection,
            TransportOptions::default(),
            ConnectionManager::default(),
            false,
            None,
        )
    }

    /// Start configuring a transport for `url`
    pub fn builder(url: impl Into<String>) -> TransportBuilder {
        TransportBuilder::new(url)
    }

    pub(crate) fn from_parts(
        connection: Arc<dyn Connection>,
        options: TransportOptions,
        state: ConnectionManager,
        reconnect: bool,
        metrics: Option<Arc<TransportMetrics>>,
    ) -> Self {
        Self {
            inner: Arc::new(TransportInner {
                options,
                configured: RwLock::new(connection),
                link: Mutex::new(None),
                active: RwLock::new(None),
                pending: RequestManager::new(),
                notification_handler: NotificationHandler::new(),
                events: EventHub::new(),
                requests: EventHub::new(),
                notifications: EventHub::new(),
                payloads: EventHub::new(),
                state,
                reconnect,
                metrics,
            }),
        }
    }

    /// Open the configured connection
    ///
    /// A no-op when it is already the active, connected one, so repeated
    /// calls emit a single `Connect`.
    #[tracing::instrument(skip(self))]
    pub async fn connect(&self) -> Result<()> {
        self.inner.establish(None, false).await
    }

    /// Make `connection` the configured connection and open it
    ///
    /// A different active connection is disconnected first.
    #[tracing::instrument(skip(self, connection), fields(kind = connection.kind()))]
    pub async fn connect_to(&self, connection: Arc<dyn Connection>) -> Result<()> {
        self.inner.establish(Some(connection), false).await
    }

    /// Close the active connection and fail every pending request
    pub async fn disconnect(&self) -> Result<()> {
        let mut link = self.inner.link.lock().await;
        // Also stops a reconnect loop waiting for its next attempt
        self.inner.state.disconnected().await;
        self.inner.record_state().await;

        match link.take() {
            Some(active) => self.inner.teardown(active).await,
            None => Ok(()),
        }
    }

    /// Call `method` and wait for its result
    ///
    /// Connects first when needed. Fails with `Error::Rpc` carrying the
    /// remote error object (or a synthesized one for channel failures), or
    /// with `Error::Timeout` when the configured timeout elapses first.
    #[tracing::instrument(skip(self, params))]
    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.request_with_context(method, params, None).await
    }

    pub async fn request_with_context<P, R>(
        &self,
        method: &str,
        params: P,
        context: Option<&Context>,
    ) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = Params::from_serialize(params).map_err(Error::into_rpc)?;
        let value = self.call(method, params, context).await?;
        serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()).into_rpc())
    }

    /// Send a request built from already-validated params, returning the raw result
    pub async fn call(
        &self,
        method: &str,
        params: Option<Params>,
        context: Option<&Context>,
    ) -> Result<Value> {
        let start = Instant::now();
        self.inner.ensure_connected().await.map_err(Error::into_rpc)?;

        let id = self.inner.pending.next_id();
        let payload = Payload::Request(Request::new(id.clone(), method, params));

        let mut rx = self.inner.pending.register(id.clone()).await;

        if let Err(e) = self.inner.send(&payload, context).await {
            self.inner.pending.cancel(&id).await;
            tracing::error!(method = %method, id = %id, error = %e, "Failed to send request");
            self.inner.record_request(method, "error", start);
            if let Some(ref m) = self.inner.metrics {
                m.record_error("send");
            }
            return Err(e.into_rpc());
        }
        tracing::debug!(id = %id, "Request sent, waiting for response");

        let received = match self.inner.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut rx).await {
                Ok(received) => received.ok(),
                Err(_) => {
                    if self.inner.pending.cancel(&id).await {
                        tracing::warn!(method = %method, id = %id, "Request timed out");
                        self.inner.record_request(method, "timeout", start);
                        if let Some(ref m) = self.inner.metrics {
                            m.record_timeout(method);
                        }
                        return Err(Error::Timeout);
                    }
                    // Settled in the same instant the timer fired
                    rx.try_recv().ok()
                }
            },
            None => (&mut rx).await.ok(),
        };
        let received = received
            .ok_or_else(|| Error::Rpc(ErrorObject::communication_failed("Connection closed")))?;

        match received.into_result() {
            Ok(result) => {
                self.inner.record_request(method, "success", start);
                Ok(result)
            }
            Err(error) => {
                tracing::debug!(method = %method, error = %error, "Request failed");
                self.inner.record_request(method, "error", start);
                if let Some(ref m) = self.inner.metrics {
                    m.record_error("rpc");
                }
                Err(Error::Rpc(error))
            }
        }
    }

    /// Send a notification; resolves once it has been handed to the channel
    pub async fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        self.notify_with_context(method, params, None).await
    }

    pub async fn notify_with_context<P: Serialize>(
        &self,
        method: &str,
        params: P,
        context: Option<&Context>,
    ) -> Result<()> {
        let params = Params::from_serialize(params).map_err(Error::into_rpc)?;
        let payload = Payload::Notification(Notification::new(method, params));
        self.inner.respond(&payload, context).await
    }

    /// Answer a peer request with a result
    ///
    /// The id belongs to the peer; the local pending table is not touched.
    pub async fn resolve<R: Serialize>(&self, id: impl Into<Id>, result: R) -> Result<()> {
        self.resolve_with_context(id, result, None).await
    }

    pub async fn resolve_with_context<R: Serialize>(
        &self,
        id: impl Into<Id>,
        result: R,
        context: Option<&Context>,
    ) -> Result<()> {
        let result = serde_json::to_value(result)
            .map_err(|e| Error::Serialization(e.to_string()).into_rpc())?;
        let payload = Payload::Result(ResultResponse::new(id.into(), result));
        self.inner.respond(&payload, context).await
    }

    /// Answer a peer request with an error
    pub async fn reject(&self, id: impl Into<Id>, error: impl Into<ErrorObject>) -> Result<()> {
        self.reject_with_context(id, error, None).await
    }

    pub async fn reject_with_context(
        &self,
        id: impl Into<Id>,
        error: impl Into<ErrorObject>,
        context: Option<&Context>,
    ) -> Result<()> {
        let payload = Payload::Error(ErrorResponse::new(id.into(), error.into()));
        self.inner.respond(&payload, context).await
    }

    /// Lifecycle events: `Connect`, `Disconnect`, `Error`
    pub fn events(&self) -> Subscription<TransportEvent> {
        self.inner.events.subscribe()
    }

    /// Requests sent by the peer, to be answered with `resolve`/`reject`
    pub fn requests(&self) -> Subscription<Request> {
        self.inner.requests.subscribe()
    }

    /// Notifications sent by the peer
    pub fn notifications(&self) -> Subscription<Notification> {
        self.inner.notifications.subscribe()
    }

    /// Every inbound payload, before dispatch
    ///
    /// Dropping a subscription unsubscribes it.
    pub fn payloads(&self) -> Subscription<Payload> {
        self.inner.payloads.subscribe()
    }

    /// Run `handler` for every notification with this method
    pub async fn on_notification<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Notification) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.notification_handler.register(method, handler).await;
    }

    /// Answer every peer request with `handler`
    ///
    /// Each request is handled on its own task; `Ok` is sent back with
    /// `resolve`, `Err` with `reject`. Abort the returned handle to stop.
    pub fn serve_requests<F, Fut>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, ErrorObject>> + Send + 'static,
    {
        let mut requests = self.requests();
        let weak = Arc::downgrade(&self.inner);
        let handler = Arc::new(handler);

        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let transport = Transport { inner };
                let handler = Arc::clone(&handler);

                tokio::spawn(async move {
                    let id = request.id.clone();
                    let method = request.method.clone();
                    let sent = match handler(request).await {
                        Ok(result) => transport.resolve(id, result).await,
                        Err(error) => transport.reject(id, error).await,
                    };
                    if let Err(e) = sent {
                        tracing::error!(method = %method, error = %e, "Failed to answer request");
                    }
                });
            }
        })
    }

    pub fn is_connected(&self) -> bool {
        self.inner.active_connection().is_some()
    }

    /// The configured connection, active or not
    pub fn connection(&self) -> Arc<dyn Connection> {
        self.inner.configured_connection()
    }

    /// Transport lifecycle state, including reconnection progress
    pub async fn state(&self) -> ConnectionState {
        self.inner.state.state().await
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.pending.pending_count().await
    }

    pub fn options(&self) -> &TransportOptions {
        &self.inner.options
    }
}

impl TransportInner {
    fn configured_connection(&self) -> Arc<dyn Connection> {
        Arc::clone(&self.configured.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn active_connection(&self) -> Option<Arc<dyn Connection>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|connection| connection.is_connected())
            .cloned()
    }

    fn set_active(&self, connection: Option<Arc<dyn Connection>>) {
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = connection;
    }

    async fn ensure_connected(self: &Arc<Self>) -> Result<()> {
        if self.active_connection().is_some() {
            return Ok(());
        }
        self.establish(None, false).await
    }

    async fn send(&self, payload: &Payload, context: Option<&Context>) -> Result<()> {
        let connection = self.active_connection().ok_or(Error::NotConnected)?;
        connection.send(payload, context).await
    }

    /// Lazily connect, then send a payload no one waits on
    async fn respond(self: &Arc<Self>, payload: &Payload, context: Option<&Context>) -> Result<()> {
        self.ensure_connected().await.map_err(Error::into_rpc)?;
        self.send(payload, context).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to send payload");
            e.into_rpc()
        })
    }

    /// Open `target` (or the configured connection) and make it active
    ///
    /// While `reconnecting`, the Reconnecting state is left for the retry
    /// loop to manage on failure.
    async fn establish(
        self: &Arc<Self>,
        target: Option<Arc<dyn Connection>>,
        reconnecting: bool,
    ) -> Result<()> {
        let mut link = self.link.lock().await;
        // A disconnect or connect that took the lock first ends the retry
        if reconnecting && !self.state.is_reconnecting().await {
            return Err(Error::NotConnected);
        }

        let target = match target {
            Some(connection) => {
                *self.configured.write().unwrap_or_else(PoisonError::into_inner) =
                    Arc::clone(&connection);
                connection
            }
            None => self.configured_connection(),
        };

        if let Some(active) = link.as_ref() {
            if same_connection(&active.connection, &target) && active.connection.is_connected() {
                return Ok(());
            }
        }
        if let Some(previous) = link.take() {
            if let Err(e) = self.teardown(previous).await {
                tracing::warn!(error = %e, "Previous connection did not close cleanly");
            }
        }

        if !reconnecting {
            self.state.connecting().await;
            self.record_state().await;
        }

        tracing::info!(kind = target.kind(), "Connecting");
        // Subscribed before open so nothing sent right after the handshake is missed
        let subscription = target.subscribe();
        let subscription_id = subscription.id();

        if let Err(e) = target.open().await {
            target.unsubscribe(subscription_id);
            if !reconnecting {
                self.state.disconnected().await;
                self.record_state().await;
            }
            if let Some(ref m) = self.metrics {
                m.record_error("connect");
            }
            tracing::error!(kind = target.kind(), error = %e, "Failed to connect");
            return Err(e);
        }

        let pump = tokio::spawn(pump(
            Arc::downgrade(self),
            subscription,
            Arc::clone(&target),
        ));
        self.set_active(Some(Arc::clone(&target)));
        *link = Some(ActiveLink {
            connection: target,
            subscription: subscription_id,
            pump,
        });

        self.state.connected().await;
        self.record_state().await;
        tracing::info!("Connected");
        self.events.emit(TransportEvent::Connect);
        Ok(())
    }

    /// Caller-initiated teardown of a link already removed from `link`
    async fn teardown(&self, active: ActiveLink) -> Result<()> {
        active.connection.unsubscribe(active.subscription);
        active.pump.abort();
        self.set_active(None);

        let closed = active.connection.close().await;
        self.after_disconnect().await;
        closed
    }

    async fn after_disconnect(&self) {
        let failed = self
            .pending
            .fail_all(ErrorObject::communication_failed("Connection closed"))
            .await;
        if failed > 0 {
            tracing::warn!(failed, "Failed pending requests on disconnect");
        }
        tracing::info!("Disconnected");
        self.events.emit(TransportEvent::Disconnect);
    }

    /// Peer-initiated close of `connection`; returns whether to reconnect
    async fn on_connection_closed(&self, connection: &Arc<dyn Connection>) -> bool {
        let mut link = self.link.lock().await;
        let is_active = link
            .as_ref()
            .map_or(false, |active| same_connection(&active.connection, connection));
        if !is_active {
            return false;
        }

        if let Some(active) = link.take() {
            active.connection.unsubscribe(active.subscription);
        }
        self.set_active(None);

        if self.reconnect {
            self.state.start_reconnecting().await;
        } else {
            self.state.disconnected().await;
        }
        self.record_state().await;
        self.after_disconnect().await;
        self.reconnect
    }

    async fn dispatch(&self, payload: Payload) {
        self.payloads.emit(payload.clone());

        match payload {
            Payload::Request(request) => {
                tracing::debug!(method = %request.method, id = %request.id, "Received request");
                self.requests.emit(request);
            }
            Payload::Notification(notification) => {
                tracing::debug!(method = %notification.method, "Received notification");
                if let Some(ref m) = self.metrics {
                    m.record_notification(&notification.method);
                }
                self.notifications.emit(notification.clone());
                // Off the pump, so a handler may itself wait on a response
                let handler = self.notification_handler.clone();
                tokio::spawn(async move {
                    handler.handle(notification).await;
                });
            }
            Payload::Result(response) => self.settle(Response::Result(response)).await,
            Payload::Error(response) => self.settle(Response::Error(response)).await,
        }
    }

    async fn settle(&self, response: Response) {
        let id = response.id().clone();
        if !self.pending.complete(response).await {
            tracing::debug!(id = %id, "Dropping response without a pending request");
        }
    }

    fn record_request(&self, method: &str, status: &str, start: Instant) {
        if let Some(ref m) = self.metrics {
            m.record_request(method, status, start.elapsed().as_secs_f64());
        }
    }

    async fn record_state(&self) {
        if let Some(ref m) = self.metrics {
            m.update_connection_state(self.state.state().await.as_metric());
        }
    }
}

impl Drop for TransportInner {
    fn drop(&mut self) {
        if let Some(active) = self.link.get_mut().take() {
            active.pump.abort();
        }
    }
}

/// Forward one connection's events into the transport
async fn pump(
    inner: Weak<TransportInner>,
    mut events: Subscription<ConnectionEvent>,
    connection: Arc<dyn Connection>,
) {
    while let Some(event) = events.recv().await {
        let Some(transport) = inner.upgrade() else {
            return;
        };

        match event {
            ConnectionEvent::Payload(payload) => transport.dispatch(payload).await,
            ConnectionEvent::Error(message) => {
                if let Some(ref m) = transport.metrics {
                    m.record_error("connection");
                }
                transport.events.emit(TransportEvent::Error(message));
            }
            ConnectionEvent::Close => {
                let reconnect = transport.on_connection_closed(&connection).await;
                drop(transport);
                if reconnect {
                    reconnect_loop(inner).await;
                }
                return;
            }
            ConnectionEvent::Open => {}
        }
    }
}

/// Retry the configured connection until it opens, the strategy gives up,
/// or the caller takes over
///
/// Boxed because each successful attempt spawns a new pump, which may in
/// turn run this loop.
fn reconnect_loop(inner: Weak<TransportInner>) -> BoxFuture<'static, ()> {
    async move { reconnect(inner).await }.boxed()
}

async fn reconnect(inner: Weak<TransportInner>) {
    loop {
        let Some(transport) = inner.upgrade() else {
            return;
        };

        let Some(delay) = transport.state.next_reconnect_delay().await else {
            tracing::warn!("Reconnection attempts exhausted");
            transport.record_state().await;
            transport
                .events
                .emit(TransportEvent::Error("Reconnection failed".to_string()));
            return;
        };
        let attempt = match transport.state.state().await {
            ConnectionState::Reconnecting { attempt } => attempt,
            _ => 0,
        };
        transport.record_state().await;
        drop(transport);

        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
        tokio::time::sleep(delay).await;

        let Some(transport) = inner.upgrade() else {
            return;
        };

        if let Some(ref m) = transport.metrics {
            m.record_reconnection_attempt();
        }
        match transport.establish(None, true).await {
            Ok(()) => {
                tracing::info!(attempt, "Reconnected");
                if let Some(ref m) = transport.metrics {
                    m.record_reconnection_success();
                }
                return;
            }
            Err(e) => {
                // A disconnect (or a manual connect) during the delay ends the loop
                if !transport.state.is_reconnecting().await {
                    tracing::debug!(attempt, "Reconnection cancelled");
                    return;
                }
                tracing::warn!(attempt, error = %e, "Reconnection attempt failed");
            }
        }
    }
}
