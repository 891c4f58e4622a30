//! Per-method notification handlers
//!
//! Notifications pushed by the peer are always broadcast on
//! [`Transport::notifications`](crate::Transport::notifications). This
//! registry is the callback alternative: one async handler per method name,
//! each invocation running on its own task.
//!
//! ```rust,no_run
//! use rpclink_client::Transport;
//!
//! # async fn example(transport: &Transport) {
//! transport.on_notification("tick", |notification| async move {
//!     println!("tick: {:?}", notification.params);
//! }).await;
//! # }
//! ```

use rpclink_core::Notification;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Boxed async notification callback
pub type NotificationFn =
    Arc<dyn Fn(Notification) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Registry of notification handlers keyed by method
#[derive(Clone, Default)]
pub struct NotificationHandler {
    handlers: Arc<Mutex<HashMap<String, NotificationFn>>>,
}

impl NotificationHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method`, replacing any previous one
    pub async fn register<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Notification) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: NotificationFn = Arc::new(move |notif| Box::pin(handler(notif)));
        self.handlers.lock().await.insert(method.into(), handler);
    }

    /// Run the handler for the notification's method
    ///
    /// Returns `false` if no handler is registered.
    pub async fn handle(&self, notification: Notification) -> bool {
        let handler = self.handlers.lock().await.get(&notification.method).cloned();

        match handler {
            Some(handler) => {
                // Lock is released before awaiting the handler
                handler(notification).await;
                true
            }
            None => {
                tracing::trace!(method = %notification.method, "No handler registered for notification");
                false
            }
        }
    }

    pub async fn has_handler(&self, method: &str) -> bool {
        self.handlers.lock().await.contains_key(method)
    }

    pub async fn unregister(&self, method: &str) -> bool {
        self.handlers.lock().await.remove(method).is_some()
    }

    pub async fn methods(&self) -> Vec<String> {
        self.handlers.lock().await.keys().cloned().collect()
    }
}
