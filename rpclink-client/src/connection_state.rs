//! Connection state tracking
//!
//! A single [`Connection`](crate::Connection) only ever reports the first
//! three states. The transport adds the last two while it is recovering from
//! an unsolicited close.
//!
//! ```text
//! Disconnected → Connecting → Connected
//!                     ↓           ↓
//!                  Failed ← Reconnecting
//! ```
//!
//! On entering Reconnecting the strategy is consulted for each attempt; a
//! successful attempt returns to Connected and resets the strategy, running
//! out of attempts ends in Failed.

use crate::reconnect::{NoReconnect, ReconnectionStrategy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Lifecycle state of a connection or transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Lost the connection, `attempt` reconnects made so far
    Reconnecting { attempt: u32 },
    /// Reconnection attempts exhausted
    Failed,
}

impl ConnectionState {
    /// Numeric value reported by the connection state gauge
    pub fn as_metric(&self) -> i64 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting { .. } => 3,
            ConnectionState::Failed => 4,
        }
    }
}

/// Shared state plus the strategy driving reconnection
#[derive(Clone)]
pub struct ConnectionManager {
    state: Arc<RwLock<ConnectionState>>,
    strategy: Arc<RwLock<Box<dyn ReconnectionStrategy>>>,
}

impl ConnectionManager {
    pub fn new(strategy: Box<dyn ReconnectionStrategy>) -> Self {
        Self {
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            strategy: Arc::new(RwLock::new(strategy)),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    pub async fn set_state(&self, new_state: ConnectionState) {
        *self.state.write().await = new_state;
    }

    pub async fn connecting(&self) {
        self.set_state(ConnectionState::Connecting).await;
    }

    /// Enter Connected and reset the strategy
    pub async fn connected(&self) {
        self.set_state(ConnectionState::Connected).await;
        self.strategy.write().await.reset();
    }

    pub async fn disconnected(&self) {
        self.set_state(ConnectionState::Disconnected).await;
    }

    pub async fn start_reconnecting(&self) {
        self.set_state(ConnectionState::Reconnecting { attempt: 0 })
            .await;
    }

    /// Delay before the next attempt, bumping the attempt counter
    ///
    /// Returns `None` and enters Failed when the strategy gives up.
    pub async fn next_reconnect_delay(&self) -> Option<Duration> {
        let attempt = match self.state().await {
            ConnectionState::Reconnecting { attempt } => attempt,
            _ => 0,
        };

        let delay = self.strategy.write().await.next_delay(attempt);

        match delay {
            Some(_) => {
                self.set_state(ConnectionState::Reconnecting {
                    attempt: attempt + 1,
                })
                .await
            }
            None => self.set_state(ConnectionState::Failed).await,
        }

        delay
    }

    /// True while a reconnect loop should keep going
    pub async fn is_reconnecting(&self) -> bool {
        matches!(self.state().await, ConnectionState::Reconnecting { .. })
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(Box::new(NoReconnect))
    }
}
