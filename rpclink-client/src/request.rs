//! Pending-request table
//!
//! Correlates outgoing requests with the responses that settle them.
//!
//! # Request Lifecycle
//!
//! 1. **Generate ID**: take the next value of the per-transport counter
//! 2. **Register**: create a oneshot waiter before anything is sent
//! 3. **Send**: hand the request to the connection
//! 4. **Settle**: exactly one of response arrival, timeout (`cancel`) or
//!    connection teardown (`fail_all`) removes the waiter
//!
//! A response whose id has no waiter is dropped; `complete` reports this by
//! returning `false` so the caller can log it.

use rpclink_core::{ErrorObject, ErrorResponse, Id, Response};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Manager for tracking pending requests
#[derive(Clone)]
pub struct RequestManager {
    pending: Arc<Mutex<HashMap<Id, oneshot::Sender<Response>>>>,
    counter: Arc<AtomicU64>,
}

impl RequestManager {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Generate a fresh id; the first one is 1
    pub fn next_id(&self) -> Id {
        Id::from(self.counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a waiter for `id`
    pub async fn register(&self, id: Id) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        rx
    }

    /// Settle the waiter matching the response id
    ///
    /// Returns `false` when no waiter exists (late or spurious response).
    pub async fn complete(&self, response: Response) -> bool {
        let waiter = self.pending.lock().await.remove(response.id());
        match waiter {
            Some(tx) => {
                // The receiver may already be gone if the caller's future was dropped
                let _ = tx.send(response);
                true
            }
            None => false,
        }
    }

    /// Remove a waiter without settling it
    pub async fn cancel(&self, id: &Id) -> bool {
        self.pending.lock().await.remove(id).is_some()
    }

    /// Settle every waiter with an ErrorResponse carrying `error`
    pub async fn fail_all(&self, error: ErrorObject) -> usize {
        let mut pending = self.pending.lock().await;
        let count = pending.len();
        for (id, tx) in pending.drain() {
            let _ = tx.send(Response::Error(ErrorResponse::new(id, error.clone())));
        }
        count
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl Default for RequestManager {
    fn default() -> Self {
        Self::new()
    }
}
