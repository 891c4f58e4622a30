//! Common test utilities for rpclink-client integration tests
//!
//! Mock peers for each connection variant, so transports can be exercised
//! end to end without a real server.
#![allow(dead_code)]

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use rpclink_client::connection::{Disposer, MessageListener};
use rpclink_client::{ConnectionOptions, MessageChannelConnection};
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone)]
enum Control {
    Push(String),
    Drop,
}

/// Mock WebSocket server
///
/// Every text frame is recorded and handed to the handler; a `Some` reply is
/// written back on the same socket. Replies are produced concurrently, so a
/// slow handler does not hold up later frames.
pub struct MockWsServer {
    addr: SocketAddr,
    control: broadcast::Sender<Control>,
    received: mpsc::UnboundedReceiver<String>,
    accept: JoinHandle<()>,
}

impl MockWsServer {
    /// Server that records frames and never replies
    pub async fn new() -> Self {
        Self::with_handler(|_msg| async move { None }).await
    }

    pub async fn with_handler<F, Fut>(handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (control, _) = broadcast::channel::<Control>(16);
        let (received_tx, received) = mpsc::unbounded_channel::<String>();
        let handler = Arc::new(handler);
        let control_tx = control.clone();

        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let received_tx = received_tx.clone();
                let mut control_rx = control_tx.subscribe();

                tokio::spawn(async move {
                    let Ok(ws_stream) = accept_async(stream).await else {
                        return;
                    };
                    let (write, mut read) = ws_stream.split();
                    let write = Arc::new(tokio::sync::Mutex::new(write));

                    loop {
                        tokio::select! {
                            frame = read.next() => match frame {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = received_tx.send(text.clone());
                                    let handler = Arc::clone(&handler);
                                    let write = Arc::clone(&write);
                                    tokio::spawn(async move {
                                        if let Some(reply) = handler(text).await {
                                            let _ = write.lock().await.send(Message::Text(reply)).await;
                                        }
                                    });
                                }
                                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                Some(Ok(_)) => {}
                            },
                            control = control_rx.recv() => match control {
                                Ok(Control::Push(text)) => {
                                    let _ = write.lock().await.send(Message::Text(text)).await;
                                }
                                Ok(Control::Drop) | Err(broadcast::error::RecvError::Closed) => {
                                    let _ = write.lock().await.close().await;
                                    break;
                                }
                                Err(broadcast::error::RecvError::Lagged(_)) => {}
                            },
                        }
                    }
                });
            }
        });

        Self {
            addr,
            control,
            received,
            accept,
        }
    }

    /// Server answering every request with `result`
    pub async fn replying(result: Value) -> Self {
        Self::with_handler(move |msg| {
            let result = result.clone();
            async move { reply(&msg, result) }
        })
        .await
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Send a frame to every connected client
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.control.send(Control::Push(text.into()));
    }

    /// Close every current client socket; the listener keeps accepting
    pub fn drop_connections(&self) {
        let _ = self.control.send(Control::Drop);
    }

    /// Next frame received from any client
    pub async fn wait_for_message(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .ok()
            .flatten()
    }

    pub fn shutdown(self) {
        self.drop_connections();
        self.accept.abort();
    }
}

/// Mock JSON-RPC-over-HTTP endpoint
///
/// Routes:
/// - `/`: `ping` → `"ok"`, `echo` → params, anything else → MethodNotFound;
///   notifications get an empty 204
/// - `/garbage`: a body that is not JSON
/// - `/broken`: HTTP 500
pub struct MockHttpServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl MockHttpServer {
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/", post(rpc))
            .route("/garbage", post(|| async { "this is not json" }))
            .route(
                "/broken",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, task }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for MockHttpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn rpc(body: String) -> Response {
    let request: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let Some(id) = request.get("id").cloned() else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let reply = match request.get("method").and_then(Value::as_str) {
        Some("ping") => json!({"jsonrpc": "2.0", "id": id, "result": "ok"}),
        Some("echo") => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": request.get("params").cloned().unwrap_or(Value::Null)
        }),
        _ => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32601, "message": "Method not found"}
        }),
    };
    Json(reply).into_response()
}

type Listeners = Arc<Mutex<Vec<(u64, MessageListener)>>>;

/// Two message-channel connections wired to each other in process
///
/// Whatever one side posts is delivered synchronously to the listeners the
/// other side registered, like a pair of entangled message ports.
pub fn message_port_pair(topic: &str) -> (MessageChannelConnection, MessageChannelConnection) {
    message_port_pair_with_topics(topic, topic)
}

pub fn message_port_pair_with_topics(
    left_topic: &str,
    right_topic: &str,
) -> (MessageChannelConnection, MessageChannelConnection) {
    let left: Listeners = Arc::default();
    let right: Listeners = Arc::default();
    (
        port(&left, &right, left_topic),
        port(&right, &left, right_topic),
    )
}

fn port(own: &Listeners, peer: &Listeners, topic: &str) -> MessageChannelConnection {
    let own = Arc::clone(own);
    let peer = Arc::clone(peer);
    let next_id = AtomicU64::new(0);

    MessageChannelConnection::from_fns(
        move |message| {
            let listeners: Vec<MessageListener> = peer
                .lock()
                .unwrap()
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            for listener in listeners {
                listener(message.clone());
            }
            Ok(())
        },
        move |listener| {
            let id = next_id.fetch_add(1, Ordering::SeqCst);
            own.lock().unwrap().push((id, listener));
            let own = Arc::clone(&own);
            Some(Box::new(move || own.lock().unwrap().retain(|(i, _)| *i != id)) as Disposer)
        },
        ConnectionOptions::default().with_topic(topic),
    )
}

/// Route `tracing` output through the test harness, honoring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Result response for the request in `text`, `None` for anything without an id
pub fn reply(text: &str, result: Value) -> Option<String> {
    let request: Value = serde_json::from_str(text).ok()?;
    let id = request.get("id")?.clone();
    Some(json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string())
}

/// Error response for the request in `text`
pub fn reply_error(text: &str, code: i64, message: &str) -> Option<String> {
    let request: Value = serde_json::from_str(text).ok()?;
    let id = request.get("id")?.clone();
    Some(
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message}
        })
        .to_string(),
    )
}

pub fn mock_notification(method: &str, params: Value) -> String {
    json!({"jsonrpc": "2.0", "method": method, "params": params}).to_string()
}

/// Method name of the payload in `text`
pub fn method_of(text: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(text).ok()?;
    payload.get("method")?.as_str().map(str::to_string)
}
