//! Request/response over WebSocket
//!
//! Success, remote errors, id uniqueness under concurrency, timeouts, and
//! server-pushed notifications.

mod common;

use common::{method_of, mock_notification, reply, reply_error, MockWsServer};
use rpclink_client::{Transport, TransportBuilder};
use rpclink_core::{Error, Params};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct DoubleParams {
    value: i32,
}

#[derive(Debug, Deserialize, PartialEq)]
struct DoubleResult {
    doubled: i32,
}

#[tokio::test]
async fn test_request_success() {
    common::init_tracing();
    let mut server = MockWsServer::with_handler(|msg| async move {
        if method_of(&msg).as_deref() == Some("double") {
            reply(&msg, json!({"doubled": 84}))
        } else {
            None
        }
    })
    .await;

    let transport = Transport::new(&server.url()).unwrap();
    let result: DoubleResult = transport
        .request("double", DoubleParams { value: 42 })
        .await
        .unwrap();
    assert_eq!(result, DoubleResult { doubled: 84 });

    let sent: Value = serde_json::from_str(&server.wait_for_message().await.unwrap()).unwrap();
    assert_eq!(
        sent,
        json!({"jsonrpc": "2.0", "id": 1, "method": "double", "params": {"value": 42}})
    );

    transport.disconnect().await.unwrap();
    server.shutdown();
}

#[tokio::test]
async fn test_remote_error_is_propagated() {
    let server =
        MockWsServer::with_handler(|msg| async move { reply_error(&msg, 4100, "Unauthorized") })
            .await;

    let transport = Transport::new(&server.url()).unwrap();
    let err = transport
        .request::<_, Value>("eth_accounts", ())
        .await
        .unwrap_err();

    match err {
        Error::Rpc(error) => {
            assert_eq!(error.code, 4100);
            assert_eq!(error.message, "Unauthorized");
            assert!(error.data.is_none());
        }
        other => panic!("Expected rpc error, got {:?}", other),
    }
    assert_eq!(transport.pending_count().await, 0);

    transport.disconnect().await.unwrap();
    server.shutdown();
}

#[tokio::test]
async fn test_concurrent_requests_resolve_out_of_order() {
    // Echoes the caller's index and the request id, later requests first
    let server = MockWsServer::with_handler(|msg| async move {
        let request: Value = serde_json::from_str(&msg).ok()?;
        let index = request["params"][0].as_u64()?;
        tokio::time::sleep(Duration::from_millis((20 - index) * 5)).await;
        reply(&msg, json!({"index": index, "id": request["id"]}))
    })
    .await;

    let transport = Transport::new(&server.url()).unwrap();
    transport.connect().await.unwrap();

    let calls = (0..20u64).map(|i| {
        let transport = transport.clone();
        async move {
            let result: Value = transport.request("echo", [i]).await.unwrap();
            assert_eq!(result["index"], json!(i));
            result["id"].as_u64().unwrap()
        }
    });
    let ids: Vec<u64> = futures::future::join_all(calls).await;

    let unique: HashSet<u64> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 20);
    assert!(ids.iter().all(|id| (1..=20).contains(id)));
    assert_eq!(transport.pending_count().await, 0);

    transport.disconnect().await.unwrap();
    server.shutdown();
}

#[tokio::test]
async fn test_timeout_then_late_reply_is_dropped() {
    let server = MockWsServer::with_handler(|msg| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        reply(&msg, json!("late"))
    })
    .await;

    let transport = TransportBuilder::new(server.url())
        .with_timeout(Duration::from_millis(50))
        .connect()
        .await
        .unwrap();
    let mut payloads = transport.payloads();

    let err = transport.request::<_, Value>("slow", ()).await.unwrap_err();
    assert!(matches!(err, Error::Timeout));
    let error = err.to_error_object();
    assert_eq!(error.code, -32000);
    assert_eq!(error.message, "Request timeout");
    assert_eq!(transport.pending_count().await, 0);

    // The reply still arrives but settles nothing
    let late = tokio::time::timeout(Duration::from_secs(2), payloads.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(late.is_response());
    assert_eq!(transport.pending_count().await, 0);
    assert!(transport.is_connected());

    transport.disconnect().await.unwrap();
    server.shutdown();
}

#[tokio::test]
async fn test_server_notification_reaches_subscribers() {
    let mut server = MockWsServer::new().await;
    let transport = Transport::new(&server.url()).unwrap();
    transport.connect().await.unwrap();

    let handled = Arc::new(AtomicUsize::new(0));
    let handled_clone = Arc::clone(&handled);
    transport
        .on_notification("tick", move |_n| {
            let handled = Arc::clone(&handled_clone);
            async move {
                handled.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;
    let mut notifications = transport.notifications();

    // Round trip first so the server has seen our socket
    transport.notify("hello", ()).await.unwrap();
    let first = server.wait_for_message().await.unwrap();
    assert_eq!(method_of(&first).as_deref(), Some("hello"));

    server.push(mock_notification("tick", json!([1])));

    let notification = tokio::time::timeout(Duration::from_secs(2), notifications.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notification.method, "tick");
    assert_eq!(notification.params, Some(Params::Array(vec![json!(1)])));
    assert_eq!(transport.pending_count().await, 0);

    for _ in 0..100 {
        if handled.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(handled.load(Ordering::SeqCst), 1);

    transport.disconnect().await.unwrap();
    server.shutdown();
}

#[tokio::test]
async fn test_invalid_frames_are_ignored() {
    let server = MockWsServer::with_handler(|msg| async move { reply(&msg, json!(true)) }).await;
    let transport = Transport::new(&server.url()).unwrap();
    transport.connect().await.unwrap();
    let mut payloads = transport.payloads();

    server.push("not json at all");
    server.push(json!({"hello": "world"}).to_string());

    // The connection survives and keeps working
    let ok: bool = transport.request("check", ()).await.unwrap();
    assert!(ok);
    assert!(payloads.recv().await.unwrap().is_response());
    assert!(payloads.try_recv().is_none());

    transport.disconnect().await.unwrap();
    server.shutdown();
}
