//! Request/response over HTTP POST

mod common;

use common::MockHttpServer;
use rpclink_client::{ConnectionOptions, Transport, TransportBuilder, TransportOptions};
use rpclink_core::{Error, ErrorCode};
use serde_json::{json, Value};
use std::time::Duration;

#[tokio::test]
async fn test_ping() {
    common::init_tracing();
    let server = MockHttpServer::start().await;
    let transport = Transport::new(&server.url("/")).unwrap();

    let result: String = transport.request("ping", ()).await.unwrap();
    assert_eq!(result, "ok");
    assert!(transport.is_connected());
    assert!(!transport.connection().capabilities().server_push);

    let echoed: Value = transport
        .request("echo", json!({"a": [1, 2]}))
        .await
        .unwrap();
    assert_eq!(echoed, json!({"a": [1, 2]}));
}

#[tokio::test]
async fn test_method_not_found() {
    let server = MockHttpServer::start().await;
    let transport = Transport::new(&server.url("/")).unwrap();

    let err = transport.request::<_, Value>("nope", ()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::MethodNotFound.code());
}

#[tokio::test]
async fn test_invalid_json_reply_is_parse_error() {
    let server = MockHttpServer::start().await;
    let transport = Transport::new(&server.url("/garbage")).unwrap();

    match transport.request::<_, Value>("ping", ()).await {
        Err(Error::Rpc(error)) => {
            assert_eq!(error.code, -32700);
            assert_eq!(error.message, "Parse error");
            assert!(error.data.is_some());
        }
        other => panic!("Expected parse error, got {:?}", other),
    }
    assert_eq!(transport.pending_count().await, 0);
}

#[tokio::test]
async fn test_http_status_failure_is_communication_failed() {
    let server = MockHttpServer::start().await;
    let transport = Transport::new(&server.url("/broken")).unwrap();

    let err = transport.request::<_, Value>("ping", ()).await.unwrap_err();
    let error = err.as_rpc().unwrap();
    assert_eq!(error.code, -32000);
    assert!(error.message.contains("500"));
}

#[tokio::test]
async fn test_unreachable_endpoint_settles_request() {
    let transport = Transport::with_options(
        "http://127.0.0.1:9",
        TransportOptions::default().with_connection_options(
            ConnectionOptions::default().with_http_timeout(Duration::from_secs(2)),
        ),
    )
    .unwrap();

    let err = transport.request::<_, Value>("ping", ()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::CommunicationFailed.code());
    assert_eq!(transport.pending_count().await, 0);
}

#[tokio::test]
async fn test_notify_gets_no_reply() {
    let server = MockHttpServer::start().await;
    let transport = TransportBuilder::new(server.url("/"))
        .with_connection_options(ConnectionOptions::default().with_header("X-Client", "rpclink-tests"))
        .build()
        .unwrap();
    let mut payloads = transport.payloads();

    transport.notify("log", json!(["hello"])).await.unwrap();
    // A request after the notification proves the notification produced nothing
    let _: String = transport.request("ping", ()).await.unwrap();

    let first = payloads.recv().await.unwrap();
    assert!(first.is_response());
    assert!(payloads.try_recv().is_none());
}
