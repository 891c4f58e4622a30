//! HTTP connection
//!
//! Every payload is POSTed to the base URL. The reply body, if any, is
//! classified and emitted as a payload. Failures of a POST carrying a request
//! are turned into an ErrorResponse for that request's id, so the waiting
//! caller always settles:
//!
//! - network error, HTTP timeout or non-2xx status: CommunicationFailed
//! - reply that is not valid JSON or not a payload: ParseError

use super::{log_traffic, Capabilities, Connection, ConnectionEvent, ConnectionOptions, Context};
use crate::events::{EventHub, Subscription, SubscriptionId};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use rpclink_core::{
    codec, Error, ErrorCode, ErrorObject, ErrorResponse, Id, Payload, Result,
};
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};

const KIND: &str = "http";

/// JSON-RPC over HTTP POST
#[derive(Clone)]
pub struct HttpConnection {
    inner: Arc<HttpInner>,
}

struct HttpInner {
    url: String,
    options: ConnectionOptions,
    client: RwLock<Option<reqwest::Client>>,
    events: EventHub<ConnectionEvent>,
}

impl HttpConnection {
    /// Create a connection for an `http:`/`https:` URL
    pub fn new(url: impl Into<String>, options: ConnectionOptions) -> Result<Self> {
        let url = url.into();
        if !super::is_http_url(&url) {
            return Err(Error::InvalidUrl(format!(
                "Url is not compatible with HTTP connection: {}",
                url
            )));
        }

        Ok(Self {
            inner: Arc::new(HttpInner {
                url,
                options,
                client: RwLock::new(None),
                events: EventHub::new(),
            }),
        })
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    fn current_client(&self) -> Option<reqwest::Client> {
        self.inner
            .client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl HttpInner {
    fn build_client(&self) -> Result<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (name, value) in &self.options.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Http(format!("Invalid header name {}: {}", name, e)))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| Error::Http(format!("Invalid value for header {}: {}", name, e)))?;
            headers.insert(header_name, header_value);
        }

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(self.options.http_timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))
    }

    async fn post(self: Arc<Self>, client: reqwest::Client, body: String, reply_to: Option<Id>) {
        let outcome = match client.post(self.url.as_str()).body(body).send().await {
            Ok(response) if response.status().is_success() => {
                response.text().await.map_err(|e| e.to_string())
            }
            Ok(response) => Err(format!("HTTP {}", response.status())),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(text) => self.on_reply(reply_to, &text),
            Err(message) => self.on_failure(reply_to, message),
        }
    }

    fn on_reply(&self, reply_to: Option<Id>, text: &str) {
        if text.trim().is_empty() && reply_to.is_none() {
            return;
        }
        log_traffic(&self.options, KIND, "received", text);

        match codec::decode(text) {
            Ok(payload) => {
                self.events.emit(ConnectionEvent::Payload(payload));
            }
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "Unreadable HTTP reply");
                match reply_to {
                    Some(id) => {
                        let error = ErrorObject::standard(
                            ErrorCode::ParseError,
                            None,
                            Some(Value::String(e.to_string())),
                        );
                        self.emit_error_response(id, error);
                    }
                    None => {
                        self.events.emit(ConnectionEvent::Error(e.to_string()));
                    }
                }
            }
        }
    }

    fn on_failure(&self, reply_to: Option<Id>, message: String) {
        tracing::error!(url = %self.url, error = %message, "HTTP request failed");
        match reply_to {
            Some(id) => self.emit_error_response(id, ErrorObject::communication_failed(message)),
            None => {
                self.events.emit(ConnectionEvent::Error(message));
            }
        }
    }

    fn emit_error_response(&self, id: Id, error: ErrorObject) {
        let payload = Payload::Error(ErrorResponse::new(id, error));
        self.events.emit(ConnectionEvent::Payload(payload));
    }
}

#[async_trait]
impl Connection for HttpConnection {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn is_connected(&self) -> bool {
        self.current_client().is_some()
    }

    fn is_connecting(&self) -> bool {
        false
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { server_push: false }
    }

    async fn open(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let client = self.inner.build_client()?;
        *self
            .inner
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(client);

        tracing::debug!(url = %self.inner.url, "HTTP connection ready");
        self.inner.events.emit(ConnectionEvent::Open);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let previous = self
            .inner
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if previous.is_some() {
            tracing::debug!(url = %self.inner.url, "HTTP connection closed");
            self.inner.events.emit(ConnectionEvent::Close);
        }
        Ok(())
    }

    async fn send(&self, payload: &Payload, _context: Option<&Context>) -> Result<()> {
        let client = self.current_client().ok_or(Error::NotConnected)?;
        let body = codec::encode(payload)?;
        log_traffic(&self.inner.options, KIND, "sending", &body);

        // Only a request has a caller waiting on its id
        let reply_to = match payload {
            Payload::Request(request) => Some(request.id.clone()),
            _ => None,
        };

        tokio::spawn(Arc::clone(&self.inner).post(client, body, reply_to));
        Ok(())
    }

    fn subscribe(&self) -> Subscription<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }
}
