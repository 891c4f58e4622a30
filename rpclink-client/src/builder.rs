//! Transport builder
//!
//! The `TransportBuilder` configures a [`Transport`] before it is used:
//! - the connection, from a URL or supplied directly
//! - request timeout and connection options
//! - automatic reconnection after an unsolicited close
//! - observability (OpenTelemetry) and the service name reported with it
//!
//! # Examples
//!
//! ```rust,no_run
//! use rpclink_client::{ExponentialBackoff, TransportBuilder};
//! use std::time::Duration;
//!
//! # async fn example() -> rpclink_core::Result<()> {
//! // Reconnecting WebSocket transport, connected up front
//! let transport = TransportBuilder::new("ws://localhost:8080")
//!     .with_timeout(Duration::from_secs(10))
//!     .with_reconnect(Box::new(ExponentialBackoff::default()))
//!     .connect()
//!     .await?;
//!
//! // HTTP transport with telemetry, connected on first use
//! let http = TransportBuilder::new("https://rpc.example.org")
//!     .with_default_observability()
//!     .service_name("indexer")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::connection::{from_url, Connection, ConnectionOptions};
use crate::connection_state::ConnectionManager;
use crate::reconnect::{ExponentialBackoff, ReconnectionStrategy};
use crate::transport::{Transport, TransportOptions};
use crate::TransportMetrics;
use rpclink_core::{Error, ObservabilityConfig, Result};
use std::sync::Arc;
use std::time::Duration;

enum Source {
    Url(String),
    Connection(Arc<dyn Connection>),
}

/// Builder for configuring and creating a [`Transport`]
pub struct TransportBuilder {
    source: Source,
    options: TransportOptions,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    enable_reconnect: bool,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl TransportBuilder {
    /// Start from a URL; the scheme picks the connection
    pub fn new(url: impl Into<String>) -> Self {
        Self::from_source(Source::Url(url.into()))
    }

    /// Start from an existing connection
    pub fn from_connection(connection: Arc<dyn Connection>) -> Self {
        Self::from_source(Source::Connection(connection))
    }

    fn from_source(source: Source) -> Self {
        Self {
            source,
            options: TransportOptions::default(),
            reconnect_strategy: None,
            enable_reconnect: false,
            observability_config: None,
            service_name: None,
        }
    }

    /// Fail requests that get no response within `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Options for the connection built from the URL
    pub fn with_connection_options(mut self, options: ConnectionOptions) -> Self {
        self.options.connection = options;
        self
    }

    /// Log every message crossing the connection at info level
    pub fn with_log_traffic(mut self) -> Self {
        self.options.connection.log_traffic = true;
        self
    }

    /// Enable automatic reconnection with the given strategy
    pub fn with_reconnect(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.reconnect_strategy = Some(strategy);
        self.enable_reconnect = true;
        self
    }

    /// Enable automatic reconnection with default exponential backoff
    pub fn with_default_reconnect(mut self) -> Self {
        self.reconnect_strategy = Some(Box::new(ExponentialBackoff::default()));
        self.enable_reconnect = true;
        self
    }

    /// Disable automatic reconnection (default)
    pub fn without_reconnect(mut self) -> Self {
        self.enable_reconnect = false;
        self.reconnect_strategy = None;
        self
    }

    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Create the transport without connecting
    pub fn build(self) -> Result<Transport> {
        let connection = match self.source {
            Source::Url(url) => from_url(&url, &self.options.connection)?,
            Source::Connection(connection) => connection,
        };

        let metrics = match self.observability_config {
            Some(mut config) => {
                if let Some(name) = self.service_name {
                    config.service_name = name;
                }

                rpclink_core::init_observability(config.clone()).map_err(|e| {
                    Error::Internal(format!("Failed to initialize observability: {}", e))
                })?;

                Some(Arc::new(TransportMetrics::new(config.service_name)))
            }
            None => None,
        };

        let state = match (self.enable_reconnect, self.reconnect_strategy) {
            (true, Some(strategy)) => ConnectionManager::new(strategy),
            (true, None) => ConnectionManager::new(Box::new(ExponentialBackoff::default())),
            (false, _) => ConnectionManager::default(),
        };

        Ok(Transport::from_parts(
            connection,
            self.options,
            state,
            self.enable_reconnect,
            metrics,
        ))
    }

    /// Create the transport and open its connection
    pub async fn connect(self) -> Result<Transport> {
        let transport = self.build()?;
        transport.connect().await?;
        Ok(transport)
    }
}
