//! Transport metrics
//!
//! OpenTelemetry instruments recorded by [`crate::Transport`] when it is
//! built with observability enabled. Without an installed meter provider the
//! global meter is a no-op, so recording is always safe.
//!
//! # Metrics Collected
//!
//! - `rpclink.transport.connection.state`: gauge, see [`crate::ConnectionState::as_metric`]
//! - `rpclink.transport.requests.total`: requests settled, by method and status
//! - `rpclink.transport.request.duration`: seconds from send to settlement
//! - `rpclink.transport.errors.total`: failures, by error type
//! - `rpclink.transport.timeouts.total`: requests that hit the timeout
//! - `rpclink.transport.notifications.received`: inbound notifications, by method
//! - `rpclink.transport.reconnection.attempts` / `.success`

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};

/// Instruments for one transport
pub struct TransportMetrics {
    pub connection_state: Gauge<i64>,
    pub requests_total: Counter<u64>,
    pub request_duration: Histogram<f64>,
    pub errors_total: Counter<u64>,
    pub timeouts_total: Counter<u64>,
    pub notifications_received: Counter<u64>,
    pub reconnection_attempts: Counter<u64>,
    pub reconnection_success: Counter<u64>,
}

impl TransportMetrics {
    /// Create instruments on the global meter named after the service
    pub fn new(service_name: impl Into<String>) -> Self {
        // global::meter wants a 'static name; transports are long-lived
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("rpclink.transport.connection.state")
                .with_description(
                    "Connection state (0=disconnected, 1=connecting, 2=connected, 3=reconnecting, 4=failed)",
                )
                .build(),
            requests_total: meter
                .u64_counter("rpclink.transport.requests.total")
                .with_description("Total number of settled requests")
                .build(),
            request_duration: meter
                .f64_histogram("rpclink.transport.request.duration")
                .with_description("Request duration in seconds")
                .build(),
            errors_total: meter
                .u64_counter("rpclink.transport.errors.total")
                .with_description("Total number of errors encountered")
                .build(),
            timeouts_total: meter
                .u64_counter("rpclink.transport.timeouts.total")
                .with_description("Total number of requests that timed out")
                .build(),
            notifications_received: meter
                .u64_counter("rpclink.transport.notifications.received")
                .with_description("Total number of notifications received")
                .build(),
            reconnection_attempts: meter
                .u64_counter("rpclink.transport.reconnection.attempts")
                .with_description("Total number of reconnection attempts")
                .build(),
            reconnection_success: meter
                .u64_counter("rpclink.transport.reconnection.success")
                .with_description("Total number of successful reconnections")
                .build(),
        }
    }

    pub fn update_connection_state(&self, state: i64) {
        self.connection_state.record(state, &[]);
    }

    /// Record a settled request; `status` is "success", "error" or "timeout"
    pub fn record_request(&self, method: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.requests_total.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);
    }

    pub fn record_error(&self, error_type: &str) {
        let attributes = &[KeyValue::new("error_type", error_type.to_string())];
        self.errors_total.add(1, attributes);
    }

    pub fn record_timeout(&self, method: &str) {
        let attributes = &[KeyValue::new("method", method.to_string())];
        self.timeouts_total.add(1, attributes);
    }

    pub fn record_notification(&self, method: &str) {
        let attributes = &[KeyValue::new("method", method.to_string())];
        self.notifications_received.add(1, attributes);
    }

    pub fn record_reconnection_attempt(&self) {
        self.reconnection_attempts.add(1, &[]);
    }

    pub fn record_reconnection_success(&self) {
        self.reconnection_success.add(1, &[]);
    }
}
