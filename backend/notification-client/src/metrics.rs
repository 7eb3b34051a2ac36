use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder,
};

use crate::models::ConnectionState;

static NOTIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_client_push_messages_total",
            "Inbound live-channel messages by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create notification_client_push_messages_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_client_push_messages_total");
    counter
});

static RECONNECT_ATTEMPTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "notification_client_reconnect_attempts_total",
        "Automatic reconnect attempts scheduled by the connection manager",
    )
    .expect("failed to create notification_client_reconnect_attempts_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_client_reconnect_attempts_total");
    counter
});

static CONNECTION_STATE: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "notification_client_connection_state",
        "Live channel state (0 = disconnected, 1 = connecting, 2 = connected)",
    )
    .expect("failed to create notification_client_connection_state");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register notification_client_connection_state");
    gauge
});

static REST_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_client_rest_requests_total",
            "REST calls issued to the backend",
        ),
        &["method", "operation", "status"],
    )
    .expect("failed to create notification_client_rest_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_client_rest_requests_total");
    counter
});

static REST_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "notification_client_rest_request_duration_seconds",
            "REST call latency",
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["method", "operation"],
    )
    .expect("failed to create notification_client_rest_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register notification_client_rest_request_duration_seconds");
    histogram
});

pub fn record_delivered() {
    NOTIFICATIONS_TOTAL.with_label_values(&["delivered"]).inc();
}

pub fn record_duplicate() {
    NOTIFICATIONS_TOTAL.with_label_values(&["duplicate"]).inc();
}

pub fn record_malformed() {
    NOTIFICATIONS_TOTAL.with_label_values(&["malformed"]).inc();
}

pub fn record_reconnect_attempt() {
    RECONNECT_ATTEMPTS_TOTAL.inc();
}

pub fn set_connection_state(state: ConnectionState) {
    let value = match state {
        ConnectionState::Disconnected => 0,
        ConnectionState::Connecting => 1,
        ConnectionState::Connected => 2,
    };
    CONNECTION_STATE.set(value);
}

/// `status` is the HTTP status code, or 0 when no response arrived
pub fn observe_rest_call(method: &str, operation: &str, status: u16, elapsed: Duration) {
    let status_label = status.to_string();
    REST_REQUESTS_TOTAL
        .with_label_values(&[method, operation, &status_label])
        .inc();
    REST_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, operation])
        .observe(elapsed.as_secs_f64());
}

/// Render the default registry in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %err, "failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}
