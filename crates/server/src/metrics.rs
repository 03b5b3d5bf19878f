//! Prometheus metrics
//!
//! Counters are recorded through the `metrics` facade; the Prometheus
//! recorder is installed once at startup and rendered at `/metrics`.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use voice_agent_core::HandshakeState;

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder. Safe to call more than once.
pub fn init_metrics() -> Option<PrometheusHandle> {
    PROMETHEUS
        .get_or_try_init(|| PrometheusBuilder::new().install_recorder())
        .map(Clone::clone)
        .map_err(|e| tracing::warn!(error = %e, "Failed to install Prometheus recorder"))
        .ok()
}

/// `GET /metrics`
pub async fn metrics_handler() -> Response {
    match PROMETHEUS.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics disabled").into_response(),
    }
}

/// Inbound webhook outcome: `accepted` or the rejection kind
pub fn record_inbound_webhook(provider: Option<&'static str>, outcome: &'static str) {
    metrics::counter!(
        "telephony_inbound_webhooks_total",
        "provider" => provider.unwrap_or("unknown"),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_status_callback(provider: &str, duplicate: bool) {
    metrics::counter!(
        "telephony_status_callbacks_total",
        "provider" => provider.to_string(),
        "duplicate" => if duplicate { "true" } else { "false" }
    )
    .increment(1);
}

/// Final handshake state: `streaming` or the close reason
pub fn record_handshake(provider: &'static str, state: &HandshakeState) {
    let outcome = match state {
        HandshakeState::Closed(reason) => reason.as_str(),
        HandshakeState::Streaming => "streaming",
        _ => "incomplete",
    };
    metrics::counter!(
        "telephony_handshakes_total",
        "provider" => provider,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_vendor_call(provider: &'static str, operation: &'static str, success: bool) {
    metrics::counter!(
        "telephony_vendor_calls_total",
        "provider" => provider,
        "operation" => operation,
        "result" => if success { "ok" } else { "error" }
    )
    .increment(1);
}
