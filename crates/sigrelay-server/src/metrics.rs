//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Only one recorder can be
/// installed per process.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format. Empty when no recorder is installed.
pub fn render(handle: Option<&PrometheusHandle>) -> String {
    handle.map(PrometheusHandle::render).unwrap_or_default()
}

/// Payload types that get their own `kind` label.
const LABELLED_KINDS: [&str; 3] = ["offer", "answer", "iceCandidate"];

/// Metric label for a peer-supplied payload `type`. Anything outside the
/// WebRTC signaling set collapses to `"other"` so peers cannot mint series.
pub fn payload_kind_label(kind: &str) -> &'static str {
    LABELLED_KINDS
        .iter()
        .copied()
        .find(|known| *known == kind)
        .unwrap_or("other")
}

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Connections currently in the registry (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused because the connection cap was reached (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Role registrations total (counter, labels: role).
pub const RELAY_REGISTRATIONS_TOTAL: &str = "relay_registrations_total";
/// Payloads accepted for routing, including those with zero recipients
/// (counter, labels: kind from [`payload_kind_label`]).
pub const RELAY_MESSAGES_ROUTED_TOTAL: &str = "relay_messages_routed_total";
/// Inbound messages rejected with an error reply (counter, labels: kind).
pub const RELAY_MESSAGES_REJECTED_TOTAL: &str = "relay_messages_rejected_total";
/// Frames that could not be queued for a recipient (counter, labels: reason).
pub const RELAY_SEND_FAILURES_TOTAL: &str = "relay_send_failures_total";
