//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

use crate::registry::RegistrySnapshot;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the relay actor is running, `"unavailable"` otherwise.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    #[serde(flatten)]
    pub registry: RegistrySnapshot,
}

/// Build a health response. `None` means the relay could not be reached.
pub fn health_check(start_time: Instant, snapshot: Option<RegistrySnapshot>) -> HealthResponse {
    HealthResponse {
        status: if snapshot.is_some() { "ok" } else { "unavailable" },
        uptime_secs: start_time.elapsed().as_secs(),
        registry: snapshot.unwrap_or_default(),
    }
}

impl HealthResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
