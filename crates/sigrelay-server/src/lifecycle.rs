//! Connection open/close handling.

use std::fmt;

use metrics::{counter, gauge};
use sigrelay_core::{ConnectionId, ConnectionKey, Role};
use tracing::{error, info, warn};

use crate::connection::Connection;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::notify;
use crate::registry::{ConnectionRecord, Registry};

/// Text of the `system` message every new connection receives.
pub const WELCOME_MESSAGE: &str = "Connected to signaling server";

/// Why a connection left the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Close frame or end of stream.
    Closed,
    /// Transport error on the socket.
    Error(String),
    /// No pong within the heartbeat timeout.
    TimedOut,
    /// Server shutdown.
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Error(_) => "error",
            Self::TimedOut => "timed_out",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(e) => write!(f, "error: {e}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Add a freshly opened connection and greet it.
///
/// Returns `None` if the key was already present; that connection keeps
/// its existing record.
pub fn on_open(registry: &mut Registry, connection: Connection) -> Option<ConnectionId> {
    let greeter = connection.clone();
    match registry.register(connection) {
        Ok(id) => {
            counter!(WS_CONNECTIONS_TOTAL).increment(1);
            gauge!(WS_CONNECTIONS_ACTIVE).set(registry.len() as f64);
            info!(conn_id = %id, conn = %greeter.key(), "connection opened");
            let _ = notify::system_message(&greeter, WELCOME_MESSAGE);
            Some(id)
        }
        Err(e) => {
            error!(conn = %greeter.key(), error = %e, "duplicate connection open ignored");
            None
        }
    }
}

/// Remove a closed connection. Hosts hear about it when a client leaves.
///
/// Idempotent: closing an unknown connection does nothing.
pub fn on_close(
    registry: &mut Registry,
    key: &ConnectionKey,
    reason: &CloseReason,
) -> Option<ConnectionRecord> {
    let record = registry.unregister(key)?;

    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).set(registry.len() as f64);
    match reason {
        CloseReason::Error(e) => {
            warn!(conn_id = %record.id, role = ?record.role, error = %e, "connection failed");
        }
        _ => info!(conn_id = %record.id, role = ?record.role, %reason, "connection closed"),
    }

    if record.role == Some(Role::Client) {
        let _ = notify::broadcast_client_count(registry);
    }
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Frame;
    use serde_json::Value;
    use tokio::sync::mpsc;

    fn open(registry: &mut Registry) -> (Connection, mpsc::Receiver<Frame>) {
        let (conn, mut rx) = Connection::channel(8);
        let _ = on_open(registry, conn.clone()).unwrap();
        let welcome: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(welcome["type"], "system");
        (conn, rx)
    }

    fn with_role(
        registry: &mut Registry,
        role: Role,
    ) -> (Connection, mpsc::Receiver<Frame>) {
        let (conn, rx) = open(registry);
        let _ = registry.set_role(conn.key(), role).unwrap();
        (conn, rx)
    }

    #[test]
    fn open_registers_and_welcomes() {
        let mut reg = Registry::new();
        let (conn, mut rx) = Connection::channel(8);
        let id = on_open(&mut reg, conn.clone()).unwrap();
        assert_eq!(reg.get(conn.key()).unwrap().id, id);
        assert_eq!(reg.role_of(conn.key()), None);

        let msg: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(msg["type"], "system");
        assert_eq!(msg["message"], WELCOME_MESSAGE);
    }

    #[test]
    fn duplicate_open_is_ignored() {
        let mut reg = Registry::new();
        let (conn, _rx) = open(&mut reg);
        assert!(on_open(&mut reg, conn).is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn client_close_updates_hosts() {
        let mut reg = Registry::new();
        let (_host, mut host_rx) = with_role(&mut reg, Role::Host);
        let (client, _client_rx) = with_role(&mut reg, Role::Client);

        let removed = on_close(&mut reg, client.key(), &CloseReason::Closed).unwrap();
        assert_eq!(removed.role, Some(Role::Client));

        let msg: Value = serde_json::from_str(&host_rx.try_recv().unwrap()).unwrap();
        assert_eq!(msg["type"], "client-update");
        assert_eq!(msg["count"], 0);
    }

    #[test]
    fn host_close_is_silent() {
        let mut reg = Registry::new();
        let (host, _host_rx) = with_role(&mut reg, Role::Host);
        let (_other, mut other_rx) = with_role(&mut reg, Role::Host);
        let (_client, mut client_rx) = with_role(&mut reg, Role::Client);

        let _ = on_close(&mut reg, host.key(), &CloseReason::Closed).unwrap();
        assert!(other_rx.try_recv().is_err());
        assert!(client_rx.try_recv().is_err());
    }

    #[test]
    fn unregistered_close_is_silent() {
        let mut reg = Registry::new();
        let (_host, mut host_rx) = with_role(&mut reg, Role::Host);
        let (stranger, _rx) = open(&mut reg);
        let _ = on_close(&mut reg, stranger.key(), &CloseReason::Closed).unwrap();
        assert!(host_rx.try_recv().is_err());
    }

    #[test]
    fn error_is_treated_like_close() {
        let mut reg = Registry::new();
        let (_host, mut host_rx) = with_role(&mut reg, Role::Host);
        let (client, _client_rx) = with_role(&mut reg, Role::Client);

        let reason = CloseReason::Error("connection reset".into());
        assert!(on_close(&mut reg, client.key(), &reason).is_some());
        assert!(reg.get(client.key()).is_none());
        let msg: Value = serde_json::from_str(&host_rx.try_recv().unwrap()).unwrap();
        assert_eq!(msg["count"], 0);
    }

    #[test]
    fn close_twice_has_no_extra_effect() {
        let mut reg = Registry::new();
        let (_host, mut host_rx) = with_role(&mut reg, Role::Host);
        let (client, _client_rx) = with_role(&mut reg, Role::Client);

        assert!(on_close(&mut reg, client.key(), &CloseReason::Closed).is_some());
        let _ = host_rx.try_recv().unwrap();
        assert!(on_close(&mut reg, client.key(), &CloseReason::Closed).is_none());
        assert!(host_rx.try_recv().is_err());
    }

    #[test]
    fn close_with_vanished_host_does_not_fail() {
        let mut reg = Registry::new();
        let (_host, host_rx) = with_role(&mut reg, Role::Host);
        let (client, _client_rx) = with_role(&mut reg, Role::Client);
        drop(host_rx);
        assert!(on_close(&mut reg, client.key(), &CloseReason::TimedOut).is_some());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn close_reason_display() {
        assert_eq!(CloseReason::Closed.to_string(), "closed");
        assert_eq!(CloseReason::TimedOut.to_string(), "timed_out");
        assert_eq!(
            CloseReason::Error("boom".into()).to_string(),
            "error: boom"
        );
    }
}
