//! Relay-originated notifications and role fan-out.
//!
//! Every send is independent: a failing recipient is logged and skipped,
//! never aborting delivery to the others.

use metrics::counter;
use sigrelay_core::{ConnectionId, ConnectionKey, Outbound, Role};
use tracing::{debug, warn};

use crate::connection::{Connection, Frame, SendError};
use crate::metrics::RELAY_SEND_FAILURES_TOTAL;
use crate::registry::Registry;

fn record_failure(connection: &Connection, kind: &str, err: &SendError) {
    counter!(RELAY_SEND_FAILURES_TOTAL, "reason" => err.error_kind()).increment(1);
    warn!(conn = %connection.key(), kind, error = %err, "failed to send to connection");
}

/// Queue a relay message for one connection. Returns whether it was queued.
pub fn send(connection: &Connection, message: &Outbound) -> bool {
    match connection.send_outbound(message) {
        Ok(()) => true,
        Err(e) => {
            record_failure(connection, message.kind(), &e);
            false
        }
    }
}

pub fn system_message(connection: &Connection, text: impl Into<String>) -> bool {
    send(connection, &Outbound::system(text))
}

pub fn error_message(connection: &Connection, text: impl Into<String>) -> bool {
    send(connection, &Outbound::error(text))
}

/// Queue `frame` for every connection with `role`, skipping `except`.
///
/// Returns the number of connections the frame was queued for.
pub fn fan_out(
    registry: &Registry,
    role: Role,
    except: Option<&ConnectionKey>,
    frame: &Frame,
    kind: &str,
) -> usize {
    let mut delivered = 0;
    registry.for_each(role, |record| {
        if except == Some(record.connection.key()) {
            return;
        }
        if !record.connection.is_writable() {
            debug!(conn_id = %record.id, kind, "skipping connection that is no longer writable");
            return;
        }
        match record.connection.send(frame.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => record_failure(&record.connection, kind, &e),
        }
    });
    delivered
}

fn broadcast_to_hosts(registry: &Registry, message: &Outbound) -> usize {
    let json = match message.to_json() {
        Ok(json) => json,
        Err(e) => {
            warn!(kind = message.kind(), error = %e, "failed to serialize notification");
            return 0;
        }
    };
    fan_out(registry, Role::Host, None, &Frame::from(json), message.kind())
}

/// Tell every host how many clients are registered right now.
pub fn broadcast_client_count(registry: &Registry) -> usize {
    let count = registry.count_by_role(Role::Client);
    let recipients = broadcast_to_hosts(registry, &Outbound::ClientUpdate { count });
    debug!(count, recipients, "broadcast client count");
    recipients
}

/// Ask every host to send a fresh offer for a newly joined client.
pub fn request_offer(registry: &Registry, client_id: ConnectionId) -> usize {
    let recipients = broadcast_to_hosts(registry, &Outbound::RequestOffer { client_id });
    debug!(%client_id, recipients, "requested offer from hosts");
    recipients
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::sync::mpsc;

    fn add(
        registry: &mut Registry,
        role: Option<Role>,
    ) -> (Connection, mpsc::Receiver<Frame>) {
        let (conn, rx) = Connection::channel(8);
        let _ = registry.register(conn.clone()).unwrap();
        if let Some(role) = role {
            let _ = registry.set_role(conn.key(), role).unwrap();
        }
        (conn, rx)
    }

    fn recv_json(rx: &mut mpsc::Receiver<Frame>) -> Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    #[test]
    fn client_count_goes_to_hosts_only() {
        let mut reg = Registry::new();
        let (_h1, mut rh1) = add(&mut reg, Some(Role::Host));
        let (_h2, mut rh2) = add(&mut reg, Some(Role::Host));
        let (_c, mut rc) = add(&mut reg, Some(Role::Client));
        let (_u, mut ru) = add(&mut reg, None);

        assert_eq!(broadcast_client_count(&reg), 2);
        for rx in [&mut rh1, &mut rh2] {
            let msg = recv_json(rx);
            assert_eq!(msg["type"], "client-update");
            assert_eq!(msg["count"], 1);
        }
        assert!(rc.try_recv().is_err());
        assert!(ru.try_recv().is_err());
    }

    #[test]
    fn request_offer_carries_client_id() {
        let mut reg = Registry::new();
        let (_h, mut rh) = add(&mut reg, Some(Role::Host));
        assert_eq!(request_offer(&reg, ConnectionId::new(9)), 1);
        let msg = recv_json(&mut rh);
        assert_eq!(msg["type"], "request-offer");
        assert_eq!(msg["clientId"], 9);
    }

    #[test]
    fn failing_recipient_does_not_abort_broadcast() {
        let mut reg = Registry::new();
        let (_dead, dead_rx) = add(&mut reg, Some(Role::Host));
        let (full, _full_rx) = add(&mut reg, Some(Role::Host));
        let (_ok, mut ok_rx) = add(&mut reg, Some(Role::Host));
        drop(dead_rx);
        for _ in 0..8 {
            full.send(Frame::from("filler")).unwrap();
        }

        assert_eq!(broadcast_client_count(&reg), 1);
        assert_eq!(recv_json(&mut ok_rx)["count"], 0);
    }

    #[test]
    fn fan_out_skips_sender() {
        let mut reg = Registry::new();
        let (a, mut ra) = add(&mut reg, Some(Role::Client));
        let (_b, mut rb) = add(&mut reg, Some(Role::Client));
        let frame = Frame::from(r#"{"type":"ping"}"#);
        assert_eq!(fan_out(&reg, Role::Client, Some(a.key()), &frame, "ping"), 1);
        assert!(ra.try_recv().is_err());
        assert_eq!(&*rb.try_recv().unwrap(), r#"{"type":"ping"}"#);
    }

    #[test]
    fn no_hosts_means_no_recipients() {
        let mut reg = Registry::new();
        let (_c, _rc) = add(&mut reg, Some(Role::Client));
        assert_eq!(broadcast_client_count(&reg), 0);
        assert_eq!(request_offer(&reg, ConnectionId::new(1)), 0);
    }

    #[test]
    fn single_recipient_messages() {
        let (conn, mut rx) = Connection::channel(4);
        assert!(system_message(&conn, "welcome"));
        assert!(error_message(&conn, "nope"));
        let first = recv_json(&mut rx);
        assert_eq!(first["type"], "system");
        assert_eq!(first["message"], "welcome");
        let second = recv_json(&mut rx);
        assert_eq!(second["type"], "error");
        assert_eq!(second["message"], "nope");
    }

    #[test]
    fn send_to_closed_connection_reports_false() {
        let (conn, rx) = Connection::channel(4);
        drop(rx);
        assert!(!system_message(&conn, "gone"));
    }
}
