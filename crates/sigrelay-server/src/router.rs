//! Inbound message routing: registration, authorization, role fan-out.

use metrics::counter;
use sigrelay_core::{ConnectionId, ConnectionKey, Inbound, Outbound, RelayError, Role};
use tracing::{debug, info, warn};

use crate::connection::Frame;
use crate::metrics::{
    payload_kind_label, RELAY_MESSAGES_REJECTED_TOTAL, RELAY_MESSAGES_ROUTED_TOTAL,
    RELAY_REGISTRATIONS_TOTAL,
};
use crate::notify;
use crate::registry::{Registry, RoleAssignment};

/// What happened to one inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The sender declared a role (or repeated the one it had).
    Registered {
        id: ConnectionId,
        role: Role,
        assignment: RoleAssignment,
    },
    /// A payload was forwarded to `recipients` connections (possibly zero).
    Forwarded { kind: String, recipients: usize },
    /// The message was refused; the sender got an `error` reply if it is
    /// still registered.
    Rejected(RelayError),
}

/// Handle one text frame from `sender`.
///
/// Routable payloads are forwarded as the exact `raw` text.
pub fn route(registry: &mut Registry, sender: &ConnectionKey, raw: &str) -> RouteOutcome {
    let outcome = match Inbound::parse(raw) {
        Ok(Inbound::Register(role)) => register(registry, sender, role),
        Ok(Inbound::Payload { kind }) => forward(registry, sender, kind, raw),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(outcome) => outcome,
        Err(e) => reject(registry, sender, e),
    }
}

fn reject(registry: &Registry, sender: &ConnectionKey, err: RelayError) -> RouteOutcome {
    counter!(RELAY_MESSAGES_REJECTED_TOTAL, "kind" => err.error_kind()).increment(1);
    match registry.get(sender) {
        Some(record) => {
            debug!(conn_id = %record.id, error = %err, "rejected message");
            let _ = notify::error_message(&record.connection, err.reply_text());
        }
        None => warn!(conn = %sender, error = %err, "message from unknown connection"),
    }
    RouteOutcome::Rejected(err)
}

fn register(
    registry: &mut Registry,
    sender: &ConnectionKey,
    role: Role,
) -> Result<RouteOutcome, RelayError> {
    let assignment = registry.set_role(sender, role)?;
    let record = registry
        .get(sender)
        .ok_or(RelayError::UnregisteredConnection)?;
    let id = record.id;
    let _ = notify::send(&record.connection, &Outbound::registered(role));

    if assignment == RoleAssignment::Assigned {
        counter!(RELAY_REGISTRATIONS_TOTAL, "role" => role.as_str()).increment(1);
        info!(conn_id = %id, %role, "connection registered");
        if role == Role::Client {
            let _ = notify::broadcast_client_count(registry);
            let _ = notify::request_offer(registry, id);
        }
    }

    Ok(RouteOutcome::Registered {
        id,
        role,
        assignment,
    })
}

fn forward(
    registry: &Registry,
    sender: &ConnectionKey,
    kind: String,
    raw: &str,
) -> Result<RouteOutcome, RelayError> {
    let record = registry
        .get(sender)
        .ok_or(RelayError::UnregisteredConnection)?;
    let role = record.role.ok_or(RelayError::NotRegistered)?;
    let target = role.opposite();

    let recipients = notify::fan_out(registry, target, Some(sender), &Frame::from(raw), &kind);
    counter!(RELAY_MESSAGES_ROUTED_TOTAL, "kind" => payload_kind_label(&kind)).increment(1);
    debug!(
        conn_id = %record.id,
        from = %role,
        to = %target,
        kind = kind.as_str(),
        recipients,
        "forwarded payload"
    );

    Ok(RouteOutcome::Forwarded { kind, recipients })
}
