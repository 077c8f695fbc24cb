use crate::role::Role;

/// Problems the relay reports for a single message or connection.
///
/// None of these are fatal to the process; the connection that caused them
/// stays open.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("invalid message format")]
    InvalidMessage,
    #[error("invalid role: {0}")]
    InvalidRole(String),
    #[error("connection is not in the registry")]
    UnregisteredConnection,
    #[error("connection has not declared a role")]
    NotRegistered,
    #[error("connection is already in the registry")]
    AlreadyConnected,
    #[error("already registered as {current}, cannot switch to {requested}")]
    RoleConflict { current: Role, requested: Role },
}

impl RelayError {
    /// Text sent back to the peer in an `error` envelope.
    pub fn reply_text(&self) -> String {
        match self {
            Self::InvalidMessage => "Invalid message format".into(),
            Self::InvalidRole(value) => format!("Invalid role: {value}"),
            Self::NotRegistered | Self::UnregisteredConnection => "Must register first".into(),
            Self::AlreadyConnected => "Connection already open".into(),
            Self::RoleConflict { current, .. } => format!("Already registered as {current}"),
        }
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidMessage => "invalid_message",
            Self::InvalidRole(_) => "invalid_role",
            Self::UnregisteredConnection => "unregistered_connection",
            Self::NotRegistered => "not_registered",
            Self::AlreadyConnected => "already_connected",
            Self::RoleConflict { .. } => "role_conflict",
        }
    }
}
