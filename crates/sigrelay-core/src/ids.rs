use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Transport-assigned key for one WebSocket connection.
///
/// Only used for map lookups; never sent on the wire.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ConnectionKey(String);

impl ConnectionKey {
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Relay-assigned numeric id. Monotonic per process and never reused.
///
/// This is the id peers see (e.g. `request-offer.clientId`).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_key_has_prefix() {
        let key = ConnectionKey::new();
        assert!(key.as_str().starts_with("conn_"), "got: {key}");
    }

    #[test]
    fn connection_keys_are_unique() {
        let a = ConnectionKey::new();
        let b = ConnectionKey::new();
        assert_ne!(a, b);
    }

    #[test]
    fn connection_id_serializes_as_bare_integer() {
        let json = serde_json::to_string(&ConnectionId::new(7)).unwrap();
        assert_eq!(json, "7");
    }

    #[test]
    fn connection_ids_order_by_value() {
        assert!(ConnectionId::new(1) < ConnectionId::new(2));
        assert_eq!(ConnectionId::new(3).get(), 3);
    }
}
