//! Wire envelopes. Every frame is a JSON object with a string `type` field.

use serde::Serialize;
use serde_json::Value;

use crate::errors::RelayError;
use crate::ids::ConnectionId;
use crate::role::Role;

/// Type tag of the registration message.
pub const MODE_TYPE: &str = "mode";

/// What the relay needs to know about an inbound frame.
///
/// Routable payloads are only classified, never decoded further; the raw
/// text is what gets forwarded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// `{"type":"mode","value":"host"|"client"}`
    Register(Role),
    /// Any other `type` (`offer`, `answer`, `iceCandidate`, ...).
    Payload { kind: String },
}

impl Inbound {
    /// Classify a raw text frame.
    ///
    /// Fails with [`RelayError::InvalidMessage`] for anything that is not a
    /// JSON object with a string `type`, and with [`RelayError::InvalidRole`]
    /// for a `mode` message whose `value` is not a known role.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let value: Value = serde_json::from_str(raw).map_err(|_| RelayError::InvalidMessage)?;
        let object = value.as_object().ok_or(RelayError::InvalidMessage)?;
        let kind = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or(RelayError::InvalidMessage)?;

        if kind != MODE_TYPE {
            return Ok(Self::Payload {
                kind: kind.to_owned(),
            });
        }

        match object.get("value") {
            Some(Value::String(role)) => role.parse().map(Self::Register),
            Some(other) => Err(RelayError::InvalidRole(other.to_string())),
            None => Err(RelayError::InvalidRole(String::new())),
        }
    }
}

/// Messages the relay itself originates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Outbound {
    System {
        message: String,
    },
    Error {
        message: String,
    },
    ClientUpdate {
        count: usize,
    },
    RequestOffer {
        #[serde(rename = "clientId")]
        client_id: ConnectionId,
    },
}

impl Outbound {
    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn registered(role: Role) -> Self {
        Self::system(format!("Registered as {role}"))
    }

    /// Wire `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::Error { .. } => "error",
            Self::ClientUpdate { .. } => "client-update",
            Self::RequestOffer { .. } => "request-offer",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_value(msg: &Outbound) -> Value {
        serde_json::from_str(&msg.to_json().unwrap()).unwrap()
    }

    #[test]
    fn parses_host_registration() {
        let msg = Inbound::parse(r#"{"type":"mode","value":"host"}"#).unwrap();
        assert_eq!(msg, Inbound::Register(Role::Host));
    }

    #[test]
    fn parses_client_registration() {
        let msg = Inbound::parse(r#"{"type":"mode","value":"client"}"#).unwrap();
        assert_eq!(msg, Inbound::Register(Role::Client));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = Inbound::parse(r#"{"type":"mode","value":"spectator"}"#).unwrap_err();
        assert_eq!(err, RelayError::InvalidRole("spectator".into()));
    }

    #[test]
    fn non_string_role_is_rejected() {
        let err = Inbound::parse(r#"{"type":"mode","value":3}"#).unwrap_err();
        assert_eq!(err, RelayError::InvalidRole("3".into()));
    }

    #[test]
    fn missing_role_value_is_rejected() {
        let err = Inbound::parse(r#"{"type":"mode"}"#).unwrap_err();
        assert!(matches!(err, RelayError::InvalidRole(_)));
    }

    #[test]
    fn signaling_types_are_payloads() {
        for kind in ["offer", "answer", "iceCandidate", "custom-thing"] {
            let raw = json!({"type": kind, "sdp": "v=0"}).to_string();
            let msg = Inbound::parse(&raw).unwrap();
            assert_eq!(msg, Inbound::Payload { kind: kind.into() });
        }
    }

    #[test]
    fn not_json_is_invalid() {
        assert_eq!(
            Inbound::parse("hello there").unwrap_err(),
            RelayError::InvalidMessage
        );
        assert_eq!(Inbound::parse("").unwrap_err(), RelayError::InvalidMessage);
    }

    #[test]
    fn non_object_json_is_invalid() {
        assert_eq!(
            Inbound::parse(r#"["offer"]"#).unwrap_err(),
            RelayError::InvalidMessage
        );
        assert_eq!(Inbound::parse("42").unwrap_err(), RelayError::InvalidMessage);
    }

    #[test]
    fn missing_or_non_string_type_is_invalid() {
        assert_eq!(
            Inbound::parse(r#"{"sdp":"x"}"#).unwrap_err(),
            RelayError::InvalidMessage
        );
        assert_eq!(
            Inbound::parse(r#"{"type":7}"#).unwrap_err(),
            RelayError::InvalidMessage
        );
    }

    #[test]
    fn outbound_wire_shapes() {
        assert_eq!(
            to_value(&Outbound::system("hi")),
            json!({"type": "system", "message": "hi"})
        );
        assert_eq!(
            to_value(&Outbound::error("bad")),
            json!({"type": "error", "message": "bad"})
        );
        assert_eq!(
            to_value(&Outbound::ClientUpdate { count: 2 }),
            json!({"type": "client-update", "count": 2})
        );
        assert_eq!(
            to_value(&Outbound::RequestOffer {
                client_id: ConnectionId::new(5)
            }),
            json!({"type": "request-offer", "clientId": 5})
        );
    }

    #[test]
    fn registered_confirmation_text() {
        assert_eq!(
            Outbound::registered(Role::Client),
            Outbound::system("Registered as client")
        );
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let msgs = [
            Outbound::system("a"),
            Outbound::error("b"),
            Outbound::ClientUpdate { count: 0 },
            Outbound::RequestOffer {
                client_id: ConnectionId::new(1),
            },
        ];
        for msg in msgs {
            assert_eq!(to_value(&msg)["type"], msg.kind());
        }
    }
}
