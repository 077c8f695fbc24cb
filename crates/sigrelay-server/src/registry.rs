//! Live connections and the role each has declared.

use std::collections::HashMap;

use serde::Serialize;
use sigrelay_core::{ConnectionId, ConnectionKey, RelayError, Role};

use crate::connection::Connection;

/// Per-connection state.
#[derive(Clone, Debug)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    /// `None` until the connection sends a `mode` message.
    pub role: Option<Role>,
    pub connection: Connection,
}

/// Result of a successful [`Registry::set_role`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleAssignment {
    /// The role was unset and is now set.
    Assigned,
    /// The connection already had this exact role.
    Unchanged,
}

/// Point-in-time counts, used by `/health` and the diagnostic log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    pub connections: usize,
    pub hosts: usize,
    pub clients: usize,
    pub unregistered: usize,
}

/// Map from connection key to record.
///
/// Holds exactly the open connections. Not synchronized: the relay actor is
/// its only owner.
#[derive(Debug)]
pub struct Registry {
    records: HashMap<ConnectionKey, ConnectionRecord>,
    next_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            next_id: 1,
        }
    }

    /// Add a connection with no role and hand out its id.
    pub fn register(&mut self, connection: Connection) -> Result<ConnectionId, RelayError> {
        if self.records.contains_key(connection.key()) {
            return Err(RelayError::AlreadyConnected);
        }
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        let _ = self.records.insert(
            connection.key().clone(),
            ConnectionRecord {
                id,
                role: None,
                connection,
            },
        );
        Ok(id)
    }

    /// Set the role of a registered connection.
    ///
    /// A role is set at most once: repeating the same role is a no-op,
    /// asking for the other role is a [`RelayError::RoleConflict`].
    pub fn set_role(
        &mut self,
        key: &ConnectionKey,
        role: Role,
    ) -> Result<RoleAssignment, RelayError> {
        let record = self
            .records
            .get_mut(key)
            .ok_or(RelayError::UnregisteredConnection)?;
        match record.role {
            None => {
                record.role = Some(role);
                Ok(RoleAssignment::Assigned)
            }
            Some(current) if current == role => Ok(RoleAssignment::Unchanged),
            Some(current) => Err(RelayError::RoleConflict {
                current,
                requested: role,
            }),
        }
    }

    /// Remove a connection. Returns `None` if it was already gone.
    pub fn unregister(&mut self, key: &ConnectionKey) -> Option<ConnectionRecord> {
        self.records.remove(key)
    }

    pub fn get(&self, key: &ConnectionKey) -> Option<&ConnectionRecord> {
        self.records.get(key)
    }

    pub fn role_of(&self, key: &ConnectionKey) -> Option<Role> {
        self.records.get(key).and_then(|r| r.role)
    }

    pub fn count_by_role(&self, role: Role) -> usize {
        self.records
            .values()
            .filter(|r| r.role == Some(role))
            .count()
    }

    /// Visit every connection with `role`. Order is unspecified.
    pub fn for_each(&self, role: Role, mut f: impl FnMut(&ConnectionRecord)) {
        self.records
            .values()
            .filter(|r| r.role == Some(role))
            .for_each(|r| f(r));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let hosts = self.count_by_role(Role::Host);
        let clients = self.count_by_role(Role::Client);
        RegistrySnapshot {
            connections: self.records.len(),
            hosts,
            clients,
            unregistered: self.records.len() - hosts - clients,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
