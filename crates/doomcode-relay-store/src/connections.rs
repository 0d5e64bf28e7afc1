//! Connection table operations (§3, §4.3).

use doomcode_proto::model::Connection;

use crate::{RelayStore, Result, StoreError};

impl RelayStore {
    /// Register or replace a connection record.
    pub fn put_connection(&self, connection: Connection) {
        self.connections.insert(connection.id.clone(), connection);
    }

    /// Fetch a connection by id.
    pub fn get_connection(&self, connection_id: &str) -> Result<Connection> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::ConnectionNotFound(connection_id.to_string()))
    }

    /// Remove a connection record. Idempotent: removing an absent id is not
    /// an error (mirrors the queue-drain idempotence requirement in §9).
    pub fn delete_connection(&self, connection_id: &str) {
        self.connections.remove(connection_id);
    }
}
