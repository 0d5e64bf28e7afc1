//! # doomcode-relay-store
//!
//! In-memory, TTL-bounded state for the relay (§3, §4.3).
//!
//! Three logical tables — connections, sessions, queued envelopes — each
//! keyed by the natural id and backed by a [`dashmap::DashMap`] so that
//! per-key mutations (slot set/clear, queue push/drain) are atomic without a
//! global lock. The relay is explicitly not a durable message log (§1): this
//! store holds nothing on disk, and every entry carries an expiry that is
//! authoritative even if a sweep hasn't run yet.
//!
//! ## Modules
//!
//! - [`connections`] — anonymous and joined connection records
//! - [`sessions`] — session lifecycle and atomic slot mutation
//! - [`queue`] — per-session offline envelope queueing

pub mod connections;
pub mod queue;
pub mod sessions;

use chrono::Duration;
use dashmap::DashMap;
use doomcode_proto::model::{Connection, QueuedEnvelope, Session};

/// Session TTL from creation (§3, §5).
pub const SESSION_TTL: Duration = Duration::hours(24);
/// Queued envelope TTL from enqueue (§3, §5).
pub const QUEUE_TTL: Duration = Duration::hours(24);

/// Errors raised by store operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("slot already occupied for role in session {0}")]
    SlotOccupied(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// The relay's complete in-memory state (§3).
///
/// Cloned cheaply: every field is an `Arc`-backed concurrent map, so a
/// `RelayStore` handle can be shared across connection tasks by `Clone`.
#[derive(Clone, Default)]
pub struct RelayStore {
    connections: DashMap<String, Connection>,
    sessions: DashMap<String, Session>,
    queues: DashMap<String, Vec<QueuedEnvelope>>,
}

impl RelayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every session, connection, and queue entry whose TTL has
    /// passed. Intended to run on a periodic interval from the relay binary
    /// (§5); store operations themselves always re-check expiry so a sweep
    /// lagging behind never causes a stale read to succeed.
    pub fn sweep_expired(&self, now: chrono::DateTime<chrono::Utc>) {
        let expired_sessions: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        for session_id in expired_sessions {
            tracing::debug!(session_id = %session_id, "sweeping expired session");
            self.sessions.remove(&session_id);
            self.queues.remove(&session_id);
        }

        for mut entry in self.queues.iter_mut() {
            entry
                .value_mut()
                .retain(|queued| !queued.is_expired(now, QUEUE_TTL));
        }
    }
}
