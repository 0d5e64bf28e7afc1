//! Offline envelope queue operations (§3, §4.3, §4.4, §9).

use chrono::{DateTime, Utc};
use doomcode_proto::model::QueuedEnvelope;
use doomcode_proto::Envelope;

use crate::{RelayStore, Result, StoreError, QUEUE_TTL};

impl RelayStore {
    /// Append an envelope to a session's queue. Callers only enqueue
    /// controller-originated envelopes while the operator slot is empty
    /// (§3 invariant); the store itself does not enforce that, since it has
    /// no view of slot state at this call site — [`crate::sessions`] does.
    pub fn enqueue(&self, session_id: &str, envelope: Envelope, now: DateTime<Utc>) -> Result<()> {
        if !self.sessions.contains_key(session_id) {
            return Err(StoreError::SessionNotFound(session_id.to_string()));
        }
        self.queues
            .entry(session_id.to_string())
            .or_default()
            .push(QueuedEnvelope {
                envelope,
                queued_at: now,
            });
        Ok(())
    }

    /// List a session's queue, oldest first, dropping anything past its TTL
    /// as a side effect (the TTL is authoritative even if the periodic sweep
    /// hasn't run yet — §4.3).
    pub fn list_queue(&self, session_id: &str, now: DateTime<Utc>) -> Vec<QueuedEnvelope> {
        let Some(mut entry) = self.queues.get_mut(session_id) else {
            return Vec::new();
        };
        entry.retain(|queued| !queued.is_expired(now, QUEUE_TTL));
        entry.clone()
    }

    /// Delete queued envelopes up to and including `message_id`, in queue
    /// order. Idempotent: if `message_id` is absent from the queue (already
    /// drained, or never present because an ack was reordered), this is a
    /// no-op rather than an error (§9 "replay ordering").
    pub fn delete_queued_up_to(&self, session_id: &str, message_id: &str) {
        let Some(mut entry) = self.queues.get_mut(session_id) else {
            return;
        };
        if let Some(cut) = entry
            .iter()
            .position(|queued| queued.envelope.message_id == message_id)
        {
            entry.drain(0..=cut);
        }
    }

    /// Drop every queued envelope for a session. Used on key rotation
    /// before any replay (§4.4 key-rotation invariant).
    pub fn purge_queue(&self, session_id: &str) {
        if let Some(mut entry) = self.queues.get_mut(session_id) {
            entry.clear();
        }
    }
}
