//! Session table operations (§3, §4.3, §4.4).
//!
//! Slot mutation goes through [`RelayStore::claim_session_slot`] and
//! [`RelayStore::force_claim_session_slot`] rather than a plain setter:
//! `dashmap::DashMap::get_mut` holds that key's shard lock for the duration
//! of the closure, so the read-then-write that decides "is this role
//! already occupied" is one atomic step — two concurrent joins for the same
//! role cannot both observe an empty slot.

use chrono::{DateTime, Utc};
use doomcode_proto::model::{Role, Session, SessionSlot};

use crate::{RelayStore, Result, StoreError, SESSION_TTL};

/// Outcome of an uncontested-by-default slot claim attempt (§4.4).
#[derive(Debug, Clone)]
pub enum SlotClaim {
    /// The slot was empty and is now held by this connection. Carries the
    /// peer's slot, if any, so the caller can reply `session_joined` and
    /// notify the peer in one pass, plus whether an operator join changed
    /// the session's operator public key since it was last recorded (§4.4
    /// key-rotation invariant — always `false` for a controller join).
    Claimed {
        peer_slot: Option<SessionSlot>,
        operator_key_rotated: bool,
    },
    /// The slot was already held. The caller must probe the incumbent
    /// before deciding between `ALREADY_CONNECTED` and eviction.
    Occupied { existing: SessionSlot },
}

/// Update `session.last_operator_public_key` when `role` is the operator,
/// returning whether this differs from whatever key was recorded before.
/// A `None` previous value (first-ever operator join) never counts as
/// rotation — there is nothing to invalidate yet.
fn record_operator_key(session: &mut Session, role: Role, public_key: &str) -> bool {
    if role != Role::Operator {
        return false;
    }
    let rotated = matches!(
        &session.last_operator_public_key,
        Some(previous) if previous != public_key
    );
    session.last_operator_public_key = Some(public_key.to_string());
    rotated
}

impl RelayStore {
    /// Allocate a fresh session with the standard 24h TTL (§3, §5).
    pub fn create_session(&self, session_id: String, now: DateTime<Utc>) -> Session {
        let session = Session {
            id: session_id.clone(),
            created_at: now,
            expires_at: now + SESSION_TTL,
            controller: None,
            operator: None,
            last_operator_public_key: None,
        };
        self.sessions.insert(session_id, session.clone());
        session
    }

    /// Fetch a session, treating an expired session as absent (§3: "no
    /// operation is permitted on an expired session").
    pub fn get_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<Session> {
        let session = self
            .sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;

        if session.is_expired(now) {
            self.sessions.remove(session_id);
            self.queues.remove(session_id);
            return Err(StoreError::SessionExpired(session_id.to_string()));
        }
        Ok(session)
    }

    /// Attempt to occupy `role`'s slot. Fails closed on an absent or expired
    /// session; otherwise atomically claims an empty slot or reports the
    /// occupant for the caller to probe.
    pub fn claim_session_slot(
        &self,
        session_id: &str,
        role: Role,
        connection_id: String,
        public_key: String,
        now: DateTime<Utc>,
    ) -> Result<SlotClaim> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;

        if entry.is_expired(now) {
            drop(entry);
            self.sessions.remove(session_id);
            self.queues.remove(session_id);
            return Err(StoreError::SessionExpired(session_id.to_string()));
        }

        let slot_ref = match role {
            Role::Controller => &mut entry.controller,
            Role::Operator => &mut entry.operator,
        };

        if let Some(existing) = slot_ref.clone() {
            return Ok(SlotClaim::Occupied { existing });
        }

        *slot_ref = Some(SessionSlot {
            connection_id,
            public_key: public_key.clone(),
        });

        let operator_key_rotated = record_operator_key(&mut entry, role, &public_key);

        let peer_slot = match role {
            Role::Controller => entry.operator.clone(),
            Role::Operator => entry.controller.clone(),
        };
        Ok(SlotClaim::Claimed {
            peer_slot,
            operator_key_rotated,
        })
    }

    /// Unconditionally occupy `role`'s slot, evicting whatever was there.
    /// Used only after the relay handler's liveness probe confirms the
    /// incumbent is `Gone` (§4.4). Returns the evicted slot (if any) and
    /// whether this changed the session's recorded operator key.
    pub fn force_claim_session_slot(
        &self,
        session_id: &str,
        role: Role,
        connection_id: String,
        public_key: String,
        now: DateTime<Utc>,
    ) -> Result<(Option<SessionSlot>, bool)> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;

        if entry.is_expired(now) {
            drop(entry);
            self.sessions.remove(session_id);
            self.queues.remove(session_id);
            return Err(StoreError::SessionExpired(session_id.to_string()));
        }

        let slot_ref = match role {
            Role::Controller => &mut entry.controller,
            Role::Operator => &mut entry.operator,
        };
        let evicted = slot_ref.take();
        *slot_ref = Some(SessionSlot {
            connection_id,
            public_key: public_key.clone(),
        });
        let operator_key_rotated = record_operator_key(&mut entry, role, &public_key);
        Ok((evicted, operator_key_rotated))
    }

    /// Clear a role's slot. Idempotent: clearing an absent session or an
    /// already-empty slot is not an error (§9 replay-ordering idempotence
    /// applies equally here).
    pub fn clear_session_slot(&self, session_id: &str, role: Role) -> Option<SessionSlot> {
        let mut entry = self.sessions.get_mut(session_id)?;
        let slot_ref = match role {
            Role::Controller => &mut entry.controller,
            Role::Operator => &mut entry.operator,
        };
        slot_ref.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_roundtrips() {
        let store = RelayStore::new();
        let now = Utc::now();
        store.create_session("s1".into(), now);
        let session = store.get_session("s1", now).expect("get");
        assert_eq!(session.id, "s1");
        assert!(session.controller.is_none());
    }

    #[test]
    fn expired_session_is_treated_as_absent() {
        let store = RelayStore::new();
        let now = Utc::now();
        store.create_session("s1".into(), now);
        let later = now + chrono::Duration::hours(25);
        let err = store.get_session("s1", later).unwrap_err();
        assert_eq!(err, StoreError::SessionExpired("s1".into()));
        assert!(store.get_session("s1", later).is_err());
    }

    #[test]
    fn claim_empty_slot_succeeds_and_reports_peer() {
        let store = RelayStore::new();
        let now = Utc::now();
        store.create_session("s1".into(), now);

        let claim = store
            .claim_session_slot("s1", Role::Controller, "c1".into(), "pk1".into(), now)
            .expect("claim");
        assert!(matches!(
            claim,
            SlotClaim::Claimed {
                peer_slot: None,
                operator_key_rotated: false,
            }
        ));

        let claim = store
            .claim_session_slot("s1", Role::Operator, "c2".into(), "pk2".into(), now)
            .expect("claim");
        match claim {
            SlotClaim::Claimed {
                peer_slot: Some(peer),
                operator_key_rotated,
            } => {
                assert_eq!(peer.connection_id, "c1");
                // First-ever operator join: nothing to rotate away from.
                assert!(!operator_key_rotated);
            }
            other => panic!("expected claimed with peer, got {other:?}"),
        }
    }

    #[test]
    fn operator_rejoin_with_different_key_is_reported_as_rotated() {
        let store = RelayStore::new();
        let now = Utc::now();
        store.create_session("s1".into(), now);
        store
            .claim_session_slot("s1", Role::Operator, "c1".into(), "pk1".into(), now)
            .expect("first operator join");
        store.clear_session_slot("s1", Role::Operator);

        let claim = store
            .claim_session_slot("s1", Role::Operator, "c2".into(), "pk2".into(), now)
            .expect("second operator join with new key");
        match claim {
            SlotClaim::Claimed {
                operator_key_rotated,
                ..
            } => assert!(operator_key_rotated),
            other => panic!("expected claimed, got {other:?}"),
        }
    }

    #[test]
    fn operator_rejoin_with_same_key_is_not_rotated() {
        let store = RelayStore::new();
        let now = Utc::now();
        store.create_session("s1".into(), now);
        store
            .claim_session_slot("s1", Role::Operator, "c1".into(), "pk1".into(), now)
            .expect("first operator join");
        store.clear_session_slot("s1", Role::Operator);

        let claim = store
            .claim_session_slot("s1", Role::Operator, "c2".into(), "pk1".into(), now)
            .expect("second operator join with same key");
        match claim {
            SlotClaim::Claimed {
                operator_key_rotated,
                ..
            } => assert!(!operator_key_rotated),
            other => panic!("expected claimed, got {other:?}"),
        }
    }

    #[test]
    fn claim_occupied_slot_reports_existing() {
        let store = RelayStore::new();
        let now = Utc::now();
        store.create_session("s1".into(), now);
        store
            .claim_session_slot("s1", Role::Controller, "c1".into(), "pk1".into(), now)
            .expect("first claim");

        let claim = store
            .claim_session_slot("s1", Role::Controller, "c2".into(), "pk2".into(), now)
            .expect("second claim attempt");
        match claim {
            SlotClaim::Occupied { existing } => assert_eq!(existing.connection_id, "c1"),
            other => panic!("expected occupied, got {other:?}"),
        }
    }

    #[test]
    fn force_claim_evicts_incumbent() {
        let store = RelayStore::new();
        let now = Utc::now();
        store.create_session("s1".into(), now);
        store
            .claim_session_slot("s1", Role::Controller, "c1".into(), "pk1".into(), now)
            .expect("first claim");

        let (evicted, operator_key_rotated) = store
            .force_claim_session_slot("s1", Role::Controller, "c2".into(), "pk2".into(), now)
            .expect("force claim");
        assert_eq!(evicted.unwrap().connection_id, "c1");
        assert!(!operator_key_rotated);

        let session = store.get_session("s1", now).expect("get");
        assert_eq!(
            session.controller.expect("slot set").connection_id,
            "c2"
        );
    }

    #[test]
    fn clear_slot_is_idempotent() {
        let store = RelayStore::new();
        let now = Utc::now();
        store.create_session("s1".into(), now);
        store
            .claim_session_slot("s1", Role::Controller, "c1".into(), "pk1".into(), now)
            .expect("claim");

        let cleared = store.clear_session_slot("s1", Role::Controller);
        assert!(cleared.is_some());
        assert!(store.clear_session_slot("s1", Role::Controller).is_none());
        assert!(store.clear_session_slot("missing-session", Role::Controller).is_none());
    }
}
