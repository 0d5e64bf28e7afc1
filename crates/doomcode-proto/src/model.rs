//! Data-model records (§3): sessions, connections, keypairs-on-the-wire,
//! pairing payloads, queued envelopes, and controller-side patch tracking
//! records.

use serde::{Deserialize, Serialize};

/// Which side of the channel a connection or envelope belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Controller,
    Operator,
}

impl Role {
    pub fn other(self) -> Role {
        match self {
            Role::Controller => Role::Operator,
            Role::Operator => Role::Controller,
        }
    }
}

/// A session's per-role binding to a live connection and a public key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSlot {
    pub connection_id: String,
    /// Base64-encoded X25519 public key.
    pub public_key: String,
}

/// A controller/operator pair bound by a shared id and a pair of public
/// keys, bounded by a 24h TTL from creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub controller: Option<SessionSlot>,
    pub operator: Option<SessionSlot>,
    /// The operator public key last bound to this session, kept across
    /// disconnects (unlike `operator.publicKey`, which disappears when the
    /// slot is cleared). Lets a later operator join detect key rotation
    /// even after the old operator has gone and the slot sits empty (§4.4).
    #[serde(default)]
    pub last_operator_public_key: Option<String>,
}

impl Session {
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn slot(&self, role: Role) -> &Option<SessionSlot> {
        match role {
            Role::Controller => &self.controller,
            Role::Operator => &self.operator,
        }
    }
}

/// A live transport connection. Belongs to at most one session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub session_id: Option<String>,
    pub role: Option<Role>,
    pub public_key: Option<String>,
    pub connected_at: chrono::DateTime<chrono::Utc>,
}

impl Connection {
    pub fn anonymous(id: String, connected_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            id,
            session_id: None,
            role: None,
            public_key: None,
            connected_at,
        }
    }
}

/// The one-shot bundle the controller produces and the operator consumes to
/// connect (§3, §6). `expires_at = created + 5 min`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingPayload {
    pub session_id: String,
    pub public_key: String,
    pub relay_url: String,
    pub expires_at: i64,
}

impl PairingPayload {
    pub fn is_expired(&self, now_unix_ms: i64) -> bool {
        now_unix_ms >= self.expires_at
    }
}

/// A controller-originated envelope held for later delivery to an absent
/// operator. Ordered by `queued_at` ascending.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueuedEnvelope {
    pub envelope: crate::envelope::Envelope,
    pub queued_at: chrono::DateTime<chrono::Utc>,
}

impl QueuedEnvelope {
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>, ttl: chrono::Duration) -> bool {
        now >= self.queued_at + ttl
    }
}

/// Per-file record inside an [`crate::payload::AppliedPatch`] wire payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFile {
    pub path: String,
    pub before_hash: String,
    pub after_hash: String,
    pub reverse_diff: String,
    /// Base64-encoded pre-image content, present only when this file was
    /// deleted by the patch. A reverse diff alone cannot recreate deleted
    /// content (§9 "Reverse diff correctness"), so undo restores from this
    /// field directly instead of attempting to reverse-apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_content: Option<String>,
}

/// Controller-side record tracking a single accepted diff, enough to undo it
/// deterministically. The bounded (<=50, newest-first) history lives in
/// `doomcode-controller`; this is the plain record type shared on the wire
/// as `patch_applied { patch }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPatch {
    pub patch_id: String,
    pub timestamp: i64,
    pub agent_id: String,
    pub prompt: Option<String>,
    pub files: Vec<AppliedFile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_other_is_involutive() {
        assert_eq!(Role::Controller.other(), Role::Operator);
        assert_eq!(Role::Operator.other(), Role::Controller);
        assert_eq!(Role::Controller.other().other(), Role::Controller);
    }

    #[test]
    fn session_expiry() {
        let now = chrono::Utc::now();
        let session = Session {
            id: "s1".into(),
            created_at: now,
            expires_at: now + chrono::Duration::hours(24),
            controller: None,
            operator: None,
            last_operator_public_key: None,
        };
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + chrono::Duration::hours(25)));
    }

    #[test]
    fn pairing_payload_expiry() {
        let payload = PairingPayload {
            session_id: "s1".into(),
            public_key: "abc".into(),
            relay_url: "wss://relay.example".into(),
            expires_at: 1_000,
        };
        assert!(!payload.is_expired(999));
        assert!(payload.is_expired(1_000));
    }
}
