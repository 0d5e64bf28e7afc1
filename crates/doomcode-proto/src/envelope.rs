//! The outer envelope frame (§3, §4.2): the only object the relay inspects.
//!
//! The relay reads `version`, `sessionId`, `sender`, and `messageId` for
//! routing; it never decodes `ciphertext`. Field validation here is
//! deliberately shallow — base64 *shape*, not semantic content — because
//! the relay has no key with which to do anything deeper.

use serde::{Deserialize, Serialize};

use crate::model::Role;
use crate::{ProtoError, Result, PROTOCOL_VERSION};

/// The outermost wire frame carrying opaque ciphertext (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub version: u8,
    pub session_id: String,
    pub message_id: String,
    pub timestamp: i64,
    pub sender: Role,
    /// Base64-encoded 24-byte nonce.
    pub nonce: String,
    /// Base64-encoded ciphertext. Aliased `encryptedPayload` on the wire
    /// (§6); accepted under either key name, always emitted as
    /// `encryptedPayload` to match the external interface in §6.
    #[serde(rename = "encryptedPayload", alias = "ciphertext")]
    pub ciphertext: String,
}

impl Envelope {
    /// Build a fresh envelope with a random 128-bit `messageId` and the
    /// producer's current clock reading (advisory only — the relay does not
    /// trust it for ordering).
    pub fn new(
        session_id: impl Into<String>,
        sender: Role,
        nonce: impl Into<String>,
        ciphertext: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            session_id: session_id.into(),
            message_id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            sender,
            nonce: nonce.into(),
            ciphertext: ciphertext.into(),
        }
    }

    /// Serialize to a JSON byte string for transmission.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtoError::MalformedJson(e.to_string()))
    }

    /// Deserialize and validate an envelope received from the wire.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let envelope: Self =
            serde_json::from_slice(bytes).map_err(|e| ProtoError::MalformedJson(e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Validate the envelope header. Checks `version` and the base64 *shape*
    /// of `nonce`/`ciphertext`; never attempts to decrypt.
    pub fn validate(&self) -> Result<()> {
        if self.version != PROTOCOL_VERSION {
            return Err(ProtoError::UnsupportedVersion {
                expected: PROTOCOL_VERSION,
                found: self.version,
            });
        }
        validate_base64_shape(&self.nonce)?;
        validate_base64_shape(&self.ciphertext)?;
        Ok(())
    }
}

fn validate_base64_shape(s: &str) -> Result<()> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map(|_| ())
        .map_err(|e| ProtoError::MalformedJson(format!("invalid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope::new(
            "session-1",
            Role::Controller,
            base64_encode(b"012345678901234567890123"),
            base64_encode(b"ciphertext-bytes"),
            1_700_000_000_000,
        )
    }

    fn base64_encode(bytes: &[u8]) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn encode_decode_roundtrip() {
        let env = sample();
        let bytes = env.encode().expect("encode");
        let decoded = Envelope::decode(&bytes).expect("decode");
        assert_eq!(decoded.session_id, env.session_id);
        assert_eq!(decoded.sender, Role::Controller);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut env = sample();
        env.version = 2;
        assert!(matches!(
            env.validate(),
            Err(ProtoError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn rejects_non_base64_nonce() {
        let mut env = sample();
        env.nonce = "not base64!!".to_string();
        assert!(env.validate().is_err());
    }

    #[test]
    fn accepts_ciphertext_alias_on_the_wire() {
        let json = serde_json::json!({
            "version": 1,
            "sessionId": "s1",
            "messageId": "m1",
            "timestamp": 0,
            "sender": "operator",
            "nonce": base64_encode(b"012345678901234567890123"),
            "ciphertext": base64_encode(b"hi"),
        });
        let decoded: Envelope = serde_json::from_value(json).expect("decode via alias");
        assert_eq!(decoded.sender, Role::Operator);
    }

    #[test]
    fn serializes_with_encrypted_payload_key() {
        let env = sample();
        let value = serde_json::to_value(&env).expect("serialize");
        assert!(value.get("encryptedPayload").is_some());
        assert!(value.get("ciphertext").is_none());
    }
}
