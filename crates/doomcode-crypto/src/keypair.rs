//! X25519 keypair generation and persistence.
//!
//! Every endpoint (controller, operator) holds exactly one long-lived keypair
//! per session. The secret half never leaves its origin device; the public
//! half travels once via pairing and once via relay join.

use crypto_box::{PublicKey as BoxPublicKey, SecretKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{CryptoError, Result};

/// Size in bytes of an X25519 public or secret key.
pub const KEY_SIZE: usize = 32;

/// An X25519 public key, 32 bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    bytes: [u8; KEY_SIZE],
}

impl PublicKey {
    /// Wrap raw bytes as a public key. Does not validate the point is on the
    /// curve; `crypto_box` rejects invalid points during box construction.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Parse a public key from a base64 string, the wire encoding used in
    /// pairing payloads and join frames.
    pub fn from_base64(s: &str) -> Result<Self> {
        use base64::Engine;
        let raw = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        if raw.len() != KEY_SIZE {
            return Err(CryptoError::InvalidLength {
                expected: KEY_SIZE,
                actual: raw.len(),
            });
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&raw);
        Ok(Self { bytes })
    }

    /// Encode as base64, the wire encoding used in pairing payloads and join
    /// frames.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.bytes)
    }

    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.bytes
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    pub(crate) fn to_box_public(&self) -> BoxPublicKey {
        BoxPublicKey::from(self.bytes)
    }
}

/// An X25519 keypair. The secret half is zeroized on drop.
#[derive(Clone)]
pub struct Keypair {
    secret: SecretKey,
    public: PublicKey,
}

impl Keypair {
    /// Generate a new random keypair. Source of randomness is the platform
    /// CSPRNG (`OsRng`).
    pub fn generate() -> Self {
        let secret = SecretKey::generate(&mut OsRng);
        let public = PublicKey::from_bytes(*secret.public_key().as_bytes());
        Self { secret, public }
    }

    /// Reconstruct a keypair from a raw 32-byte secret, e.g. when reloading
    /// `session.json` on `--reuse`.
    pub fn from_secret_bytes(mut bytes: [u8; KEY_SIZE]) -> Self {
        let secret = SecretKey::from(bytes);
        let public = PublicKey::from_bytes(*secret.public_key().as_bytes());
        bytes.zeroize();
        Self { secret, public }
    }

    /// The raw secret bytes, for persistence only. Callers must not log or
    /// transmit this value.
    pub fn secret_bytes(&self) -> [u8; KEY_SIZE] {
        self.secret.to_bytes()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_nonzero_public_key() {
        let kp = Keypair::generate();
        assert_ne!(kp.public_key().to_bytes(), [0u8; KEY_SIZE]);
    }

    #[test]
    fn secret_roundtrip_preserves_public_key() {
        let kp = Keypair::generate();
        let bytes = kp.secret_bytes();
        let restored = Keypair::from_secret_bytes(bytes);
        assert_eq!(kp.public_key().to_bytes(), restored.public_key().to_bytes());
    }

    #[test]
    fn public_key_base64_roundtrip() {
        let kp = Keypair::generate();
        let encoded = kp.public_key().to_base64();
        let decoded = PublicKey::from_base64(&encoded).expect("decode");
        assert_eq!(decoded, *kp.public_key());
    }

    #[test]
    fn rejects_wrong_length_base64() {
        use base64::Engine;
        let short = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
        assert!(PublicKey::from_base64(&short).is_err());
    }
}
