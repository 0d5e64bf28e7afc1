//! Precomputed-shared-secret authenticated encryption (NaCl `crypto_box`).
//!
//! A [`PrecomputedBox`] derives the X25519 shared secret once per peer pair
//! and reuses it for every subsequent seal/open; this is cheaper than
//! re-deriving the shared secret on each call and matches the "precomputes
//! the X25519 shared secret; all subsequent encrypt/decrypt reuse it"
//! contract.

use crypto_box::aead::{Aead, AeadCore, OsRng};
use crypto_box::{PublicKey as BoxPublicKey, SalsaBox, SecretKey as BoxSecretKey};
use serde::{Deserialize, Serialize};

use crate::keypair::{Keypair, PublicKey};
use crate::{CryptoError, Result};

/// Size in bytes of the random nonce prefixed to every sealed message.
pub const NONCE_SIZE: usize = 24;

/// A sealed message: a fresh random nonce plus the authenticated ciphertext.
/// Serializes with base64-encoded fields, matching the envelope's
/// `nonce`/`ciphertext` wire representation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealedMessage {
    #[serde(with = "base64_bytes")]
    pub nonce: [u8; NONCE_SIZE],
    #[serde(with = "base64_vec")]
    pub ciphertext: Vec<u8>,
}

/// A precomputed X25519 shared secret bound to one peer pair, ready to seal
/// and open an unbounded number of messages.
pub struct PrecomputedBox {
    inner: SalsaBox,
}

impl PrecomputedBox {
    /// Precompute the shared secret between `my_secret` and `peer_public`.
    /// Reused for every subsequent `seal`/`open` call with this peer.
    pub fn new(my_keypair: &Keypair, peer_public: &PublicKey) -> Self {
        let secret: &BoxSecretKey = my_keypair.secret();
        let public: BoxPublicKey = peer_public.to_box_public();
        Self {
            inner: SalsaBox::new(&public, secret),
        }
    }

    /// Encrypt `plaintext` under a fresh 24-byte CSPRNG nonce.
    pub fn seal(&self, plaintext: &[u8]) -> SealedMessage {
        let nonce = SalsaBox::generate_nonce(&mut OsRng);
        // encrypt() only fails on buffer-allocation overflow, which cannot
        // happen for realistic message sizes.
        let ciphertext = self
            .inner
            .encrypt(&nonce, plaintext)
            .expect("crypto_box encryption does not fail for bounded plaintexts");
        SealedMessage {
            nonce: nonce.into(),
            ciphertext,
        }
    }

    /// Decrypt and authenticate a sealed message. Any tampering, truncation,
    /// or cross-session misrouting yields a single [`CryptoError::AuthFailure`]
    /// — callers never observe partial plaintext.
    pub fn open(&self, message: &SealedMessage) -> Result<Vec<u8>> {
        let nonce = message.nonce.into();
        self.inner
            .decrypt(&nonce, message.ciphertext.as_slice())
            .map_err(|_| CryptoError::AuthFailure)
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 24], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 24], D::Error> {
        let s = String::deserialize(d)?;
        let raw = base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)?;
        raw.try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::custom(format!("expected 24 bytes, got {}", v.len())))
    }
}

mod base64_vec {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let alice_box = PrecomputedBox::new(&alice, bob.public_key());
        let bob_box = PrecomputedBox::new(&bob, alice.public_key());

        let sealed = alice_box.seal(b"hello from alice");
        let opened = bob_box.open(&sealed).expect("decrypt");
        assert_eq!(opened, b"hello from alice");
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let alice_box = PrecomputedBox::new(&alice, bob.public_key());
        let bob_box = PrecomputedBox::new(&bob, alice.public_key());

        let mut sealed = alice_box.seal(b"hello");
        if let Some(byte) = sealed.ciphertext.first_mut() {
            *byte ^= 0xFF;
        }
        assert!(bob_box.open(&sealed).is_err());
    }

    #[test]
    fn tampered_nonce_fails() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let alice_box = PrecomputedBox::new(&alice, bob.public_key());
        let bob_box = PrecomputedBox::new(&bob, alice.public_key());

        let mut sealed = alice_box.seal(b"hello");
        sealed.nonce[0] ^= 0xFF;
        assert!(bob_box.open(&sealed).is_err());
    }

    #[test]
    fn wrong_peer_fails() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let mallory = Keypair::generate();
        let alice_box = PrecomputedBox::new(&alice, bob.public_key());
        let mallory_box = PrecomputedBox::new(&mallory, alice.public_key());

        let sealed = alice_box.seal(b"hello");
        assert!(mallory_box.open(&sealed).is_err());
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let alice_box = PrecomputedBox::new(&alice, bob.public_key());
        let bob_box = PrecomputedBox::new(&bob, alice.public_key());

        let sealed = alice_box.seal(b"");
        let opened = bob_box.open(&sealed).expect("decrypt");
        assert!(opened.is_empty());
    }

    #[test]
    fn wire_json_roundtrip() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let alice_box = PrecomputedBox::new(&alice, bob.public_key());
        let bob_box = PrecomputedBox::new(&bob, alice.public_key());

        let sealed = alice_box.seal(b"wire test");
        let json = serde_json::to_string(&sealed).expect("serialize");
        let restored: SealedMessage = serde_json::from_str(&json).expect("deserialize");
        let opened = bob_box.open(&restored).expect("decrypt");
        assert_eq!(opened, b"wire test");
    }
}
