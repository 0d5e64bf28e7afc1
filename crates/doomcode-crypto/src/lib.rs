//! # doomcode-crypto
//!
//! Cryptographic primitives for the DoomCode relay/controller channel.
//!
//! This crate implements the one cryptographic suite the system permits:
//! Curve25519 key agreement with precomputed-shared-secret XSalsa20-Poly1305
//! authenticated encryption, i.e. the NaCl `crypto_box` construction. No
//! algorithm negotiation is exposed.
//!
//! ## Modules
//!
//! - [`keypair`] — X25519 keypair generation and persistence
//! - [`sealed_box`] — precomputed-secret box seal/open

pub mod keypair;
pub mod sealed_box;

pub use keypair::{Keypair, PublicKey};
pub use sealed_box::{PrecomputedBox, SealedMessage};

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Authenticated decryption failed: tampering, truncation, or cross-session
    /// misrouting. Callers never see partial plaintext.
    #[error("authentication failed")]
    AuthFailure,

    /// A key or nonce did not have the expected byte length.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Base64 decoding of a wire field failed.
    #[error("invalid base64 encoding: {0}")]
    InvalidEncoding(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
