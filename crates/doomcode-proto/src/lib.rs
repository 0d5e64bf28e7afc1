//! # doomcode-proto
//!
//! Wire types and framing for the DoomCode relay protocol.
//!
//! This crate is pure types plus codec — it never touches a socket, a clock,
//! or a key. It defines exactly what the relay is allowed to see (§4.2, §6):
//! plaintext control frames carrying an `action`, and opaque envelope frames
//! carrying `encryptedPayload`/`ciphertext` that the relay routes but never
//! decodes.
//!
//! ## Modules
//!
//! - [`model`] — session/connection/pairing/patch data-model records (§3)
//! - [`envelope`] — the outer envelope frame and its validation (§4.2)
//! - [`control`] — plaintext control frames and relay error codes (§4.4, §6)
//! - [`frame`] — the disambiguated `WireFrame` shared by one transport (§4.2)
//! - [`payload`] — the encrypted payload kinds carried inside envelopes (§6)

pub mod control;
pub mod envelope;
pub mod frame;
pub mod model;
pub mod payload;

pub use control::{ControlFrame, ErrorCode};
pub use envelope::Envelope;
pub use frame::WireFrame;
pub use model::Role;

/// Current envelope wire version. No other version is accepted.
pub const PROTOCOL_VERSION: u8 = 1;

/// Errors raised while decoding or validating wire data.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtoError {
    #[error("unsupported envelope version {found}, expected {expected}")]
    UnsupportedVersion { expected: u8, found: u8 },

    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    #[error("frame has neither an `action` nor an `encryptedPayload` field")]
    AmbiguousFrame,

    #[error("invalid sender role: {0}")]
    InvalidSender(String),
}

pub type Result<T> = std::result::Result<T, ProtoError>;
