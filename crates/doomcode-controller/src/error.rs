//! Controller-side error kinds (§7).
//!
//! Transport and crypto errors are recovered locally by the caller (logged
//! and the connection/envelope dropped); spawn and patch errors are fatal or
//! surfaced to the operator. This enum exists to let call sites match on
//! kind rather than stringly-typed causes.

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("failed to locate assistant binary {name}: searched {searched} roots and PATH")]
    AgentNotFound { name: String, searched: usize },

    #[error("failed to spawn PTY: {0}")]
    PtySpawn(String),

    #[error("PTY write failed: {0}")]
    PtyWrite(String),

    #[error("HTTP request to relay failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("protocol error: {0}")]
    Proto(#[from] doomcode_proto::ProtoError),

    #[error("crypto error: {0}")]
    Crypto(#[from] doomcode_crypto::CryptoError),

    #[error("relay rejected request: {code} {message}")]
    RelayRejected {
        code: doomcode_proto::control::ErrorCode,
        message: String,
    },

    #[error("session cache error: {0}")]
    SessionCache(String),

    #[error("patch error: {0}")]
    Patch(String),

    #[error("undo error: {0}")]
    Undo(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ControllerError>;
