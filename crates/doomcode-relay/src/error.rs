//! Startup and binding errors for the relay binary.
//!
//! Per-connection protocol errors never reach here — they are modeled as
//! `ControlFrame::Error` values and sent on the wire (§6, §7); this enum is
//! only for failures that prevent the process from serving at all.

/// Errors that can abort relay startup.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
