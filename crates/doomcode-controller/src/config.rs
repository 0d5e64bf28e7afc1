//! Environment-driven runtime tuning (§6 "Environment").
//!
//! CLI flags (`--ws-url`, `--dir`, ...) live on the `clap` types in
//! [`crate::cli`]; this module covers the handful of knobs exposed only as
//! environment variables.

use std::env;
use std::time::Duration;

/// Line-ending suffix appended after a line-write prompt, or before
/// force-submit on a typewrite (§4.5.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnterMode {
    Cr,
    Lf,
    CrLf,
}

impl EnterMode {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            EnterMode::Cr => b"\r",
            EnterMode::Lf => b"\n",
            EnterMode::CrLf => b"\r\n",
        }
    }

    fn from_env_str(s: &str) -> Option<Self> {
        match s {
            "cr" => Some(EnterMode::Cr),
            "lf" => Some(EnterMode::Lf),
            "crlf" => Some(EnterMode::CrLf),
            _ => None,
        }
    }
}

/// Whether input injection uses a single line-write or the slower,
/// more-reliable typewrite discipline (§4.5.2). The supervisor defaults this
/// by backend (native → line, bridge → typewrite) unless overridden.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputStyle {
    Line,
    Typewrite,
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub debug_session: bool,
    pub debug_pty: bool,
    pub enter_mode_override: Option<EnterMode>,
    pub typewrite_override: Option<bool>,
    pub typewrite_delay: Duration,
}

const DEFAULT_TYPEWRITE_DELAY_MS: u64 = 5;

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self {
            debug_session: env_flag("DOOMCODE_DEBUG_SESSION"),
            debug_pty: env_flag("DOOMCODE_DEBUG_PTY"),
            enter_mode_override: env::var("DOOMCODE_ENTER_MODE")
                .ok()
                .and_then(|v| EnterMode::from_env_str(&v)),
            typewrite_override: env::var("DOOMCODE_TYPEWRITE").ok().map(|v| v == "1"),
            typewrite_delay: env::var("DOOMCODE_TYPEWRITE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_TYPEWRITE_DELAY_MS)),
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).map(|v| v == "1").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_mode_parses_known_values() {
        assert_eq!(EnterMode::from_env_str("cr"), Some(EnterMode::Cr));
        assert_eq!(EnterMode::from_env_str("crlf"), Some(EnterMode::CrLf));
        assert_eq!(EnterMode::from_env_str("nonsense"), None);
    }

    #[test]
    fn enter_mode_bytes_match_mode() {
        assert_eq!(EnterMode::Lf.as_bytes(), b"\n");
        assert_eq!(EnterMode::CrLf.as_bytes(), b"\r\n");
    }
}
