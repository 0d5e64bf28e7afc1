//! Output scanners (§4.5.3, §9 "scanner composition").
//!
//! The supervisor buffers the subprocess's combined output into a rolling
//! window and runs it past a pipeline of pattern matchers, each consuming
//! `(window, offset) -> {consumed, event?}`, rather than interleaving both
//! scanners' logic in one function — this avoids double-firing on
//! overlapping patterns and keeps each detector independently testable.

pub mod diff;
pub mod permission;

use doomcode_proto::payload::{EstimatedRisk, Payload};

/// What a scanner did with the bytes it was just handed.
pub struct ScanOutcome {
    /// Emitted payload, if this chunk completed a recognizable event.
    pub event: Option<Payload>,
    /// Whether the scanner wants its window reset (it consumed a full
    /// logical unit and has nothing pending).
    pub reset_window: bool,
}

impl ScanOutcome {
    pub fn none() -> Self {
        Self {
            event: None,
            reset_window: false,
        }
    }

    pub fn emit(event: Payload, reset_window: bool) -> Self {
        Self {
            event: Some(event),
            reset_window,
        }
    }
}

pub trait Scanner: Send {
    /// Consume the current rolling window and report any event it produced.
    fn scan(&mut self, window: &str) -> ScanOutcome;
}

const BUFFER_HARD_LIMIT: usize = 10_000;
const BUFFER_TRUNCATE_TO: usize = 5_000;

/// Truncate a rolling window once it exceeds the hard limit (§4.5.3),
/// applying the newline-boundary-safe policy from §9's open question: cut
/// at the nearest preceding `\n` at or before the tail window rather than
/// mid-line, so a half-emitted diff line is never bisected. Falls back to
/// the raw byte-count cut if no newline exists within a bounded lookback.
pub fn truncate_buffer(buffer: &mut String) {
    if buffer.len() <= BUFFER_HARD_LIMIT {
        return;
    }
    let tail_start = buffer.len() - BUFFER_TRUNCATE_TO;
    let lookback_floor = tail_start.saturating_sub(BUFFER_TRUNCATE_TO);

    let boundary = buffer[lookback_floor..tail_start]
        .rfind('\n')
        .map(|pos| lookback_floor + pos + 1);

    let cut = boundary.unwrap_or(tail_start);
    // `cut` may land inside a UTF-8 sequence if we fell back to the raw
    // byte cut; snap forward to the next char boundary.
    let cut = (cut..=buffer.len())
        .find(|&i| buffer.is_char_boundary(i))
        .unwrap_or(buffer.len());
    *buffer = buffer[cut..].to_string();
}

/// Classify overall change risk from file/line counts (§4.5.3).
pub fn estimate_risk(changed_files: usize, total_changes: u32, any_sensitive_path: bool) -> EstimatedRisk {
    if any_sensitive_path || changed_files > 10 || total_changes > 500 {
        EstimatedRisk::High
    } else if changed_files > 5 || total_changes > 100 {
        EstimatedRisk::Medium
    } else {
        EstimatedRisk::Low
    }
}

const SENSITIVE_PATH_MARKERS: &[&str] = &[
    "env", "config", "secret", "key", "password", "auth", "cargo.toml", "package.json",
    "dockerfile", "makefile",
];

/// Does `path` match one of the patterns §4.5.3 calls out as sensitive
/// (env, config, secret, key, password, auth, root manifests, build
/// config)?
pub fn is_sensitive_path(path: &str) -> bool {
    let lowered = path.to_ascii_lowercase();
    SENSITIVE_PATH_MARKERS.iter().any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_buffer_alone() {
        let mut buf = "short".to_string();
        truncate_buffer(&mut buf);
        assert_eq!(buf, "short");
    }

    #[test]
    fn truncate_cuts_at_newline_boundary() {
        let mut buf = String::new();
        for i in 0..2000 {
            buf.push_str(&format!("line {i}\n"));
        }
        let original_len = buf.len();
        truncate_buffer(&mut buf);
        assert!(buf.len() < original_len);
        assert!(buf.len() <= 5000 + 20);
        assert!(!buf.starts_with("line") || buf.as_bytes()[0] == b'l');
    }

    #[test]
    fn risk_escalates_on_sensitive_path() {
        assert_eq!(estimate_risk(1, 1, true), EstimatedRisk::High);
    }

    #[test]
    fn risk_escalates_on_file_count() {
        assert_eq!(estimate_risk(11, 1, false), EstimatedRisk::High);
        assert_eq!(estimate_risk(6, 1, false), EstimatedRisk::Medium);
        assert_eq!(estimate_risk(1, 1, false), EstimatedRisk::Low);
    }

    #[test]
    fn is_sensitive_path_matches_known_markers() {
        assert!(is_sensitive_path(".env.production"));
        assert!(is_sensitive_path("Cargo.toml"));
        assert!(!is_sensitive_path("src/main.rs"));
    }
}
