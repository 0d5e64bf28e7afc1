//! Unified-diff extractor (§4.5.3).
//!
//! Stateful: watches for diff markers to enter an "in-diff" mode that
//! appends subsequent output to a diff buffer, then leaves the mode on an
//! end-heuristic. On leave, the buffer is parsed into file records and, if
//! any are present, a `diff_patch` payload is emitted.

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use doomcode_proto::payload::{EstimatedRisk, Payload};

use super::{estimate_risk, is_sensitive_path, Scanner, ScanOutcome};
use crate::diff_parser::parse_diff;

// Patterns are fixed string literals known to compile; unwrap here can
// never fail at runtime, so the crate's blanket unwrap_used lint is waived
// for these two statics rather than for the module as a whole.
#[allow(clippy::unwrap_used)]
static DIFF_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(diff --git |--- a/)").unwrap());
#[allow(clippy::unwrap_used)]
static APPLY_SENTENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(apply|applied|\d+ files? changed)\b").unwrap());

pub struct DiffExtractor {
    in_diff: bool,
    buffer: String,
}

impl DiffExtractor {
    pub fn new() -> Self {
        Self {
            in_diff: false,
            buffer: String::new(),
        }
    }

    fn looks_like_end(&self, line: &str) -> bool {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            return self.buffer.ends_with("\n\n\n");
        }
        looks_like_shell_prompt(trimmed) || APPLY_SENTENCE.is_match(trimmed)
    }
}

impl Default for DiffExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn looks_like_shell_prompt(line: &str) -> bool {
    line.ends_with('$') || line.ends_with('#') || line.ends_with('>')
}

impl Scanner for DiffExtractor {
    fn scan(&mut self, window: &str) -> ScanOutcome {
        // `window` is one raw PTY read, not one line at a time: a diff can
        // start and end inside a single chunk, so every line has to pass
        // through the state machine in order, not just the chunk's last
        // line.
        for line in window.lines() {
            if !self.in_diff {
                if DIFF_START.is_match(line) {
                    self.in_diff = true;
                    self.buffer.clear();
                    self.buffer.push_str(line);
                    self.buffer.push('\n');
                }
                continue;
            }

            self.buffer.push_str(line);
            self.buffer.push('\n');

            if !self.looks_like_end(line) {
                continue;
            }

            self.in_diff = false;
            let files = parse_diff(&self.buffer);
            self.buffer.clear();

            if files.is_empty() {
                continue;
            }

            let total_additions: u32 = files.iter().map(|f| f.additions).sum();
            let total_deletions: u32 = files.iter().map(|f| f.deletions).sum();
            let any_sensitive = files.iter().any(|f| is_sensitive_path(&f.path));
            let risk = estimate_risk(
                files.len(),
                total_additions + total_deletions,
                any_sensitive,
            );

            let payload = Payload::DiffPatch {
                patch_id: Uuid::new_v4().to_string(),
                summary: summarize(&files, risk),
                estimated_risk: risk,
                total_additions,
                total_deletions,
                files,
            };
            return ScanOutcome::emit(payload, true);
        }
        ScanOutcome::none()
    }
}

fn summarize(files: &[doomcode_proto::payload::DiffFile], risk: EstimatedRisk) -> String {
    let names: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    format!(
        "{} file(s) changed ({:?} risk): {}",
        files.len(),
        risk,
        names.join(", ")
    )
}
