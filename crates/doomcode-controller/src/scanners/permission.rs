//! Permission-prompt detector (§4.5.3).
//!
//! A fixed, ordered list of regular expressions recognizes common approval
//! prompts and extracts a structured `{action, description, details}`
//! triple. The first pattern to match wins; patterns are ordered specific
//! to general so `shell_command` doesn't shadow a more precise file prompt.

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use doomcode_proto::payload::{Payload, PermissionAction};

use super::{Scanner, ScanOutcome};

struct Pattern {
    regex: Regex,
    action: PermissionAction,
    describe: fn(&regex::Captures) -> (String, serde_json::Value),
}

// Patterns are fixed string literals known to compile; unwrap here can
// never fail at runtime, so the crate's blanket unwrap_used lint is waived
// for these two statics rather than for the module as a whole.
#[allow(clippy::unwrap_used)]
static PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        Pattern {
            regex: Regex::new(r"(?i)do you want to write to\s+(?P<path>\S+)\?").unwrap(),
            action: PermissionAction::FileWrite,
            describe: |caps| {
                let path = caps["path"].trim_end_matches(['?', ':']).to_string();
                (
                    format!("Write to file: {path}"),
                    serde_json::json!({ "path": path }),
                )
            },
        },
        Pattern {
            regex: Regex::new(r"(?i)do you want to read\s+(?P<path>\S+)\?").unwrap(),
            action: PermissionAction::FileRead,
            describe: |caps| {
                let path = caps["path"].trim_end_matches(['?', ':']).to_string();
                (
                    format!("Read file: {path}"),
                    serde_json::json!({ "path": path }),
                )
            },
        },
        Pattern {
            regex: Regex::new(r"(?i)(?:run|execute) the command\s+[`']?(?P<cmd>[^`'\n]+?)[`']?\s*\??$")
                .unwrap(),
            action: PermissionAction::ShellCommand,
            describe: |caps| {
                let cmd = caps["cmd"].trim().to_string();
                (
                    format!("Run command: {cmd}"),
                    serde_json::json!({ "command": cmd }),
                )
            },
        },
        Pattern {
            regex: Regex::new(r"(?i)\ballow\b.*\?\s*$").unwrap(),
            action: PermissionAction::Other,
            describe: |_caps| ("Allow requested action?".to_string(), serde_json::json!({})),
        },
    ]
});

/// Matches the innermost `[y/n]`-style approval suffix this pattern set
/// expects; used to confirm a line is actually a prompt before scanning for
/// the more specific patterns above.
#[allow(clippy::unwrap_used)]
static APPROVAL_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[y/n\]\s*$").unwrap());

pub struct PermissionDetector;

impl PermissionDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PermissionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for PermissionDetector {
    fn scan(&mut self, window: &str) -> ScanOutcome {
        for line in window.lines().rev() {
            let trimmed = line.trim_end();
            let is_prompt_line = APPROVAL_SUFFIX.is_match(trimmed) || trimmed.ends_with('?');
            if !is_prompt_line {
                continue;
            }
            let core = APPROVAL_SUFFIX.replace(trimmed, "").trim_end().to_string();
            for pattern in PATTERNS.iter() {
                if let Some(caps) = pattern.regex.captures(&core) {
                    let (description, details) = (pattern.describe)(&caps);
                    let payload = Payload::PermissionRequest {
                        request_id: Uuid::new_v4().to_string(),
                        action: pattern.action,
                        description,
                        details,
                        timeout: None,
                    };
                    return ScanOutcome::emit(payload, true);
                }
            }
        }
        ScanOutcome::none()
    }
}
