//! Payload kinds carried inside envelope ciphertext (§6).
//!
//! These never touch the relay — they are serialized, sealed by
//! `doomcode-crypto`, and carried as `Envelope::ciphertext`. This crate only
//! defines their shape; sealing/opening lives with the caller so that
//! `doomcode-proto` stays free of a crypto dependency.

use serde::{Deserialize, Serialize};

use crate::model::AppliedPatch;

/// A single line in a unified diff hunk (§4.5.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffLineKind {
    Context,
    Addition,
    Deletion,
    Header,
}

/// One hunk inside a diff file record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffHunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub lines: Vec<DiffLine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub text: String,
}

/// One file's worth of changes inside a `diff_patch` payload (§4.5.4, §6).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffFile {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub is_new_file: bool,
    pub is_deleted_file: bool,
    pub is_binary: bool,
    pub hunks: Vec<DiffHunk>,
    pub additions: u32,
    pub deletions: u32,
}

/// Risk classification attached to a `diff_patch` payload (§4.5.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatedRisk {
    Low,
    Medium,
    High,
}

/// Action tags the permission detector can extract (§4.5.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionAction {
    FileRead,
    FileWrite,
    ShellCommand,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDecision {
    Approve,
    Deny,
    ApproveAlways,
    DenyAlways,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchDecisionKind {
    Apply,
    Reject,
    Edit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentControlCommand {
    Start,
    Stop,
    Retry,
    Configure,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_permissions: Option<Vec<String>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Running,
    WaitingInput,
    Error,
}

/// The tagged union of everything that travels E2E-encrypted inside an
/// envelope's ciphertext (§6). The direction annotated on each variant is
/// enforced at the call site, not by this type — the relay never sees this
/// enum at all.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Payload {
    /// C → O
    TerminalOutput {
        stream: String,
        data: String,
        sequence: u64,
    },

    /// O → C
    UserPrompt {
        prompt: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },

    /// C → O
    PermissionRequest {
        request_id: String,
        action: PermissionAction,
        description: String,
        details: serde_json::Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },

    /// O → C
    PermissionResponse {
        request_id: String,
        decision: PermissionDecision,
    },

    /// C → O
    DiffPatch {
        patch_id: String,
        files: Vec<DiffFile>,
        summary: String,
        estimated_risk: EstimatedRisk,
        total_additions: u32,
        total_deletions: u32,
    },

    /// O → C
    PatchDecision {
        patch_id: String,
        decision: PatchDecisionKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        edited_diff: Option<String>,
    },

    /// C → O
    PatchApplied { patch: AppliedPatch },

    /// O → C
    UndoRequest { patch_id: String },

    /// C → O
    UndoResult {
        patch_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        reverted_files: Vec<String>,
    },

    /// O → C
    AgentControl {
        command: AgentControlCommand,
        agent_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        config: Option<AgentConfig>,
    },

    /// C → O
    AgentStatusUpdate {
        agent_id: String,
        status: AgentStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_prompt: Option<String>,
    },

    /// Both directions
    Heartbeat {
        timestamp: i64,
        agent_status: AgentStatus,
    },

    /// C → O, resync snapshot
    SessionState {
        agent_status: AgentStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_prompt: Option<String>,
        pending_permissions: Vec<PermissionRequestSnapshot>,
        recent_patches: Vec<AppliedPatch>,
    },
}

/// A pending permission entry as carried inside a `session_state` resync
/// snapshot — the operator's UI needs enough to re-render an outstanding
/// prompt after reconnecting mid-decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequestSnapshot {
    pub request_id: String,
    pub action: PermissionAction,
    pub description: String,
    pub details: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_output_roundtrips_with_type_tag() {
        let payload = Payload::TerminalOutput {
            stream: "stdout".into(),
            data: "ok\n".into(),
            sequence: 0,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "terminal_output");
        let back: Payload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn permission_request_fields_are_camel_case() {
        let payload = Payload::PermissionRequest {
            request_id: "r1".into(),
            action: PermissionAction::FileWrite,
            description: "Write to file: README.md".into(),
            details: serde_json::json!({"path": "README.md"}),
            timeout: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["requestId"], "r1");
        assert_eq!(json["action"], "file_write");
        assert!(json.get("timeout").is_none());
    }

    #[test]
    fn estimated_risk_serializes_lowercase() {
        assert_eq!(serde_json::to_value(EstimatedRisk::High).unwrap(), "high");
    }

    #[test]
    fn heartbeat_carries_both_fields() {
        let payload = Payload::Heartbeat {
            timestamp: 123,
            agent_status: AgentStatus::Running,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["agentStatus"], "running");
    }
}
