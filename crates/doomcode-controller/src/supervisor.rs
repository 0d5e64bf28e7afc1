//! Agent subprocess supervision (§4.5.2, §4.5.6, §5).
//!
//! Owns the PTY-attached assistant subprocess, the output scanners, the
//! patch tracker, and the state machine transitions. Input injection goes
//! through this supervisor's single writer so two concurrent callers (the
//! operator's `permission_response` and a typewrite pacing task) can never
//! race on the PTY (§5 "shared-resource policy").

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use doomcode_proto::payload::{
    AgentControlCommand, AgentStatus, Payload, PatchDecisionKind, PermissionDecision,
    PermissionRequestSnapshot,
};

use crate::config::{EnterMode, InputStyle, RuntimeConfig};
use crate::error::{ControllerError, Result};
use crate::input;
use crate::patch_tracker::PatchTracker;
use crate::pty::bridge::BridgePty;
use crate::pty::native::NativePty;
use crate::pty::{locate_agent_binary, PtyProvider};
use crate::scanners::diff::DiffExtractor;
use crate::scanners::permission::PermissionDetector;
use crate::scanners::{truncate_buffer, Scanner};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    WaitingInput,
    Error,
}

impl SupervisorState {
    fn as_agent_status(self) -> AgentStatus {
        match self {
            SupervisorState::Idle => AgentStatus::Idle,
            SupervisorState::Running => AgentStatus::Running,
            SupervisorState::WaitingInput => AgentStatus::WaitingInput,
            SupervisorState::Error => AgentStatus::Error,
        }
    }
}

struct PendingPermission {
    snapshot: PermissionRequestSnapshot,
}

/// How many recent patches a `session_state` resync snapshot carries.
const RECENT_PATCHES_LIMIT: usize = 10;

pub struct Supervisor {
    agent_name: String,
    working_directory: PathBuf,
    runtime_config: RuntimeConfig,
    state: SupervisorState,
    pty: Option<Box<dyn PtyProvider>>,
    pty_is_native: bool,
    pending_permission: Option<PendingPermission>,
    last_prompt: Option<String>,
    sequence: u64,
    window: String,
    permission_detector: PermissionDetector,
    diff_extractor: DiffExtractor,
    patch_tracker: PatchTracker,
    events_tx: mpsc::UnboundedSender<Payload>,
}

impl Supervisor {
    pub fn new(
        agent_name: impl Into<String>,
        working_directory: PathBuf,
        runtime_config: RuntimeConfig,
        events_tx: mpsc::UnboundedSender<Payload>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            working_directory: working_directory.clone(),
            runtime_config,
            state: SupervisorState::Idle,
            pty: None,
            pty_is_native: false,
            pending_permission: None,
            last_prompt: None,
            sequence: 0,
            window: String::new(),
            permission_detector: PermissionDetector::new(),
            diff_extractor: DiffExtractor::new(),
            patch_tracker: PatchTracker::new(working_directory),
            events_tx,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Locate and spawn the assistant, falling back from the native PTY
    /// backend to the bridge backend on spawn failure (§4.5.2).
    pub fn start(&mut self, reader_tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<()> {
        let binary = locate_agent_binary(&self.agent_name).ok_or_else(|| {
            ControllerError::AgentNotFound {
                name: self.agent_name.clone(),
                searched: 4,
            }
        })?;

        let enter_mode = self.enter_mode();
        let provider: Box<dyn PtyProvider> = match NativePty::spawn(&binary, &[]) {
            Ok(native) => {
                self.pty_is_native = true;
                Box::new(native)
            }
            Err(e) => {
                tracing::warn!("native PTY spawn failed ({e}), falling back to bridge backend");
                match BridgePty::spawn(&binary, &[], enter_mode) {
                    Ok(bridge) => {
                        self.pty_is_native = false;
                        Box::new(bridge)
                    }
                    Err(e2) => {
                        self.state = SupervisorState::Error;
                        return Err(ControllerError::PtySpawn(e2.to_string()));
                    }
                }
            }
        };

        let mut provider = provider;
        let mut reader = provider
            .take_reader()
            .map_err(|e| ControllerError::PtySpawn(e.to_string()))?;
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if reader_tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        self.pty = Some(provider);
        self.state = SupervisorState::Running;
        self.emit_status();
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(pty) = self.pty.as_mut() {
            let _ = pty.kill();
        }
        self.pty = None;
        self.pty_is_native = false;
        self.pending_permission = None;
        self.state = SupervisorState::Idle;
        self.emit_status();
    }

    fn enter_mode(&self) -> EnterMode {
        self.runtime_config.enter_mode_override.unwrap_or(EnterMode::Cr)
    }

    fn input_style(&self, backend_is_native: bool) -> InputStyle {
        match self.runtime_config.typewrite_override {
            Some(true) => InputStyle::Typewrite,
            Some(false) => InputStyle::Line,
            None if backend_is_native => InputStyle::Line,
            None => InputStyle::Typewrite,
        }
    }

    /// Inject a prompt, picking line-write or typewrite per the active
    /// backend/override (§4.5.2).
    pub async fn send_prompt(&mut self, prompt: &str) -> Result<()> {
        self.last_prompt = Some(prompt.to_string());
        let enter_mode = self.enter_mode();
        let is_native = self.pty_is_native;
        let style = self.input_style(is_native);
        let pty = self
            .pty
            .as_mut()
            .ok_or_else(|| ControllerError::PtyWrite("no active subprocess".into()))?;

        let result = match style {
            InputStyle::Line => input::write_line(pty.as_mut(), prompt, enter_mode),
            InputStyle::Typewrite => {
                input::typewrite(pty.as_mut(), prompt, self.runtime_config.typewrite_delay, !is_native)
                    .await
            }
        };
        result.map_err(|e| ControllerError::PtyWrite(e.to_string()))
    }

    /// Feed a chunk of raw PTY output through the scanner pipeline,
    /// emitting `terminal_output` plus any detector event (§4.5.3, §5
    /// ordering guarantee: sequence assigned here, at enqueue time).
    pub fn handle_output_chunk(&mut self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        self.window.push_str(&text);
        truncate_buffer(&mut self.window);

        let sequence = self.sequence;
        self.sequence += 1;
        self.emit(Payload::TerminalOutput {
            stream: "stdout".to_string(),
            data: text.to_string(),
            sequence,
        });

        if self.pending_permission.is_none() {
            let outcome = self.permission_detector.scan(&text);
            if let Some(event) = outcome.event {
                if let Payload::PermissionRequest {
                    request_id,
                    action,
                    description,
                    details,
                    ..
                } = &event
                {
                    self.pending_permission = Some(PendingPermission {
                        snapshot: PermissionRequestSnapshot {
                            request_id: request_id.clone(),
                            action: *action,
                            description: description.clone(),
                            details: details.clone(),
                        },
                    });
                    self.state = SupervisorState::WaitingInput;
                    self.emit_status();
                }
                self.emit(event);
                if outcome.reset_window {
                    self.window.clear();
                }
                return;
            }
        }

        let outcome = self.diff_extractor.scan(&text);
        if let Some(Payload::DiffPatch { patch_id, files, .. }) = &outcome.event {
            self.patch_tracker.prepare(patch_id.clone(), self.agent_name.clone(), self.last_prompt.clone(), files);
        }
        if let Some(event) = outcome.event {
            self.emit(event);
        }
        if outcome.reset_window {
            self.window.clear();
        }
    }

    /// Operator replied to a pending permission prompt (§4.5.3).
    pub async fn handle_permission_response(&mut self, request_id: &str, decision: PermissionDecision) -> Result<()> {
        let Some(pending) = &self.pending_permission else {
            return Ok(());
        };
        if pending.snapshot.request_id != request_id {
            return Ok(());
        }

        let answer = match decision {
            PermissionDecision::Approve | PermissionDecision::ApproveAlways => "y",
            PermissionDecision::Deny | PermissionDecision::DenyAlways => "n",
        };
        let enter_mode = self.enter_mode();
        {
            let pty = self
                .pty
                .as_mut()
                .ok_or_else(|| ControllerError::PtyWrite("no active subprocess".into()))?;
            input::write_line(pty.as_mut(), answer, enter_mode)
                .map_err(|e| ControllerError::PtyWrite(e.to_string()))?;
        }

        self.pending_permission = None;
        self.state = SupervisorState::Running;
        self.emit_status();
        Ok(())
    }

    /// Operator decided on a previously emitted diff (§4.5.5, §6).
    pub fn handle_patch_decision(&mut self, patch_id: &str, decision: PatchDecisionKind) {
        match decision {
            PatchDecisionKind::Apply => {
                self.patch_tracker.finalize(patch_id);
            }
            PatchDecisionKind::Reject | PatchDecisionKind::Edit => {
                // Nothing tracked survives a rejection; an edited diff is
                // re-applied by the agent under a fresh patch id.
            }
        }
    }

    /// Operator requested undo of a previously applied patch (§4.5.5).
    pub fn handle_undo_request(&mut self, patch_id: &str) -> Payload {
        let report = self.patch_tracker.undo(patch_id);
        Payload::UndoResult {
            patch_id: patch_id.to_string(),
            success: report.success,
            error: report.error,
            reverted_files: report.reverted_files,
        }
    }

    /// Operator-driven agent control (§4.5.6).
    pub async fn handle_agent_control(
        &mut self,
        command: AgentControlCommand,
        reader_tx: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Result<()> {
        match command {
            AgentControlCommand::Start => {
                self.stop();
                self.start(reader_tx)?;
            }
            AgentControlCommand::Stop => {
                self.stop();
            }
            AgentControlCommand::Retry => {
                if self.state == SupervisorState::Idle {
                    if let Some(prompt) = self.last_prompt.clone() {
                        self.send_prompt(&prompt).await?;
                    }
                }
            }
            AgentControlCommand::Configure => {
                // Model/temperature/tool-permission changes are recorded by
                // the caller; applying them fully may require a restart,
                // which the operator drives explicitly via `start` (§4.5.6).
            }
        }
        Ok(())
    }

    fn emit(&self, payload: Payload) {
        let _ = self.events_tx.send(payload);
    }

    fn emit_status(&self) {
        self.emit(Payload::AgentStatusUpdate {
            agent_id: self.agent_name.clone(),
            status: self.state.as_agent_status(),
            last_prompt: self.last_prompt.clone(),
        });
    }

    /// Build a resync snapshot for a reconnecting operator (§6
    /// `session_state`).
    pub fn snapshot(&self) -> Payload {
        let pending_permissions = self
            .pending_permission
            .as_ref()
            .map(|p| vec![p.snapshot.clone()])
            .unwrap_or_default();
        Payload::SessionState {
            agent_status: self.state.as_agent_status(),
            last_prompt: self.last_prompt.clone(),
            pending_permissions,
            recent_patches: self.patch_tracker.recent(RECENT_PATCHES_LIMIT),
        }
    }
}

/// Shared handle so the transport task and the PTY-reader task can both
/// drive the supervisor without a redundant lock-per-backend split (§5).
pub type SharedSupervisor = Arc<Mutex<Supervisor>>;

/// Watches the child process for exit and flips state back to `idle`
/// (§4.5.2 transition table: `running|waiting_input -> idle` on child
/// exit).
pub async fn watch_for_exit(supervisor: SharedSupervisor) {
    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let mut guard = supervisor.lock().await;
        if guard.state == SupervisorState::Idle || guard.state == SupervisorState::Error {
            continue;
        }
        let exited = match guard.pty.as_mut() {
            Some(pty) => matches!(pty.try_wait(), Ok(Some(_))),
            None => true,
        };
        if exited {
            guard.pty = None;
            guard.pty_is_native = false;
            guard.pending_permission = None;
            guard.state = SupervisorState::Idle;
            guard.emit_status();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supervisor_starts_idle() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(
            "assistant",
            PathBuf::from("."),
            RuntimeConfig::from_env(),
            tx,
        );
        assert_eq!(supervisor.state(), SupervisorState::Idle);
    }

    #[test]
    fn input_style_defaults_follow_backend_without_override() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new("assistant", PathBuf::from("."), RuntimeConfig::from_env(), tx);
        assert_eq!(supervisor.input_style(true), InputStyle::Line);
        assert_eq!(supervisor.input_style(false), InputStyle::Typewrite);
    }

    #[test]
    fn snapshot_carries_pending_permission_and_recent_patches() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut supervisor = Supervisor::new("assistant", PathBuf::from("."), RuntimeConfig::from_env(), tx);
        supervisor.pending_permission = Some(PendingPermission {
            snapshot: PermissionRequestSnapshot {
                request_id: "r1".into(),
                action: doomcode_proto::payload::PermissionAction::FileWrite,
                description: "write foo".into(),
                details: serde_json::json!({}),
            },
        });
        let Payload::SessionState { pending_permissions, .. } = supervisor.snapshot() else {
            panic!("expected session_state payload");
        };
        assert_eq!(pending_permissions.len(), 1);
        assert_eq!(pending_permissions[0].request_id, "r1");
    }
}
