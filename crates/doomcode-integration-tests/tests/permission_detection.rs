//! §8 "Permission detection and response": a literal assistant prompt line
//! is detected, mapped to an `{action, description, details}` triple, and an
//! operator's `approve` decision is translated into the exact bytes the PTY
//! discipline would inject.

use std::io;

use doomcode_controller::config::EnterMode;
use doomcode_controller::input;
use doomcode_controller::pty::PtyProvider;
use doomcode_controller::scanners::permission::PermissionDetector;
use doomcode_controller::scanners::Scanner;
use doomcode_proto::payload::{Payload, PermissionAction, PermissionDecision};

/// Records every byte written to it; stands in for a live PTY.
struct RecordingPty {
    written: Vec<u8>,
}

impl PtyProvider for RecordingPty {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.written.extend_from_slice(bytes);
        Ok(())
    }
    fn resize(&mut self, _cols: u16, _rows: u16) -> io::Result<()> {
        Ok(())
    }
    fn kill(&mut self) -> io::Result<()> {
        Ok(())
    }
    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(None)
    }
    fn take_reader(&mut self) -> io::Result<Box<dyn io::Read + Send>> {
        Ok(Box::new(io::empty()))
    }
}

#[tokio::test]
async fn approved_write_prompt_injects_confirmation_and_returns_to_running() {
    let mut detector = PermissionDetector::new();
    let outcome = detector.scan("Do you want to write to README.md? [y/n]");
    let Some(Payload::PermissionRequest {
        request_id,
        action,
        description,
        details,
        ..
    }) = outcome.event
    else {
        panic!("expected a permission_request event");
    };
    assert_eq!(action, PermissionAction::FileWrite);
    assert_eq!(description, "Write to file: README.md");
    assert_eq!(details, serde_json::json!({"path": "README.md"}));
    assert!(!request_id.is_empty());

    // The operator approves; the supervisor maps that decision to "y" and
    // line-writes it under the active enter mode.
    let decision = PermissionDecision::Approve;
    let answer = match decision {
        PermissionDecision::Approve | PermissionDecision::ApproveAlways => "y",
        PermissionDecision::Deny | PermissionDecision::DenyAlways => "n",
    };

    let mut pty = RecordingPty { written: Vec::new() };
    input::write_line(&mut pty, answer, EnterMode::Cr).expect("write answer");

    assert_eq!(pty.written, b"y\r");
}

#[tokio::test]
async fn denied_prompt_injects_n() {
    let mut detector = PermissionDetector::new();
    let outcome = detector.scan("Do you want to run the command `rm -rf build`? [y/n]");
    let Some(Payload::PermissionRequest { action, .. }) = outcome.event else {
        panic!("expected a permission_request event");
    };
    assert_eq!(action, PermissionAction::ShellCommand);

    let mut pty = RecordingPty { written: Vec::new() };
    input::write_line(&mut pty, "n", EnterMode::Lf).expect("write answer");
    assert_eq!(pty.written, b"n\n");
}
