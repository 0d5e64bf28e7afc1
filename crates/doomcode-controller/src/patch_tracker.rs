//! Deterministic undo for accepted diffs (§4.5.5).
//!
//! Two passes bracket "apply": **prepare** runs before the operator even
//! sees the patch (records `beforeHash` and a reverse diff, plus the full
//! pre-image of any file the patch deletes, since a reverse diff cannot
//! reconstruct deleted content); **finalize** runs after the agent applies
//! it (records `afterHash`). Undo re-verifies `afterHash` before touching
//! anything, then applies each file's reverse diff in reverse file order.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use base64::Engine;
use doomcode_proto::model::{AppliedFile, AppliedPatch};
use doomcode_proto::payload::{DiffFile, DiffLineKind};
use sha2::{Digest, Sha256};

use crate::diff_parser;

const HISTORY_LIMIT: usize = 50;

pub struct PatchTracker {
    root: PathBuf,
    history: VecDeque<AppliedPatch>,
}

#[derive(Debug)]
pub struct UndoReport {
    pub success: bool,
    pub reverted_files: Vec<String>,
    pub error: Option<String>,
}

impl PatchTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            history: VecDeque::new(),
        }
    }

    /// Prepare pass: hash current on-disk content and compute each file's
    /// reverse diff. Pushes the record to the front of the bounded history
    /// immediately, evicting the oldest entry past 50.
    pub fn prepare(
        &mut self,
        patch_id: impl Into<String>,
        agent_id: impl Into<String>,
        prompt: Option<String>,
        files: &[DiffFile],
    ) -> AppliedPatch {
        let mut recorded = Vec::with_capacity(files.len());
        for file in files {
            let path = self.root.join(&file.path);
            let before_content = std::fs::read(&path).ok();
            let before_hash = before_content
                .as_deref()
                .map(hash_bytes)
                .unwrap_or_else(|| hash_bytes(&[]));
            let reverse_diff = reverse_diff_text(file);
            let deleted_content = if file.is_deleted_file {
                before_content.map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes))
            } else {
                None
            };
            recorded.push(AppliedFile {
                path: file.path.clone(),
                before_hash,
                // Filled in by `finalize`; placeholder until then.
                after_hash: String::new(),
                reverse_diff,
                deleted_content,
            });
        }

        let patch = AppliedPatch {
            patch_id: patch_id.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            agent_id: agent_id.into(),
            prompt,
            files: recorded,
        };

        self.history.push_front(patch.clone());
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_back();
        }
        patch
    }

    /// Finalize pass: re-read each tracked file and record its post-apply
    /// hash. No-op if `patch_id` isn't tracked (the agent may apply patches
    /// this tracker was never asked to prepare).
    pub fn finalize(&mut self, patch_id: &str) {
        let root = self.root.clone();
        if let Some(patch) = self.history.iter_mut().find(|p| p.patch_id == patch_id) {
            for file in &mut patch.files {
                let path = root.join(&file.path);
                let content = std::fs::read(&path).unwrap_or_default();
                file.after_hash = hash_bytes(&content);
            }
        }
    }

    /// Most recent entries first, for a `session_state` resync snapshot.
    pub fn recent(&self, limit: usize) -> Vec<AppliedPatch> {
        self.history.iter().take(limit).cloned().collect()
    }

    /// Undo a previously applied patch. Refuses and reverts nothing if any
    /// tracked file has drifted from its recorded `afterHash`.
    pub fn undo(&mut self, patch_id: &str) -> UndoReport {
        let Some(position) = self.history.iter().position(|p| p.patch_id == patch_id) else {
            return UndoReport {
                success: false,
                reverted_files: Vec::new(),
                error: Some(format!("patch {patch_id} not found")),
            };
        };
        let patch = self.history[position].clone();

        for file in &patch.files {
            let path = self.root.join(&file.path);
            let on_disk = std::fs::read(&path);
            let drifted = if file.after_hash.is_empty() {
                false
            } else {
                match on_disk {
                    Ok(bytes) => hash_bytes(&bytes) != file.after_hash,
                    Err(_) => file.after_hash != hash_bytes(&[]),
                }
            };
            if drifted {
                return UndoReport {
                    success: false,
                    reverted_files: Vec::new(),
                    error: Some(format!(
                        "file {} has drifted since apply; refusing to undo",
                        file.path
                    )),
                };
            }
        }

        let mut reverted = Vec::new();
        for file in patch.files.iter().rev() {
            if let Err(e) = self.revert_file(file) {
                return UndoReport {
                    success: false,
                    reverted_files: reverted,
                    error: Some(format!("failed to revert {}: {e}", file.path)),
                };
            }
            reverted.push(file.path.clone());
        }

        self.history.remove(position);
        UndoReport {
            success: true,
            reverted_files: reverted,
            error: None,
        }
    }

    fn revert_file(&self, file: &AppliedFile) -> std::io::Result<()> {
        let path = self.root.join(&file.path);
        if let Some(encoded) = &file.deleted_content {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            return std::fs::write(&path, bytes);
        }

        if file.reverse_diff.trim().is_empty() {
            // A reverse diff for a brand-new file is empty by construction:
            // undo means removing the file entirely.
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            return Ok(());
        }

        apply_reverse_diff(&self.root, file)
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Flip `+`/`-` prefixes on content lines, leaving `---`/`+++` headers and
/// hunk ranges transposed so the result applies in the opposite direction.
/// New-file-mode patches have no meaningful reverse diff — undo for those
/// unlinks the file directly instead.
fn reverse_diff_text(file: &DiffFile) -> String {
    if file.is_new_file {
        return String::new();
    }
    let reversed = DiffFile {
        path: file.old_path.clone().unwrap_or_else(|| file.path.clone()),
        old_path: Some(file.path.clone()),
        is_new_file: file.is_deleted_file,
        is_deleted_file: file.is_new_file,
        is_binary: file.is_binary,
        hunks: file
            .hunks
            .iter()
            .map(|hunk| doomcode_proto::payload::DiffHunk {
                old_start: hunk.new_start,
                old_lines: hunk.new_lines,
                new_start: hunk.old_start,
                new_lines: hunk.old_lines,
                lines: hunk
                    .lines
                    .iter()
                    .map(|line| doomcode_proto::payload::DiffLine {
                        kind: match line.kind {
                            DiffLineKind::Addition => DiffLineKind::Deletion,
                            DiffLineKind::Deletion => DiffLineKind::Addition,
                            other => other,
                        },
                        text: line.text.clone(),
                    })
                    .collect(),
            })
            .collect(),
        additions: file.deletions,
        deletions: file.additions,
    };
    diff_parser::format_diff(std::slice::from_ref(&reversed))
}

/// Apply a stored reverse diff, preferring the native `patch(1)` tool via a
/// check-then-apply pair (§4.5.5): a `--dry-run` confirms the diff still
/// applies cleanly before anything touches disk, then a real invocation does
/// the write. Falls back to a manual line-based hunk applier when `patch(1)`
/// is absent or rejects the dry run — covers hosts without it installed and
/// every case this workspace's own diffs can produce.
fn apply_reverse_diff(root: &Path, file: &AppliedFile) -> std::io::Result<()> {
    let files = diff_parser::parse_diff(&file.reverse_diff);
    let Some(reversed) = files.into_iter().next() else {
        return Ok(());
    };

    let target = root.join(&file.path);
    if reversed.is_deleted_file {
        if target.exists() {
            std::fs::remove_file(&target)?;
        }
        return Ok(());
    }

    if apply_via_patch_tool(root, file).unwrap_or(false) {
        return Ok(());
    }

    apply_via_line_splice(&target, &reversed)
}

/// Check-then-apply against the system `patch` binary. Returns `Ok(true)` on
/// a successful real apply, `Ok(false)` if the dry run rejected the diff
/// (caller should fall back), and `Err` only for I/O failures unrelated to
/// whether the tool is installed.
fn apply_via_patch_tool(root: &Path, file: &AppliedFile) -> std::io::Result<bool> {
    use std::process::{Command, Stdio};

    let sanitized: String = file
        .path
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let patch_file = root.join(format!(".doomcode-undo-{sanitized}-{}.reversediff", std::process::id()));
    std::fs::write(&patch_file, &file.reverse_diff)?;

    let run = |dry_run: bool| -> std::io::Result<bool> {
        let mut command = Command::new("patch");
        command
            .current_dir(root)
            .arg("-p1")
            .arg("--forward")
            .arg("--input")
            .arg(&patch_file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if dry_run {
            command.arg("--dry-run");
        }
        match command.status() {
            Ok(status) => Ok(status.success()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    };

    let result = (|| {
        let dry_run_ok = run(true)?;
        if dry_run_ok {
            run(false)
        } else {
            Ok(false)
        }
    })();
    let _ = std::fs::remove_file(&patch_file);
    result
}

/// Manual line-based hunk applier, used when `patch(1)` is unavailable or
/// rejects the dry run.
fn apply_via_line_splice(target: &Path, reversed: &DiffFile) -> std::io::Result<()> {
    let original = std::fs::read_to_string(target).unwrap_or_default();
    let mut lines: Vec<String> = original.lines().map(str::to_string).collect();

    for hunk in reversed.hunks.iter().rev() {
        let start = hunk.old_start.saturating_sub(1) as usize;
        let old_count = hunk
            .lines
            .iter()
            .filter(|l| l.kind != DiffLineKind::Addition)
            .count();
        let replacement: Vec<String> = hunk
            .lines
            .iter()
            .filter(|l| l.kind != DiffLineKind::Deletion)
            .map(|l| l.text.clone())
            .collect();
        let end = (start + old_count).min(lines.len());
        lines.splice(start..end, replacement);
    }

    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(target, content)
}
