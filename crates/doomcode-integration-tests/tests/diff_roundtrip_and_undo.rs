//! §8 "Diff round-trip and undo": a recognizable unified diff against a
//! 20-line file is extracted, prepared, applied, and finalized by the
//! patch tracker, then undone — restoring the on-disk SHA-256 to the
//! pre-apply hash.

use std::io::Write as _;

use doomcode_controller::diff_parser;
use doomcode_controller::patch_tracker::PatchTracker;
use doomcode_controller::scanners::diff::DiffExtractor;
use doomcode_controller::scanners::Scanner;
use doomcode_proto::payload::Payload;
use sha2::{Digest, Sha256};

fn hash_file(path: &std::path::Path) -> String {
    let bytes = std::fs::read(path).expect("read file");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

fn twenty_lines() -> String {
    (1..=20).map(|n| format!("line {n}\n")).collect()
}

#[tokio::test]
async fn apply_then_undo_restores_original_content_and_hash() {
    let root = std::env::temp_dir().join(format!("doomcode-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&root).expect("create temp root");
    let file_path = root.join("foo.txt");

    let original = twenty_lines();
    std::fs::write(&file_path, &original).expect("write original file");
    let before_hash = hash_file(&file_path);

    // A hand-built unified diff changing line 10 of foo.txt, mirroring what
    // DiffExtractor would pull out of a real assistant's terminal output.
    let diff_text = "diff --git a/foo.txt b/foo.txt\n\
--- a/foo.txt\n\
+++ b/foo.txt\n\
@@ -8,5 +8,5 @@\n\
 line 8\n\
 line 9\n\
-line 10\n\
+line ten (edited)\n\
 line 11\n\
 line 12\n\
1 file changed\n";

    let mut extractor = DiffExtractor::new();
    let mut event = None;
    for line in diff_text.lines() {
        let outcome = extractor.scan(line);
        if outcome.event.is_some() {
            event = outcome.event;
        }
    }
    let Some(Payload::DiffPatch { patch_id, files, .. }) = event else {
        panic!("expected a diff_patch payload from the extractor");
    };
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "foo.txt");

    let mut tracker = PatchTracker::new(root.clone());
    let prepared = tracker.prepare(patch_id.clone(), "agent-1", Some("edit line 10".to_string()), &files);
    assert_eq!(prepared.files[0].before_hash, before_hash);

    // The agent applies the forward diff itself; the tracker only observes
    // before/after state, so apply it here the way the real PTY-driven agent
    // would via the same formatter the extractor's parser round-trips with.
    let forward_text = diff_parser::format_diff(&files);
    assert!(forward_text.contains("line ten (edited)"));
    let patched = original.replace("line 10\n", "line ten (edited)\n");
    let mut handle = std::fs::File::create(&file_path).expect("reopen for patch");
    handle.write_all(patched.as_bytes()).expect("write patched content");
    drop(handle);

    tracker.finalize(&patch_id);
    let after_hash = hash_file(&file_path);
    assert_ne!(after_hash, before_hash);

    let report = tracker.undo(&patch_id);
    assert!(report.success, "undo failed: {:?}", report.error);
    assert_eq!(report.reverted_files, vec!["foo.txt".to_string()]);

    let restored_hash = hash_file(&file_path);
    assert_eq!(restored_hash, before_hash);
    let restored_content = std::fs::read_to_string(&file_path).expect("read restored file");
    assert_eq!(restored_content, original);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn undo_refuses_when_file_has_drifted_since_apply() {
    let root = std::env::temp_dir().join(format!("doomcode-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&root).expect("create temp root");
    let file_path = root.join("foo.txt");
    std::fs::write(&file_path, twenty_lines()).expect("write original file");

    let diff_text = "diff --git a/foo.txt b/foo.txt\n\
--- a/foo.txt\n\
+++ b/foo.txt\n\
@@ -1,2 +1,2 @@\n\
-line 1\n\
+line one (edited)\n\
 line 2\n\
1 file changed\n";

    let mut extractor = DiffExtractor::new();
    let mut event = None;
    for line in diff_text.lines() {
        let outcome = extractor.scan(line);
        if outcome.event.is_some() {
            event = outcome.event;
        }
    }
    let Some(Payload::DiffPatch { patch_id, files, .. }) = event else {
        panic!("expected a diff_patch payload from the extractor");
    };

    let mut tracker = PatchTracker::new(root.clone());
    tracker.prepare(patch_id.clone(), "agent-1", None, &files);

    let patched = twenty_lines().replace("line 1\n", "line one (edited)\n");
    std::fs::write(&file_path, patched).expect("write patched content");
    tracker.finalize(&patch_id);

    // The file changes again after finalize, outside the tracker's knowledge.
    std::fs::write(&file_path, "something else entirely\n").expect("simulate drift");

    let report = tracker.undo(&patch_id);
    assert!(!report.success);
    assert!(report.error.is_some());
    assert!(report.reverted_files.is_empty());

    std::fs::remove_dir_all(&root).ok();
}
