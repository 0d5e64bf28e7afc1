//! Hand-rolled unified-diff parser (§4.5.4).
//!
//! Invoked by the diff extractor and by the patch tracker's reverse-diff
//! step. No external diff-parsing crate is pulled in: the grammar this
//! workspace needs is small and fully specified, so this is the same kind of
//! self-contained textual parser the rest of the workspace writes by hand.

use doomcode_proto::payload::{DiffFile, DiffHunk, DiffLine, DiffLineKind};

/// Parse a textual unified diff into file/hunk/line records plus derived
/// per-file statistics. Unrecognized preamble lines between file boundaries
/// are skipped; a diff with no recognizable `diff --git` or `---`/`+++` pair
/// yields an empty file list rather than an error — callers treat "nothing
/// parsed" as "not actually a diff".
pub fn parse_diff(text: &str) -> Vec<DiffFile> {
    let lines: Vec<&str> = text.lines().collect();
    let mut files = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if lines[i].starts_with("diff --git ") || lines[i].starts_with("--- ") {
            let (file, consumed) = parse_file(&lines[i..]);
            if let Some(file) = file {
                files.push(file);
            }
            i += consumed.max(1);
        } else {
            i += 1;
        }
    }

    files
}

fn parse_file(lines: &[&str]) -> (Option<DiffFile>, usize) {
    let mut idx = 0;
    let mut old_path = None;
    let mut new_path = None;
    let mut is_new_file = false;
    let mut is_deleted_file = false;
    let mut is_binary = false;
    let mut rename_from = None;
    let mut rename_to = None;

    if lines[idx].starts_with("diff --git ") {
        idx += 1;
    }

    while idx < lines.len() {
        let line = lines[idx];
        if line.starts_with("new file mode") {
            is_new_file = true;
            idx += 1;
        } else if line.starts_with("deleted file mode") {
            is_deleted_file = true;
            idx += 1;
        } else if let Some(rest) = line.strip_prefix("rename from ") {
            rename_from = Some(rest.trim().to_string());
            idx += 1;
        } else if let Some(rest) = line.strip_prefix("rename to ") {
            rename_to = Some(rest.trim().to_string());
            idx += 1;
        } else if line.starts_with("Binary files ") || line.starts_with("GIT binary patch") {
            is_binary = true;
            idx += 1;
        } else if let Some(rest) = line.strip_prefix("--- ") {
            old_path = parse_path_marker(rest);
            idx += 1;
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            new_path = parse_path_marker(rest);
            idx += 1;
        } else if line.starts_with("@@") {
            break;
        } else if line.starts_with("diff --git ") {
            break;
        } else {
            idx += 1;
        }
    }

    let (path, old_path_field) = resolve_paths(old_path, new_path, rename_from, rename_to);

    let mut hunks = Vec::new();
    while idx < lines.len() && lines[idx].starts_with("@@") {
        let (hunk, consumed) = parse_hunk(&lines[idx..]);
        if let Some(hunk) = hunk {
            hunks.push(hunk);
        }
        idx += consumed.max(1);
        if idx < lines.len() && lines[idx].starts_with("diff --git ") {
            break;
        }
    }

    if path.is_none() && hunks.is_empty() && !is_binary {
        return (None, idx.max(1));
    }

    let (additions, deletions) = hunks.iter().fold((0u32, 0u32), |(a, d), hunk| {
        let hunk_a = hunk
            .lines
            .iter()
            .filter(|l| l.kind == DiffLineKind::Addition)
            .count() as u32;
        let hunk_d = hunk
            .lines
            .iter()
            .filter(|l| l.kind == DiffLineKind::Deletion)
            .count() as u32;
        (a + hunk_a, d + hunk_d)
    });

    let file = DiffFile {
        path: path.unwrap_or_default(),
        old_path: old_path_field,
        is_new_file,
        is_deleted_file,
        is_binary,
        hunks,
        additions,
        deletions,
    };

    (Some(file), idx.max(1))
}

/// `/dev/null` implies the file is being added (as `---`) or removed (as
/// `+++`); otherwise strip the leading `a/`/`b/` prefix git conventionally
/// uses.
fn parse_path_marker(rest: &str) -> Option<String> {
    let path = rest.split('\t').next().unwrap_or(rest).trim();
    if path == "/dev/null" {
        return None;
    }
    let stripped = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    Some(stripped.to_string())
}

fn resolve_paths(
    old_path: Option<String>,
    new_path: Option<String>,
    rename_from: Option<String>,
    rename_to: Option<String>,
) -> (Option<String>, Option<String>) {
    if let (Some(from), Some(to)) = (rename_from, rename_to) {
        return (Some(to), Some(from));
    }
    match (old_path, new_path) {
        (Some(_old), Some(new)) => (Some(new), None),
        (Some(old), None) => (Some(old), None),
        (None, Some(new)) => (Some(new), None),
        (None, None) => (None, None),
    }
}

/// Parse one `@@ -o,ol +n,nl @@` hunk header and its body lines. A count
/// omitted in the header (`@@ -5 +5 @@`) implies a one-line hunk.
fn parse_hunk(lines: &[&str]) -> (Option<DiffHunk>, usize) {
    let header = lines[0];
    let Some(parsed) = parse_hunk_header(header) else {
        return (None, 1);
    };
    let (old_start, old_lines, new_start, new_lines) = parsed;

    let mut body = Vec::new();
    let mut idx = 1;
    while idx < lines.len() {
        let line = lines[idx];
        if line.starts_with("@@") || line.starts_with("diff --git ") {
            break;
        }
        let kind = match line.chars().next() {
            Some('+') => DiffLineKind::Addition,
            Some('-') => DiffLineKind::Deletion,
            Some('\\') => {
                // "\ No newline at end of file" — not a content line.
                idx += 1;
                continue;
            }
            _ => DiffLineKind::Context,
        };
        let text = line.get(1..).unwrap_or("").to_string();
        body.push(DiffLine { kind, text });
        idx += 1;
    }

    (
        Some(DiffHunk {
            old_start,
            old_lines,
            new_start,
            new_lines,
            lines: body,
        }),
        idx,
    )
}

fn parse_hunk_header(header: &str) -> Option<(u32, u32, u32, u32)> {
    let inner = header
        .strip_prefix("@@ ")
        .and_then(|s| s.split(" @@").next())?;
    let mut parts = inner.split_whitespace();
    let old = parts.next()?.strip_prefix('-')?;
    let new = parts.next()?.strip_prefix('+')?;
    let (old_start, old_lines) = parse_range(old)?;
    let (new_start, new_lines) = parse_range(new)?;
    Some((old_start, old_lines, new_start, new_lines))
}

fn parse_range(range: &str) -> Option<(u32, u32)> {
    match range.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

/// Render file records back to a textual unified diff. Inverse of
/// [`parse_diff`] for the subset this workspace produces (§8 property:
/// `parseDiff(formatDiff(files)) == files`).
pub fn format_diff(files: &[DiffFile]) -> String {
    let mut out = String::new();
    for file in files {
        let old_display = file.old_path.as_deref().unwrap_or(&file.path);
        out.push_str(&format!("diff --git a/{old_display} b/{}\n", file.path));
        if file.is_new_file {
            out.push_str("new file mode 100644\n");
        }
        if file.is_deleted_file {
            out.push_str("deleted file mode 100644\n");
        }
        if file.is_binary {
            out.push_str(&format!("Binary files a/{old_display} and b/{} differ\n", file.path));
            continue;
        }
        let old_marker = if file.is_new_file {
            "/dev/null".to_string()
        } else {
            format!("a/{old_display}")
        };
        let new_marker = if file.is_deleted_file {
            "/dev/null".to_string()
        } else {
            format!("b/{}", file.path)
        };
        out.push_str(&format!("--- {old_marker}\n+++ {new_marker}\n"));

        for hunk in &file.hunks {
            out.push_str(&format!(
                "@@ -{},{} +{},{} @@\n",
                hunk.old_start, hunk.old_lines, hunk.new_start, hunk.new_lines
            ));
            for line in &hunk.lines {
                let prefix = match line.kind {
                    DiffLineKind::Addition => '+',
                    DiffLineKind::Deletion => '-',
                    DiffLineKind::Context | DiffLineKind::Header => ' ',
                };
                out.push(prefix);
                out.push_str(&line.text);
                out.push('\n');
            }
        }
    }
    out
}
