//! PTY provider abstraction (§4.5.2, §9 "multi-backend PTY fallback").
//!
//! The rest of the supervisor talks to whichever backend is active through
//! one trait; it never branches on which provider is live. [`native`] wraps
//! `portable-pty`'s platform backend. [`bridge`] is the fallback used when
//! the native backend's spawn fails (`posix_spawnp failed` on some hosts):
//! a small helper process that allocates its own PTY and proxies bytes over
//! pipes to this process.

pub mod bridge;
pub mod native;

use std::io;

/// Initial window size for a freshly spawned assistant (§4.5.2).
pub const INITIAL_COLS: u16 = 120;
pub const INITIAL_ROWS: u16 = 40;

/// A live PTY-attached subprocess, regardless of backend.
pub trait PtyProvider: Send {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn resize(&mut self, cols: u16, rows: u16) -> io::Result<()>;
    fn kill(&mut self) -> io::Result<()>;
    /// True once the child process has exited (reaped or observed dead).
    fn try_wait(&mut self) -> io::Result<Option<i32>>;
    /// A cloneable handle to read the combined stdout/stderr stream.
    fn take_reader(&mut self) -> io::Result<Box<dyn io::Read + Send>>;
}

/// Environment variables every backend sets on the child (§4.5.2): a
/// capable terminal type, forced color output, CI disabled (many assistants
/// suppress interactive prompts when `CI` is truthy), and a concrete shell.
pub fn child_env() -> Vec<(String, String)> {
    vec![
        ("TERM".into(), "xterm-256color".into()),
        ("FORCE_COLOR".into(), "1".into()),
        ("CI".into(), "false".into()),
        ("SHELL".into(), default_shell()),
    ]
}

fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".into())
}

/// Locate the configured assistant binary by probing a fixed list of
/// filesystem roots before falling back to a `PATH` search (§4.5.2).
pub fn locate_agent_binary(name: &str) -> Option<std::path::PathBuf> {
    let fixed_roots = [
        "/usr/local/bin",
        "/usr/bin",
        "/opt/homebrew/bin",
        "/snap/bin",
    ];
    for root in fixed_roots {
        let candidate = std::path::Path::new(root).join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    which_in_path(name)
}

fn which_in_path(name: &str) -> Option<std::path::PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
