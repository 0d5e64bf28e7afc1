//! Bridge fallback backend (§4.5.2, §9).
//!
//! Used when [`super::native::NativePty::spawn`] fails (`posix_spawnp
//! failed` on some hosts). Rather than reimplement PTY allocation by hand,
//! this shells out to the system `script(1)` utility, which already does
//! exactly what §9 asks of a fallback: a small helper process that
//! allocates its own PTY, connects the child to its slave, and proxies
//! bytes to and from the parent over pipes. The supervisor only ever sees
//! [`PtyProvider`], so it cannot tell which backend produced a given byte.

use std::io;
use std::process::{Child, Command, Stdio};

use super::{child_env, PtyProvider};
use crate::config::EnterMode;

pub struct BridgePty {
    child: Child,
    stdin: std::process::ChildStdin,
}

impl BridgePty {
    /// Spawn `program` under `script(1)`. `enter_mode` controls whether the
    /// slave terminal's `ICRNL` line discipline stays on (the default,
    /// appropriate for `cr` mode) or is disabled up front (`lf`/`crlf`
    /// modes, where the supervisor wants to control the line ending itself
    /// rather than have the tty translate it).
    pub fn spawn(
        program: &std::path::Path,
        args: &[String],
        enter_mode: EnterMode,
    ) -> io::Result<Self> {
        let inner_command = build_inner_command(program, args, enter_mode);
        let mut command = script_command(&inner_command);

        for (key, value) in child_env() {
            command.env(key, value);
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "bridge process has no stdin"))?;

        Ok(Self { child, stdin })
    }
}

fn build_inner_command(program: &std::path::Path, args: &[String], enter_mode: EnterMode) -> String {
    let quoted_program = shell_quote(&program.to_string_lossy());
    let quoted_args: Vec<String> = args.iter().map(|a| shell_quote(a)).collect();
    let mut parts = vec![quoted_program];
    parts.extend(quoted_args);
    let command_line = parts.join(" ");

    match enter_mode {
        EnterMode::Cr => command_line,
        EnterMode::Lf | EnterMode::CrLf => format!("stty -icrnl; {command_line}"),
    }
}

#[cfg(target_os = "macos")]
fn script_command(inner_command: &str) -> Command {
    let mut command = Command::new("script");
    command.args(["-q", "/dev/null", "/bin/sh", "-c", inner_command]);
    command
}

#[cfg(not(target_os = "macos"))]
fn script_command(inner_command: &str) -> Command {
    let mut command = Command::new("script");
    command.args(["-qefc", inner_command, "/dev/null"]);
    command
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

impl PtyProvider for BridgePty {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        use std::io::Write;
        self.stdin.write_all(bytes)?;
        self.stdin.flush()
    }

    fn resize(&mut self, _cols: u16, _rows: u16) -> io::Result<()> {
        // script(1) does not expose a runtime resize control from the
        // parent side; the bridge backend accepts a fixed initial geometry.
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(|status| status.code().unwrap_or(-1)))
    }

    fn take_reader(&mut self) -> io::Result<Box<dyn io::Read + Send>> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn io::Read + Send>)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "bridge process has no stdout"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn lf_mode_disables_icrnl() {
        let cmd = build_inner_command(std::path::Path::new("/bin/echo"), &[], EnterMode::Lf);
        assert!(cmd.starts_with("stty -icrnl;"));
    }

    #[test]
    fn cr_mode_leaves_icrnl_alone() {
        let cmd = build_inner_command(std::path::Path::new("/bin/echo"), &[], EnterMode::Cr);
        assert!(!cmd.contains("stty"));
    }
}
