//! Input-injection discipline (§4.5.2).
//!
//! Sending a prompt to the assistant is not "write a line": line-ending
//! behavior differs across backends and terminal line disciplines. The
//! supervisor picks line-write on the native backend and typewrite on the
//! bridge backend by default, overridable per invocation.

use std::time::Duration;

use tokio::time::sleep;

use crate::config::EnterMode;
use crate::pty::PtyProvider;

const PRIME_DELAY: Duration = Duration::from_millis(50);
const FORCE_SUBMIT_GAP: Duration = Duration::from_millis(10);
const ESC: u8 = 0x1b;
const CR: u8 = 0x0d;
const LF: u8 = 0x0a;

/// Append the enter suffix once after the payload bytes.
pub fn write_line(pty: &mut dyn PtyProvider, payload: &str, enter_mode: EnterMode) -> std::io::Result<()> {
    pty.write(payload.as_bytes())?;
    pty.write(enter_mode.as_bytes())
}

/// Send an `ESC` (bridge backend only, to break out of any composed-input
/// mode), wait a short prime delay, emit the payload one code point at a
/// time with a configurable per-character delay, then force-submit with
/// both `CR` and `LF` separated by a short gap — reliable across assistants
/// regardless of their chosen line discipline.
pub async fn typewrite(
    pty: &mut dyn PtyProvider,
    payload: &str,
    per_char_delay: Duration,
    send_escape: bool,
) -> std::io::Result<()> {
    if send_escape {
        pty.write(&[ESC])?;
    }
    sleep(PRIME_DELAY).await;

    for ch in payload.chars() {
        let mut buf = [0u8; 4];
        pty.write(ch.encode_utf8(&mut buf).as_bytes())?;
        sleep(per_char_delay).await;
    }

    pty.write(&[CR])?;
    sleep(FORCE_SUBMIT_GAP).await;
    pty.write(&[LF])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingPty {
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl PtyProvider for RecordingPty {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.written.lock().unwrap().extend_from_slice(bytes);
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

    #[test]
    fn write_line_appends_exact_enter_mode_once() {
        let mut pty = RecordingPty::default();
        let written = pty.written.clone();
        write_line(&mut pty, "hello", EnterMode::CrLf).unwrap();
        assert_eq!(&written.lock().unwrap()[..], b"hello\r\n");
    }

    #[test]
    fn write_line_cr_mode_appends_only_cr() {
        let mut pty = RecordingPty::default();
        let written = pty.written.clone();
        write_line(&mut pty, "hi", EnterMode::Cr).unwrap();
        assert_eq!(&written.lock().unwrap()[..], b"hi\r");
    }

    #[tokio::test]
    async fn typewrite_emits_payload_then_force_submit() {
        let mut pty = RecordingPty::default();
        let written = pty.written.clone();
        typewrite(&mut pty, "ok", Duration::from_millis(0), true)
            .await
            .unwrap();
        let bytes = written.lock().unwrap().clone();
        assert_eq!(bytes, vec![ESC, b'o', b'k', CR, LF]);
    }

    #[tokio::test]
    async fn typewrite_skips_escape_on_native_backend() {
        let mut pty = RecordingPty::default();
        let written = pty.written.clone();
        typewrite(&mut pty, "x", Duration::from_millis(0), false)
            .await
            .unwrap();
        let bytes = written.lock().unwrap().clone();
        assert_eq!(bytes, vec![b'x', CR, LF]);
    }
}
