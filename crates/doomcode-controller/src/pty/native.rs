//! Native PTY backend via `portable-pty` (§4.5.2, preferred backend).

use std::io;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use super::{child_env, PtyProvider, INITIAL_COLS, INITIAL_ROWS};

pub struct NativePty {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn io::Write + Send>,
    child: Box<dyn Child + Send + Sync>,
}

impl NativePty {
    /// Spawn `program` attached to a fresh native PTY. Returns an error the
    /// caller should interpret as "fall back to the bridge backend"
    /// (§4.5.2: "Used when (1) fails").
    pub fn spawn(program: &std::path::Path, args: &[String]) -> io::Result<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: INITIAL_ROWS,
                cols: INITIAL_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(to_io_error)?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        for (key, value) in child_env() {
            cmd.env(key, value);
        }

        let child = pair.slave.spawn_command(cmd).map_err(to_io_error)?;
        let writer = pair.master.take_writer().map_err(to_io_error)?;

        Ok(Self {
            master: pair.master,
            writer,
            child,
        })
    }
}

impl PtyProvider for NativePty {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()
    }

    fn resize(&mut self, cols: u16, rows: u16) -> io::Result<()> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(to_io_error)
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        match self.child.try_wait()? {
            Some(status) => Ok(Some(status.exit_code() as i32)),
            None => Ok(None),
        }
    }

    fn take_reader(&mut self) -> io::Result<Box<dyn io::Read + Send>> {
        self.master.try_clone_reader().map_err(to_io_error)
    }
}

fn to_io_error(e: anyhow::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}
