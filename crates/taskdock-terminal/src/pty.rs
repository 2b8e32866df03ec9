//! Low-level pty plumbing: one master/slave pair, one spawned shell.

use std::io;
use std::io::Read;
use std::io::Write;
use std::os::fd::RawFd;

use portable_pty::native_pty_system;
use portable_pty::Child;
use portable_pty::CommandBuilder;
use portable_pty::MasterPty;
use portable_pty::PtySize;
use tracing::debug;

use crate::error::PtyError;
use crate::session::SessionConfig;

/// Exclusive owner of the master descriptor, its reader/writer halves and
/// the child handle. Each is released exactly once when the handle drops.
pub(crate) struct PtyHandle {
    /// Held for ownership only; dropping it closes the master side.
    _master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
    master_fd: RawFd,
    exit_code: Option<i32>,
}

impl PtyHandle {
    /// Allocates the pair and spawns the shell with the slave wired to its
    /// stdio. portable-pty places the child in a fresh session with the
    /// slave as controlling terminal, so the child pid doubles as the
    /// process-group id for signal fan-out. The parent's slave copy is
    /// dropped before returning, and the master is switched to
    /// non-blocking for both halves (they share the open file
    /// description).
    pub(crate) fn open(config: &SessionConfig) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();
        let size = PtySize {
            rows: config.rows,
            cols: config.cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        let pair = pty_system
            .openpty(size)
            .map_err(|e| PtyError::Allocation(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&config.shell);
        cmd.cwd(&config.working_dir);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::Spawn(e.to_string()))?;
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Allocation(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Allocation(e.to_string()))?;
        let master_fd = pair
            .master
            .as_raw_fd()
            .ok_or_else(|| PtyError::Allocation("no raw fd for pty master".to_string()))?;
        set_non_blocking(master_fd)?;

        Ok(Self {
            _master: pair.master,
            child,
            reader,
            writer,
            master_fd,
            exit_code: None,
        })
    }

    pub(crate) fn master_fd(&self) -> RawFd {
        self.master_fd
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    pub(crate) fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }

    /// One non-blocking attempt. A short write is surfaced as an error so
    /// the caller drops the tail instead of stalling the host loop.
    pub(crate) fn write(&mut self, bytes: &[u8]) -> Result<(), PtyError> {
        if bytes.is_empty() {
            return Ok(());
        }
        match self.writer.write(bytes) {
            Ok(n) if n == bytes.len() => {
                let _ = self.writer.flush();
                Ok(())
            }
            Ok(n) => Err(PtyError::Write(format!(
                "short write: {n} of {} bytes",
                bytes.len()
            ))),
            Err(e) => Err(PtyError::Write(e.to_string())),
        }
    }

    /// Reaps the child if it has exited. The code is remembered so the
    /// teardown paths racing over this handle all see the same answer.
    pub(crate) fn try_wait(&mut self) -> Option<i32> {
        if self.exit_code.is_some() {
            return self.exit_code;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_code = Some(status.exit_code() as i32);
                self.exit_code
            }
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "pty child wait failed");
                None
            }
        }
    }

    /// Delivers a signal to the child's whole process group so interactive
    /// interrupts reach the foreground job, falling back to the child
    /// itself when the group cannot be targeted.
    pub(crate) fn signal(&self, signal: i32) -> Result<(), PtyError> {
        let Some(pid) = self.child.process_id() else {
            return Err(PtyError::Signal("no child process".to_string()));
        };
        let pid = pid as i32;
        // SAFETY: killpg/kill with a pid we spawned and a caller-chosen
        // signal number; a stale pid at worst yields ESRCH.
        if unsafe { libc::killpg(pid, signal) } == 0 {
            return Ok(());
        }
        if unsafe { libc::kill(pid, signal) } == 0 {
            return Ok(());
        }
        Err(PtyError::Signal(io::Error::last_os_error().to_string()))
    }

    pub(crate) fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            debug!(error = %e, "force kill failed");
        }
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        if self.try_wait().is_none() {
            self.kill();
            // reap so the child does not linger as a zombie
            if let Ok(status) = self.child.wait() {
                self.exit_code = Some(status.exit_code() as i32);
            }
        }
    }
}

fn set_non_blocking(fd: RawFd) -> Result<(), PtyError> {
    // SAFETY: fcntl on a descriptor we own; F_GETFL/F_SETFL take no
    // pointers.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(PtyError::Allocation(io::Error::last_os_error().to_string()));
    }
    if flags & libc::O_NONBLOCK == 0 {
        let result = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if result < 0 {
            return Err(PtyError::Allocation(io::Error::last_os_error().to_string()));
        }
    }
    Ok(())
}
