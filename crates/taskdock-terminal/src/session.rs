//! Pseudo-terminal session lifecycle.
//!
//! A `PtySession` owns exactly one pty master and one child shell. The
//! read loop and liveness poll are tokio tasks on the host runtime, not
//! dedicated threads. Teardown is reentrant because explicit `close()` and
//! asynchronous exit detection can race over the same handles; whichever
//! path gets there first wins and the other becomes a no-op.

use std::collections::HashMap;
use std::os::fd::AsRawFd;
use std::os::fd::RawFd;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use taskdock_common::mutex_lock_or_recover;

use crate::error::PtyError;
use crate::pty::PtyHandle;
use crate::shell;

/// Exit code reported when the real one is unknown: pty allocation or
/// spawn failed, or the child vanished without a reapable status. Real
/// shell exit codes are 0..=255, so this cannot collide with one.
pub const EXIT_CODE_UNKNOWN: i32 = -1;

const READ_CHUNK_SIZE: usize = 4096;
const LIVENESS_POLL_INTERVAL: Duration = Duration::from_millis(250);
const CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(1);
const CLOSE_WAIT_STEP: Duration = Duration::from_millis(50);

/// Monotonic within one instance; `restart` replaces the instance rather
/// than transitioning out of `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Construction has begun but the shell is not spawned yet. Never
    /// observable through [`PtySession::state`].
    NotStarted,
    Running,
    Terminated,
}

/// Events delivered to the session consumer, in strict read order.
#[derive(Debug)]
pub enum SessionEvent {
    /// Raw bytes from one read of the master side, never reordered or
    /// coalesced out of order.
    Output(Vec<u8>),
    /// The child is gone; carries its exit code or [`EXIT_CODE_UNKNOWN`].
    Terminated(i32),
}

/// Immutable inputs captured at construction and reused verbatim by
/// `restart`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub shell: PathBuf,
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
    pub cols: u16,
    pub rows: u16,
}

impl SessionConfig {
    /// Resolves the shell fallback chain and augments the collaborator's
    /// environment map with the terminal type and, for bash/sh-family
    /// shells, the prompt hook that emits the cwd marker.
    pub fn new(
        shell_override: Option<&Path>,
        working_dir: impl Into<PathBuf>,
        env: HashMap<String, String>,
    ) -> Self {
        let shell = shell::resolve_shell(shell_override);
        let env = shell::session_env(&shell, env);
        Self {
            shell,
            working_dir: working_dir.into(),
            env,
            cols: 80,
            rows: 24,
        }
    }

    pub fn with_size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }
}

struct Inner {
    state: SessionState,
    handle: Option<PtyHandle>,
    last_exit_code: Option<i32>,
    /// Taken on the first teardown path so the terminated event is emitted
    /// at most once per instance.
    events: Option<UnboundedSender<SessionEvent>>,
}

pub struct PtySession {
    config: SessionConfig,
    inner: Arc<Mutex<Inner>>,
    read_task: Option<JoinHandle<()>>,
}

impl PtySession {
    /// Allocates the pty and spawns the shell. Must be called on a tokio
    /// runtime; the read loop and liveness poll run as tasks on it.
    ///
    /// Failures never surface as errors: the returned session is already
    /// `Terminated` and the receiver holds a `Terminated(-1)` event.
    pub fn spawn(config: SessionConfig) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let handle = match PtyHandle::open(&config) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, shell = %config.shell.display(), "pty session failed to start");
                let _ = events_tx.send(SessionEvent::Terminated(EXIT_CODE_UNKNOWN));
                let inner = Arc::new(Mutex::new(Inner {
                    state: SessionState::Terminated,
                    handle: None,
                    last_exit_code: Some(EXIT_CODE_UNKNOWN),
                    events: None,
                }));
                return (
                    Self {
                        config,
                        inner,
                        read_task: None,
                    },
                    events_rx,
                );
            }
        };

        let master_fd = handle.master_fd();
        let inner = Arc::new(Mutex::new(Inner {
            state: SessionState::Running,
            handle: Some(handle),
            last_exit_code: None,
            events: Some(events_tx),
        }));

        let read_task = tokio::spawn(read_loop(Arc::clone(&inner), master_fd));

        (
            Self {
                config,
                inner,
                read_task: Some(read_task),
            },
            events_rx,
        )
    }

    pub fn state(&self) -> SessionState {
        mutex_lock_or_recover(&self.inner).state
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        mutex_lock_or_recover(&self.inner).last_exit_code
    }

    pub fn pid(&self) -> Option<u32> {
        mutex_lock_or_recover(&self.inner)
            .handle
            .as_ref()
            .and_then(PtyHandle::pid)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Best-effort write. Input is dropped silently when the session is
    /// not running or the descriptor rejects it; the child may have just
    /// died and that is not the caller's problem.
    pub fn write(&self, bytes: &[u8]) {
        let mut guard = mutex_lock_or_recover(&self.inner);
        if guard.state != SessionState::Running {
            return;
        }
        if let Some(handle) = guard.handle.as_mut() {
            if let Err(e) = handle.write(bytes) {
                debug!(error = %e, "dropping input write to pty");
            }
        }
    }

    /// Fire-and-forget signal delivery to the child's process group, with
    /// a direct-to-child fallback inside. Safe no-op without a live child.
    pub fn send_signal(&self, signal: i32) {
        let guard = mutex_lock_or_recover(&self.inner);
        if guard.state != SessionState::Running {
            return;
        }
        if let Some(handle) = guard.handle.as_ref() {
            if let Err(e) = handle.signal(signal) {
                debug!(error = %e, signal, "signal delivery failed");
            }
        }
    }

    /// Discards this instance and constructs a fresh one from the captured
    /// config: new master descriptor, new child, new event channel.
    /// Nothing buffered for the old instance reaches the new one.
    pub fn restart(&mut self) -> UnboundedReceiver<SessionEvent> {
        self.close();
        let (next, events) = Self::spawn(self.config.clone());
        *self = next;
        events
    }

    /// Tears the session down: stops the read loop and liveness poll,
    /// nudges a live child with SIGTERM to its group, waits a bounded
    /// moment for exit, force-kills, and closes the master. Idempotent;
    /// explicit shutdown and exit detection may both land here.
    pub fn close(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }

        let handle = {
            let mut guard = mutex_lock_or_recover(&self.inner);
            guard.events.take();
            guard.state = SessionState::Terminated;
            guard.handle.take()
        };
        let Some(mut handle) = handle else {
            return;
        };

        let mut code = handle.try_wait();
        if code.is_none() {
            if let Err(e) = handle.signal(libc::SIGTERM) {
                debug!(error = %e, "graceful termination signal failed");
            }
            let deadline = Instant::now() + CLOSE_GRACE_PERIOD;
            loop {
                code = handle.try_wait();
                if code.is_some() || Instant::now() >= deadline {
                    break;
                }
                std::thread::sleep(CLOSE_WAIT_STEP);
            }
            if code.is_none() {
                handle.kill();
            }
        }

        if let Some(code) = code {
            let mut guard = mutex_lock_or_recover(&self.inner);
            guard.last_exit_code.get_or_insert(code);
        }
        // handle drops here, closing the master descriptor exactly once
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.close();
    }
}

/// The master fd wrapped for reactor registration. The descriptor outlives
/// the registration: the read loop owns it only through the `Inner` handle
/// and `close()` aborts the loop before the handle drops.
struct MasterFd(RawFd);

impl AsRawFd for MasterFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

enum ReadOutcome {
    Data,
    WouldBlock,
    Closed,
}

async fn read_loop(inner: Arc<Mutex<Inner>>, master_fd: RawFd) {
    let fd = match AsyncFd::with_interest(MasterFd(master_fd), Interest::READABLE) {
        Ok(fd) => fd,
        Err(e) => {
            warn!(error = %e, "failed to register pty fd with the reactor");
            finish(&inner, None);
            return;
        }
    };

    // Catches children that exit without ever producing output.
    let mut liveness = tokio::time::interval(LIVENESS_POLL_INTERVAL);
    let mut buf = [0u8; READ_CHUNK_SIZE];

    loop {
        tokio::select! {
            ready = fd.readable() => {
                let mut ready = match ready {
                    Ok(ready) => ready,
                    Err(e) => {
                        debug!(error = %e, "pty readiness wait failed");
                        finish(&inner, None);
                        break;
                    }
                };
                match read_once(&inner, &mut buf) {
                    ReadOutcome::Data => ready.retain_ready(),
                    ReadOutcome::WouldBlock => ready.clear_ready(),
                    ReadOutcome::Closed => {
                        finish(&inner, None);
                        break;
                    }
                }
            }
            _ = liveness.tick() => {
                let exited = {
                    let mut guard = mutex_lock_or_recover(&inner);
                    if guard.state != SessionState::Running {
                        break;
                    }
                    guard.handle.as_mut().and_then(PtyHandle::try_wait)
                };
                if let Some(code) = exited {
                    finish(&inner, Some(code));
                    break;
                }
            }
        }
    }
}

/// One non-blocking read of at most [`READ_CHUNK_SIZE`] bytes. Zero bytes
/// or a device-gone error both mean the terminal is over.
fn read_once(inner: &Arc<Mutex<Inner>>, buf: &mut [u8]) -> ReadOutcome {
    let mut guard = mutex_lock_or_recover(inner);
    if guard.state != SessionState::Running {
        return ReadOutcome::Closed;
    }
    let Some(handle) = guard.handle.as_mut() else {
        return ReadOutcome::Closed;
    };
    match handle.read(buf) {
        Ok(0) => ReadOutcome::Closed,
        Ok(n) => {
            let chunk = buf[..n].to_vec();
            if let Some(events) = guard.events.as_ref() {
                let _ = events.send(SessionEvent::Output(chunk));
            }
            ReadOutcome::Data
        }
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => ReadOutcome::WouldBlock,
        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => ReadOutcome::Data,
        Err(e) => {
            // EIO/EBADF-class errors after the child dies are ordinary exit
            let err = PtyError::Read(e.to_string());
            debug!(error = %err, "treating read failure as exit");
            ReadOutcome::Closed
        }
    }
}

/// Exit-detection teardown. First caller wins: transitions to Terminated,
/// harvests the exit code, releases the handle and emits the terminated
/// event exactly once.
fn finish(inner: &Arc<Mutex<Inner>>, code_hint: Option<i32>) {
    let (events, code) = {
        let mut guard = mutex_lock_or_recover(inner);
        if guard.state == SessionState::Terminated {
            return;
        }
        guard.state = SessionState::Terminated;
        let mut code = code_hint;
        if let Some(mut handle) = guard.handle.take() {
            if code.is_none() {
                code = handle.try_wait();
            }
            // handle drops here, closing the master descriptor
        }
        let code = code.unwrap_or(EXIT_CODE_UNKNOWN);
        guard.last_exit_code = Some(code);
        (guard.events.take(), code)
    };
    if let Some(events) = events {
        let _ = events.send(SessionEvent::Terminated(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh_config(dir: &Path) -> SessionConfig {
        SessionConfig::new(Some(Path::new("/bin/sh")), dir, HashMap::new())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawn_reaches_running() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _events) = PtySession::spawn(sh_config(dir.path()));
        assert_eq!(session.state(), SessionState::Running);
        assert!(session.pid().is_some());
        session.close();
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _events) = PtySession::spawn(sh_config(dir.path()));
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_signal_is_noop_without_live_child() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _events) = PtySession::spawn(sh_config(dir.path()));
        session.close();
        session.send_signal(libc::SIGINT);
        session.write(b"ignored\n");
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawn_failure_terminates_with_unknown_code() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::new(
            Some(Path::new("/nonexistent/taskdock-test-shell")),
            dir.path(),
            HashMap::new(),
        );
        let (session, mut events) = PtySession::spawn(config);

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut terminated = None;
        while Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
                Ok(Some(SessionEvent::Terminated(code))) => {
                    terminated = Some(code);
                    break;
                }
                Ok(Some(SessionEvent::Output(_))) => {}
                Ok(None) => break,
                Err(_) => {}
            }
        }

        let code = terminated.expect("terminated event");
        assert_ne!(code, 0);
        assert_eq!(session.state(), SessionState::Terminated);
    }
}
