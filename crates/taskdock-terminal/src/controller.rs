//! Host-facing terminal controller.
//!
//! Composes one pty session, one output filter and one display buffer.
//! UI input events become wire bytes; session output becomes display
//! updates. The controller lives exactly as long as the hosting view:
//! created when the view first shows, `shutdown()` when it is destroyed.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use taskdock_common::mutex_lock_or_recover;
use taskdock_common::rwlock_read_or_recover;
use taskdock_common::rwlock_write_or_recover;

use crate::buffer::DisplayBuffer;
use crate::filter::OutputFilter;
use crate::keymap::key_to_bytes;
use crate::session::PtySession;
use crate::session::SessionConfig;
use crate::session::SessionEvent;
use crate::session::SessionState;

/// Status surfaced to the host's indicator; the newest state wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "exit_code", rename_all = "snake_case")]
pub enum ControllerStatus {
    Engaging,
    Ready,
    Resetting,
    Terminated(i32),
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerStatus::Engaging => write!(f, "engaging…"),
            ControllerStatus::Ready => write!(f, "ready"),
            ControllerStatus::Resetting => write!(f, "resetting…"),
            ControllerStatus::Terminated(code) => write!(f, "terminated (exit {code})"),
        }
    }
}

/// Display-side instructions emitted to the hosting view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UiEvent {
    /// New text landed in the display buffer.
    OutputAppended,
    /// The shell reported a new working directory through the marker.
    WorkingDirChanged { path: String },
    /// Auto-scroll is on and fresh output arrived.
    ScrollToBottom,
    StatusChanged { status: ControllerStatus },
    /// The view was activated; input focus belongs in the terminal.
    FocusRequested,
}

/// Hook invoked for every forwarded input event (keystroke or paste):
/// keypress sound, status flash, whatever the host wants. Implementations
/// swallow their own failures; the controller never waits on them.
pub trait InputFeedback: Send + Sync {
    fn on_input(&self);
}

/// Feedback hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFeedback;

impl InputFeedback for NoFeedback {
    fn on_input(&self) {}
}

struct Shared {
    buffer: RwLock<DisplayBuffer>,
    working_dir: RwLock<Option<String>>,
    status: Mutex<ControllerStatus>,
    last_exit_code: Mutex<Option<i32>>,
    auto_scroll: AtomicBool,
    ui: UnboundedSender<UiEvent>,
}

impl Shared {
    fn set_status(&self, status: ControllerStatus) {
        *mutex_lock_or_recover(&self.status) = status;
        let _ = self.ui.send(UiEvent::StatusChanged { status });
    }
}

pub struct TerminalController {
    session: PtySession,
    shared: Arc<Shared>,
    feedback: Arc<dyn InputFeedback>,
    pump: Option<JoinHandle<()>>,
    activated: bool,
    shut_down: bool,
}

impl TerminalController {
    /// Builds the controller and spawns its session. Must run on a tokio
    /// runtime. The returned receiver is the UI event stream the hosting
    /// view subscribes to.
    pub fn new(
        config: SessionConfig,
        feedback: Arc<dyn InputFeedback>,
    ) -> (Self, UnboundedReceiver<UiEvent>) {
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            buffer: RwLock::new(DisplayBuffer::new()),
            working_dir: RwLock::new(None),
            status: Mutex::new(ControllerStatus::Engaging),
            last_exit_code: Mutex::new(None),
            auto_scroll: AtomicBool::new(true),
            ui: ui_tx,
        });
        shared.set_status(ControllerStatus::Engaging);

        let (session, events) = PtySession::spawn(config);
        // Ready goes out before the pump starts so a session that dies on
        // arrival still ends up showing its terminated status last.
        shared.set_status(ControllerStatus::Ready);
        let pump = tokio::spawn(pump(events, Arc::clone(&shared)));

        (
            Self {
                session,
                shared,
                feedback,
                pump: Some(pump),
                activated: false,
                shut_down: false,
            },
            ui_rx,
        )
    }

    /// Forwards one key event. Names in the wire table become their escape
    /// sequences; anything else is forwarded as the key's literal text.
    pub fn send_key(&self, key: &str) {
        match key_to_bytes(key) {
            Some(bytes) => self.session.write(&bytes),
            None => self.session.write(key.as_bytes()),
        }
        self.feedback.on_input();
    }

    /// Forwards pasted clipboard text verbatim.
    pub fn paste(&self, text: &str) {
        self.session.write(text.as_bytes());
        self.feedback.on_input();
    }

    pub fn send_signal(&self, signal: i32) {
        self.session.send_signal(signal);
    }

    /// Convenience for the interrupt key: SIGINT to the whole foreground
    /// job, not just the shell.
    pub fn interrupt(&self) {
        self.send_signal(libc::SIGINT);
    }

    /// Empties the display buffer; the underlying session is untouched.
    pub fn clear(&self) {
        rwlock_write_or_recover(&self.shared.buffer).clear();
        let _ = self.shared.ui.send(UiEvent::OutputAppended);
    }

    /// Discards the session and builds a fresh one. The display buffer
    /// persists across the restart; the filter does not, so stale partial
    /// state from the old instance never colors the new one.
    pub fn restart(&mut self) {
        self.shared.set_status(ControllerStatus::Resetting);
        if let Some(pump_task) = self.pump.take() {
            pump_task.abort();
        }
        let events = self.session.restart();
        self.shared.set_status(ControllerStatus::Ready);
        self.pump = Some(tokio::spawn(pump(events, Arc::clone(&self.shared))));
        self.shut_down = false;
    }

    /// The hosting view became visible; focus belongs in the terminal.
    /// The visual transition itself is the host's concern.
    pub fn activate(&mut self) {
        self.activated = true;
        let _ = self.shared.ui.send(UiEvent::FocusRequested);
    }

    pub fn deactivate(&mut self) {
        self.activated = false;
    }

    /// Final teardown when the owning view is destroyed. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        if let Some(pump_task) = self.pump.take() {
            pump_task.abort();
        }
        self.session.close();
    }

    pub fn lines(&self) -> Vec<String> {
        rwlock_read_or_recover(&self.shared.buffer).snapshot()
    }

    pub fn working_dir(&self) -> Option<String> {
        rwlock_read_or_recover(&self.shared.working_dir).clone()
    }

    pub fn status(&self) -> ControllerStatus {
        *mutex_lock_or_recover(&self.shared.status)
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        *mutex_lock_or_recover(&self.shared.last_exit_code)
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn set_auto_scroll(&self, enabled: bool) {
        self.shared.auto_scroll.store(enabled, Ordering::Relaxed);
    }

    pub fn auto_scroll(&self) -> bool {
        self.shared.auto_scroll.load(Ordering::Relaxed)
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }
}

impl Drop for TerminalController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Bridges session events into display updates, one chunk at a time and in
/// arrival order. Ends with the session: terminated event or closed
/// channel.
async fn pump(mut events: UnboundedReceiver<SessionEvent>, shared: Arc<Shared>) {
    let mut filter = OutputFilter::new();
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Output(bytes) => {
                let chunk = filter.process(&bytes);
                if let Some(cwd) = chunk.cwd {
                    *rwlock_write_or_recover(&shared.working_dir) = Some(cwd.clone());
                    let _ = shared.ui.send(UiEvent::WorkingDirChanged { path: cwd });
                }
                if !chunk.text.is_empty() {
                    rwlock_write_or_recover(&shared.buffer).append_text(&chunk.text);
                    let _ = shared.ui.send(UiEvent::OutputAppended);
                    if shared.auto_scroll.load(Ordering::Relaxed) {
                        let _ = shared.ui.send(UiEvent::ScrollToBottom);
                    }
                }
            }
            SessionEvent::Terminated(code) => {
                *mutex_lock_or_recover(&shared.last_exit_code) = Some(code);
                shared.set_status(ControllerStatus::Terminated(code));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_strings() {
        assert_eq!(ControllerStatus::Ready.to_string(), "ready");
        assert_eq!(ControllerStatus::Engaging.to_string(), "engaging…");
        assert_eq!(ControllerStatus::Resetting.to_string(), "resetting…");
        assert_eq!(
            ControllerStatus::Terminated(2).to_string(),
            "terminated (exit 2)"
        );
    }

    #[test]
    fn test_status_serializes_with_exit_code() {
        let json = serde_json::to_string(&ControllerStatus::Terminated(3)).unwrap();
        assert!(json.contains("terminated"));
        assert!(json.contains('3'));
    }
}
