#![deny(clippy::all)]

//! Embedded interactive terminal core for the taskdock desktop app.
//!
//! One pty-backed shell session bridged into the host's tokio event loop:
//! non-blocking reads surface as an ordered event stream, UI input maps to
//! wire bytes, ANSI noise is filtered out of the display text, and a
//! prompt-hook marker protocol recovers the shell's working directory.
//! Everything around it (projects, tasks, git, settings) talks to this
//! crate only through [`SessionConfig`], the controller commands and the
//! [`UiEvent`] stream.

pub mod error;

mod buffer;
mod controller;
mod filter;
mod keymap;
mod pty;
mod session;
mod shell;

pub use buffer::DisplayBuffer;
pub use buffer::DEFAULT_SCROLLBACK_LINES;
pub use controller::ControllerStatus;
pub use controller::InputFeedback;
pub use controller::NoFeedback;
pub use controller::TerminalController;
pub use controller::UiEvent;
pub use error::PtyError;
pub use filter::FilteredChunk;
pub use filter::OutputFilter;
pub use filter::CWD_MARKER_CLOSE;
pub use filter::CWD_MARKER_OPEN;
pub use keymap::key_to_bytes;
pub use session::PtySession;
pub use session::SessionConfig;
pub use session::SessionEvent;
pub use session::SessionState;
pub use session::EXIT_CODE_UNKNOWN;
pub use shell::resolve_shell;
pub use shell::DEFAULT_SHELL;

pub type Result<T> = std::result::Result<T, PtyError>;
