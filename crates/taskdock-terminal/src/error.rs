//! Error taxonomy for the terminal core.
//!
//! Every variant is caught inside this crate and converted into either a
//! terminated event or a silent no-op. Nothing here propagates far enough
//! to take the hosting application down with it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("failed to allocate pty: {0}")]
    Allocation(String),
    #[error("failed to spawn shell: {0}")]
    Spawn(String),
    #[error("failed to read from pty: {0}")]
    Read(String),
    #[error("failed to write to pty: {0}")]
    Write(String),
    #[error("failed to deliver signal: {0}")]
    Signal(String),
}
