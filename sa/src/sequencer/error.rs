//! Sequencer errors

use thiserror::Error;
use workthread::WorkerError;

use crate::collab::DisplayError;
use crate::registry::SequenceError;

/// Why startup returned false
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("another instance is already running (PID: {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("failed to claim instance lock: {0}")]
    InstanceLock(String),

    #[error("failed to create display: {0}")]
    Display(#[from] DisplayError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error("failed to go live: {0}")]
    GoLive(#[from] WorkerError),

    #[error("sequencer is {0}, startup needs a fresh sequencer")]
    WrongPhase(&'static str),
}
