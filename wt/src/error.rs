//! Worker errors

use thiserror::Error;

use crate::worker::WorkerState;

/// Errors from worker lifecycle operations
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker {name} cannot {op} while {state:?}")]
    InvalidState {
        name: String,
        op: &'static str,
        state: WorkerState,
    },

    #[error("Worker {name} must be stopped before join")]
    NotStopped { name: String },

    #[error("Failed to spawn thread for worker {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker {name} panicked")]
    Panicked { name: String },
}

impl WorkerError {
    /// Name of the worker the error refers to
    pub fn worker_name(&self) -> &str {
        match self {
            Self::InvalidState { name, .. }
            | Self::NotStopped { name }
            | Self::Spawn { name, .. }
            | Self::Panicked { name } => name,
        }
    }
}
