//! Registry and subsystem errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use workthread::WorkerError;

use super::EntryState;

/// Failure inside one subsystem's construct, load or close step
#[derive(Debug, Error)]
pub enum SubsystemError {
    #[error("{id}: required component '{component}' is not available")]
    Missing { id: String, component: &'static str },

    #[error("{id}: failed to read {path}: {source}")]
    Io {
        id: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{id}: {reason}")]
    Failed { id: String, reason: String },

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl SubsystemError {
    pub fn failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(id: impl Into<String>, component: &'static str) -> Self {
        Self::Missing { id: id.into(), component }
    }
}

/// Failure of the registry itself
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("duplicate subsystem id '{0}'")]
    DuplicateId(String),

    #[error("subsystem '{id}' depends on unknown subsystem '{dependency}'")]
    UnknownDependency { id: String, dependency: String },

    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("subsystem '{id}' needs '{dependency}' which is {state}")]
    DependencyNotReady {
        id: String,
        dependency: String,
        state: EntryState,
    },

    #[error("subsystem '{id}' failed to construct")]
    Construct {
        id: String,
        #[source]
        source: SubsystemError,
    },

    #[error("registry already started (at '{id}')")]
    AlreadyStarted { id: String },
}
