//! Host resources the sequencer gates on: instance lock, display, hand-off

use std::process::Command;
use std::sync::Arc;

use eyre::Result;
use tracing::{error, info};

use crate::collab::{DisplayError, DisplaySurface, create_display};
use crate::config::DisplayConfig;
use crate::instance::InstanceLock;

/// Process-level resources, abstracted so startup gates can be exercised in tests
pub trait Environment {
    /// PID of another live instance
    fn running_instance(&self) -> Option<u32>;

    fn claim_instance(&mut self) -> Result<()>;

    fn release_instance(&mut self) -> Result<()>;

    fn create_display(&mut self, config: &DisplayConfig) -> Result<Arc<dyn DisplaySurface>, DisplayError>;

    /// Launch `command` and end the process
    fn hand_off(&mut self, command: &str) -> !;
}

/// The real host: PID-file lock and stdout display
#[derive(Debug)]
pub struct HostEnvironment {
    lock: InstanceLock,
}

impl HostEnvironment {
    pub fn new(lock: InstanceLock) -> Self {
        Self { lock }
    }

    pub fn lock(&self) -> &InstanceLock {
        &self.lock
    }
}

impl Environment for HostEnvironment {
    fn running_instance(&self) -> Option<u32> {
        self.lock.running_pid()
    }

    fn claim_instance(&mut self) -> Result<()> {
        self.lock.acquire()
    }

    fn release_instance(&mut self) -> Result<()> {
        self.lock.release()
    }

    fn create_display(&mut self, config: &DisplayConfig) -> Result<Arc<dyn DisplaySurface>, DisplayError> {
        create_display(config)
    }

    fn hand_off(&mut self, command: &str) -> ! {
        info!(command, "Handing off to external command");
        if let Err(e) = self.lock.release() {
            error!(error = %e, "Failed to release instance lock before hand-off");
        }
        match Command::new("sh").arg("-c").arg(command).spawn() {
            Ok(child) => {
                info!(pid = child.id(), "Hand-off command started, exiting");
                std::process::exit(0)
            }
            Err(e) => {
                error!(command, error = %e, "Failed to start hand-off command, exiting");
                std::process::exit(1)
            }
        }
    }
}
