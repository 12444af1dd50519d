//! Lifecycle sequencer
//!
//! Startup runs the instance gate, the display gate, registry bring-up and
//! then goes live by opening input delivery and resuming the workers.
//! Shutdown reverses it and keeps going past individual failures; derived
//! state and the profile are written only after every worker has joined.

mod components;
mod environment;
mod error;

use std::fmt;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use workthread::WorkerError;

use crate::collab::persist;
use crate::config::Config;
use crate::registry::{BringUpReport, Registry, SequenceError};
use crate::report::{ShutdownReport, StepOutcome};

pub use components::{Components, entries, subsystem_registry};
pub use environment::{Environment, HostEnvironment};
pub use error::StartupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Not started
    Idle,
    Live,
    /// Startup failed and was rolled back
    Failed,
    ShutDown,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Live => "live",
            Self::Failed => "failed",
            Self::ShutDown => "shut down",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User input routed through the input-delivery latch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Drop a mark at the current position
    MarkLocation,
    Redraw,
    AbortTask,
    ResumeTask,
}

pub struct Sequencer<E: Environment> {
    env: E,
    components: Components,
    registry: Registry<Components>,
    phase: Phase,
    after_startup_done: bool,
}

impl<E: Environment> fmt::Debug for Sequencer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequencer")
            .field("phase", &self.phase)
            .field("registry", &self.registry)
            .finish()
    }
}

impl<E: Environment> Sequencer<E> {
    pub fn new(config: Config, env: E) -> Result<Self, SequenceError> {
        debug!("Sequencer::new: called");
        Ok(Self {
            env,
            components: Components::new(config),
            registry: subsystem_registry()?,
            phase: Phase::Idle,
            after_startup_done: false,
        })
    }

    /// Save `profile` at shutdown instead of the effective configuration
    ///
    /// Lets command-line overrides apply to this run without being written
    /// back into the next one.
    pub fn with_profile(mut self, profile: Config) -> Self {
        self.components.profile = profile;
        self
    }

    /// Settings changed while running; saved at shutdown
    pub fn profile_mut(&mut self) -> &mut Config {
        &mut self.components.profile
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn registry(&self) -> &Registry<Components> {
        &self.registry
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    /// Bring the system up; false if any gate or construction step failed
    pub fn startup(&mut self) -> bool {
        match self.try_startup() {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "Startup failed");
                false
            }
        }
    }

    pub fn try_startup(&mut self) -> Result<BringUpReport, StartupError> {
        debug!(phase = %self.phase, "Sequencer::try_startup: called");
        if self.phase != Phase::Idle {
            return Err(StartupError::WrongPhase(self.phase.as_str()));
        }

        let result = self.run_startup();
        self.phase = if result.is_ok() { Phase::Live } else { Phase::Failed };
        result
    }

    fn run_startup(&mut self) -> Result<BringUpReport, StartupError> {
        info!("Startup: instance gate");
        if let Some(pid) = self.env.running_instance() {
            return Err(StartupError::AlreadyRunning { pid });
        }

        info!("Startup: display gate");
        let display = self.env.create_display(&self.components.config.display)?;
        if let Err(e) = self.env.claim_instance() {
            display.close();
            return Err(StartupError::InstanceLock(format!("{e:#}")));
        }
        self.components.display = Some(display);

        info!("Startup: bringing up subsystems");
        let report = match self.registry.bring_up(&mut self.components) {
            Ok(report) => report,
            Err(e) => {
                self.roll_back();
                return Err(e.into());
            }
        };

        if let Err(e) = self.go_live() {
            self.roll_back();
            return Err(e.into());
        }

        info!(
            subsystems = report.constructed.len(),
            degraded = ?report.degraded,
            "Startup complete"
        );
        Ok(report)
    }

    fn go_live(&mut self) -> Result<(), WorkerError> {
        info!("Startup: going live");
        self.components.input.trigger();
        if let Some(render) = self.components.render.as_mut() {
            render.resume()?;
        }
        if let Some(calculation) = self.components.calculation.as_mut() {
            calculation.resume()?;
        }
        if let Some(render) = self.components.render.as_ref() {
            render.wake();
        }
        Ok(())
    }

    /// Undo a partial startup: everything built so far, the display and the lock
    fn roll_back(&mut self) {
        warn!("Rolling back partial startup");
        self.components.input.reset();
        self.components.stop_workers();
        for outcome in self.registry.tear_down(&mut self.components) {
            if !outcome.ok {
                error!(%outcome, "Rollback step failed");
            }
        }
        if let Some(display) = self.components.display.take() {
            display.close();
        }
        if let Err(e) = self.env.release_instance() {
            error!(error = %e, "Failed to release instance lock");
        }
    }

    /// Post-startup actions; run at most once
    pub fn after_startup(&mut self) -> bool {
        if self.after_startup_done || self.phase != Phase::Live {
            return false;
        }
        self.after_startup_done = true;

        if let Some(task) = &self.components.task_manager {
            task.resume();
        }
        let simulator = self.components.devices.as_ref().is_some_and(|d| d.is_simulator());
        info!(simulator, "System running in {} mode", if simulator { "simulator" } else { "device" });
        if let Some(render) = &self.components.render {
            render.wake();
        }
        true
    }

    /// Pump one sample from the device link
    pub fn poll_devices(&self) -> bool {
        match (&self.components.devices, self.phase) {
            (Some(devices), Phase::Live) => devices.poll(),
            _ => false,
        }
    }

    /// Route one input event; false when input delivery is closed or the event had no effect
    pub fn deliver_input(&self, event: InputEvent) -> bool {
        if !self.components.input.test() {
            debug!(?event, "Sequencer::deliver_input: input disabled, dropped");
            return false;
        }
        let c = &self.components;
        match event {
            InputEvent::MarkLocation => {
                let (Some(marks), Some(bb)) = (&c.marks, &c.blackboard) else {
                    return false;
                };
                let sensor = bb.sensor().value;
                let Some(time) = sensor.time else {
                    return false;
                };
                let record = vec![
                    format!("mark-{}", time.format("%H%M%S")),
                    format!("{:.6}", sensor.latitude),
                    format!("{:.6}", sensor.longitude),
                ];
                match marks.append(record) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "Failed to store mark");
                        false
                    }
                }
            }
            InputEvent::Redraw => c.render.as_ref().map(|r| r.wake()).is_some(),
            InputEvent::AbortTask => c.task_manager.as_ref().map(|t| t.abort()).is_some(),
            InputEvent::ResumeTask => c.task_manager.as_ref().map(|t| t.resume()).is_some(),
        }
    }

    /// Tear everything down
    ///
    /// Only a live system has anything to release; other phases return an
    /// empty report. Each step is recorded and a failure never stops the rest.
    pub fn shutdown(&mut self) -> ShutdownReport {
        debug!(phase = %self.phase, "Sequencer::shutdown: called");
        let mut report = ShutdownReport::default();
        if self.phase != Phase::Live {
            if self.phase == Phase::Idle {
                self.phase = Phase::ShutDown;
            }
            return report;
        }
        info!("Shutting down");

        let input = self.components.input.clone();
        report.push(StepOutcome::record("disable input", || {
            input.reset();
            Ok::<(), String>(())
        }));

        // Workers are joined by the teardown; keep the blackboard for the final persist
        let blackboard = self.components.blackboard.clone();

        let components = &mut self.components;
        report.push(StepOutcome::record("stop workers", || {
            components.stop_workers();
            Ok::<(), String>(())
        }));

        report.extend(self.registry.tear_down(&mut self.components));

        let data = &self.components.config.data;
        if let Some(bb) = blackboard {
            let derived = bb.derived();
            let path = data.resolve(&data.persist_file);
            report.push(StepOutcome::record("persist derived state", || {
                if derived.generation == 0 {
                    return Ok(());
                }
                persist::save(&path, &derived.value).map_err(|e| format!("{e:#}"))
            }));
        }
        let path = self.components.config.profile_path();
        let profile = &self.components.profile;
        report.push(StepOutcome::record("save profile", || {
            profile.save(&path).map_err(|e| format!("{e:#}"))
        }));

        if let Some(command) = self.components.config.shutdown.handoff_command.clone() {
            if let Some(display) = self.components.display.take() {
                display.close();
            }
            self.phase = Phase::ShutDown;
            self.env.hand_off(&command);
        }

        let display = self.components.display.take();
        report.push(StepOutcome::record("close display", || {
            if let Some(display) = display {
                display.close();
            }
            Ok::<(), String>(())
        }));

        let env = &mut self.env;
        report.push(StepOutcome::record("release instance", || {
            env.release_instance().map_err(|e| format!("{e:#}"))
        }));

        self.phase = Phase::ShutDown;
        info!(clean = report.is_clean(), steps = report.steps.len(), "Shutdown complete");
        report
    }
}

impl<E: Environment> Drop for Sequencer<E> {
    fn drop(&mut self) {
        if self.phase == Phase::Live {
            warn!("Sequencer dropped while live, shutting down");
            self.shutdown();
        }
    }
}
