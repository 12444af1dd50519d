//! SitAware - live situational-awareness display
//!
//! A sensor feed lands on a shared blackboard. A calculation worker derives
//! flight state from it, an instrument worker drives the vario gauge, and a
//! render worker draws the map. The subsystems behind them are brought up in
//! dependency order and torn down in exactly the reverse order.
//!
//! # Modules
//!
//! - [`sequencer`] - Startup gates, go-live, post-startup and shutdown
//! - [`registry`] - Dependency-ordered subsystem registry
//! - [`workers`] - The calculation, instrument and render jobs
//! - [`collab`] - Stores, task, airspace, glide computer, device link, display
//! - [`blackboard`] - Shared sensor and derived state with change notification
//! - [`instance`] - PID-file single-instance guard
//! - [`report`] - Per-step outcome records
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod blackboard;
pub mod cli;
pub mod collab;
pub mod config;
pub mod instance;
pub mod registry;
pub mod report;
pub mod sequencer;
pub mod workers;

pub use blackboard::{Blackboard, DerivedState, SensorState};
pub use config::Config;
pub use registry::{EntryState, Registry, SequenceError, SubsystemError};
pub use report::{ShutdownReport, StepOutcome};
pub use sequencer::{Environment, HostEnvironment, InputEvent, Phase, Sequencer, StartupError};
