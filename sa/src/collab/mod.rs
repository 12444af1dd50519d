//! Collaborator subsystems
//!
//! Stand-ins for the stores and engines the sequencer brings up. Each exposes
//! the construct / load / close contract the registry drives.

pub mod airspace;
pub mod device;
pub mod display;
pub mod gauge;
pub mod glide;
pub mod logger;
pub mod map_view;
pub mod persist;
pub mod store;
pub mod task;

pub use airspace::AirspaceWarnings;
pub use device::{DeviceLink, Simulator};
pub use display::{DisplayError, DisplaySurface, Frame, HeadlessDisplay, TerminalDisplay, create_display};
pub use gauge::{GaugeReading, VarioGauge};
pub use glide::GlideComputer;
pub use logger::{Fix, FlightLogger};
pub use map_view::{MapView, PopulatedStores};
pub use store::{DataStore, StoreKind, StoreState};
pub use task::{TaskManager, TaskMode, Waypoint};
