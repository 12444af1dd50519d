//! Map view: composes frames from the stores and the blackboard

use std::sync::Arc;

use super::display::{DisplayError, DisplaySurface, Frame};
use super::gauge::GaugeReading;
use super::store::DataStore;
use super::task::TaskManager;
use crate::blackboard::{DerivedState, FlightMode, SensorState};
use crate::registry::SubsystemError;

/// The stores a map view draws from, all past their load step
#[derive(Debug, Clone)]
pub struct PopulatedStores {
    pub waypoints: Arc<DataStore>,
    pub airspaces: Arc<DataStore>,
    pub topology: Arc<DataStore>,
    pub terrain: Arc<DataStore>,
    pub weather: Arc<DataStore>,
    pub marks: Arc<DataStore>,
}

impl PopulatedStores {
    /// Fails if any store has not attempted its load yet
    pub fn assemble(
        waypoints: Arc<DataStore>,
        airspaces: Arc<DataStore>,
        topology: Arc<DataStore>,
        terrain: Arc<DataStore>,
        weather: Arc<DataStore>,
        marks: Arc<DataStore>,
    ) -> Result<Self, SubsystemError> {
        let stores = Self {
            waypoints,
            airspaces,
            topology,
            terrain,
            weather,
            marks,
        };
        if let Some(store) = stores.iter().find(|s| !s.is_populated()) {
            return Err(SubsystemError::failed(
                "map_view",
                format!("store '{}' is {:?}", store.kind(), store.state()),
            ));
        }
        Ok(stores)
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<DataStore>> {
        [
            &self.waypoints,
            &self.airspaces,
            &self.topology,
            &self.terrain,
            &self.weather,
            &self.marks,
        ]
        .into_iter()
    }
}

#[derive(Debug)]
pub struct MapView {
    stores: PopulatedStores,
    task: Arc<TaskManager>,
    display: Arc<dyn DisplaySurface>,
}

impl MapView {
    pub fn new(stores: PopulatedStores, task: Arc<TaskManager>, display: Arc<dyn DisplaySurface>) -> Self {
        Self { stores, task, display }
    }

    pub fn display(&self) -> &Arc<dyn DisplaySurface> {
        &self.display
    }

    pub fn compose(&self, seq: u64, sensor: &SensorState, derived: &DerivedState, gauge: &GaugeReading) -> Frame {
        let mut lines = Vec::with_capacity(5);

        if sensor.has_fix() {
            lines.push(format!(
                "pos {:.4} {:.4}  alt {:.0}m  gs {:.0}m/s  trk {:03.0}",
                sensor.latitude, sensor.longitude, sensor.altitude, sensor.ground_speed, sensor.track
            ));
        } else {
            lines.push("waiting for fix".to_string());
        }

        let mode = match derived.mode {
            FlightMode::Cruise => "cruise",
            FlightMode::Circling => "circling",
        };
        lines.push(format!(
            "vario {:+.1}  avg {:+.1}  gain {:+.0}m  {}  t {:.0}s",
            gauge.vario, derived.average_vario, derived.altitude_gain, mode, derived.flight_time_secs
        ));

        let target = self.task.target().map(|wp| wp.name).unwrap_or_else(|| "-".to_string());
        lines.push(format!("next {}  ({:?})", target, self.task.mode()));

        if !derived.airspace_warnings.is_empty() {
            lines.push(format!("AIRSPACE {}", derived.airspace_warnings.join(", ")));
        }

        let s = &self.stores;
        lines.push(format!(
            "wpt {}  asp {}  topo {}  terrain {}  wx {}  marks {}",
            s.waypoints.len(),
            s.airspaces.len(),
            s.topology.len(),
            s.terrain.len(),
            s.weather.len(),
            s.marks.len()
        ));

        Frame { seq, lines }
    }

    /// Compose and present one frame
    pub fn render(
        &self,
        seq: u64,
        sensor: &SensorState,
        derived: &DerivedState,
        gauge: &GaugeReading,
    ) -> Result<(), DisplayError> {
        let frame = self.compose(seq, sensor, derived, gauge);
        self.display.present(&frame)
    }
}
