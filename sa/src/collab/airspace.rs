//! Airspace warnings: which airspace bands contain the aircraft

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::store::{DataStore, field_f64};
use crate::blackboard::SensorState;

/// Vertical extent of one airspace, from a `name,floor,ceiling` record
#[derive(Debug, Clone, PartialEq)]
struct Band {
    name: String,
    floor: f64,
    ceiling: f64,
}

#[derive(Debug)]
pub struct AirspaceWarnings {
    airspaces: Arc<DataStore>,
    bands: RwLock<Vec<Band>>,
    inside: RwLock<Vec<String>>,
}

impl AirspaceWarnings {
    pub fn new(airspaces: Arc<DataStore>) -> Self {
        debug!("AirspaceWarnings::new: called");
        Self {
            airspaces,
            bands: RwLock::new(Vec::new()),
            inside: RwLock::new(Vec::new()),
        }
    }

    /// Rebuild the band list from the store and evaluate `state`
    pub fn reset(&self, state: &SensorState) {
        let bands: Vec<Band> = self
            .airspaces
            .records()
            .iter()
            .filter_map(|r| {
                Some(Band {
                    name: r.first()?.clone(),
                    floor: field_f64(r, 1)?,
                    ceiling: field_f64(r, 2)?,
                })
            })
            .collect();
        info!(bands = bands.len(), "Airspace warnings reset");
        *self.bands.write() = bands;
        self.update(state);
    }

    /// Names of the airspaces containing the aircraft's altitude
    pub fn update(&self, state: &SensorState) -> Vec<String> {
        let inside: Vec<String> = if state.has_fix() {
            self.bands
                .read()
                .iter()
                .filter(|b| state.altitude >= b.floor && state.altitude <= b.ceiling)
                .map(|b| b.name.clone())
                .collect()
        } else {
            Vec::new()
        };

        let mut current = self.inside.write();
        if *current != inside {
            debug!(?inside, "AirspaceWarnings::update: warnings changed");
            current.clone_from(&inside);
        }
        inside
    }

    pub fn active(&self) -> Vec<String> {
        self.inside.read().clone()
    }

    pub fn clear(&self) {
        self.bands.write().clear();
        self.inside.write().clear();
    }
}
