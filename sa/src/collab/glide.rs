//! Glide computer: turns sensor samples into derived flight state

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use super::airspace::AirspaceWarnings;
use super::task::TaskManager;
use crate::blackboard::{DerivedState, FlightMode, SensorState};

/// Samples in the vario moving average
const VARIO_WINDOW: usize = 30;

/// Track change per sample above which the glider counts as circling
const CIRCLING_TURN_DEG: f64 = 8.0;

/// Consecutive turning samples needed to switch mode
const CIRCLING_SAMPLES: u32 = 3;

#[derive(Debug, Default)]
struct GlideState {
    varios: VecDeque<f64>,
    samples: u64,
    first_fix: Option<(DateTime<Utc>, f64)>,
    max_altitude: f64,
    last_track: Option<f64>,
    turning: u32,
    cruising: u32,
    mode: FlightMode,
}

#[derive(Debug)]
pub struct GlideComputer {
    task: Arc<TaskManager>,
    warnings: Arc<AirspaceWarnings>,
    state: Mutex<GlideState>,
}

impl GlideComputer {
    pub fn new(task: Arc<TaskManager>, warnings: Arc<AirspaceWarnings>) -> Self {
        debug!("GlideComputer::new: called");
        Self {
            task,
            warnings,
            state: Mutex::new(GlideState::default()),
        }
    }

    /// Forget all history
    pub fn initialise(&self) {
        debug!("GlideComputer::initialise: called");
        *self.state.lock() = GlideState::default();
    }

    /// Seed history from a previously persisted state
    pub fn restore(&self, derived: &DerivedState) {
        let mut state = self.state.lock();
        state.max_altitude = derived.max_altitude;
        state.samples = derived.samples;
    }

    /// Fold one sample into the history and return the new derived state
    pub fn process(&self, sensor: &SensorState) -> DerivedState {
        let mut state = self.state.lock();
        let Some(time) = sensor.time else {
            return DerivedState::default();
        };

        state.samples += 1;
        state.varios.push_back(sensor.vario);
        if state.varios.len() > VARIO_WINDOW {
            state.varios.pop_front();
        }
        let average_vario = state.varios.iter().sum::<f64>() / state.varios.len() as f64;

        let (start, start_altitude) = *state.first_fix.get_or_insert((time, sensor.altitude));
        state.max_altitude = state.max_altitude.max(sensor.altitude);

        if let Some(last) = state.last_track {
            let turn = track_delta(last, sensor.track).abs();
            if turn >= CIRCLING_TURN_DEG {
                state.turning += 1;
                state.cruising = 0;
            } else {
                state.cruising += 1;
                state.turning = 0;
            }
            if state.turning >= CIRCLING_SAMPLES {
                state.mode = FlightMode::Circling;
            } else if state.cruising >= CIRCLING_SAMPLES {
                state.mode = FlightMode::Cruise;
            }
        }
        state.last_track = Some(sensor.track);

        self.task.update_position(sensor.latitude, sensor.longitude);

        DerivedState {
            samples: state.samples,
            average_vario,
            max_altitude: state.max_altitude,
            altitude_gain: sensor.altitude - start_altitude,
            flight_time_secs: (time - start).num_milliseconds().max(0) as f64 / 1000.0,
            mode: state.mode,
            airspace_warnings: self.warnings.update(sensor),
            active_waypoint: self.task.target().map(|wp| wp.name),
            updated: Some(Utc::now()),
        }
    }
}

/// Signed smallest difference between two headings, in -180..180
fn track_delta(from: f64, to: f64) -> f64 {
    let d = (to - from).rem_euclid(360.0);
    if d > 180.0 { d - 360.0 } else { d }
}
