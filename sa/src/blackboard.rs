//! Blackboard: the shared sensor and derived-state slots
//!
//! Each slot has exactly one writer. The device link publishes sensor state
//! from the control thread; the calculation worker publishes derived state.
//! Readers take a cloned snapshot under a short read lock and never hold the
//! lock across a unit of work.
//!
//! Publishing bumps the slot's generation and wakes the workers subscribed to
//! that slot.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;
use workthread::Waker;

/// Raw sample from the device link
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorState {
    /// Sample time; `None` until the first fix
    pub time: Option<DateTime<Utc>>,
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude in meters
    pub altitude: f64,
    /// Ground speed in m/s
    pub ground_speed: f64,
    /// Track in degrees, 0..360
    pub track: f64,
    /// Total-energy vario in m/s
    pub vario: f64,
}

impl SensorState {
    pub fn has_fix(&self) -> bool {
        self.time.is_some()
    }
}

/// Flight mode inferred from the track history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlightMode {
    #[default]
    Cruise,
    Circling,
}

/// State computed by the calculation worker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivedState {
    /// Samples processed since the glide computer was reset
    pub samples: u64,
    /// Moving average of the vario
    pub average_vario: f64,
    pub max_altitude: f64,
    /// Altitude above the first fix
    pub altitude_gain: f64,
    pub flight_time_secs: f64,
    pub mode: FlightMode,
    /// Airspaces whose vertical band contains the current altitude
    pub airspace_warnings: Vec<String>,
    /// Name of the active task point
    pub active_waypoint: Option<String>,
    pub updated: Option<DateTime<Utc>>,
}

/// A value together with the generation that produced it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot<T> {
    /// Zero until the first publish
    pub generation: u64,
    pub value: T,
}

#[derive(Debug)]
struct Slot<T> {
    data: RwLock<Snapshot<T>>,
    subscribers: Mutex<Vec<(String, Waker)>>,
}

impl<T: Clone + Default> Slot<T> {
    fn new() -> Self {
        Self {
            data: RwLock::new(Snapshot::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn publish(&self, value: T) -> u64 {
        let generation = {
            let mut data = self.data.write();
            data.generation += 1;
            data.value = value;
            data.generation
        };
        for (_, waker) in self.subscribers.lock().iter() {
            waker.wake();
        }
        generation
    }

    fn snapshot(&self) -> Snapshot<T> {
        self.data.read().clone()
    }

    fn generation(&self) -> u64 {
        self.data.read().generation
    }

    fn subscribe(&self, name: &str, waker: Waker) {
        let mut subs = self.subscribers.lock();
        subs.retain(|(n, _)| n != name);
        subs.push((name.to_string(), waker));
    }

    fn unsubscribe(&self, name: &str) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|(n, _)| n != name);
        subs.len() != before
    }
}

/// Shared state between the device link and the workers
#[derive(Debug)]
pub struct Blackboard {
    sensor: Slot<SensorState>,
    derived: Slot<DerivedState>,
}

impl Default for Blackboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Blackboard {
    pub fn new() -> Self {
        debug!("Blackboard::new: called");
        Self {
            sensor: Slot::new(),
            derived: Slot::new(),
        }
    }

    /// Publish a sensor sample and wake sensor subscribers
    pub fn publish_sensor(&self, state: SensorState) -> u64 {
        self.sensor.publish(state)
    }

    pub fn sensor(&self) -> Snapshot<SensorState> {
        self.sensor.snapshot()
    }

    pub fn sensor_generation(&self) -> u64 {
        self.sensor.generation()
    }

    /// Publish derived state and wake derived-state subscribers
    pub fn publish_derived(&self, state: DerivedState) -> u64 {
        self.derived.publish(state)
    }

    pub fn derived(&self) -> Snapshot<DerivedState> {
        self.derived.snapshot()
    }

    pub fn derived_generation(&self) -> u64 {
        self.derived.generation()
    }

    /// Wake `waker` on every sensor publish; replaces an earlier subscription of the same name
    pub fn subscribe_sensor(&self, name: &str, waker: Waker) {
        debug!(name, "Blackboard::subscribe_sensor: called");
        self.sensor.subscribe(name, waker);
    }

    /// Wake `waker` on every derived-state publish
    pub fn subscribe_derived(&self, name: &str, waker: Waker) {
        debug!(name, "Blackboard::subscribe_derived: called");
        self.derived.subscribe(name, waker);
    }

    /// Drop every subscription held under `name`; true if any existed
    pub fn unsubscribe(&self, name: &str) -> bool {
        debug!(name, "Blackboard::unsubscribe: called");
        let a = self.sensor.unsubscribe(name);
        let b = self.derived.unsubscribe(name);
        a || b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use workthread::{Tick, Worker, WorkerConfig};

    #[test]
    fn test_new_blackboard_is_empty() {
        let bb = Blackboard::new();
        assert_eq!(bb.sensor_generation(), 0);
        assert_eq!(bb.derived_generation(), 0);
        assert!(!bb.sensor().value.has_fix());
    }

    #[test]
    fn test_publish_bumps_generation() {
        let bb = Blackboard::new();
        let sample = SensorState {
            time: Some(Utc::now()),
            altitude: 1500.0,
            ..Default::default()
        };

        assert_eq!(bb.publish_sensor(sample.clone()), 1);
        assert_eq!(bb.publish_sensor(sample.clone()), 2);

        let snap = bb.sensor();
        assert_eq!(snap.generation, 2);
        assert_eq!(snap.value, sample);
        assert_eq!(bb.derived_generation(), 0);
    }

    #[test]
    fn test_publish_wakes_subscribers() {
        let bb = Blackboard::new();
        let worker = Worker::new(WorkerConfig::new("sub", Duration::from_secs(60)), |_: &Tick| {});

        bb.subscribe_sensor("sub", worker.waker());
        assert!(!worker.is_triggered());

        bb.publish_derived(DerivedState::default());
        assert!(!worker.is_triggered());

        bb.publish_sensor(SensorState::default());
        assert!(worker.is_triggered());
    }

    #[test]
    fn test_unsubscribe() {
        let bb = Blackboard::new();
        let worker = Worker::new(WorkerConfig::new("sub", Duration::from_secs(60)), |_: &Tick| {});

        bb.subscribe_derived("sub", worker.waker());
        assert!(bb.unsubscribe("sub"));
        assert!(!bb.unsubscribe("sub"));

        bb.publish_derived(DerivedState::default());
        assert!(!worker.is_triggered());
    }

    #[test]
    fn test_derived_state_serde() {
        let state = DerivedState {
            samples: 10,
            average_vario: 1.5,
            mode: FlightMode::Circling,
            airspace_warnings: vec!["CTR".to_string()],
            ..Default::default()
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"circling\""));

        let back: DerivedState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
