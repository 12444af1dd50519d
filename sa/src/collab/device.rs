//! Device link: the ingest path into the blackboard
//!
//! Samples only reach the blackboard while the link is open and the input
//! latch is set. Everything else is counted as dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info};
use workthread::Trigger;

use crate::blackboard::{Blackboard, SensorState};
use crate::config::DeviceConfig;

/// Samples per simulated thermal circle
const CIRCLE_STEPS: u64 = 18;

/// Degrees of latitude covered by the simulated circle radius
const CIRCLE_RADIUS_DEG: f64 = 0.002;

/// Synthetic flight: alternating thermal circles and straight glides
#[derive(Debug, Clone)]
pub struct Simulator {
    step: u64,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    track: f64,
}

impl Simulator {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            step: 0,
            latitude,
            longitude,
            altitude,
            track: 0.0,
        }
    }

    /// Produce the next one-second sample
    pub fn next_sample(&mut self) -> SensorState {
        let phase = self.step % (CIRCLE_STEPS * 2);
        let circling = phase < CIRCLE_STEPS;

        let (vario, ground_speed) = if circling {
            self.track = (self.track + 360.0 / CIRCLE_STEPS as f64) % 360.0;
            (1.8, 22.0)
        } else {
            (-0.9, 33.0)
        };

        let heading = self.track.to_radians();
        let step_deg = if circling {
            CIRCLE_RADIUS_DEG * 2.0 * std::f64::consts::PI / CIRCLE_STEPS as f64
        } else {
            ground_speed / 111_000.0
        };
        self.latitude += step_deg * heading.cos();
        self.longitude += step_deg * heading.sin();
        self.altitude += vario;
        self.step += 1;

        SensorState {
            time: Some(Utc::now()),
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
            ground_speed,
            track: self.track,
            vario,
        }
    }
}

#[derive(Debug)]
pub struct DeviceLink {
    blackboard: Arc<Blackboard>,
    input: Arc<Trigger>,
    simulator: Option<Mutex<Simulator>>,
    open: AtomicBool,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl DeviceLink {
    pub fn new(blackboard: Arc<Blackboard>, input: Arc<Trigger>, config: &DeviceConfig) -> Self {
        debug!(simulator = config.simulator, "DeviceLink::new: called");
        let simulator = config.simulator.then(|| {
            Mutex::new(Simulator::new(
                config.start_latitude,
                config.start_longitude,
                config.start_altitude,
            ))
        });
        Self {
            blackboard,
            input,
            simulator,
            open: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn is_simulator(&self) -> bool {
        self.simulator.is_some()
    }

    pub fn open(&self) {
        info!(simulator = self.is_simulator(), "Device link open");
        self.open.store(true, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Pull one sample from the source; true if it reached the blackboard
    pub fn poll(&self) -> bool {
        if !self.is_open() {
            return false;
        }
        match &self.simulator {
            Some(sim) => {
                let sample = sim.lock().next_sample();
                self.ingest(sample)
            }
            None => false,
        }
    }

    /// Publish a sample if the link is open and input delivery is enabled
    pub fn ingest(&self, sample: SensorState) -> bool {
        if !self.is_open() || !self.input.test() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("DeviceLink::ingest: input disabled, sample dropped");
            return false;
        }
        self.blackboard.publish_sensor(sample);
        self.delivered.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting samples; safe to call repeatedly
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            info!(delivered = self.delivered(), dropped = self.dropped(), "Device link closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(simulator: bool) -> (Arc<Blackboard>, Arc<Trigger>, DeviceLink) {
        let bb = Arc::new(Blackboard::new());
        let input = Arc::new(Trigger::new("input"));
        let config = DeviceConfig {
            simulator,
            ..Default::default()
        };
        let link = DeviceLink::new(bb.clone(), input.clone(), &config);
        (bb, input, link)
    }

    #[test]
    fn test_ingest_gated_by_input_latch() {
        let (bb, input, link) = link(true);
        link.open();

        assert!(!link.poll());
        assert_eq!(bb.sensor_generation(), 0);
        assert_eq!(link.dropped(), 1);

        input.trigger();
        assert!(link.poll());
        assert_eq!(bb.sensor_generation(), 1);
        assert!(bb.sensor().value.has_fix());

        input.reset();
        assert!(!link.poll());
        assert_eq!(link.delivered(), 1);
        assert_eq!(link.dropped(), 2);
    }

    #[test]
    fn test_closed_link_drops() {
        let (bb, input, link) = link(true);
        input.trigger();

        assert!(!link.poll());
        link.open();
        link.close();
        link.close();
        assert!(!link.ingest(SensorState::default()));
        assert_eq!(bb.sensor_generation(), 0);
    }

    #[test]
    fn test_no_simulator_produces_nothing() {
        let (bb, input, link) = link(false);
        input.trigger();
        link.open();
        assert!(!link.poll());
        assert_eq!(bb.sensor_generation(), 0);
    }

    #[test]
    fn test_simulator_climbs_then_glides() {
        let mut sim = Simulator::new(0.0, 0.0, 1000.0);
        let circle: Vec<_> = (0..CIRCLE_STEPS).map(|_| sim.next_sample()).collect();
        assert!(circle.iter().all(|s| s.vario > 0.0));
        assert!(circle.last().unwrap().altitude > 1000.0);

        let glide = sim.next_sample();
        assert!(glide.vario < 0.0);
        assert!(glide.has_fix());
    }
}
