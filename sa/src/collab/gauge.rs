//! Vario gauge readout, written by the instrument worker

use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GaugeReading {
    pub vario: f64,
    pub average: f64,
    pub altitude: f64,
    /// Number of updates applied
    pub updates: u64,
}

#[derive(Debug, Default)]
pub struct VarioGauge {
    reading: RwLock<GaugeReading>,
}

impl VarioGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, vario: f64, average: f64, altitude: f64) {
        let mut reading = self.reading.write();
        reading.vario = vario;
        reading.average = average;
        reading.altitude = altitude;
        reading.updates += 1;
    }

    pub fn reading(&self) -> GaugeReading {
        self.reading.read().clone()
    }

    /// Needle text, e.g. `+1.2`
    pub fn needle(&self) -> String {
        format!("{:+.1}", self.reading.read().vario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_and_needle() {
        let gauge = VarioGauge::new();
        assert_eq!(gauge.needle(), "+0.0");

        gauge.update(-1.26, 0.4, 900.0);
        let r = gauge.reading();
        assert_eq!(r.updates, 1);
        assert_eq!(r.altitude, 900.0);
        assert_eq!(gauge.needle(), "-1.3");
    }
}
