//! Calculation worker: sensor samples in, derived state out

use std::sync::Arc;

use tracing::{trace, warn};
use workthread::{Job, Tick, Worker, WorkerConfig};

use crate::blackboard::Blackboard;
use crate::collab::{FlightLogger, GlideComputer};

/// Runs the glide computer over each new sensor sample
///
/// Publishing derived state wakes the render worker through its blackboard
/// subscription. Every new sample is also handed to the flight recorder.
#[derive(Debug)]
pub struct CalculationJob {
    blackboard: Arc<Blackboard>,
    computer: Arc<GlideComputer>,
    logger: Arc<FlightLogger>,
    last_sensor: u64,
}

impl CalculationJob {
    pub fn new(blackboard: Arc<Blackboard>, computer: Arc<GlideComputer>, logger: Arc<FlightLogger>) -> Self {
        Self {
            blackboard,
            computer,
            logger,
            last_sensor: 0,
        }
    }
}

impl Job for CalculationJob {
    fn run(&mut self, tick: &Tick) {
        let sensor = self.blackboard.sensor();
        if sensor.generation == self.last_sensor {
            trace!(seq = tick.seq, "calculation: no new sample");
            return;
        }
        self.last_sensor = sensor.generation;

        if let Err(e) = self.logger.record(&sensor.value) {
            warn!(seq = tick.seq, error = %e, "calculation: flight log write failed");
        }
        let derived = self.computer.process(&sensor.value);
        self.blackboard.publish_derived(derived);
    }
}

pub type CalculationWorker = Worker<CalculationJob>;

pub fn calculation_worker(
    config: WorkerConfig,
    blackboard: Arc<Blackboard>,
    computer: Arc<GlideComputer>,
    logger: Arc<FlightLogger>,
) -> CalculationWorker {
    Worker::new(config, CalculationJob::new(blackboard, computer, logger))
}
