//! Instrument worker: periodic vario gauge refresh

use std::sync::Arc;

use workthread::{Job, Tick, Worker, WorkerConfig};

use crate::blackboard::Blackboard;
use crate::collab::VarioGauge;

/// Refreshes the vario gauge on a fixed period
#[derive(Debug)]
pub struct InstrumentJob {
    blackboard: Arc<Blackboard>,
    gauge: Arc<VarioGauge>,
}

impl InstrumentJob {
    pub fn new(blackboard: Arc<Blackboard>, gauge: Arc<VarioGauge>) -> Self {
        Self { blackboard, gauge }
    }
}

impl Job for InstrumentJob {
    fn run(&mut self, _tick: &Tick) {
        let sensor = self.blackboard.sensor().value;
        let derived = self.blackboard.derived().value;
        self.gauge.update(sensor.vario, derived.average_vario, sensor.altitude);
    }
}

pub type InstrumentWorker = Worker<InstrumentJob>;

pub fn instrument_worker(config: WorkerConfig, blackboard: Arc<Blackboard>, gauge: Arc<VarioGauge>) -> InstrumentWorker {
    Worker::new(config, InstrumentJob::new(blackboard, gauge))
}
