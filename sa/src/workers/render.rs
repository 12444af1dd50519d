//! Render worker

use std::sync::Arc;

use tracing::{trace, warn};
use workthread::{Job, Tick, TickReason, Worker, WorkerConfig};

use crate::blackboard::Blackboard;
use crate::collab::{MapView, VarioGauge};

/// Presents a frame when asked to, or when the blackboard moved on
#[derive(Debug)]
pub struct RenderJob {
    blackboard: Arc<Blackboard>,
    map_view: Arc<MapView>,
    gauge: Arc<VarioGauge>,
    seen: (u64, u64),
    frames: u64,
}

impl RenderJob {
    pub fn new(blackboard: Arc<Blackboard>, map_view: Arc<MapView>, gauge: Arc<VarioGauge>) -> Self {
        Self {
            blackboard,
            map_view,
            gauge,
            seen: (0, 0),
            frames: 0,
        }
    }
}

impl Job for RenderJob {
    fn run(&mut self, tick: &Tick) {
        let sensor = self.blackboard.sensor();
        let derived = self.blackboard.derived();
        let current = (sensor.generation, derived.generation);
        if tick.reason == TickReason::Timeout && current == self.seen {
            trace!(seq = tick.seq, "render: nothing changed");
            return;
        }
        self.seen = current;

        self.frames += 1;
        let gauge = self.gauge.reading();
        if let Err(e) = self.map_view.render(self.frames, &sensor.value, &derived.value, &gauge) {
            warn!(error = %e, "render: failed to present frame");
        }
    }
}

pub type RenderWorker = Worker<RenderJob>;

pub fn render_worker(
    config: WorkerConfig,
    blackboard: Arc<Blackboard>,
    map_view: Arc<MapView>,
    gauge: Arc<VarioGauge>,
) -> RenderWorker {
    Worker::new(config, RenderJob::new(blackboard, map_view, gauge))
}
