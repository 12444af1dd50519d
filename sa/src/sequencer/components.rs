//! The context object owning every subsystem, and the entries that fill it

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};
use workthread::Trigger;

use crate::blackboard::Blackboard;
use crate::collab::store::nearest_elevation;
use crate::collab::{
    AirspaceWarnings, DataStore, DeviceLink, DisplaySurface, FlightLogger, GlideComputer, MapView, PopulatedStores,
    StoreKind, TaskManager, VarioGauge, persist,
};
use crate::config::Config;
use crate::registry::{Entry, Registry, SequenceError, SubsystemError};
use crate::workers::{
    CalculationWorker, InstrumentWorker, RenderWorker, calculation_worker, instrument_worker, render_worker,
};

/// Single owner of all subsystems
///
/// Slots are filled by the registry entries during bring-up and emptied
/// again by their close steps. Workers and engines hold `Arc` clones.
#[derive(Debug)]
pub struct Components {
    /// Effective configuration, including command-line overrides
    pub config: Config,
    /// Settings saved at shutdown; starts as a copy of `config`
    pub profile: Config,
    /// Input-delivery latch; set once the system is live
    pub input: Arc<Trigger>,
    pub display: Option<Arc<dyn DisplaySurface>>,

    pub blackboard: Option<Arc<Blackboard>>,
    pub marks: Option<Arc<DataStore>>,
    pub topology: Option<Arc<DataStore>>,
    pub terrain: Option<Arc<DataStore>>,
    pub waypoints: Option<Arc<DataStore>>,
    pub weather: Option<Arc<DataStore>>,
    pub airspaces: Option<Arc<DataStore>>,
    pub task_manager: Option<Arc<TaskManager>>,
    pub airspace_warnings: Option<Arc<AirspaceWarnings>>,
    pub glide_computer: Option<Arc<GlideComputer>>,
    pub devices: Option<Arc<DeviceLink>>,
    pub gauge: Option<Arc<VarioGauge>>,
    pub map_view: Option<Arc<MapView>>,
    pub flight_logger: Option<Arc<FlightLogger>>,

    pub calculation: Option<CalculationWorker>,
    pub instrument: Option<InstrumentWorker>,
    pub render: Option<RenderWorker>,
}

impl Components {
    pub fn new(config: Config) -> Self {
        Self {
            profile: config.clone(),
            config,
            input: Arc::new(Trigger::new("app::input")),
            display: None,
            blackboard: None,
            marks: None,
            topology: None,
            terrain: None,
            waypoints: None,
            weather: None,
            airspaces: None,
            task_manager: None,
            airspace_warnings: None,
            glide_computer: None,
            devices: None,
            gauge: None,
            map_view: None,
            flight_logger: None,
            calculation: None,
            instrument: None,
            render: None,
        }
    }

    /// Request stop on every worker without waiting
    pub fn stop_workers(&mut self) {
        if let Some(w) = self.render.as_mut() {
            w.stop();
        }
        if let Some(w) = self.instrument.as_mut() {
            w.stop();
        }
        if let Some(w) = self.calculation.as_mut() {
            w.stop();
        }
    }
}

fn require<T: ?Sized>(id: &str, slot: &Option<Arc<T>>, component: &'static str) -> Result<Arc<T>, SubsystemError> {
    slot.clone().ok_or_else(|| SubsystemError::missing(id, component))
}

fn store_entry(
    kind: StoreKind,
    slot: fn(&mut Components) -> &mut Option<Arc<DataStore>>,
    file: fn(&Config) -> &PathBuf,
) -> Entry<Components> {
    let id = kind.id();
    Entry::new(
        id,
        move |ctx: &mut Components| {
            let path = ctx.config.data.resolve(file(&ctx.config));
            *slot(ctx) = Some(Arc::new(DataStore::new(kind, path)));
            Ok(())
        },
        move |ctx: &mut Components| {
            if let Some(store) = slot(ctx).take() {
                store.close();
            }
            Ok(())
        },
    )
    .with_load(move |ctx: &mut Components| {
        let store = require(id, slot(ctx), id)?;
        store.load().map(|_| ())
    })
}

/// Every subsystem, with the dependencies it reads
///
/// List order breaks ties between independent entries. Workers come last so
/// they are joined first; among workers a reader follows the writer it reads.
pub fn entries() -> Vec<Entry<Components>> {
    vec![
        Entry::new(
            "blackboard",
            |ctx: &mut Components| {
                ctx.blackboard = Some(Arc::new(Blackboard::new()));
                Ok(())
            },
            |ctx: &mut Components| {
                ctx.blackboard = None;
                Ok(())
            },
        )
        .with_load(|ctx: &mut Components| {
            let bb = require("blackboard", &ctx.blackboard, "blackboard")?;
            let path = ctx.config.data.resolve(&ctx.config.data.persist_file);
            match persist::load(&path) {
                Ok(Some(state)) => {
                    bb.publish_derived(state);
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(e) => Err(SubsystemError::failed("blackboard", format!("{e:#}"))),
            }
        }),
        store_entry(StoreKind::Marks, |c| &mut c.marks, |c| &c.data.marks),
        Entry::new(
            "topology",
            |ctx: &mut Components| {
                let marks = require("topology", &ctx.marks, "marks")?;
                let path = ctx.config.data.resolve(&ctx.config.data.topology);
                ctx.topology = Some(Arc::new(DataStore::layered(StoreKind::Topology, path, marks)));
                Ok(())
            },
            |ctx: &mut Components| {
                if let Some(store) = ctx.topology.take() {
                    store.close();
                }
                Ok(())
            },
        )
        .depends_on(["marks"])
        .with_load(|ctx: &mut Components| {
            require("topology", &ctx.topology, "topology")?.load().map(|_| ())
        }),
        store_entry(StoreKind::Terrain, |c| &mut c.terrain, |c| &c.data.terrain),
        store_entry(StoreKind::Waypoints, |c| &mut c.waypoints, |c| &c.data.waypoints)
            .depends_on(["terrain"])
            .with_load(|ctx: &mut Components| {
                let waypoints = require("waypoints", &ctx.waypoints, "waypoints")?;
                let terrain = require("waypoints", &ctx.terrain, "terrain")?;
                waypoints.load()?;
                // Fill missing altitudes from terrain
                waypoints.update_records(|record| {
                    if record.len() == 3
                        && let (Ok(lat), Ok(lon)) = (record[1].parse::<f64>(), record[2].parse::<f64>())
                        && let Some(elevation) = nearest_elevation(&terrain, lat, lon)
                    {
                        record.push(format!("{elevation}"));
                    }
                });
                Ok(())
            }),
        store_entry(StoreKind::Weather, |c| &mut c.weather, |c| &c.data.weather),
        store_entry(StoreKind::Airspaces, |c| &mut c.airspaces, |c| &c.data.airspace),
        Entry::new(
            "task_manager",
            |ctx: &mut Components| {
                let waypoints = require("task_manager", &ctx.waypoints, "waypoints")?;
                let task = TaskManager::new(waypoints);
                task.reset();
                ctx.task_manager = Some(Arc::new(task));
                Ok(())
            },
            |ctx: &mut Components| {
                if let Some(task) = ctx.task_manager.take() {
                    // Leave abort mode before the task goes away
                    task.resume();
                    task.reset();
                }
                Ok(())
            },
        )
        .depends_on(["waypoints"])
        .with_load(|ctx: &mut Components| {
            require("task_manager", &ctx.task_manager, "task_manager")?.load_default();
            Ok(())
        }),
        Entry::new(
            "airspace_warnings",
            |ctx: &mut Components| {
                let airspaces = require("airspace_warnings", &ctx.airspaces, "airspaces")?;
                ctx.airspace_warnings = Some(Arc::new(AirspaceWarnings::new(airspaces)));
                Ok(())
            },
            |ctx: &mut Components| {
                if let Some(w) = ctx.airspace_warnings.take() {
                    w.clear();
                }
                Ok(())
            },
        )
        .depends_on(["airspaces", "blackboard"])
        .with_load(|ctx: &mut Components| {
            let warnings = require("airspace_warnings", &ctx.airspace_warnings, "airspace_warnings")?;
            let bb = require("airspace_warnings", &ctx.blackboard, "blackboard")?;
            warnings.reset(&bb.sensor().value);
            Ok(())
        }),
        Entry::new(
            "glide_computer",
            |ctx: &mut Components| {
                let task = require("glide_computer", &ctx.task_manager, "task_manager")?;
                let warnings = require("glide_computer", &ctx.airspace_warnings, "airspace_warnings")?;
                let computer = GlideComputer::new(task, warnings);
                computer.initialise();
                ctx.glide_computer = Some(Arc::new(computer));
                Ok(())
            },
            |ctx: &mut Components| {
                ctx.glide_computer = None;
                Ok(())
            },
        )
        .depends_on(["task_manager", "airspace_warnings", "blackboard"])
        .with_load(|ctx: &mut Components| {
            let computer = require("glide_computer", &ctx.glide_computer, "glide_computer")?;
            let bb = require("glide_computer", &ctx.blackboard, "blackboard")?;
            let restored = bb.derived();
            if restored.generation > 0 {
                computer.restore(&restored.value);
            }
            Ok(())
        }),
        Entry::new(
            "devices",
            |ctx: &mut Components| {
                let bb = require("devices", &ctx.blackboard, "blackboard")?;
                ctx.devices = Some(Arc::new(DeviceLink::new(bb, ctx.input.clone(), &ctx.config.device)));
                Ok(())
            },
            |ctx: &mut Components| {
                if let Some(devices) = ctx.devices.take() {
                    devices.close();
                }
                Ok(())
            },
        )
        .depends_on(["blackboard"])
        .with_load(|ctx: &mut Components| {
            require("devices", &ctx.devices, "devices")?.open();
            Ok(())
        }),
        Entry::new(
            "vario_gauge",
            |ctx: &mut Components| {
                ctx.gauge = Some(Arc::new(VarioGauge::new()));
                Ok(())
            },
            |ctx: &mut Components| {
                ctx.gauge = None;
                Ok(())
            },
        ),
        Entry::new(
            "flight_logger",
            |ctx: &mut Components| {
                let path = ctx.config.data.resolve(&ctx.config.data.flight_log);
                ctx.flight_logger = Some(Arc::new(FlightLogger::new(path)));
                Ok(())
            },
            |ctx: &mut Components| {
                let Some(logger) = ctx.flight_logger.take() else {
                    return Ok(());
                };
                let flushed = logger.close()?;
                debug!(flushed, total = logger.written(), "flight_logger: closed");
                Ok(())
            },
        ),
        Entry::new(
            "map_view",
            |ctx: &mut Components| {
                let id = "map_view";
                let stores = PopulatedStores::assemble(
                    require(id, &ctx.waypoints, "waypoints")?,
                    require(id, &ctx.airspaces, "airspaces")?,
                    require(id, &ctx.topology, "topology")?,
                    require(id, &ctx.terrain, "terrain")?,
                    require(id, &ctx.weather, "weather")?,
                    require(id, &ctx.marks, "marks")?,
                )?;
                let task = require(id, &ctx.task_manager, "task_manager")?;
                let display = require(id, &ctx.display, "display")?;
                ctx.map_view = Some(Arc::new(MapView::new(stores, task, display)));
                Ok(())
            },
            |ctx: &mut Components| {
                ctx.map_view = None;
                Ok(())
            },
        )
        .depends_on([
            "waypoints",
            "task_manager",
            "airspaces",
            "topology",
            "terrain",
            "weather",
            "marks",
        ]),
        Entry::new(
            "calculation_worker",
            |ctx: &mut Components| {
                let bb = require("calculation_worker", &ctx.blackboard, "blackboard")?;
                let computer = require("calculation_worker", &ctx.glide_computer, "glide_computer")?;
                let logger = require("calculation_worker", &ctx.flight_logger, "flight_logger")?;
                let mut worker = calculation_worker(ctx.config.workers.calculation(), bb.clone(), computer, logger);
                bb.subscribe_sensor(worker.name(), worker.waker());
                worker.start()?;
                ctx.calculation = Some(worker);
                Ok(())
            },
            |ctx: &mut Components| close_worker(&ctx.blackboard, ctx.calculation.take()),
        )
        .depends_on(["blackboard", "glide_computer", "flight_logger"]),
        Entry::new(
            "instrument_worker",
            |ctx: &mut Components| {
                let bb = require("instrument_worker", &ctx.blackboard, "blackboard")?;
                let gauge = require("instrument_worker", &ctx.gauge, "vario_gauge")?;
                let mut worker = instrument_worker(ctx.config.workers.instrument(), bb, gauge);
                worker.start()?;
                ctx.instrument = Some(worker);
                Ok(())
            },
            |ctx: &mut Components| close_worker(&ctx.blackboard, ctx.instrument.take()),
        )
        .depends_on(["blackboard", "vario_gauge", "calculation_worker"]),
        Entry::new(
            "render_worker",
            |ctx: &mut Components| {
                let bb = require("render_worker", &ctx.blackboard, "blackboard")?;
                let view = require("render_worker", &ctx.map_view, "map_view")?;
                let gauge = require("render_worker", &ctx.gauge, "vario_gauge")?;
                let mut worker = render_worker(ctx.config.workers.render(), bb.clone(), view, gauge);
                bb.subscribe_derived(worker.name(), worker.waker());
                // Parked until the system goes live
                worker.start_suspended()?;
                ctx.render = Some(worker);
                Ok(())
            },
            |ctx: &mut Components| close_worker(&ctx.blackboard, ctx.render.take()),
        )
        .depends_on([
            "blackboard",
            "map_view",
            "vario_gauge",
            "calculation_worker",
            "instrument_worker",
        ]),
    ]
}

fn close_worker<J: workthread::Job>(
    blackboard: &Option<Arc<Blackboard>>,
    worker: Option<workthread::Worker<J>>,
) -> Result<(), SubsystemError> {
    let Some(mut worker) = worker else {
        return Ok(());
    };
    if let Some(bb) = blackboard {
        bb.unsubscribe(worker.name());
    }
    worker.stop();
    let elapsed = worker.join()?;
    debug!(worker = worker.name(), ?elapsed, "close_worker: joined");
    Ok(())
}

/// The registry of all subsystems, validated
pub fn subsystem_registry() -> Result<Registry<Components>, SequenceError> {
    let registry = Registry::with_entries(entries())?;
    info!(subsystems = registry.len(), "Subsystem registry built");
    Ok(registry)
}
