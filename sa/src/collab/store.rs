//! File-backed data stores
//!
//! Every store reads a simple comma-separated record file. Blank lines and
//! lines starting with `#` are skipped. `load` and `close` are idempotent and
//! `close` is safe after a failed or partial load.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::registry::SubsystemError;

/// Which data set a store holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    Marks,
    Topology,
    Terrain,
    Waypoints,
    Weather,
    Airspaces,
}

impl StoreKind {
    pub fn id(self) -> &'static str {
        match self {
            Self::Marks => "marks",
            Self::Topology => "topology",
            Self::Terrain => "terrain",
            Self::Waypoints => "waypoints",
            Self::Weather => "weather",
            Self::Airspaces => "airspaces",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Load status of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreState {
    /// Constructed, load not attempted
    Empty,
    Loaded,
    /// Load attempted and failed; the store is usable but empty
    LoadFailed,
    Closed,
}

/// One parsed line
pub type Record = Vec<String>;

#[derive(Debug)]
struct StoreData {
    state: StoreState,
    records: Vec<Record>,
}

/// A data set loaded from one file
#[derive(Debug)]
pub struct DataStore {
    kind: StoreKind,
    path: PathBuf,
    /// Records of this store are presented after the overlay's
    overlay: Option<Arc<DataStore>>,
    data: RwLock<StoreData>,
}

impl DataStore {
    pub fn new(kind: StoreKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(%kind, ?path, "DataStore::new: called");
        Self {
            kind,
            path,
            overlay: None,
            data: RwLock::new(StoreData {
                state: StoreState::Empty,
                records: Vec::new(),
            }),
        }
    }

    /// A store whose records are presented together with `overlay`'s
    pub fn layered(kind: StoreKind, path: impl Into<PathBuf>, overlay: Arc<DataStore>) -> Self {
        Self {
            overlay: Some(overlay),
            ..Self::new(kind, path)
        }
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> StoreState {
        self.data.read().state
    }

    /// Load has been attempted, successfully or not
    pub fn is_populated(&self) -> bool {
        matches!(self.state(), StoreState::Loaded | StoreState::LoadFailed)
    }

    /// Read the backing file; a second call after success is a no-op
    pub fn load(&self) -> Result<usize, SubsystemError> {
        debug!(kind = %self.kind, path = ?self.path, "DataStore::load: called");
        let mut data = self.data.write();
        match data.state {
            StoreState::Loaded => return Ok(data.records.len()),
            StoreState::Closed => return Err(SubsystemError::failed(self.kind.id(), "store is closed")),
            StoreState::Empty | StoreState::LoadFailed => {}
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(source) => {
                data.state = StoreState::LoadFailed;
                return Err(SubsystemError::Io {
                    id: self.kind.id().to_string(),
                    path: self.path.clone(),
                    source,
                });
            }
        };

        data.records = parse_records(&content);
        data.state = StoreState::Loaded;
        info!(kind = %self.kind, records = data.records.len(), "Store loaded");
        Ok(data.records.len())
    }

    /// Drop all records; safe in any state
    pub fn close(&self) {
        debug!(kind = %self.kind, "DataStore::close: called");
        let mut data = self.data.write();
        data.records.clear();
        data.state = StoreState::Closed;
    }

    /// Own records plus the overlay's
    pub fn len(&self) -> usize {
        self.data.read().records.len() + self.overlay.as_ref().map_or(0, |o| o.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the overlay's records followed by this store's own
    pub fn records(&self) -> Vec<Record> {
        let mut out = self.overlay.as_ref().map(|o| o.records()).unwrap_or_default();
        out.extend(self.data.read().records.iter().cloned());
        out
    }

    /// Rewrite records in place
    pub fn update_records(&self, mut f: impl FnMut(&mut Record)) {
        let mut data = self.data.write();
        for record in data.records.iter_mut() {
            f(record);
        }
    }

    /// Add a record and append it to the backing file
    pub fn append(&self, record: Record) -> Result<(), SubsystemError> {
        debug!(kind = %self.kind, ?record, "DataStore::append: called");
        let mut data = self.data.write();
        if data.state == StoreState::Closed {
            return Err(SubsystemError::failed(self.kind.id(), "store is closed"));
        }

        let io_err = |source| SubsystemError::Io {
            id: self.kind.id().to_string(),
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        writeln!(file, "{}", record.join(",")).map_err(io_err)?;

        data.records.push(record);
        Ok(())
    }
}

fn parse_records(content: &str) -> Vec<Record> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.split(',').map(|f| f.trim().to_string()).collect())
        .collect()
}

/// Parse field `idx` of a record as a number
pub fn field_f64(record: &Record, idx: usize) -> Option<f64> {
    record.get(idx).and_then(|f| f.parse().ok())
}

/// Elevation of the terrain sample nearest to a position
///
/// Terrain records are `latitude,longitude,elevation`.
pub fn nearest_elevation(terrain: &DataStore, latitude: f64, longitude: f64) -> Option<f64> {
    terrain
        .records()
        .iter()
        .filter_map(|r| Some((field_f64(r, 0)?, field_f64(r, 1)?, field_f64(r, 2)?)))
        .map(|(lat, lon, elev)| ((lat - latitude).powi(2) + (lon - longitude).powi(2), elev))
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, elev)| elev)
}
