//! Task manager: an ordered list of turn points over the waypoint store

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use super::store::{DataStore, Record, field_f64};

/// Distance in degrees within which a turn point counts as reached
const REACHED_RADIUS_DEG: f64 = 0.005;

/// Maximum turn points in the default task
const DEFAULT_TASK_POINTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waypoint {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

impl Waypoint {
    /// Parse a `name,latitude,longitude[,altitude]` record
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(Self {
            name: record.first()?.clone(),
            latitude: field_f64(record, 1)?,
            longitude: field_f64(record, 2)?,
            altitude: field_f64(record, 3),
        })
    }

    fn reached(&self, latitude: f64, longitude: f64) -> bool {
        (self.latitude - latitude).hypot(self.longitude - longitude) <= REACHED_RADIUS_DEG
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskMode {
    Ordered,
    /// Heading for home instead of the task
    Abort,
}

#[derive(Debug)]
struct TaskState {
    home: Option<Waypoint>,
    points: Vec<Waypoint>,
    active: usize,
    mode: TaskMode,
}

impl Default for TaskState {
    fn default() -> Self {
        Self {
            home: None,
            points: Vec::new(),
            active: 0,
            mode: TaskMode::Ordered,
        }
    }
}

#[derive(Debug)]
pub struct TaskManager {
    waypoints: Arc<DataStore>,
    state: RwLock<TaskState>,
}

impl TaskManager {
    pub fn new(waypoints: Arc<DataStore>) -> Self {
        debug!("TaskManager::new: called");
        Self {
            waypoints,
            state: RwLock::new(TaskState::default()),
        }
    }

    /// Clear the task and home
    pub fn reset(&self) {
        debug!("TaskManager::reset: called");
        *self.state.write() = TaskState::default();
    }

    /// Set home to the first waypoint and build a task from the ones after it
    ///
    /// Returns the number of turn points.
    pub fn load_default(&self) -> usize {
        let waypoints: Vec<Waypoint> = self.waypoints.records().iter().filter_map(Waypoint::from_record).collect();
        let mut state = self.state.write();
        state.home = waypoints.first().cloned();
        state.points = waypoints.into_iter().skip(1).take(DEFAULT_TASK_POINTS).collect();
        state.active = 0;
        info!(
            home = state.home.as_ref().map(|h| h.name.as_str()),
            points = state.points.len(),
            "Default task loaded"
        );
        state.points.len()
    }

    pub fn home(&self) -> Option<Waypoint> {
        self.state.read().home.clone()
    }

    pub fn points(&self) -> Vec<Waypoint> {
        self.state.read().points.clone()
    }

    pub fn mode(&self) -> TaskMode {
        self.state.read().mode
    }

    /// Point currently flown to: home when aborted, else the active turn point
    pub fn target(&self) -> Option<Waypoint> {
        let state = self.state.read();
        match state.mode {
            TaskMode::Abort => state.home.clone(),
            TaskMode::Ordered => state.points.get(state.active).cloned(),
        }
    }

    /// Advance past the active turn point once it is reached
    pub fn update_position(&self, latitude: f64, longitude: f64) -> bool {
        let mut state = self.state.write();
        if state.mode != TaskMode::Ordered {
            return false;
        }
        let active = state.active;
        match state.points.get(active) {
            Some(wp) if wp.reached(latitude, longitude) => {
                info!(waypoint = %wp.name, "Turn point reached");
                state.active += 1;
                true
            }
            _ => false,
        }
    }

    pub fn abort(&self) {
        info!("Task aborted");
        self.state.write().mode = TaskMode::Abort;
    }

    /// Leave abort mode and continue the ordered task
    pub fn resume(&self) {
        debug!("TaskManager::resume: called");
        self.state.write().mode = TaskMode::Ordered;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::store::StoreKind;
    use std::fs;
    use tempfile::TempDir;

    fn manager(content: &str) -> (TempDir, TaskManager) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("w.csv");
        fs::write(&path, content).unwrap();
        let store = Arc::new(DataStore::new(StoreKind::Waypoints, path));
        store.load().unwrap();
        (dir, TaskManager::new(store))
    }

    #[test]
    fn test_waypoint_from_record() {
        let wp = Waypoint::from_record(&vec!["Home".into(), "1.5".into(), "2.5".into()]).unwrap();
        assert_eq!(wp.name, "Home");
        assert_eq!(wp.altitude, None);
        assert!(Waypoint::from_record(&vec!["bad".into(), "x".into()]).is_none());
    }

    #[test]
    fn test_load_default_task() {
        let (_dir, tm) = manager("Home,0,0,100\nA,0,1\nB,1,1\nC,1,0\nD,2,2\n");
        assert_eq!(tm.load_default(), 3);
        assert_eq!(tm.home().unwrap().name, "Home");
        assert_eq!(tm.target().unwrap().name, "A");

        tm.reset();
        assert!(tm.home().is_none());
        assert!(tm.target().is_none());
    }

    #[test]
    fn test_advance_and_abort() {
        let (_dir, tm) = manager("Home,0,0\nA,0,1\nB,1,1\n");
        tm.load_default();

        assert!(!tm.update_position(0.5, 0.5));
        assert!(tm.update_position(0.0, 1.001));
        assert_eq!(tm.target().unwrap().name, "B");

        tm.abort();
        assert_eq!(tm.mode(), TaskMode::Abort);
        assert_eq!(tm.target().unwrap().name, "Home");
        assert!(!tm.update_position(1.0, 1.0));

        tm.resume();
        assert_eq!(tm.target().unwrap().name, "B");
    }
}
