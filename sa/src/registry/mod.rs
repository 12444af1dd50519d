//! Subsystem registry
//!
//! Subsystems are registered as data: an id, the ids they depend on, and the
//! construct / load / close operations. Construction order is derived from the
//! dependency graph; teardown always runs in the exact reverse of the order in
//! which construction actually happened.

mod error;
pub mod graph;

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::report::StepOutcome;

pub use error::{SequenceError, SubsystemError};
use graph::DependencyNode;

/// Lifecycle state of one registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryState {
    /// Registered, not yet constructed
    Pending,
    /// Constructed, load not yet run
    Constructed,
    /// Constructed and loaded
    Ready,
    /// Constructed, load failed; dependents may still use it
    Degraded,
    /// Construction failed
    Failed,
    /// Torn down (terminal)
    Closed,
}

impl EntryState {
    /// Usable by dependents
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }

    /// Holds resources that teardown must release
    pub fn needs_close(self) -> bool {
        matches!(self, Self::Constructed | Self::Ready | Self::Degraded)
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Constructed => "constructed",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

type Step<C> = Box<dyn FnMut(&mut C) -> Result<(), SubsystemError> + Send>;

/// One subsystem: identity, dependencies and lifecycle operations over context `C`
pub struct Entry<C> {
    id: String,
    deps: Vec<String>,
    construct: Step<C>,
    load: Option<Step<C>>,
    close: Step<C>,
    state: EntryState,
}

impl<C> Entry<C> {
    pub fn new(
        id: impl Into<String>,
        construct: impl FnMut(&mut C) -> Result<(), SubsystemError> + Send + 'static,
        close: impl FnMut(&mut C) -> Result<(), SubsystemError> + Send + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            deps: Vec::new(),
            construct: Box::new(construct),
            load: None,
            close: Box::new(close),
            state: EntryState::Pending,
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Data-population step run right after construction; failure degrades instead of aborting
    pub fn with_load(mut self, load: impl FnMut(&mut C) -> Result<(), SubsystemError> + Send + 'static) -> Self {
        self.load = Some(Box::new(load));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    pub fn state(&self) -> EntryState {
        self.state
    }
}

impl<C> fmt::Debug for Entry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("deps", &self.deps)
            .field("state", &self.state)
            .finish()
    }
}

impl<C> DependencyNode for Entry<C> {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn node_deps(&self) -> &[String] {
        &self.deps
    }
}

/// Summary of a successful bring-up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BringUpReport {
    pub constructed: Vec<String>,
    pub degraded: Vec<String>,
}

/// Ordered collection of subsystems over context `C`
pub struct Registry<C> {
    entries: Vec<Entry<C>>,
    /// Indices of entries in the order they were actually constructed
    constructed: Vec<usize>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries)
            .field("constructed", &self.construction_order())
            .finish()
    }
}

impl<C> Registry<C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            constructed: Vec::new(),
        }
    }

    /// Build a registry and validate its plan
    pub fn with_entries(entries: impl IntoIterator<Item = Entry<C>>) -> Result<Self, SequenceError> {
        let mut registry = Self::new();
        for entry in entries {
            registry.register(entry)?;
        }
        registry.plan()?;
        Ok(registry)
    }

    pub fn register(&mut self, entry: Entry<C>) -> Result<(), SequenceError> {
        debug!(id = %entry.id, deps = ?entry.deps, "Registry::register: called");
        if !self.constructed.is_empty() {
            return Err(SequenceError::AlreadyStarted { id: entry.id });
        }
        if self.entries.iter().any(|e| e.id == entry.id) {
            return Err(SequenceError::DuplicateId(entry.id));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Construction order as entry indices
    pub fn plan(&self) -> Result<Vec<usize>, SequenceError> {
        debug!(entry_count = self.entries.len(), "Registry::plan: called");
        if let Some((id, dependency)) = graph::find_unknown_dependency(&self.entries) {
            return Err(SequenceError::UnknownDependency { id, dependency });
        }
        graph::topological_sort(&self.entries).map_err(SequenceError::Cycle)
    }

    /// Construction order as ids
    pub fn planned_ids(&self) -> Result<Vec<&str>, SequenceError> {
        Ok(self.plan()?.into_iter().map(|i| self.entries[i].id.as_str()).collect())
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry<C>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn state(&self, id: &str) -> Option<EntryState> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.state)
    }

    /// Ids in the order they were constructed; empty before bring-up and after teardown
    pub fn construction_order(&self) -> Vec<&str> {
        self.constructed.iter().map(|&i| self.entries[i].id.as_str()).collect()
    }

    /// Number of entries still holding resources
    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|e| e.state.needs_close()).count()
    }

    /// Construct and load every entry in plan order
    ///
    /// A construct failure stops bring-up and returns the error; entries built
    /// so far stay constructed and must be released with [`Registry::tear_down`].
    /// A load failure marks the entry degraded and bring-up continues.
    pub fn bring_up(&mut self, ctx: &mut C) -> Result<BringUpReport, SequenceError> {
        let order = self.plan()?;
        info!(count = order.len(), "Bringing up subsystems");
        let mut report = BringUpReport::default();

        for idx in order {
            if self.entries[idx].state != EntryState::Pending {
                return Err(SequenceError::AlreadyStarted {
                    id: self.entries[idx].id.clone(),
                });
            }
            self.check_deps(idx)?;

            let entry = &mut self.entries[idx];
            let start = Instant::now();
            if let Err(source) = (entry.construct)(&mut *ctx) {
                entry.state = EntryState::Failed;
                error!(id = %entry.id, error = %source, "Subsystem construction failed");
                return Err(SequenceError::Construct {
                    id: entry.id.clone(),
                    source,
                });
            }
            entry.state = EntryState::Constructed;
            self.constructed.push(idx);
            report.constructed.push(entry.id.clone());
            debug!(id = %entry.id, elapsed = ?start.elapsed(), "Subsystem constructed");

            entry.state = match entry.load.as_mut().map(|load| load(&mut *ctx)) {
                None | Some(Ok(())) => EntryState::Ready,
                Some(Err(e)) => {
                    warn!(id = %entry.id, error = %e, "Subsystem load failed, continuing degraded");
                    report.degraded.push(entry.id.clone());
                    EntryState::Degraded
                }
            };
        }

        info!(
            constructed = report.constructed.len(),
            degraded = report.degraded.len(),
            "Subsystems up"
        );
        Ok(report)
    }

    fn check_deps(&self, idx: usize) -> Result<(), SequenceError> {
        let entry = &self.entries[idx];
        for dep in &entry.deps {
            let state = self.state(dep).ok_or_else(|| SequenceError::UnknownDependency {
                id: entry.id.clone(),
                dependency: dep.clone(),
            })?;
            if !state.is_usable() {
                return Err(SequenceError::DependencyNotReady {
                    id: entry.id.clone(),
                    dependency: dep.clone(),
                    state,
                });
            }
        }
        Ok(())
    }

    /// Close every constructed entry in reverse construction order
    ///
    /// Each close runs once. Errors are recorded and teardown continues.
    pub fn tear_down(&mut self, ctx: &mut C) -> Vec<StepOutcome> {
        info!(count = self.constructed.len(), "Tearing down subsystems");
        let mut outcomes = Vec::with_capacity(self.constructed.len());

        while let Some(idx) = self.constructed.pop() {
            let entry = &mut self.entries[idx];
            if !entry.state.needs_close() {
                continue;
            }
            let outcome = StepOutcome::record(format!("close {}", entry.id), || (entry.close)(&mut *ctx));
            entry.state = EntryState::Closed;
            outcomes.push(outcome);
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log {
        events: Vec<String>,
        fail_construct: Option<&'static str>,
        fail_load: Option<&'static str>,
        fail_close: Option<&'static str>,
    }

    fn entry(id: &'static str, deps: &[&'static str]) -> Entry<Log> {
        Entry::new(
            id,
            move |log: &mut Log| {
                if log.fail_construct == Some(id) {
                    return Err(SubsystemError::failed(id, "construct refused"));
                }
                log.events.push(format!("construct {id}"));
                Ok(())
            },
            move |log: &mut Log| {
                log.events.push(format!("close {id}"));
                if log.fail_close == Some(id) {
                    return Err(SubsystemError::failed(id, "close refused"));
                }
                Ok(())
            },
        )
        .depends_on(deps.iter().copied())
        .with_load(move |log: &mut Log| {
            if log.fail_load == Some(id) {
                return Err(SubsystemError::failed(id, "no data"));
            }
            log.events.push(format!("load {id}"));
            Ok(())
        })
    }

    fn abc() -> Registry<Log> {
        Registry::with_entries([entry("C", &["B"]), entry("A", &[]), entry("B", &["A"])]).unwrap()
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = Registry::new();
        registry.register(entry("A", &[])).unwrap();
        let err = registry.register(entry("A", &[])).unwrap_err();
        assert!(matches!(err, SequenceError::DuplicateId(id) if id == "A"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = Registry::with_entries([entry("A", &["ghost"])]).unwrap_err();
        assert!(matches!(err, SequenceError::UnknownDependency { .. }));
    }

    #[test]
    fn test_cycle_rejected() {
        let err = Registry::with_entries([entry("A", &["B"]), entry("B", &["A"])]).unwrap_err();
        assert!(matches!(err, SequenceError::Cycle(_)));
    }

    #[test]
    fn test_bring_up_and_tear_down_order() {
        let mut registry = abc();
        let mut log = Log::default();

        let report = registry.bring_up(&mut log).unwrap();
        assert_eq!(report.constructed, vec!["A", "B", "C"]);
        assert!(report.degraded.is_empty());
        assert_eq!(registry.construction_order(), vec!["A", "B", "C"]);
        assert_eq!(registry.state("C"), Some(EntryState::Ready));

        let outcomes = registry.tear_down(&mut log);
        assert!(outcomes.iter().all(|o| o.ok));
        assert_eq!(
            log.events,
            vec![
                "construct A",
                "load A",
                "construct B",
                "load B",
                "construct C",
                "load C",
                "close C",
                "close B",
                "close A",
            ]
        );
        assert_eq!(registry.live_count(), 0);
        assert!(registry.construction_order().is_empty());
    }

    #[test]
    fn test_load_failure_degrades() {
        let mut registry = abc();
        let mut log = Log {
            fail_load: Some("B"),
            ..Default::default()
        };

        let report = registry.bring_up(&mut log).unwrap();
        assert_eq!(report.degraded, vec!["B"]);
        assert_eq!(registry.state("B"), Some(EntryState::Degraded));
        // C still built on top of a degraded B
        assert_eq!(registry.state("C"), Some(EntryState::Ready));
    }

    #[test]
    fn test_construct_failure_leaves_partial_for_teardown() {
        let mut registry = abc();
        let mut log = Log {
            fail_construct: Some("B"),
            ..Default::default()
        };

        let err = registry.bring_up(&mut log).unwrap_err();
        assert!(matches!(err, SequenceError::Construct { ref id, .. } if id == "B"));
        assert_eq!(registry.state("A"), Some(EntryState::Ready));
        assert_eq!(registry.state("B"), Some(EntryState::Failed));
        assert_eq!(registry.state("C"), Some(EntryState::Pending));

        let outcomes = registry.tear_down(&mut log);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(log.events.last().map(String::as_str), Some("close A"));
    }

    #[test]
    fn test_close_failure_continues() {
        let mut registry = abc();
        let mut log = Log {
            fail_close: Some("B"),
            ..Default::default()
        };

        registry.bring_up(&mut log).unwrap();
        let outcomes = registry.tear_down(&mut log);

        assert_eq!(outcomes.len(), 3);
        assert!(!outcomes[1].ok);
        assert_eq!(outcomes[1].step, "close B");
        assert!(outcomes[2].ok);
        assert_eq!(registry.state("B"), Some(EntryState::Closed));
    }

    #[test]
    fn test_tear_down_twice_is_noop() {
        let mut registry = abc();
        let mut log = Log::default();
        registry.bring_up(&mut log).unwrap();

        assert_eq!(registry.tear_down(&mut log).len(), 3);
        assert!(registry.tear_down(&mut log).is_empty());
    }

    #[test]
    fn test_bring_up_twice_rejected() {
        let mut registry = abc();
        let mut log = Log::default();
        registry.bring_up(&mut log).unwrap();

        let err = registry.bring_up(&mut log).unwrap_err();
        assert!(matches!(err, SequenceError::AlreadyStarted { .. }));
    }

    #[test]
    fn test_register_after_bring_up_rejected() {
        let mut registry = abc();
        let mut log = Log::default();
        registry.bring_up(&mut log).unwrap();

        let err = registry.register(entry("D", &[])).unwrap_err();
        assert!(matches!(err, SequenceError::AlreadyStarted { .. }));
    }

    #[test]
    fn test_failed_dependency_not_ready() {
        // A fails to construct; nothing depending on it may run
        let mut registry = Registry::new();
        registry.register(entry("A", &[])).unwrap();
        registry.register(entry("B", &["A"])).unwrap();
        registry.entries[0].state = EntryState::Failed;

        assert!(matches!(
            registry.check_deps(1),
            Err(SequenceError::DependencyNotReady { state: EntryState::Failed, .. })
        ));
    }
}
