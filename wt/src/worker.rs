//! Worker - cooperative, suspendable poll-loop thread
//!
//! A `Worker` owns one OS thread running a fixed poll-loop:
//!
//! ```text
//!   ┌──────────────────────────────────────────────┐
//!   │ 1. running.wait_forever()      (suspend gate) │
//!   │ 2. wake.wait(poll_interval)    (tick)         │
//!   │ 3. stop.test()? -> exit                       │
//!   │ 4. wake.reset(); job.run(&tick)               │
//!   └──────────────────────────────────────────────┘
//! ```
//!
//! The loop is written once; concrete workers inject their unit of work as a
//! [`Job`]. `stop()` signals stop, wake and running together so a thread
//! parked at either blocking point always observes the stop request.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::WorkerError;
use crate::trigger::Trigger;

/// Default poll interval for a worker loop
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Multiple of the poll interval after which a pending join is reported
pub const DEFAULT_JOIN_WARN_FACTOR: u32 = 5;

/// Lifecycle state of a worker, as seen from the owning thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Constructed, no thread yet
    Created,
    /// Thread alive and doing work
    Resumed,
    /// Thread alive, parked at the running gate
    Suspended,
    /// Stop signaled, thread may still be finishing its last unit of work
    StopRequested,
    /// Thread handle consumed (terminal)
    Joined,
}

impl WorkerState {
    /// True while a thread exists and has not been asked to stop
    pub fn is_live(self) -> bool {
        matches!(self, Self::Resumed | Self::Suspended)
    }
}

/// Why the loop ran a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReason {
    /// The wake trigger fired
    Woken,
    /// The poll interval elapsed with no wake
    Timeout,
}

/// One iteration of the poll-loop, passed to the job
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    /// 1-based iteration counter
    pub seq: u64,
    /// What released the bounded wait
    pub reason: TickReason,
}

/// Unit of work executed on the worker thread
pub trait Job: Send + 'static {
    fn run(&mut self, tick: &Tick);
}

impl<F> Job for F
where
    F: FnMut(&Tick) + Send + 'static,
{
    fn run(&mut self, tick: &Tick) {
        self(tick)
    }
}

/// Worker timing configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Thread name, also used in log output
    pub name: String,
    /// Bounded wait on the wake trigger
    pub poll_interval: Duration,
    /// A join still pending after this long emits a warning
    pub join_warn_after: Duration,
}

impl WorkerConfig {
    pub fn new(name: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            name: name.into(),
            poll_interval,
            join_warn_after: poll_interval.saturating_mul(DEFAULT_JOIN_WARN_FACTOR),
        }
    }

    pub fn with_join_warn_after(mut self, join_warn_after: Duration) -> Self {
        self.join_warn_after = join_warn_after;
        self
    }
}

/// Triggers and counters shared between the owner and the worker thread
#[derive(Debug)]
struct Control {
    running: Trigger,
    wake: Trigger,
    stop: Trigger,
    finished: Trigger,
    ticks: AtomicU64,
}

impl Control {
    fn new(name: &str) -> Self {
        Self {
            running: Trigger::new(format!("{name}::running")),
            wake: Trigger::new(format!("{name}::wake")),
            stop: Trigger::new(format!("{name}::stop")),
            finished: Trigger::new(format!("{name}::finished")),
            ticks: AtomicU64::new(0),
        }
    }
}

/// Cloneable handle for delivering wake events to a worker from other threads
#[derive(Debug, Clone)]
pub struct Waker {
    control: Arc<Control>,
}

impl Waker {
    /// Signal that new work is ready
    pub fn wake(&self) {
        self.control.wake.trigger();
    }

    /// Peek at the pending wake state without consuming it
    pub fn is_triggered(&self) -> bool {
        self.control.wake.test()
    }
}

/// Sets the finished trigger when the thread leaves `run_loop`, panics included
struct FinishedGuard(Arc<Control>);

impl Drop for FinishedGuard {
    fn drop(&mut self) {
        self.0.finished.trigger();
    }
}

/// A long-lived thread running a cooperative poll-loop around a [`Job`]
pub struct Worker<J: Job> {
    config: WorkerConfig,
    control: Arc<Control>,
    job: Option<J>,
    handle: Option<JoinHandle<()>>,
    thread_id: Option<ThreadId>,
    state: WorkerState,
}

impl<J: Job> Worker<J> {
    /// Create a worker. No thread exists until [`Worker::start`].
    pub fn new(config: WorkerConfig, job: J) -> Self {
        debug!(worker = %config.name, poll = ?config.poll_interval, "Worker::new: called");
        Self {
            control: Arc::new(Control::new(&config.name)),
            config,
            job: Some(job),
            handle: None,
            thread_id: None,
            state: WorkerState::Created,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Identity of the worker's thread, once started
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.thread_id
    }

    /// Units of work completed so far
    pub fn ticks(&self) -> u64 {
        self.control.ticks.load(Ordering::Acquire)
    }

    /// Handle other threads use to deliver wake events
    pub fn waker(&self) -> Waker {
        Waker {
            control: self.control.clone(),
        }
    }

    /// Peek at the pending wake state, non-blocking
    pub fn is_triggered(&self) -> bool {
        self.control.wake.test()
    }

    /// Request a unit of work
    pub fn wake(&self) {
        self.control.wake.trigger();
    }

    /// Spawn the thread with the loop active
    pub fn start(&mut self) -> Result<(), WorkerError> {
        self.spawn(true)
    }

    /// Spawn the thread parked at the running gate; call [`Worker::resume`] to begin work
    pub fn start_suspended(&mut self) -> Result<(), WorkerError> {
        self.spawn(false)
    }

    fn spawn(&mut self, active: bool) -> Result<(), WorkerError> {
        debug!(worker = %self.config.name, active, "Worker::spawn: called");
        let job = match (self.state, self.job.take()) {
            (WorkerState::Created, Some(job)) => job,
            (state, job) => {
                self.job = job;
                return Err(self.invalid("start", state));
            }
        };

        if active {
            self.control.running.trigger();
        }

        let control = self.control.clone();
        let name = self.config.name.clone();
        let poll_interval = self.config.poll_interval;
        let spawned = thread::Builder::new()
            .name(self.config.name.clone())
            .spawn(move || run_loop(name, control, job, poll_interval));

        match spawned {
            Ok(handle) => {
                self.thread_id = Some(handle.thread().id());
                self.handle = Some(handle);
                self.state = if active {
                    WorkerState::Resumed
                } else {
                    WorkerState::Suspended
                };
                info!(worker = %self.config.name, state = ?self.state, "Worker started");
                Ok(())
            }
            Err(source) => {
                self.state = WorkerState::Joined;
                Err(WorkerError::Spawn {
                    name: self.config.name.clone(),
                    source,
                })
            }
        }
    }

    /// Park the loop at the running gate; the thread stays alive
    pub fn suspend(&mut self) -> Result<(), WorkerError> {
        debug!(worker = %self.config.name, state = ?self.state, "Worker::suspend: called");
        if !self.state.is_live() {
            return Err(self.invalid("suspend", self.state));
        }
        self.control.running.reset();
        self.state = WorkerState::Suspended;
        Ok(())
    }

    /// Release the running gate
    pub fn resume(&mut self) -> Result<(), WorkerError> {
        debug!(worker = %self.config.name, state = ?self.state, "Worker::resume: called");
        if !self.state.is_live() {
            return Err(self.invalid("resume", self.state));
        }
        self.control.running.trigger();
        self.state = WorkerState::Resumed;
        Ok(())
    }

    /// Request thread shutdown. Safe to call in any state; repeated calls are no-ops.
    pub fn stop(&mut self) {
        debug!(worker = %self.config.name, state = ?self.state, "Worker::stop: called");
        match self.state {
            WorkerState::StopRequested | WorkerState::Joined => {
                debug!(worker = %self.config.name, "Worker::stop: already stopping");
            }
            WorkerState::Created | WorkerState::Resumed | WorkerState::Suspended => {
                // stop implies wake implies resume
                self.control.stop.trigger();
                self.control.wake.trigger();
                self.control.running.trigger();
                self.state = WorkerState::StopRequested;
            }
        }
    }

    /// Wait for the thread to exit after [`Worker::stop`]
    ///
    /// Waits without bound. A join still pending after `join_warn_after`
    /// logs a warning and keeps waiting. Returns the time spent waiting.
    pub fn join(&mut self) -> Result<Duration, WorkerError> {
        debug!(worker = %self.config.name, state = ?self.state, "Worker::join: called");
        match self.state {
            WorkerState::StopRequested => {}
            WorkerState::Resumed | WorkerState::Suspended | WorkerState::Created => {
                return Err(WorkerError::NotStopped {
                    name: self.config.name.clone(),
                });
            }
            WorkerState::Joined => return Err(self.invalid("join", self.state)),
        }

        let start = Instant::now();
        self.state = WorkerState::Joined;
        let Some(handle) = self.handle.take() else {
            debug!(worker = %self.config.name, "Worker::join: never started");
            return Ok(start.elapsed());
        };

        if !self.control.finished.wait(self.config.join_warn_after) {
            warn!(
                worker = %self.config.name,
                waited = ?self.config.join_warn_after,
                "Worker has not observed its stop signal yet, still waiting"
            );
            self.control.finished.wait_forever();
        }

        let result = handle.join();
        let elapsed = start.elapsed();
        match result {
            Ok(()) => {
                info!(worker = %self.config.name, ?elapsed, ticks = self.ticks(), "Worker joined");
                Ok(elapsed)
            }
            Err(_) => Err(WorkerError::Panicked {
                name: self.config.name.clone(),
            }),
        }
    }

    fn invalid(&self, op: &'static str, state: WorkerState) -> WorkerError {
        WorkerError::InvalidState {
            name: self.config.name.clone(),
            op,
            state,
        }
    }
}

impl<J: Job> fmt::Debug for Worker<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.config.name)
            .field("state", &self.state)
            .field("ticks", &self.ticks())
            .finish()
    }
}

/// Dropping a started worker stops and joins it; the thread never outlives its handle
impl<J: Job> Drop for Worker<J> {
    fn drop(&mut self) {
        if self.state.is_live() {
            warn!(worker = %self.config.name, "Worker dropped while running, stopping");
            self.stop();
        }
        if self.state == WorkerState::StopRequested
            && let Err(e) = self.join()
        {
            warn!(worker = %self.config.name, error = %e, "Worker::drop: join failed");
        }
    }
}

fn run_loop<J: Job>(name: String, control: Arc<Control>, mut job: J, poll_interval: Duration) {
    let _finished = FinishedGuard(control.clone());
    debug!(worker = %name, "run_loop: thread started");

    let mut seq = 0u64;
    loop {
        control.running.wait_forever();

        let woken = control.wake.wait(poll_interval);
        if control.stop.test() {
            break;
        }
        control.wake.reset();

        seq += 1;
        let tick = Tick {
            seq,
            reason: if woken { TickReason::Woken } else { TickReason::Timeout },
        };
        job.run(&tick);
        control.ticks.fetch_add(1, Ordering::Release);
    }

    debug!(worker = %name, iterations = seq, "run_loop: thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;

    const POLL: Duration = Duration::from_millis(10);

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn noop_worker(name: &str) -> Worker<impl Job> {
        Worker::new(WorkerConfig::new(name, POLL), |_: &Tick| {})
    }

    #[test]
    fn test_new_worker_is_created() {
        let worker = noop_worker("w");
        assert_eq!(worker.state(), WorkerState::Created);
        assert!(worker.thread_id().is_none());
        assert_eq!(worker.ticks(), 0);
    }

    #[test]
    fn test_start_runs_periodic_ticks() {
        let mut worker = noop_worker("w");
        worker.start().unwrap();
        assert_eq!(worker.state(), WorkerState::Resumed);
        assert!(wait_for(|| worker.ticks() >= 3), "timeouts should drive ticks");

        worker.stop();
        worker.join().unwrap();
        assert_eq!(worker.state(), WorkerState::Joined);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut worker = noop_worker("w");
        worker.start().unwrap();
        let err = worker.start().unwrap_err();
        assert!(matches!(err, WorkerError::InvalidState { op: "start", .. }));
        worker.stop();
        worker.join().unwrap();
    }

    #[test]
    fn test_start_suspended_does_no_work_until_resumed() {
        let mut worker = noop_worker("w");
        worker.start_suspended().unwrap();
        assert_eq!(worker.state(), WorkerState::Suspended);

        thread::sleep(POLL * 5);
        assert_eq!(worker.ticks(), 0);

        worker.resume().unwrap();
        assert!(wait_for(|| worker.ticks() > 0));

        worker.stop();
        worker.join().unwrap();
    }

    #[test]
    fn test_wake_produces_woken_tick() {
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let seen = reasons.clone();
        let config = WorkerConfig::new("w", Duration::from_secs(10));
        let mut worker = Worker::new(config, move |tick: &Tick| {
            seen.lock().unwrap().push(tick.reason);
        });
        worker.start().unwrap();

        worker.wake();
        assert!(wait_for(|| !reasons.lock().unwrap().is_empty()));
        assert_eq!(reasons.lock().unwrap()[0], TickReason::Woken);
        assert!(!worker.is_triggered(), "wake is consumed before the job runs");

        worker.stop();
        worker.join().unwrap();
    }

    #[test]
    fn test_waker_from_other_thread() {
        let config = WorkerConfig::new("w", Duration::from_secs(10));
        let mut worker = Worker::new(config, |_: &Tick| {});
        worker.start().unwrap();

        let waker = worker.waker();
        thread::spawn(move || waker.wake()).join().unwrap();
        assert!(wait_for(|| worker.ticks() == 1));

        worker.stop();
        worker.join().unwrap();
    }

    #[test]
    fn test_suspend_resume_keeps_thread() {
        let ids = Arc::new(Mutex::new(Vec::new()));
        let seen = ids.clone();
        let mut worker = Worker::new(WorkerConfig::new("w", POLL), move |_: &Tick| {
            seen.lock().unwrap().push(thread::current().id());
        });
        worker.start().unwrap();
        let original = worker.thread_id().unwrap();
        assert!(wait_for(|| worker.ticks() > 0));

        worker.suspend().unwrap();
        thread::sleep(POLL * 3);
        let parked = worker.ticks();
        thread::sleep(POLL * 5);
        assert!(worker.ticks() <= parked + 1, "suspended worker should idle");

        worker.resume().unwrap();
        assert!(wait_for(|| worker.ticks() > parked + 2));
        assert_eq!(worker.thread_id(), Some(original));
        assert!(ids.lock().unwrap().iter().all(|id| *id == original));

        worker.stop();
        worker.join().unwrap();
    }

    #[test]
    fn test_stop_overrides_suspend() {
        let mut worker = noop_worker("w");
        worker.start().unwrap();
        worker.suspend().unwrap();
        worker.stop();

        let elapsed = worker.join().unwrap();
        assert!(elapsed < POLL * 5, "join took {:?}", elapsed);
    }

    #[test]
    fn test_stop_twice_is_noop() {
        let mut worker = noop_worker("w");
        worker.start().unwrap();
        worker.stop();
        worker.stop();
        assert_eq!(worker.state(), WorkerState::StopRequested);
        worker.join().unwrap();
        worker.stop();
        assert_eq!(worker.state(), WorkerState::Joined);
    }

    #[test]
    fn test_join_before_stop_is_rejected() {
        let mut worker = noop_worker("w");
        worker.start().unwrap();
        assert!(matches!(worker.join(), Err(WorkerError::NotStopped { .. })));
        worker.stop();
        worker.join().unwrap();
    }

    #[test]
    fn test_join_twice_is_rejected() {
        let mut worker = noop_worker("w");
        worker.start().unwrap();
        worker.stop();
        worker.join().unwrap();
        assert!(matches!(worker.join(), Err(WorkerError::InvalidState { op: "join", .. })));
    }

    #[test]
    fn test_operations_after_stop_are_rejected() {
        let mut worker = noop_worker("w");
        worker.start().unwrap();
        worker.stop();
        assert!(worker.suspend().is_err());
        assert!(worker.resume().is_err());
        worker.join().unwrap();
        assert!(worker.resume().is_err());
    }

    #[test]
    fn test_stop_unstarted_worker() {
        let mut worker = noop_worker("w");
        worker.stop();
        assert_eq!(worker.state(), WorkerState::StopRequested);
        worker.join().unwrap();
        assert!(worker.start().is_err());
    }

    #[test]
    fn test_suspend_before_start_is_rejected() {
        let mut worker = noop_worker("w");
        let err = worker.suspend().unwrap_err();
        assert_eq!(err.worker_name(), "w");
    }

    #[test]
    fn test_panicking_job_reports_on_join() {
        let mut worker = Worker::new(WorkerConfig::new("boom", POLL), |_: &Tick| panic!("job failed"));
        worker.start().unwrap();
        assert!(wait_for(|| worker.control.finished.test()));
        worker.stop();
        assert!(matches!(worker.join(), Err(WorkerError::Panicked { .. })));
    }

    #[test]
    fn test_huge_poll_interval_saturates_join_warning() {
        let config = WorkerConfig::new("huge", Duration::MAX);
        assert_eq!(config.join_warn_after, Duration::MAX);
    }

    struct ExitFlag(Arc<AtomicBool>);

    impl Drop for ExitFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_joins_live_worker() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = ExitFlag(exited.clone());
        let mut worker = Worker::new(WorkerConfig::new("dropped", POLL), move |_: &Tick| {
            let _ = &flag;
        });
        worker.start().unwrap();
        drop(worker);
        assert!(exited.load(Ordering::SeqCst), "thread should have exited");
    }

    #[test]
    fn test_drop_after_stop_joins() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = ExitFlag(exited.clone());
        let mut worker = Worker::new(WorkerConfig::new("stopped", POLL), move |_: &Tick| {
            let _ = &flag;
        });
        worker.start_suspended().unwrap();
        worker.stop();
        drop(worker);
        assert!(exited.load(Ordering::SeqCst));
    }

    #[test]
    fn test_slow_job_join_waits_past_warning() {
        let config = WorkerConfig::new("slow", POLL).with_join_warn_after(Duration::from_millis(5));
        let mut worker = Worker::new(config, |_: &Tick| thread::sleep(Duration::from_millis(50)));
        worker.start().unwrap();
        thread::sleep(POLL * 2);
        worker.stop();
        assert!(worker.join().is_ok());
    }
}
