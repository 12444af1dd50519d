//! WorkThread - trigger-gated cooperative worker threads
//!
//! Two pieces:
//!
//! - [`Trigger`]: a named binary event flag (set / clear / peek / wait). It is
//!   the only synchronization primitive the workers use.
//! - [`Worker`]: one OS thread running a poll-loop around an injected [`Job`],
//!   with start, suspend, resume, stop and join.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use workthread::{Tick, Worker, WorkerConfig};
//!
//! let mut worker = Worker::new(
//!     WorkerConfig::new("example", Duration::from_millis(10)),
//!     |tick: &Tick| {
//!         let _ = tick.seq;
//!     },
//! );
//! worker.start().unwrap();
//! worker.wake();
//! worker.stop();
//! worker.join().unwrap();
//! ```

mod error;
mod trigger;
mod worker;

pub use error::WorkerError;
pub use trigger::Trigger;
pub use worker::{
    DEFAULT_JOIN_WARN_FACTOR, DEFAULT_POLL_INTERVAL, Job, Tick, TickReason, Waker, Worker, WorkerConfig, WorkerState,
};
