//! Trigger - named binary event flag
//!
//! A `Trigger` is a boolean that threads can set, clear, peek at, and wait on.
//! It is used both as a one-shot latch ("input delivery is enabled") and as a
//! repeatable pulse ("a redraw was requested"); the role is fixed by the
//! use-site, the operations are the same.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

/// Named binary event flag with wait/signal/clear semantics
pub struct Trigger {
    name: String,
    state: Mutex<bool>,
    cond: Condvar,
}

impl Trigger {
    /// Create a new trigger in the cleared state
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_state(name, false)
    }

    /// Create a new trigger with an explicit initial state
    pub fn with_state(name: impl Into<String>, signaled: bool) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(signaled),
            cond: Condvar::new(),
        }
    }

    /// Debug name of this trigger
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the trigger and wake every thread waiting on it
    pub fn trigger(&self) {
        let mut state = self.state.lock();
        *state = true;
        self.cond.notify_all();
        trace!(trigger = %self.name, "trigger: set");
    }

    /// Clear the trigger. Waiters are not woken.
    pub fn reset(&self) {
        *self.state.lock() = false;
        trace!(trigger = %self.name, "reset: cleared");
    }

    /// Current state, never blocks on a wait
    pub fn test(&self) -> bool {
        *self.state.lock()
    }

    /// Block until the trigger is set or `timeout` elapses
    ///
    /// Returns true if the trigger was set, false on timeout. Does not clear
    /// the trigger; pulse-style users call [`Trigger::reset`] themselves once
    /// they have consumed the signal. A timeout too large to express as a
    /// deadline waits without bound.
    pub fn wait(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait_forever();
            return true;
        };
        let mut state = self.state.lock();
        while !*state {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return *state;
            }
        }
        true
    }

    /// Block until the trigger is set, without a timeout
    ///
    /// Only the worker's running gate uses this; everything else waits with a
    /// bound.
    pub fn wait_forever(&self) {
        let mut state = self.state.lock();
        while !*state {
            self.cond.wait(&mut state);
        }
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("name", &self.name)
            .field("signaled", &self.test())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_trigger_is_clear() {
        let t = Trigger::new("test");
        assert!(!t.test());
        assert_eq!(t.name(), "test");
    }

    #[test]
    fn test_with_state_signaled() {
        let t = Trigger::with_state("test", true);
        assert!(t.test());
        assert!(t.wait(Duration::from_millis(1)));
    }

    #[test]
    fn test_trigger_then_reset() {
        let t = Trigger::new("test");
        t.trigger();
        assert!(t.test());
        t.reset();
        assert!(!t.test());
    }

    #[test]
    fn test_wait_times_out_when_clear() {
        let t = Trigger::new("test");
        let start = Instant::now();
        assert!(!t.wait(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_does_not_consume_signal() {
        let t = Trigger::new("test");
        t.trigger();
        assert!(t.wait(Duration::from_millis(1)));
        assert!(t.test());
    }

    #[test]
    fn test_trigger_releases_all_waiters() {
        let t = Arc::new(Trigger::new("shared"));
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let t = t.clone();
                thread::spawn(move || t.wait(Duration::from_secs(5)))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        t.trigger();

        for w in waiters {
            assert!(w.join().unwrap(), "every waiter should see the signal");
        }
    }

    #[test]
    fn test_unrepresentable_timeout_does_not_overflow() {
        let set = Trigger::with_state("set", true);
        assert!(set.wait(Duration::MAX));

        let t = Arc::new(Trigger::new("late"));
        let t2 = t.clone();
        let handle = thread::spawn(move || t2.wait(Duration::MAX));
        thread::sleep(Duration::from_millis(10));
        t.trigger();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_wait_forever_returns_after_trigger() {
        let t = Arc::new(Trigger::new("gate"));
        let t2 = t.clone();
        let handle = thread::spawn(move || t2.wait_forever());

        thread::sleep(Duration::from_millis(10));
        t.trigger();
        handle.join().unwrap();
    }

    #[test]
    fn test_debug_shows_name_and_state() {
        let t = Trigger::with_state("dbg", true);
        let s = format!("{:?}", t);
        assert!(s.contains("dbg"));
        assert!(s.contains("true"));
    }
}
