//! Outcome records for startup and shutdown steps

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Result of one lifecycle step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub step: String,
    pub ok: bool,
    pub error: Option<String>,
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

impl StepOutcome {
    pub fn ok(step: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            step: step.into(),
            ok: true,
            error: None,
            elapsed,
        }
    }

    pub fn failed(step: impl Into<String>, error: impl fmt::Display, elapsed: Duration) -> Self {
        Self {
            step: step.into(),
            ok: false,
            error: Some(error.to_string()),
            elapsed,
        }
    }

    /// Run `f` and record how it went
    pub fn record<E: fmt::Display>(step: impl Into<String>, f: impl FnOnce() -> Result<(), E>) -> Self {
        let start = Instant::now();
        match f() {
            Ok(()) => Self::ok(step, start.elapsed()),
            Err(e) => Self::failed(step, e, start.elapsed()),
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "{}: ok ({:?})", self.step, self.elapsed),
            Some(e) => write!(f, "{}: FAILED ({:?}): {}", self.step, self.elapsed, e),
        }
    }
}

/// Every shutdown step in the order it ran
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    pub steps: Vec<StepOutcome>,
}

impl ShutdownReport {
    pub fn push(&mut self, outcome: StepOutcome) {
        if outcome.ok {
            tracing::debug!(step = %outcome.step, elapsed = ?outcome.elapsed, "Shutdown step complete");
        } else {
            tracing::error!(
                step = %outcome.step,
                error = outcome.error.as_deref().unwrap_or(""),
                "Shutdown step failed, continuing"
            );
        }
        self.steps.push(outcome);
    }

    pub fn extend(&mut self, outcomes: impl IntoIterator<Item = StepOutcome>) {
        for outcome in outcomes {
            self.push(outcome);
        }
    }

    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| !s.ok)
    }

    pub fn step(&self, name: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step == name)
    }
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
