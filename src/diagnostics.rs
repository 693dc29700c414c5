//! Cumulative evaluation timing.
//!
//! One `EvaluationStats` is shared (through `Arc`) by every factor built from the
//! same `ProjectionConfig`. Updates are relaxed atomics, so factors can be
//! evaluated from any number of worker threads.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Running totals of time spent in factor evaluation.
#[derive(Debug, Default)]
pub struct EvaluationStats {
    total_nanos: AtomicU64,
    evaluations: AtomicU64,
}

impl EvaluationStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one evaluation that took `elapsed`.
    #[inline]
    pub fn record(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.evaluations.fetch_add(1, Ordering::Relaxed);
    }

    /// Total time recorded so far.
    pub fn total_time(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed))
    }

    /// Number of evaluations recorded so far.
    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    /// Mean time per evaluation, zero when nothing was recorded.
    pub fn mean_time(&self) -> Duration {
        let count = self.evaluations();
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed) / count)
    }

    pub fn reset(&self) {
        self.total_nanos.store(0, Ordering::Relaxed);
        self.evaluations.store(0, Ordering::Relaxed);
    }
}

impl fmt::Display for EvaluationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Projection Factor Evaluation ===")?;
        writeln!(f, "Evaluations:        {}", self.evaluations())?;
        writeln!(f, "Total time:         {:?}", self.total_time())?;
        write!(f, "Mean per evaluation: {:?}", self.mean_time())
    }
}
