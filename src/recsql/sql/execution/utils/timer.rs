//! Per-stage elapsed-time measurement.
//!
//! Every pipeline stage wraps its work in a [`StageTimer`]; the elapsed
//! seconds land in the result sink keyed by the stage label, so callers can
//! inspect where an execution spent its time after the fact.

use crate::recsql::sql::execution::results::QueryResults;
use std::time::Instant;

/// Measures one labelled span of execution time.
pub struct StageTimer {
    label: String,
    started: Instant,
}

impl StageTimer {
    /// Start timing under the given label.
    pub fn start(label: impl Into<String>) -> Self {
        StageTimer {
            label: label.into(),
            started: Instant::now(),
        }
    }

    /// Stop and record the elapsed seconds into the sink.
    pub fn stop(self, results: &mut QueryResults) {
        results.add_timing(self.label, self.started.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_records_label() {
        let mut results = QueryResults::new();
        let timer = StageTimer::start("test stage");
        timer.stop(&mut results);
        assert_eq!(results.timings().len(), 1);
        assert_eq!(results.timings()[0].0, "test stage");
        assert!(results.timings()[0].1 >= 0.0);
    }
}
