//! Timing and divergence observation.
//!
//! Components receive an `Arc<dyn QueryObserver>` at construction and report
//! through it; the default [`TracingObserver`] turns reports into `tracing`
//! events.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

pub trait QueryObserver: Send + Sync {
    /// One timed unit of work finished.
    fn record(&self, operation: &str, elapsed: Duration, outcome: Outcome);

    /// Two sources produced different answers for the same operation.
    fn divergence(&self, operation: &str, canonical: &str, other: &str, detail: &str);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl QueryObserver for TracingObserver {
    fn record(&self, operation: &str, elapsed: Duration, outcome: Outcome) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        match outcome {
            Outcome::Success => debug!(operation, elapsed_ms, "completed"),
            Outcome::Failure => warn!(operation, elapsed_ms, "failed"),
        }
    }

    fn divergence(&self, operation: &str, canonical: &str, other: &str, detail: &str) {
        warn!(
            operation,
            canonical,
            other,
            detail,
            "unexpected differing result"
        );
    }
}

/// Run `work`, reporting its elapsed time and whether it returned `Ok`.
pub fn instrument<T, E, F>(observer: &dyn QueryObserver, operation: &str, work: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
{
    let started = Instant::now();
    let result = work();
    let outcome = if result.is_ok() {
        Outcome::Success
    } else {
        Outcome::Failure
    };
    observer.record(operation, started.elapsed(), outcome);
    result
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Observer that keeps every report for assertions.
    #[derive(Default)]
    pub struct RecordingObserver {
        pub records: Mutex<Vec<(String, Outcome)>>,
        pub divergences: Mutex<Vec<(String, String, String)>>,
    }

    impl QueryObserver for RecordingObserver {
        fn record(&self, operation: &str, _elapsed: Duration, outcome: Outcome) {
            self.records.lock().push((operation.to_string(), outcome));
        }

        fn divergence(&self, operation: &str, canonical: &str, other: &str, _detail: &str) {
            self.divergences.lock().push((
                operation.to_string(),
                canonical.to_string(),
                other.to_string(),
            ));
        }
    }
}
