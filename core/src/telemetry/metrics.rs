use serde::Serialize;
use std::sync::Mutex;

/// Outcome counters of one batch, shared between workers.
pub struct MetricsRecorder {
    inner: Mutex<BatchCounts>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
    /// Items that produced a trajectory without soft issues.
    pub processed: usize,
    /// Items that produced a trajectory with at least one soft issue.
    pub degraded: usize,
    pub failed: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BatchCounts::default()),
        }
    }

    pub fn record_processed(&self) {
        if let Ok(mut counts) = self.inner.lock() {
            counts.processed += 1;
        }
    }

    pub fn record_degraded(&self) {
        if let Ok(mut counts) = self.inner.lock() {
            counts.degraded += 1;
        }
    }

    pub fn record_failed(&self) {
        if let Ok(mut counts) = self.inner.lock() {
            counts.failed += 1;
        }
    }

    pub fn snapshot(&self) -> BatchCounts {
        if let Ok(counts) = self.inner.lock() {
            *counts
        } else {
            BatchCounts::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate_per_outcome() {
        let recorder = MetricsRecorder::new();
        recorder.record_processed();
        recorder.record_processed();
        recorder.record_degraded();
        recorder.record_failed();
        assert_eq!(
            recorder.snapshot(),
            BatchCounts {
                processed: 2,
                degraded: 1,
                failed: 1
            }
        );
    }
}
