use serde::{Deserialize, Serialize};
use trajcore::telemetry::BatchCounts;

/// Batch state published on the progress endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProgressModel {
    pub total: usize,
    pub completed: usize,
    pub processed: usize,
    pub degraded: usize,
    pub failed: usize,
    pub written: usize,
    pub finished: bool,
    pub cancelled: bool,
}

impl ProgressModel {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn apply_counts(&mut self, counts: BatchCounts) {
        self.processed = counts.processed;
        self.degraded = counts.degraded;
        self.failed = counts.failed;
    }
}
