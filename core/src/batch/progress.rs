use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, observed by workers between items.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Monotonic batch counters, safe to poll from any thread.
#[derive(Debug, Default)]
pub struct BatchProgress {
    completed: AtomicUsize,
    finished: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub finished: bool,
}

impl BatchProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items finished over the lifetime of the scheduler; never decreases.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed(),
            finished: self.is_finished(),
        }
    }

    pub(crate) fn begin(&self) {
        self.finished.store(false, Ordering::SeqCst);
    }

    pub(crate) fn complete_one(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

/// Turns polled counters into progress lines, one per percentage step.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    total: usize,
    last_percent: Option<usize>,
}

impl ProgressReporter {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            last_percent: None,
        }
    }

    pub fn observe(&mut self, completed: usize) -> Option<String> {
        let percent = if self.total == 0 {
            100
        } else {
            (completed.min(self.total) * 100) / self.total
        };
        if self.last_percent == Some(percent) {
            return None;
        }
        self.last_percent = Some(percent);
        Some(format!(
            "{completed}/{} trajectories processed ({percent}%)",
            self.total
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reporter_skips_repeated_percentages() {
        let mut reporter = ProgressReporter::new(300);
        assert!(reporter.observe(0).is_some());
        assert!(reporter.observe(1).is_none());
        assert!(reporter.observe(2).is_none());
        assert_eq!(
            reporter.observe(3).as_deref(),
            Some("3/300 trajectories processed (1%)")
        );
        assert!(reporter.observe(3).is_none());
        assert!(reporter.observe(300).is_some());
    }

    #[test]
    fn progress_counts_only_upwards() {
        let progress = BatchProgress::new();
        progress.begin();
        progress.complete_one();
        progress.complete_one();
        progress.finish();
        assert_eq!(
            progress.snapshot(),
            ProgressSnapshot {
                completed: 2,
                finished: true
            }
        );
        progress.begin();
        assert_eq!(progress.completed(), 2);
        assert!(!progress.is_finished());
    }

    #[test]
    fn token_clones_share_state() {
        let token = CancellationToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }
}
