use crate::batch::progress::{BatchProgress, CancellationToken};
use crate::interface::airport::AirportLookup;
use crate::interface::state_vector::LoadedSamples;
use crate::prelude::{StageConfig, StageResult, TrajectoryError};
use crate::processing::pipeline::{TrajectoryBundle, TrajectoryPipeline};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::{BatchCounts, MetricsRecorder};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Opaque identifier understood by the [`SampleSource`].
pub type WorkItemId = String;

/// Result code of an item that was never claimed.
pub const NOT_RUN_CODE: i32 = -100;

/// Ingest collaborator: materializes the state vectors of one work item.
pub trait SampleSource: Send + Sync {
    fn load(&self, id: &str) -> StageResult<LoadedSamples>;
}

#[derive(Debug, Clone)]
pub enum ItemStatus {
    NotRun,
    Completed(Box<TrajectoryBundle>),
    Failed(TrajectoryError),
}

impl ItemStatus {
    /// 0 or a positive soft-issue code on success, negative otherwise.
    pub fn code(&self) -> i32 {
        match self {
            ItemStatus::NotRun => NOT_RUN_CODE,
            ItemStatus::Completed(bundle) => bundle.code(),
            ItemStatus::Failed(err) => err.code(),
        }
    }

    pub fn bundle(&self) -> Option<&TrajectoryBundle> {
        match self {
            ItemStatus::Completed(bundle) => Some(bundle),
            _ => None,
        }
    }

    pub fn was_run(&self) -> bool {
        !matches!(self, ItemStatus::NotRun)
    }
}

/// Fixed-size worker pool over an ordered list of work items.
///
/// Workers claim indices from one shared counter, so every index is handed
/// out at most once. Cancellation is checked before each claim.
pub struct BatchScheduler {
    config: StageConfig,
    source: Arc<dyn SampleSource>,
    airports: Option<Arc<dyn AirportLookup>>,
    items: Vec<WorkItemId>,
    results: Vec<ItemStatus>,
    cancellation: CancellationToken,
    progress: Arc<BatchProgress>,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl BatchScheduler {
    pub fn new(
        config: StageConfig,
        source: Arc<dyn SampleSource>,
        airports: Option<Arc<dyn AirportLookup>>,
    ) -> Self {
        Self {
            config,
            source,
            airports,
            items: Vec::new(),
            results: Vec::new(),
            cancellation: CancellationToken::new(),
            progress: Arc::new(BatchProgress::new()),
            metrics: MetricsRecorder::new(),
            logger: LogManager::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Replaces the work list; every slot starts as [`ItemStatus::NotRun`].
    pub fn set_work_items(&mut self, items: Vec<WorkItemId>) {
        self.results = vec![ItemStatus::NotRun; items.len()];
        self.items = items;
    }

    /// Runs the pool until the list is exhausted or cancellation is observed.
    pub fn run(&mut self, worker_count: usize) {
        let workers = worker_count.max(1).min(self.items.len().max(1));
        self.progress.begin();
        self.logger.record(&format!(
            "running {} items on {workers} workers",
            self.items.len()
        ));

        let next = AtomicUsize::new(0);
        let outcomes: Vec<(usize, ItemStatus)> = {
            let shared = &*self;
            let next = &next;
            thread::scope(|scope| {
                let handles: Vec<_> = (0..workers)
                    .map(|_| scope.spawn(move || shared.work(next)))
                    .collect();
                handles
                    .into_iter()
                    .flat_map(|handle| match handle.join() {
                        Ok(done) => done,
                        Err(_) => {
                            shared
                                .logger
                                .warn("worker panicked outside item processing");
                            Vec::new()
                        }
                    })
                    .collect()
            })
        };
        let mut reported = vec![false; self.items.len()];
        for (index, status) in outcomes {
            reported[index] = true;
            self.results[index] = status;
        }
        let claimed = next.load(Ordering::SeqCst).min(self.items.len());
        self.fail_lost_claims(claimed, &reported);

        if self.cancellation.is_cancelled() {
            self.logger.warn("batch cancelled");
        }
        self.progress.finish();
    }

    /// Marks items below `claimed` whose worker never reported back as failed.
    fn fail_lost_claims(&mut self, claimed: usize, reported: &[bool]) {
        for index in 0..claimed {
            if reported.get(index).copied().unwrap_or(false) {
                continue;
            }
            let id = &self.items[index];
            self.logger
                .warn(&format!("{id}: worker terminated before reporting"));
            self.metrics.record_failed();
            self.results[index] = ItemStatus::Failed(TrajectoryError::Internal(format!(
                "worker terminated while processing {id}"
            )));
        }
    }

    fn work(&self, next: &AtomicUsize) -> Vec<(usize, ItemStatus)> {
        let mut pipeline = TrajectoryPipeline::new(self.config.clone());
        let mut done = Vec::new();
        while !self.cancellation.is_cancelled() {
            let index = next.fetch_add(1, Ordering::SeqCst);
            let Some(id) = self.items.get(index) else {
                break;
            };
            let status = self.process(&mut pipeline, id);
            match &status {
                ItemStatus::Completed(bundle) if bundle.is_degraded() => {
                    self.metrics.record_degraded()
                }
                ItemStatus::Completed(_) => self.metrics.record_processed(),
                _ => self.metrics.record_failed(),
            }
            done.push((index, status));
            self.progress.complete_one();
        }
        done
    }

    fn process(&self, pipeline: &mut TrajectoryPipeline, id: &str) -> ItemStatus {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let loaded = self.source.load(id)?;
            pipeline.run(loaded, self.airports.as_deref())
        }));
        match outcome {
            Ok(Ok(bundle)) => ItemStatus::Completed(Box::new(bundle)),
            Ok(Err(err)) => {
                self.logger.warn(&format!("{id}: {err}"));
                ItemStatus::Failed(err)
            }
            Err(_) => {
                *pipeline = TrajectoryPipeline::new(self.config.clone());
                ItemStatus::Failed(TrajectoryError::Internal(format!(
                    "panic while processing {id}"
                )))
            }
        }
    }

    pub fn request_cancellation(&self) {
        self.cancellation.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn progress(&self) -> Arc<BatchProgress> {
        Arc::clone(&self.progress)
    }

    pub fn items(&self) -> &[WorkItemId] {
        &self.items
    }

    pub fn results(&self) -> &[ItemStatus] {
        &self.results
    }

    /// Moves the results of the last run out, paired with their identifiers.
    pub fn take_results(&mut self) -> Vec<(WorkItemId, ItemStatus)> {
        let results = std::mem::take(&mut self.results);
        std::mem::take(&mut self.items).into_iter().zip(results).collect()
    }

    pub fn counts(&self) -> BatchCounts {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::fixtures::loaded_flight;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves the synthetic flight for ids starting with `ok`, fails otherwise.
    #[derive(Default)]
    struct FixtureSource {
        loads: AtomicUsize,
        seen: Mutex<Vec<String>>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl SampleSource for FixtureSource {
        fn load(&self, id: &str) -> StageResult<LoadedSamples> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(id.to_string());
            }
            let count = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
            if id == "panic" {
                panic!("corrupt input");
            }
            thread::sleep(Duration::from_millis(5));
            if let Some((limit, token)) = &self.cancel_after {
                if count == *limit {
                    token.cancel();
                }
            }
            if id.starts_with("ok") {
                Ok(loaded_flight("3c6444", "DLH4AB"))
            } else {
                Err(TrajectoryError::Ingest(format!("unknown item {id}")))
            }
        }
    }

    fn ids(count: usize) -> Vec<WorkItemId> {
        (0..count).map(|i| format!("ok-{i}")).collect()
    }

    #[test]
    fn every_item_is_claimed_exactly_once() {
        let source = Arc::new(FixtureSource::default());
        let mut scheduler = BatchScheduler::new(StageConfig::default(), source.clone(), None);
        scheduler.set_work_items(ids(7));
        scheduler.run(3);

        assert!(scheduler.results().iter().all(|s| s.code() == 0));
        let seen = source.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 7);
        assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 7);
        let progress = scheduler.progress().snapshot();
        assert_eq!(progress.completed, 7);
        assert!(progress.finished);
        assert_eq!(scheduler.counts().processed, 7);
    }

    #[test]
    fn failures_do_not_abort_the_batch() {
        let source = Arc::new(FixtureSource::default());
        let mut scheduler = BatchScheduler::new(StageConfig::default(), source, None);
        scheduler.set_work_items(vec![
            "ok-0".into(),
            "missing".into(),
            "panic".into(),
            "ok-1".into(),
        ]);
        scheduler.run(2);

        let codes: Vec<i32> = scheduler.results().iter().map(ItemStatus::code).collect();
        assert_eq!(codes, vec![0, -1, -99, 0]);
        assert_eq!(scheduler.counts().failed, 2);
        let results = scheduler.take_results();
        assert_eq!(results[1].0, "missing");
        assert!(scheduler.results().is_empty());
    }

    #[test]
    fn cancellation_stops_claiming_new_items() {
        let token = CancellationToken::new();
        let source = Arc::new(FixtureSource {
            cancel_after: Some((4, token.clone())),
            ..Default::default()
        });
        let mut scheduler = BatchScheduler::new(StageConfig::default(), source, None)
            .with_cancellation(token);
        scheduler.set_work_items(ids(10));
        scheduler.run(3);

        let run = scheduler.results().iter().filter(|s| s.was_run()).count();
        assert!((4..=6).contains(&run), "{run} items ran");
        assert!(scheduler
            .results()
            .iter()
            .filter(|s| !s.was_run())
            .all(|s| s.code() == NOT_RUN_CODE));
        assert!(scheduler.progress().is_finished());
    }

    #[test]
    fn unreported_claims_are_marked_failed() {
        let source = Arc::new(FixtureSource::default());
        let mut scheduler = BatchScheduler::new(StageConfig::default(), source, None);
        scheduler.set_work_items(ids(3));
        scheduler.fail_lost_claims(2, &[true, false, false]);

        let codes: Vec<i32> = scheduler.results().iter().map(ItemStatus::code).collect();
        assert_eq!(codes, vec![NOT_RUN_CODE, -99, NOT_RUN_CODE]);
        assert_eq!(scheduler.counts().failed, 1);
    }

    #[test]
    fn progress_accumulates_across_rounds() {
        let source = Arc::new(FixtureSource::default());
        let mut scheduler = BatchScheduler::new(StageConfig::default(), source, None);
        scheduler.set_work_items(ids(2));
        scheduler.run(4);
        scheduler.set_work_items(ids(3));
        scheduler.run(4);
        assert_eq!(scheduler.progress().completed(), 5);
        assert_eq!(scheduler.results().len(), 3);
    }
}
