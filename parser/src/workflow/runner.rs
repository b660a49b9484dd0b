use crate::gui_bridge::model::ProgressModel;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use log::{info, warn};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use trajcore::batch::{
    BatchProgress, BatchScheduler, CancellationToken, ItemStatus, ProgressReporter, SampleSource,
    WorkItemId,
};
use trajcore::interface::airport::AirportLookup;
use trajcore::interface::report::TrajectoryReport;
use trajcore::telemetry::BatchCounts;

const PROGRESS_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub counts: BatchCounts,
    pub written: usize,
    pub not_run: usize,
    pub cancelled: bool,
}

/// Drives the scheduler round by round and writes one JSON line per trajectory.
pub struct Runner {
    config: WorkflowConfig,
    scheduler: BatchScheduler,
    cancellation: CancellationToken,
    model: Arc<RwLock<ProgressModel>>,
}

impl Runner {
    pub fn new(
        config: WorkflowConfig,
        source: Arc<dyn SampleSource>,
        airports: Option<Arc<dyn AirportLookup>>,
        cancellation: CancellationToken,
    ) -> Self {
        let scheduler = BatchScheduler::new(config.to_stage_config(), source, airports)
            .with_cancellation(cancellation.clone());
        Self {
            config,
            scheduler,
            cancellation,
            model: Arc::new(RwLock::new(ProgressModel::default())),
        }
    }

    pub fn progress_model(&self) -> Arc<RwLock<ProgressModel>> {
        self.model.clone()
    }

    pub fn execute<W: Write>(
        &mut self,
        items: Vec<WorkItemId>,
        output: &mut W,
    ) -> anyhow::Result<BatchSummary> {
        let total = items.len();
        if let Ok(mut model) = self.model.write() {
            *model = ProgressModel::new(total);
        }
        let done = Arc::new(AtomicBool::new(false));
        let watcher = spawn_progress_watcher(
            self.scheduler.progress(),
            total,
            self.model.clone(),
            done.clone(),
        );

        let outcome = self.run_rounds(items, output);
        done.store(true, Ordering::SeqCst);
        if watcher.join().is_err() {
            warn!("progress watcher panicked");
        }

        let summary = outcome?;
        if let Ok(mut model) = self.model.write() {
            model.apply_counts(summary.counts);
            model.written = summary.written;
            model.cancelled = summary.cancelled;
            model.finished = true;
        }
        Ok(summary)
    }

    fn run_rounds<W: Write>(
        &mut self,
        items: Vec<WorkItemId>,
        output: &mut W,
    ) -> anyhow::Result<BatchSummary> {
        let mut written = 0;
        let mut not_run = 0;
        let rounds: Vec<&[WorkItemId]> = items.chunks(self.config.round_size()).collect();
        for (round, chunk) in rounds.iter().enumerate() {
            if self.cancellation.is_cancelled() {
                not_run += chunk.len();
                continue;
            }
            info!("round {} of {}: {} items", round + 1, rounds.len(), chunk.len());
            self.scheduler.set_work_items(chunk.to_vec());
            self.scheduler.run(self.config.worker_count());

            for (id, status) in self.scheduler.take_results() {
                match status {
                    ItemStatus::Completed(bundle) => {
                        let report = TrajectoryReport::from_bundle(&id, &bundle);
                        let line = report
                            .to_json_line()
                            .with_context(|| format!("serializing trajectory {id}"))?;
                        writeln!(output, "{line}")
                            .with_context(|| format!("writing trajectory {id}"))?;
                        written += 1;
                    }
                    ItemStatus::Failed(err) => {
                        warn!("{id}: failed with code {} ({err})", err.code());
                    }
                    ItemStatus::NotRun => not_run += 1,
                }
            }
            output.flush().context("flushing trajectory output")?;
            if let Ok(mut model) = self.model.write() {
                model.apply_counts(self.scheduler.counts());
                model.written = written;
            }
        }

        Ok(BatchSummary {
            counts: self.scheduler.counts(),
            written,
            not_run,
            cancelled: self.cancellation.is_cancelled(),
        })
    }
}

fn spawn_progress_watcher(
    progress: Arc<BatchProgress>,
    total: usize,
    model: Arc<RwLock<ProgressModel>>,
    done: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reporter = ProgressReporter::new(total);
        loop {
            let finished = done.load(Ordering::SeqCst);
            let completed = progress.completed();
            if let Some(line) = reporter.observe(completed) {
                info!("{line}");
            }
            if let Ok(mut model) = model.write() {
                model.completed = completed;
            }
            if finished {
                break;
            }
            thread::sleep(PROGRESS_POLL);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::{GeneratorConfig, SyntheticSource};

    fn runner(step_count: usize, token: CancellationToken) -> (Runner, Vec<WorkItemId>) {
        let source = SyntheticSource::new(GeneratorConfig {
            flights: 5,
            seed: 3,
            outlier_rate: 0.0,
            ..Default::default()
        });
        let items = source.work_items();
        let cfg = WorkflowConfig::from_args(2, step_count, true);
        (Runner::new(cfg, Arc::new(source), None, token), items)
    }

    #[test]
    fn runner_writes_one_line_per_trajectory() {
        let (mut runner, items) = runner(2, CancellationToken::new());
        let mut output = Vec::new();
        let summary = runner.execute(items, &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let reports: Vec<TrajectoryReport> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(reports.len(), summary.written);
        assert_eq!(
            summary.counts.processed + summary.counts.degraded + summary.counts.failed,
            5
        );
        assert_eq!(summary.written, summary.counts.processed + summary.counts.degraded);
        assert_eq!(reports[0].id, "synthetic-00000");

        let model = runner.progress_model().read().unwrap().clone();
        assert_eq!(model.total, 5);
        assert_eq!(model.completed, 5);
        assert!(model.finished);
    }

    #[test]
    fn cancelled_batch_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let (mut runner, items) = runner(2, token);
        let mut output = Vec::new();
        let summary = runner.execute(items, &mut output).unwrap();
        assert!(output.is_empty());
        assert_eq!(summary.not_run, 5);
        assert!(summary.cancelled);
    }
}
