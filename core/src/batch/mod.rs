//! Parallel execution of the trajectory pipeline over many work items.

pub mod progress;
pub mod scheduler;

pub use progress::{BatchProgress, CancellationToken, ProgressReporter, ProgressSnapshot};
pub use scheduler::{BatchScheduler, ItemStatus, SampleSource, WorkItemId};
