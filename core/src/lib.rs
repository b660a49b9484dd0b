//! Trajectory reconstruction core for ADS-B state-vector logs.
//!
//! The modules split the work the same way the batch tool runs it: a vertical
//! and a horizontal pass over one aircraft's samples, a merge that aligns both
//! axes on a common time base, and a scheduler that runs many aircraft on a
//! fixed worker pool.

pub mod batch;
pub mod interface;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use prelude::{ProcessingStage, StageConfig, StageInput, StageResult, TrajectoryError};
