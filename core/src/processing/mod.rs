pub mod horizontal;
pub mod merge;
pub mod phase;
pub mod pipeline;
pub mod quality;
pub mod reliability;
pub mod sample_table;
pub mod vertical;

#[cfg(test)]
pub mod fixtures;

pub use horizontal::{HorizontalPath, HorizontalStage};
pub use merge::{MergeStage, MergedSample, MergedTrajectory};
pub use phase::{FlightPhase, PhaseKind};
pub use pipeline::{TrajectoryBundle, TrajectoryPipeline};
pub use quality::TrajectoryMetrics;
pub use reliability::ReliabilityCurve;
pub use sample_table::{SampleFlag, SampleTable};
pub use vertical::{VerticalProfile, VerticalStage};
