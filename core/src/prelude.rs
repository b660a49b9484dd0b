use crate::interface::state_vector::Identity;
use crate::processing::sample_table::SampleTable;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shared configuration handed to every processing stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub vertical: VerticalConfig,
    pub horizontal: HorizontalConfig,
    /// Thin both axes down to the samples needed to reproduce them by interpolation.
    pub redundancy_filtration: bool,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            vertical: VerticalConfig::default(),
            horizontal: HorizontalConfig::default(),
            redundancy_filtration: true,
        }
    }
}

/// Reliability curve parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityConfig {
    pub step_s: f64,
    pub window_s: f64,
    /// Samples per second that count as full confidence.
    pub required_density: f64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            step_s: 5.0,
            window_s: 120.0,
            required_density: 0.5,
        }
    }
}

/// Thresholds used when cutting unreliable trajectory ends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    pub crossing_ratio: f64,
    pub crossing_floor_ft: f64,
    pub low_reliability: f64,
    pub max_low_reliability_s: f64,
    pub max_reclimb_ft: f64,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            crossing_ratio: 0.3,
            crossing_floor_ft: 10_000.0,
            low_reliability: 0.2,
            max_low_reliability_s: 480.0,
            max_reclimb_ft: 1_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerticalConfig {
    pub median_half_window: usize,
    pub cruise_margin_ft: f64,
    pub cruise_lookahead_s: f64,
    pub cruise_lookahead_ratio: f64,
    pub min_segment_samples: usize,
    pub level_margin_ft: f64,
    /// Minimum samples per second inside a level segment.
    pub level_min_density: f64,
    pub segment_max_deviation_ft: f64,
    /// Vertical rate bounds in ft/min.
    pub max_vertical_rate: f64,
    pub min_vertical_rate: f64,
    pub min_climb_descent_duration_s: f64,
    pub min_climb_descent_samples: usize,
    pub coalesce_threshold_ft: f64,
    pub thinning_threshold_ft: f64,
    pub reliability: ReliabilityConfig,
    pub trim: TrimConfig,
}

impl Default for VerticalConfig {
    fn default() -> Self {
        Self {
            median_half_window: 5,
            cruise_margin_ft: 76.0,
            cruise_lookahead_s: 60.0,
            cruise_lookahead_ratio: 0.3,
            min_segment_samples: 30,
            level_margin_ft: 51.0,
            level_min_density: 0.25,
            segment_max_deviation_ft: 76.0,
            max_vertical_rate: 6_000.0,
            min_vertical_rate: -7_000.0,
            min_climb_descent_duration_s: 30.0,
            min_climb_descent_samples: 10,
            coalesce_threshold_ft: 50.0,
            thinning_threshold_ft: 26.0,
            reliability: ReliabilityConfig::default(),
            trim: TrimConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizontalConfig {
    pub max_track_change_deg: f64,
    pub max_spike_run: usize,
    pub max_groundspeed_kt: f64,
    pub max_cross_track_nm: f64,
    pub max_along_track_nm: f64,
    pub reliability: ReliabilityConfig,
}

impl Default for HorizontalConfig {
    fn default() -> Self {
        Self {
            max_track_change_deg: 30.0,
            max_spike_run: 8,
            max_groundspeed_kt: 750.0,
            max_cross_track_nm: 0.01,
            max_along_track_nm: 0.1,
            reliability: ReliabilityConfig {
                required_density: 0.25,
                ..ReliabilityConfig::default()
            },
        }
    }
}

/// Input payload for an axis stage: one aircraft's samples for that axis.
#[derive(Debug, Clone)]
pub struct StageInput<V> {
    pub identity: Identity,
    pub samples: SampleTable<V>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    Vertical,
    Horizontal,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Vertical => write!(f, "vertical"),
            Axis::Horizontal => write!(f, "horizontal"),
        }
    }
}

/// Fatal conditions; each aborts the trajectory it occurred in.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TrajectoryError {
    #[error("ingest failure: {0}")]
    Ingest(String),
    #[error("no samples in input")]
    EmptyInput,
    #[error("inconsistent time axis: {0}")]
    InconsistentTime(String),
    #[error("missing identity field {0}")]
    MissingIdentity(&'static str),
    #[error("no usable {0} samples")]
    NoUsableSamples(Axis),
    #[error("merge window could not be determined")]
    UndeterminableWindow,
    #[error("empty merge window [{start}, {end}]")]
    EmptyWindow { start: f64, end: f64 },
    #[error("stage not initialized: {0}")]
    NotInitialized(&'static str),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl TrajectoryError {
    /// Negative result code recorded by the batch scheduler.
    pub fn code(&self) -> i32 {
        match self {
            TrajectoryError::Ingest(_) => -1,
            TrajectoryError::EmptyInput => -2,
            TrajectoryError::InconsistentTime(_) => -4,
            TrajectoryError::MissingIdentity(_) => -5,
            TrajectoryError::NoUsableSamples(Axis::Vertical) => -10,
            TrajectoryError::NoUsableSamples(Axis::Horizontal) => -11,
            TrajectoryError::UndeterminableWindow => -20,
            TrajectoryError::EmptyWindow { .. } => -21,
            TrajectoryError::NotInitialized(_) => -90,
            TrajectoryError::Internal(_) => -99,
        }
    }
}

pub type StageResult<T> = Result<T, TrajectoryError>;

/// Degradations that leave the trajectory usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SoftIssue {
    IdentityMismatch { field: String, count: usize },
    UnparseableField { field: String, count: usize },
    DuplicateTimestamps { count: usize },
    UnresolvedTrackSpikes { count: usize },
    MergeIdentityMismatch,
    PhaseReindexFailed,
}

impl SoftIssue {
    /// Positive result code; the highest code of an item is reported.
    pub fn code(&self) -> i32 {
        match self {
            SoftIssue::IdentityMismatch { field, .. } if field == "icao24" => 1,
            SoftIssue::IdentityMismatch { .. } => 2,
            SoftIssue::MergeIdentityMismatch => 3,
            SoftIssue::UnparseableField { .. } => 1000,
            SoftIssue::DuplicateTimestamps { .. } => 2000,
            SoftIssue::UnresolvedTrackSpikes { .. } => 3000,
            SoftIssue::PhaseReindexFailed => 4000,
        }
    }
}

/// Trait describing the per-trajectory processing stages.
pub trait ProcessingStage {
    type Input;
    type Output;

    fn initialize(&mut self, config: &StageConfig) -> StageResult<()>;
    fn execute(&mut self, input: Self::Input) -> StageResult<Self::Output>;
    fn cleanup(&mut self);
}
