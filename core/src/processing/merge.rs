use crate::interface::state_vector::Identity;
use crate::math::geodesy::GeoPosition;
use crate::prelude::{
    ProcessingStage, ReliabilityConfig, SoftIssue, StageConfig, StageResult, TrajectoryError,
};
use crate::processing::horizontal::HorizontalPath;
use crate::processing::phase::FlightPhase;
use crate::processing::reliability::ReliabilityCurve;
use crate::processing::vertical::VerticalProfile;
use crate::telemetry::log::LogManager;

/// Coordinate written when no position is available for a merged timestamp.
pub const MISSING_COORDINATE: f64 = f64::MAX;

/// One row of the merged trajectory. Coordinates are in degrees, altitude in feet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergedSample {
    pub time: f64,
    pub lat: f64,
    pub lon: f64,
    pub baro_altitude: f64,
}

impl MergedSample {
    /// `None` for rows carrying the missing-coordinate placeholder.
    pub fn position(&self) -> Option<GeoPosition> {
        if self.lat == MISSING_COORDINATE || self.lon == MISSING_COORDINATE {
            return None;
        }
        Some(GeoPosition::from_degrees(self.lat, self.lon))
    }
}

/// Both axis results of one aircraft, ready to be merged.
pub struct AxisPair {
    pub vertical: VerticalProfile,
    pub horizontal: HorizontalPath,
}

#[derive(Debug, Clone)]
pub struct MergedTrajectory {
    pub identity: Identity,
    pub samples: Vec<MergedSample>,
    /// Phases indexed into `samples`.
    pub phases: Vec<FlightPhase>,
    pub reliability: ReliabilityCurve,
    pub vertical: VerticalProfile,
    pub horizontal: HorizontalPath,
    pub issues: Vec<SoftIssue>,
}

impl MergedTrajectory {
    pub fn start_time(&self) -> Option<f64> {
        self.samples.first().map(|s| s.time)
    }

    pub fn end_time(&self) -> Option<f64> {
        self.samples.last().map(|s| s.time)
    }
}

/// Time-aligns a vertical profile with a horizontal path.
pub struct MergeStage {
    config: Option<ReliabilityConfig>,
    logger: LogManager,
}

impl MergeStage {
    pub fn new() -> Self {
        Self {
            config: None,
            logger: LogManager::new(),
        }
    }
}

impl Default for MergeStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for MergeStage {
    type Input = AxisPair;
    type Output = MergedTrajectory;

    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        self.config = Some(config.vertical.reliability);
        Ok(())
    }

    fn execute(&mut self, input: Self::Input) -> StageResult<Self::Output> {
        let config = self
            .config
            .ok_or(TrajectoryError::NotInitialized("merge"))?;
        let AxisPair {
            vertical,
            horizontal,
        } = input;

        let mut issues = Vec::new();
        let identity = if vertical.identity() == horizontal.identity() {
            vertical.identity().clone()
        } else {
            issues.push(SoftIssue::MergeIdentityMismatch);
            Identity::sentinel()
        };
        self.logger.bind(&identity);

        let (start, end) = merge_window(&vertical, &horizontal)?;
        let times = merged_times(&vertical, &horizontal, start, end);
        let samples: Vec<MergedSample> = times
            .iter()
            .map(|&t| fill_row(t, &vertical, &horizontal))
            .collect();
        let placeholders = samples.iter().filter(|s| s.position().is_none()).count();
        if placeholders > 0 {
            self.logger.warn(&format!(
                "{placeholders} merged samples without horizontal position"
            ));
        }

        let phases = match reindex_phases(&vertical, &times, start, end) {
            Some(phases) => phases,
            None => {
                issues.push(SoftIssue::PhaseReindexFailed);
                Vec::new()
            }
        };

        let reliability = match (times.first(), times.last()) {
            (Some(&first), Some(&last)) => ReliabilityCurve::combine_min(
                vertical.reliability(),
                horizontal.reliability(),
                first,
                last,
                config.step_s,
            ),
            _ => ReliabilityCurve::default(),
        };

        self.logger.record(&format!(
            "merged {} samples over [{start:.0}, {end:.0}], {} phases",
            samples.len(),
            phases.len()
        ));
        Ok(MergedTrajectory {
            identity,
            samples,
            phases,
            reliability,
            vertical,
            horizontal,
            issues,
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

/// Overlap of the two active windows.
pub fn merge_window(
    vertical: &VerticalProfile,
    horizontal: &HorizontalPath,
) -> StageResult<(f64, f64)> {
    let bounds = (
        vertical.first_active_time(),
        horizontal.first_active_time(),
        vertical.last_active_time(),
        horizontal.last_active_time(),
    );
    let (Some(v_first), Some(h_first), Some(v_last), Some(h_last)) = bounds else {
        return Err(TrajectoryError::UndeterminableWindow);
    };
    let start = v_first.max(h_first);
    let end = v_last.min(h_last);
    if start > end {
        return Err(TrajectoryError::EmptyWindow { start, end });
    }
    Ok((start, end))
}

/// Sorted union of the active sample times of both axes inside `[start, end]`.
fn merged_times(
    vertical: &VerticalProfile,
    horizontal: &HorizontalPath,
    start: f64,
    end: f64,
) -> Vec<f64> {
    let mut times: Vec<f64> = vertical
        .active_indices()
        .iter()
        .map(|&i| vertical.table().time(i))
        .chain(
            horizontal
                .active_indices()
                .iter()
                .map(|&i| horizontal.table().time(i)),
        )
        .filter(|&t| t >= start && t <= end)
        .collect();
    times.sort_by(f64::total_cmp);
    times.dedup();
    times
}

/// Interpolates both axes at `time`; gaps are filled with the placeholder.
pub fn fill_row(
    time: f64,
    vertical: &VerticalProfile,
    horizontal: &HorizontalPath,
) -> MergedSample {
    let (lat, lon) = horizontal
        .position_at(time)
        .map(GeoPosition::to_degrees)
        .unwrap_or((MISSING_COORDINATE, MISSING_COORDINATE));
    MergedSample {
        time,
        lat,
        lon,
        baro_altitude: vertical.altitude_at(time).unwrap_or(MISSING_COORDINATE),
    }
}

/// Moves phase starts from vertical table indices to merged sample indices.
/// `None` when a start inside the window has no merged timestamp.
fn reindex_phases(
    vertical: &VerticalProfile,
    times: &[f64],
    start: f64,
    end: f64,
) -> Option<Vec<FlightPhase>> {
    let table = vertical.table();
    let phases = vertical.phases();
    let mut reindexed = Vec::with_capacity(phases.len());
    for (k, phase) in phases.iter().enumerate() {
        let phase_start = table.time(phase.start_index);
        if phase_start >= end {
            continue;
        }
        if phase_start < start {
            let extends_into_window = phases
                .get(k + 1)
                .map_or(true, |next| table.time(next.start_index) > start);
            if extends_into_window {
                reindexed.push(FlightPhase::new(phase.kind, 0));
            }
            continue;
        }
        let index = times
            .binary_search_by(|t| t.total_cmp(&phase_start))
            .ok()?;
        reindexed.push(FlightPhase::new(phase.kind, index));
    }
    Some(reindexed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::geodesy::GeoPosition;
    use crate::prelude::StageInput;
    use crate::processing::horizontal::{HorizontalStage, PositionSample};
    use crate::processing::phase::PhaseKind;
    use crate::processing::sample_table::SampleTable;
    use crate::processing::vertical::{AltitudeSample, VerticalStage};

    fn identity() -> Identity {
        Identity::new("40621d", "BAW256")
    }

    /// Flat cruise at 35,000 ft sampled every 2 s over `[from, to]`.
    fn vertical(from: f64, to: f64, identity: Identity) -> VerticalProfile {
        let count = ((to - from) / 2.0) as usize + 1;
        let samples = SampleTable::from_records((0..count).map(|i| {
            let time = from + i as f64 * 2.0;
            (
                time,
                AltitudeSample {
                    altitude: 35_000.0 * 0.3048,
                    last_contact: time,
                },
            )
        }));
        let mut stage = VerticalStage::new();
        stage.initialize(&StageConfig::default()).unwrap();
        stage.execute(StageInput { identity, samples }).unwrap()
    }

    /// Eastbound along the equator at 360 kt over `[from, to]`.
    fn horizontal(from: f64, to: f64, identity: Identity) -> HorizontalPath {
        let count = ((to - from) / 5.0) as usize + 1;
        let samples = SampleTable::from_records((0..count).map(|i| {
            let time = from + i as f64 * 5.0;
            (
                time,
                PositionSample {
                    position: GeoPosition::from_degrees(0.0, time / 600.0),
                    last_position_update: time,
                },
            )
        }));
        let mut stage = HorizontalStage::new();
        stage.initialize(&StageConfig::default()).unwrap();
        stage.execute(StageInput { identity, samples }).unwrap()
    }

    fn merge(
        vertical: VerticalProfile,
        horizontal: HorizontalPath,
    ) -> StageResult<MergedTrajectory> {
        let mut stage = MergeStage::new();
        stage.initialize(&StageConfig::default())?;
        let result = stage.execute(AxisPair {
            vertical,
            horizontal,
        });
        stage.cleanup();
        result
    }

    #[test]
    fn window_is_the_overlap() {
        let v = vertical(0.0, 100.0, identity());
        let h = horizontal(20.0, 120.0, identity());
        assert_eq!(merge_window(&v, &h).unwrap(), (20.0, 100.0));
        let merged = merge(v, h).unwrap();
        assert_eq!(merged.start_time(), Some(20.0));
        assert_eq!(merged.end_time(), Some(100.0));
        assert!(merged.issues.is_empty());
    }

    #[test]
    fn first_phase_is_clamped_into_window() {
        let merged = merge(
            vertical(0.0, 100.0, identity()),
            horizontal(20.0, 120.0, identity()),
        )
        .unwrap();
        assert_eq!(merged.phases, vec![FlightPhase::new(PhaseKind::Cruise, 0)]);
    }

    #[test]
    fn combined_reliability_is_pointwise_minimum() {
        let merged = merge(
            vertical(0.0, 600.0, identity()),
            horizontal(100.0, 700.0, identity()),
        )
        .unwrap();
        for point in merged.reliability.points() {
            let expected = merged
                .vertical
                .reliability_at(point.time)
                .min(merged.horizontal.reliability_at(point.time));
            assert_eq!(point.value, expected);
            assert!((0.0..=1.0).contains(&point.value));
        }
    }

    #[test]
    fn disjoint_windows_are_fatal() {
        let err = merge(
            vertical(0.0, 200.0, identity()),
            horizontal(400.0, 600.0, identity()),
        )
        .unwrap_err();
        assert_eq!(
            err,
            TrajectoryError::EmptyWindow {
                start: 400.0,
                end: 200.0
            }
        );
    }

    #[test]
    fn identity_mismatch_uses_sentinel() {
        let merged = merge(
            vertical(0.0, 300.0, identity()),
            horizontal(0.0, 300.0, Identity::new("40621d", "BAW257")),
        )
        .unwrap();
        assert_eq!(merged.identity, Identity::sentinel());
        assert_eq!(merged.issues, vec![SoftIssue::MergeIdentityMismatch]);
    }

    #[test]
    fn missing_position_yields_placeholder_row() {
        let v = vertical(0.0, 300.0, identity());
        let h = horizontal(20.0, 320.0, identity());
        let row = fill_row(10.0, &v, &h);
        assert_eq!(row.lat, MISSING_COORDINATE);
        assert_eq!(row.lon, MISSING_COORDINATE);
        assert_eq!(row.position(), None);
        assert!((row.baro_altitude - 35_000.0).abs() < 1e-6);
    }
}
