use crate::interface::state_vector::Identity;
use crate::math::geodesy::{
    great_circle_distance_estimate, nearest_point_on_great_circle, track_angle_change,
    ArcInterpolator, GeoPosition,
};
use crate::prelude::{
    Axis, HorizontalConfig, ProcessingStage, StageConfig, StageInput, StageResult,
    TrajectoryError,
};
use crate::processing::reliability::ReliabilityCurve;
use crate::processing::sample_table::SampleTable;
use crate::telemetry::log::LogManager;
use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub position: GeoPosition,
    pub last_position_update: f64,
}

/// Filtered ground track of one aircraft.
#[derive(Debug, Clone)]
pub struct HorizontalPath {
    identity: Identity,
    raw: SampleTable<PositionSample>,
    table: SampleTable<PositionSample>,
    reliability: ReliabilityCurve,
    active: Vec<usize>,
    unresolved_spikes: usize,
}

impl HorizontalPath {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn raw(&self) -> &SampleTable<PositionSample> {
        &self.raw
    }

    pub fn table(&self) -> &SampleTable<PositionSample> {
        &self.table
    }

    pub fn reliability(&self) -> &ReliabilityCurve {
        &self.reliability
    }

    pub fn active_indices(&self) -> &[usize] {
        &self.active
    }

    /// Track-angle spikes the filter could not remove.
    pub fn unresolved_spikes(&self) -> usize {
        self.unresolved_spikes
    }

    pub fn first_active_time(&self) -> Option<f64> {
        self.active.first().map(|&i| self.table.time(i))
    }

    pub fn last_active_time(&self) -> Option<f64> {
        self.active.last().map(|&i| self.table.time(i))
    }

    /// Great-circle interpolation between the bounding active samples.
    pub fn position_at(&self, time: f64) -> Option<GeoPosition> {
        let first = self.first_active_time()?;
        let last = self.last_active_time()?;
        if time < first || time > last {
            return None;
        }
        let upper = self.active.partition_point(|&i| self.table.time(i) < time);
        let hi = self.active[upper];
        if upper == 0 || self.table.time(hi) == time {
            return Some(self.table.value(hi).position);
        }
        let lo = self.active[upper - 1];
        let (t0, t1) = (self.table.time(lo), self.table.time(hi));
        let arc =
            ArcInterpolator::new(self.table.value(lo).position, self.table.value(hi).position);
        Some(arc.at((time - t0) / (t1 - t0)))
    }

    pub fn reliability_at(&self, time: f64) -> f64 {
        self.reliability.value_at(time)
    }
}

/// Horizontal trajectory stage: duplicate, spike and groundspeed filters plus
/// optional great-circle thinning.
pub struct HorizontalStage {
    config: Option<HorizontalConfig>,
    redundancy_filtration: bool,
    logger: LogManager,
}

impl HorizontalStage {
    pub fn new() -> Self {
        Self {
            config: None,
            redundancy_filtration: true,
            logger: LogManager::new(),
        }
    }
}

impl Default for HorizontalStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for HorizontalStage {
    type Input = StageInput<PositionSample>;
    type Output = HorizontalPath;

    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        self.config = Some(config.horizontal.clone());
        self.redundancy_filtration = config.redundancy_filtration;
        Ok(())
    }

    fn execute(&mut self, input: Self::Input) -> StageResult<Self::Output> {
        let config = self
            .config
            .as_ref()
            .ok_or(TrajectoryError::NotInitialized("horizontal"))?;
        self.logger.bind(&input.identity);
        if input.samples.is_empty() {
            return Err(TrajectoryError::NoUsableSamples(Axis::Horizontal));
        }

        let raw = input.samples;
        let mut table = raw.clone();
        self.logger
            .stage("duplicate updates", filter_duplicate_updates(&mut table));
        let spikes = filter_track_spikes(&mut table, config);
        self.logger.stage("track spikes", spikes.removed);
        if spikes.unresolved > 0 {
            self.logger
                .warn(&format!("{} unresolved track spikes", spikes.unresolved));
        }
        self.logger.stage(
            "groundspeed",
            filter_unrealistic_groundspeed(&mut table, config),
        );

        let reliability = ReliabilityCurve::from_table(&table, &config.reliability);
        if self.redundancy_filtration {
            self.logger
                .stage("redundant positions", filter_redundant_positions(&mut table, config));
        }

        let active: Vec<usize> = table.active_indices().collect();
        self.logger.record(&format!(
            "horizontal path: {} of {} samples active",
            active.len(),
            table.len()
        ));
        Ok(HorizontalPath {
            identity: input.identity,
            raw,
            table,
            reliability,
            active,
            unresolved_spikes: spikes.unresolved,
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

pub fn filter_duplicate_updates(table: &mut SampleTable<PositionSample>) -> usize {
    let duplicates: Vec<usize> = (1..table.len())
        .filter(|&i| {
            table.value(i).last_position_update == table.value(i - 1).last_position_update
        })
        .collect();
    duplicates
        .into_iter()
        .filter(|&i| table.invalidate(i))
        .count()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpikeReport {
    pub removed: usize,
    pub unresolved: usize,
}

fn position(table: &SampleTable<PositionSample>, index: usize) -> GeoPosition {
    table.value(index).position
}

/// Absolute bearing change at `valid[at]` with the given neighbours.
fn change_between(
    table: &SampleTable<PositionSample>,
    before: usize,
    at: usize,
    after: usize,
) -> f64 {
    track_angle_change(position(table, before), position(table, at), position(table, after)).abs()
}

/// Removes the shortest run of samples around each sharp bearing change that
/// restores smooth bearings on both sides.
pub fn filter_track_spikes(
    table: &mut SampleTable<PositionSample>,
    config: &HorizontalConfig,
) -> SpikeReport {
    let limit = config.max_track_change_deg.to_radians();
    let mut valid: Vec<usize> = table.valid_indices().collect();
    let mut report = SpikeReport::default();
    let mut i = 1;

    while i + 1 < valid.len() {
        if change_between(table, valid[i - 1], valid[i], valid[i + 1]) <= limit {
            i += 1;
            continue;
        }
        match find_spike_run(table, &valid, i, config.max_spike_run, limit) {
            Some(run) => {
                let start = *run.start();
                for &index in &valid[run.clone()] {
                    report.removed += usize::from(table.invalidate(index));
                }
                valid.drain(run);
                i = start.saturating_sub(1).max(1);
            }
            None => {
                report.unresolved += 1;
                i += 1;
            }
        }
    }
    report
}

fn find_spike_run(
    table: &SampleTable<PositionSample>,
    valid: &[usize],
    i: usize,
    max_run: usize,
    limit: f64,
) -> Option<RangeInclusive<usize>> {
    let resolves = |start: usize, end: usize| {
        start >= 2
            && end + 2 < valid.len()
            && change_between(table, valid[start - 2], valid[start - 1], valid[end + 1]) < limit
            && change_between(table, valid[start - 1], valid[end + 1], valid[end + 2]) < limit
    };
    for n in 1..=max_run {
        let mut runs = vec![(i, i + n - 1), (i + 1, i + n)];
        if i + 1 >= n {
            runs.push((i + 1 - n, i));
        }
        if let Some((start, end)) = runs.into_iter().find(|&(s, e)| resolves(s, e)) {
            return Some(start..=end);
        }
    }
    None
}

/// Groundspeed in knots between two samples, by the fast distance estimate.
fn groundspeed(table: &SampleTable<PositionSample>, from: usize, to: usize) -> f64 {
    let (a, b) = (table.value(from), table.value(to));
    let hours = (b.last_position_update - a.last_position_update) / 3600.0;
    great_circle_distance_estimate(a.position, b.position) / hours
}

/// Removes the fewest samples that bring every adjacent pair under the
/// configured groundspeed.
pub fn filter_unrealistic_groundspeed(
    table: &mut SampleTable<PositionSample>,
    config: &HorizontalConfig,
) -> usize {
    let realistic = |table: &SampleTable<PositionSample>, from: usize, to: usize| {
        let speed = groundspeed(table, from, to);
        speed.is_finite() && speed >= 0.0 && speed <= config.max_groundspeed_kt
    };
    let mut valid: Vec<usize> = table.valid_indices().collect();
    let mut removed = 0;
    let mut i = 0;

    while i + 1 < valid.len() {
        if realistic(table, valid[i], valid[i + 1]) {
            i += 1;
            continue;
        }
        let len = valid.len();
        let resolution = (1..len).find_map(|rc| {
            let forward = (i + rc < len
                && (i + rc + 1 == len || realistic(table, valid[i], valid[i + rc + 1])))
            .then(|| i + 1..=i + rc);
            let backward = (rc <= i + 1
                && (rc == i + 1 || realistic(table, valid[i - rc], valid[i + 1])))
            .then(|| i + 1 - rc..=i);
            forward.or(backward)
        });
        match resolution {
            Some(run) => {
                let start = *run.start();
                for &index in &valid[run.clone()] {
                    removed += usize::from(table.invalidate(index));
                }
                valid.drain(run);
                i = start.saturating_sub(1);
            }
            None => i += 1,
        }
    }
    removed
}

/// Keeps the minimal anchor set so that every other valid sample lies within
/// the cross-track and along-track tolerances of the arc between its anchors.
pub fn filter_redundant_positions(
    table: &mut SampleTable<PositionSample>,
    config: &HorizontalConfig,
) -> usize {
    let valid: Vec<usize> = table.valid_indices().collect();
    if valid.len() <= 2 {
        return 0;
    }
    let mut anchors = vec![false; valid.len()];
    anchors[0] = true;
    anchors[valid.len() - 1] = true;

    let mut pending = vec![(0, valid.len() - 1)];
    while let Some((lo, hi)) = pending.pop() {
        let (a, b) = (valid[lo], valid[hi]);
        let arc = ArcInterpolator::new(position(table, a), position(table, b));
        let (t0, t1) = (table.time(a), table.time(b));
        let worst = (lo + 1..hi)
            .map(|m| {
                let p = position(table, valid[m]);
                let expected = arc.at((table.time(valid[m]) - t0) / (t1 - t0));
                let nearest =
                    nearest_point_on_great_circle(p, position(table, a), position(table, b));
                let cross_track = great_circle_distance_estimate(p, nearest);
                let along_track = great_circle_distance_estimate(expected, nearest);
                let excess = (cross_track / config.max_cross_track_nm)
                    .max(along_track / config.max_along_track_nm);
                (m, excess)
            })
            .max_by(|x, y| x.1.total_cmp(&y.1));
        if let Some((m, excess)) = worst {
            if excess > 1.0 {
                anchors[m] = true;
                pending.push((lo, m));
                pending.push((m, hi));
            }
        }
    }

    valid
        .iter()
        .zip(anchors)
        .filter(|&(&index, anchor)| {
            if anchor {
                table.mark_required(index)
            } else {
                table.mark_redundant(index)
            }
        })
        .count()
}
