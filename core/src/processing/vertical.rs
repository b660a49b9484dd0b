use crate::interface::state_vector::Identity;
use crate::math::geodesy::FEET_PER_METER;
use crate::math::stats::StatsHelper;
use crate::prelude::{
    Axis, ProcessingStage, StageConfig, StageInput, StageResult, TrajectoryError, VerticalConfig,
};
use crate::processing::phase::{
    clear_undefined, phase_end, repair_undefined, sweep_phases, FlightPhase, PhaseCandidates,
    PhaseKind, RateBounds, Segment,
};
use crate::processing::reliability::{ReliabilityCurve, ReliabilityPoint};
use crate::processing::sample_table::SampleTable;
use crate::telemetry::log::LogManager;

/// Altitude channel value; feet once the stage has converted it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AltitudeSample {
    pub altitude: f64,
    pub last_contact: f64,
}

/// Filtered altitude profile of one aircraft.
#[derive(Debug, Clone)]
pub struct VerticalProfile {
    identity: Identity,
    raw: SampleTable<AltitudeSample>,
    table: SampleTable<AltitudeSample>,
    phases: Vec<FlightPhase>,
    reliability: ReliabilityCurve,
    active: Vec<usize>,
}

impl VerticalProfile {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Samples as handed in, altitude in metres.
    pub fn raw(&self) -> &SampleTable<AltitudeSample> {
        &self.raw
    }

    pub fn table(&self) -> &SampleTable<AltitudeSample> {
        &self.table
    }

    pub fn phases(&self) -> &[FlightPhase] {
        &self.phases
    }

    pub fn reliability(&self) -> &ReliabilityCurve {
        &self.reliability
    }

    pub fn active_indices(&self) -> &[usize] {
        &self.active
    }

    pub fn first_active_time(&self) -> Option<f64> {
        self.active.first().map(|&i| self.table.time(i))
    }

    pub fn last_active_time(&self) -> Option<f64> {
        self.active.last().map(|&i| self.table.time(i))
    }

    /// Altitude in feet, linear between the bounding active samples.
    pub fn altitude_at(&self, time: f64) -> Option<f64> {
        let first = self.first_active_time()?;
        let last = self.last_active_time()?;
        if time < first || time > last {
            return None;
        }
        let upper = self.active.partition_point(|&i| self.table.time(i) < time);
        let hi = self.active[upper];
        if upper == 0 || self.table.time(hi) == time {
            return Some(self.table.value(hi).altitude);
        }
        let lo = self.active[upper - 1];
        let (t0, t1) = (self.table.time(lo), self.table.time(hi));
        let (a0, a1) = (self.table.value(lo).altitude, self.table.value(hi).altitude);
        Some(a0 + (a1 - a0) * (time - t0) / (t1 - t0))
    }

    pub fn reliability_at(&self, time: f64) -> f64 {
        self.reliability.value_at(time)
    }
}

/// Vertical trajectory stage: filtering, phase segmentation, trimming and thinning.
pub struct VerticalStage {
    config: Option<VerticalConfig>,
    redundancy_filtration: bool,
    logger: LogManager,
}

impl VerticalStage {
    pub fn new() -> Self {
        Self {
            config: None,
            redundancy_filtration: true,
            logger: LogManager::new(),
        }
    }
}

impl Default for VerticalStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for VerticalStage {
    type Input = StageInput<AltitudeSample>;
    type Output = VerticalProfile;

    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        self.config = Some(config.vertical.clone());
        self.redundancy_filtration = config.redundancy_filtration;
        Ok(())
    }

    fn execute(&mut self, input: Self::Input) -> StageResult<Self::Output> {
        let config = self
            .config
            .as_ref()
            .ok_or(TrajectoryError::NotInitialized("vertical"))?;
        self.logger.bind(&input.identity);
        if input.samples.is_empty() {
            return Err(TrajectoryError::NoUsableSamples(Axis::Vertical));
        }

        let raw = input.samples;
        let mut table = raw.clone();
        convert_to_feet(&mut table);
        self.logger
            .stage("duplicate contacts", filter_duplicate_contacts(&mut table));
        smooth_moving_median(&mut table, config.median_half_window);

        let candidates = detect_segments(&mut table, config, &self.logger);
        let mut phases = sweep_phases(&table, candidates);
        let bounds = RateBounds {
            min: config.min_vertical_rate,
            max: config.max_vertical_rate,
        };
        self.logger
            .stage("undefined repair", repair_undefined(&mut table, &mut phases, bounds));
        self.logger
            .stage("undefined clearing", clear_undefined(&mut table, &mut phases));
        coalesce_broken_levels(&table, &mut phases, config.coalesce_threshold_ft);

        let mut reliability = ReliabilityCurve::from_table(&table, &config.reliability);
        if let Some(cut) = trim_end(&mut table, &mut phases, &reliability, config) {
            self.logger.record(&format!("trajectory end cut at {cut:.0}"));
            reliability = ReliabilityCurve::from_table(&table, &config.reliability);
        }
        if let Some(cut) = trim_beginning(&mut table, &mut phases, &reliability, config) {
            self.logger
                .record(&format!("trajectory beginning cut at {cut:.0}"));
            reliability = ReliabilityCurve::from_table(&table, &config.reliability);
        }

        if self.redundancy_filtration {
            thin_phases(&mut table, &phases, config.thinning_threshold_ft);
        }
        snap_phase_starts(&table, &mut phases);

        let active: Vec<usize> = table.active_indices().collect();
        self.logger.record(&format!(
            "vertical profile: {} of {} samples active, {} phases",
            active.len(),
            table.len(),
            phases.len()
        ));
        Ok(VerticalProfile {
            identity: input.identity,
            raw,
            table,
            phases,
            reliability,
            active,
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

/// Cruise, level, climb and descent detection with their dedicated filters.
fn detect_segments(
    table: &mut SampleTable<AltitudeSample>,
    config: &VerticalConfig,
    logger: &LogManager,
) -> PhaseCandidates {
    let mut cruise = detect_cruise_segments(table, config);
    let mut level = detect_level_segments(table, config);
    let deviating = filter_segment_deviation(table, &mut cruise, config, cruise_reference)
        + filter_segment_deviation(table, &mut level, config, level_reference);
    logger.stage("segment deviation", deviating);
    absorb_level_into_cruise(&mut cruise, &mut level);

    let anchors: Vec<Segment> = cruise.iter().chain(level.iter()).copied().collect();
    let (mut climb, mut descent) = infer_climb_descent(table, anchors);
    logger.stage("climb pruning", prune_climbs(table, &mut climb, config));
    logger.stage("descent pruning", prune_descents(table, &mut descent, config));

    PhaseCandidates {
        cruise,
        level,
        climb,
        descent,
    }
}

pub fn convert_to_feet(table: &mut SampleTable<AltitudeSample>) {
    for i in 0..table.len() {
        table.value_mut(i).altitude *= FEET_PER_METER;
    }
}

pub fn filter_duplicate_contacts(table: &mut SampleTable<AltitudeSample>) -> usize {
    (1..table.len())
        .filter(|&i| table.value(i).last_contact == table.value(i - 1).last_contact)
        .collect::<Vec<_>>()
        .into_iter()
        .filter(|&i| table.invalidate(i))
        .count()
}

/// Median over each valid sample and up to `half_window` valid neighbours on
/// each side, gathered independently; windows at the edges are one-sided.
pub fn smooth_moving_median(table: &mut SampleTable<AltitudeSample>, half_window: usize) {
    let valid: Vec<usize> = table.valid_indices().collect();
    let original: Vec<f64> = valid.iter().map(|&i| table.value(i).altitude).collect();
    for (pos, &index) in valid.iter().enumerate() {
        let left = pos.saturating_sub(half_window);
        let right = (pos + half_window).min(original.len() - 1);
        let mut window = original[left..=right].to_vec();
        if let Some(median) = StatsHelper::median(&mut window) {
            table.value_mut(index).altitude = median;
        }
    }
}

/// Nearest 1000 ft level; an exact half rounds up.
pub fn closest_cruising_level(altitude: f64) -> f64 {
    ((altitude + 500.0) / 1000.0).floor() * 1000.0
}

struct CruiseRun {
    start: usize,
    last: usize,
    count: usize,
    level: f64,
}

pub fn detect_cruise_segments(
    table: &SampleTable<AltitudeSample>,
    config: &VerticalConfig,
) -> Vec<Segment> {
    let valid: Vec<usize> = table.valid_indices().collect();
    let in_margin =
        |i: usize, level: f64| (table.value(i).altitude - level).abs() <= config.cruise_margin_ft;
    let mut segments = Vec::new();
    let mut run: Option<CruiseRun> = None;
    let mut pos = 0;

    let close = |run: CruiseRun, segments: &mut Vec<Segment>| {
        if run.count >= config.min_segment_samples && run.start < run.last {
            segments.push(Segment::new(run.start, run.last));
        }
    };

    while pos < valid.len() {
        let index = valid[pos];
        match run.take() {
            None => {
                let level = closest_cruising_level(table.value(index).altitude);
                if in_margin(index, level) {
                    run = Some(CruiseRun {
                        start: index,
                        last: index,
                        count: 1,
                        level,
                    });
                }
                pos += 1;
            }
            Some(mut current) if in_margin(index, current.level) => {
                current.last = index;
                current.count += 1;
                run = Some(current);
                pos += 1;
            }
            Some(mut current) => match bridge_excursion(table, &valid, pos, current.level, config)
            {
                Some(resume) => {
                    current.count += valid[pos..=resume]
                        .iter()
                        .filter(|&&i| in_margin(i, current.level))
                        .count();
                    current.last = valid[resume];
                    run = Some(current);
                    pos = resume + 1;
                }
                None => close(current, &mut segments),
            },
        }
    }
    if let Some(current) = run {
        close(current, &mut segments);
    }
    segments
}

/// Looks past an excursion starting at `valid[pos]`. Returns the position
/// where enough in-margin time has accumulated within the lookahead window.
fn bridge_excursion(
    table: &SampleTable<AltitudeSample>,
    valid: &[usize],
    pos: usize,
    level: f64,
    config: &VerticalConfig,
) -> Option<usize> {
    let origin = table.time(valid[pos.checked_sub(1)?]);
    let required = config.cruise_lookahead_s * config.cruise_lookahead_ratio;
    let in_margin = |i: usize| (table.value(i).altitude - level).abs() <= config.cruise_margin_ft;
    let mut accumulated = 0.0;
    for j in pos + 1..valid.len() {
        if table.time(valid[j]) - origin > config.cruise_lookahead_s {
            break;
        }
        if in_margin(valid[j - 1]) && in_margin(valid[j]) {
            accumulated += table.time(valid[j]) - table.time(valid[j - 1]);
        }
        if accumulated >= required {
            return Some(j);
        }
    }
    None
}

pub fn detect_level_segments(
    table: &SampleTable<AltitudeSample>,
    config: &VerticalConfig,
) -> Vec<Segment> {
    let valid: Vec<usize> = table.valid_indices().collect();
    let mut segments = Vec::new();
    let accept = |from: usize, to: usize, segments: &mut Vec<Segment>| {
        let count = to - from + 1;
        let duration = table.time(valid[to]) - table.time(valid[from]);
        if count >= config.min_segment_samples
            && duration > 0.0
            && count as f64 / duration >= config.level_min_density
        {
            segments.push(Segment::new(valid[from], valid[to]));
        }
    };

    let mut start = 0;
    let (mut low, mut high) = (f64::INFINITY, f64::NEG_INFINITY);
    for (pos, &index) in valid.iter().enumerate() {
        let altitude = table.value(index).altitude;
        if high.max(altitude) - low.min(altitude) > config.level_margin_ft {
            accept(start, pos - 1, &mut segments);
            start = pos;
            low = altitude;
            high = altitude;
        } else {
            low = low.min(altitude);
            high = high.max(altitude);
        }
    }
    if !valid.is_empty() {
        accept(start, valid.len() - 1, &mut segments);
    }
    segments
}

fn valid_altitudes(table: &SampleTable<AltitudeSample>, from: usize, to: usize) -> Vec<f64> {
    (from..to.min(table.len()))
        .filter(|&i| table.is_valid(i))
        .map(|i| table.value(i).altitude)
        .collect()
}

fn mid_range(altitudes: &[f64]) -> Option<f64> {
    let low = altitudes.iter().copied().reduce(f64::min)?;
    let high = altitudes.iter().copied().reduce(f64::max)?;
    Some(((low + high) / 2.0 + 0.5).floor())
}

fn cruise_reference(table: &SampleTable<AltitudeSample>, segment: Segment) -> Option<f64> {
    let first = table.next_valid(segment.start).filter(|&i| i <= segment.end)?;
    Some(closest_cruising_level(table.value(first).altitude))
}

fn level_reference(table: &SampleTable<AltitudeSample>, segment: Segment) -> Option<f64> {
    mid_range(&valid_altitudes(table, segment.start, segment.end + 1))
}

/// Invalidates samples too far from their segment's reference altitude and
/// shrinks each segment to its remaining valid bounds.
pub fn filter_segment_deviation<F>(
    table: &mut SampleTable<AltitudeSample>,
    segments: &mut Vec<Segment>,
    config: &VerticalConfig,
    reference: F,
) -> usize
where
    F: Fn(&SampleTable<AltitudeSample>, Segment) -> Option<f64>,
{
    let mut invalidated = 0;
    for segment in segments.iter_mut() {
        let Some(reference) = reference(table, *segment) else {
            continue;
        };
        for i in segment.start..=segment.end {
            if table.is_valid(i)
                && (table.value(i).altitude - reference).abs() > config.segment_max_deviation_ft
                && table.invalidate(i)
            {
                invalidated += 1;
            }
        }
        let start = table.next_valid(segment.start).unwrap_or(segment.end);
        let end = table.prev_valid(segment.end).unwrap_or(segment.start);
        *segment = Segment::new(start, end);
    }
    segments.retain(|s| s.start < s.end);
    invalidated
}

fn overlaps(a: &Segment, b: &Segment) -> bool {
    a.start <= b.end && b.start <= a.end
}

/// Level segments overlapping a cruise segment extend it and disappear;
/// cruise segments starting inside a remaining level segment are dropped.
pub fn absorb_level_into_cruise(cruise: &mut Vec<Segment>, level: &mut Vec<Segment>) {
    level.retain(|l| match cruise.iter_mut().find(|c| overlaps(c, l)) {
        Some(c) => {
            c.start = c.start.min(l.start);
            c.end = c.end.max(l.end);
            false
        }
        None => true,
    });
    cruise.retain(|c| !level.iter().any(|l| l.start <= c.start && c.start <= l.end));
}

/// Classifies the gaps between anchors as climbs or descents.
pub fn infer_climb_descent(
    table: &SampleTable<AltitudeSample>,
    mut anchors: Vec<Segment>,
) -> (Vec<Segment>, Vec<Segment>) {
    let mut climbs = Vec::new();
    let mut descents = Vec::new();
    let (Some(first), Some(last)) = (table.first_valid(), table.last_valid()) else {
        return (climbs, descents);
    };
    let mut push = |segment: Segment, climbing: bool| {
        if climbing {
            climbs.push(segment);
        } else {
            descents.push(segment);
        }
    };

    anchors.sort_by_key(|s| s.start);
    let mut cursor = first;
    for (n, anchor) in anchors.iter().enumerate() {
        if anchor.start > cursor {
            let climbing = if n == 0 {
                climbs_by_majority(table, cursor, anchor.start)
            } else {
                table.value(anchor.start).altitude >= table.value(cursor).altitude
            };
            push(Segment::new(cursor, anchor.start), climbing);
        }
        cursor = cursor.max(anchor.end);
    }
    if last > cursor {
        push(Segment::new(cursor, last), climbs_by_majority(table, cursor, last));
    }
    (climbs, descents)
}

fn climbs_by_majority(table: &SampleTable<AltitudeSample>, from: usize, to: usize) -> bool {
    let valid: Vec<usize> = (from..=to).filter(|&i| table.is_valid(i)).collect();
    let (mut up, mut down) = (0usize, 0usize);
    for pair in valid.windows(2) {
        let delta = table.value(pair[1]).altitude - table.value(pair[0]).altitude;
        if delta > 0.0 {
            up += 1;
        } else if delta < 0.0 {
            down += 1;
        }
    }
    up >= down
}

/// Rate in ft/min between two samples, measured on last-contact time.
fn contact_rate(table: &SampleTable<AltitudeSample>, from: usize, to: usize) -> f64 {
    let (a, b) = (table.value(from), table.value(to));
    (b.altitude - a.altitude) / (b.last_contact - a.last_contact) * 60.0
}

/// Walks each climb backward from its top and invalidates samples that do
/// not climb at a plausible rate towards the last accepted sample.
pub fn prune_climbs(
    table: &mut SampleTable<AltitudeSample>,
    climbs: &mut Vec<Segment>,
    config: &VerticalConfig,
) -> usize {
    let mut invalidated = 0;
    for segment in climbs.iter() {
        let Some(mut reference) = table.prev_valid(segment.end).filter(|&i| i >= segment.start)
        else {
            continue;
        };
        for i in (segment.start..reference).rev() {
            if !table.is_valid(i) {
                continue;
            }
            let rate = contact_rate(table, i, reference);
            if !rate.is_finite() || rate > config.max_vertical_rate || rate <= 0.0 {
                invalidated += usize::from(table.invalidate(i));
            } else {
                reference = i;
            }
        }
    }
    retain_plausible(table, climbs, config);
    invalidated
}

/// Forward counterpart of [`prune_climbs`].
pub fn prune_descents(
    table: &mut SampleTable<AltitudeSample>,
    descents: &mut Vec<Segment>,
    config: &VerticalConfig,
) -> usize {
    let mut invalidated = 0;
    for segment in descents.iter() {
        let Some(mut reference) = table.next_valid(segment.start).filter(|&i| i <= segment.end)
        else {
            continue;
        };
        for i in reference + 1..=segment.end {
            if !table.is_valid(i) {
                continue;
            }
            let rate = contact_rate(table, reference, i);
            if !rate.is_finite() || rate >= 0.0 || rate < config.min_vertical_rate {
                invalidated += usize::from(table.invalidate(i));
            } else {
                reference = i;
            }
        }
    }
    retain_plausible(table, descents, config);
    invalidated
}

fn retain_plausible(
    table: &SampleTable<AltitudeSample>,
    segments: &mut Vec<Segment>,
    config: &VerticalConfig,
) {
    for segment in segments.iter_mut() {
        let start = table.next_valid(segment.start).unwrap_or(segment.end);
        let end = table.prev_valid(segment.end).unwrap_or(segment.start);
        *segment = Segment::new(start, end);
    }
    segments.retain(|s| {
        s.start < s.end
            && table.time(s.end) - table.time(s.start) >= config.min_climb_descent_duration_s
            && (s.start..s.end).filter(|&i| table.is_valid(i)).count()
                >= config.min_climb_descent_samples
    });
}

/// Reference altitude of a level-flight phase.
pub fn reference_altitude(
    table: &SampleTable<AltitudeSample>,
    phases: &[FlightPhase],
    index: usize,
) -> Option<f64> {
    let phase = phases.get(index)?;
    let end = phase_end(table, phases, index)?;
    let mid = mid_range(&valid_altitudes(table, phase.start_index, end))?;
    match phase.kind {
        PhaseKind::Cruise => Some(closest_cruising_level(mid)),
        _ => Some(mid),
    }
}

/// Collapses level, undefined, level triples at matching altitudes.
pub fn coalesce_broken_levels(
    table: &SampleTable<AltitudeSample>,
    phases: &mut Vec<FlightPhase>,
    threshold_ft: f64,
) {
    let mut cursor = 0;
    while cursor + 2 < phases.len() {
        let (left, middle, right) = (phases[cursor], phases[cursor + 1], phases[cursor + 2]);
        let candidate = left.kind.is_level_flight()
            && middle.kind == PhaseKind::Undefined
            && right.kind.is_level_flight();
        let matching = candidate
            && match (
                reference_altitude(table, phases, cursor),
                reference_altitude(table, phases, cursor + 2),
            ) {
                (Some(a), Some(b)) => (a - b).abs() <= threshold_ft,
                _ => false,
            };
        if matching {
            if right.kind == PhaseKind::Cruise {
                phases[cursor].kind = PhaseKind::Cruise;
            }
            phases.drain(cursor + 1..=cursor + 2);
        } else {
            cursor += 1;
        }
    }
}

/// Highest level-flight reference altitude and the crossing threshold derived from it.
fn crossing_threshold(
    table: &SampleTable<AltitudeSample>,
    phases: &[FlightPhase],
    config: &VerticalConfig,
) -> Option<f64> {
    let highest = (0..phases.len())
        .filter(|&k| phases[k].kind.is_level_flight())
        .filter_map(|k| reference_altitude(table, phases, k))
        .reduce(f64::max)?;
    Some((config.trim.crossing_ratio * highest).max(config.trim.crossing_floor_ft))
}

/// Time where the first long enough low-reliability stretch begins, in scan order.
fn low_reliability_cut<'a, I>(points: I, config: &VerticalConfig) -> Option<f64>
where
    I: Iterator<Item = &'a ReliabilityPoint>,
{
    let mut run_start: Option<f64> = None;
    for point in points {
        if point.value < config.trim.low_reliability {
            let start = *run_start.get_or_insert(point.time);
            if (point.time - start).abs() >= config.trim.max_low_reliability_s {
                return Some(start);
            }
        } else {
            run_start = None;
        }
    }
    None
}

fn invalidate_where<F>(table: &mut SampleTable<AltitudeSample>, cut: F) -> usize
where
    F: Fn(f64) -> bool,
{
    let targets: Vec<usize> = (0..table.len()).filter(|&i| cut(table.time(i))).collect();
    targets.into_iter().filter(|&i| table.invalidate(i)).count()
}

/// Cuts the arrival end; returns the cut time when samples were removed.
pub fn trim_end(
    table: &mut SampleTable<AltitudeSample>,
    phases: &mut Vec<FlightPhase>,
    reliability: &ReliabilityCurve,
    config: &VerticalConfig,
) -> Option<f64> {
    let threshold = crossing_threshold(table, phases, config)?;
    let arrival = table
        .valid_indices()
        .filter(|&i| table.value(i).altitude >= threshold)
        .last()?;
    let arrival_time = table.time(arrival);

    let low_reliability = low_reliability_cut(
        reliability.points().iter().filter(|p| p.time > arrival_time),
        config,
    );

    let mut reclimb = None;
    let mut lowest = arrival;
    for i in table.valid_indices().filter(|&i| i > arrival) {
        let altitude = table.value(i).altitude;
        if altitude <= table.value(lowest).altitude {
            lowest = i;
        } else if altitude - table.value(lowest).altitude > config.trim.max_reclimb_ft {
            reclimb = Some(table.time(lowest));
            break;
        }
    }

    let cut = [low_reliability, reclimb].into_iter().flatten().reduce(f64::min)?;
    let removed = invalidate_where(table, |time| time > cut);
    if removed == 0 {
        return None;
    }
    let last = table.last_valid().unwrap_or(0);
    phases.retain(|p| p.start_index < last);
    Some(cut)
}

/// Cuts the departure end; returns the cut time when samples were removed.
pub fn trim_beginning(
    table: &mut SampleTable<AltitudeSample>,
    phases: &mut Vec<FlightPhase>,
    reliability: &ReliabilityCurve,
    config: &VerticalConfig,
) -> Option<f64> {
    let threshold = crossing_threshold(table, phases, config)?;
    let departure = table
        .valid_indices()
        .find(|&i| table.value(i).altitude >= threshold)?;
    let departure_time = table.time(departure);

    let low_reliability = low_reliability_cut(
        reliability
            .points()
            .iter()
            .rev()
            .filter(|p| p.time < departure_time),
        config,
    );

    let first = table.first_valid()?;
    let lowest = table
        .valid_indices()
        .take_while(|&i| i < departure)
        .reduce(|best, i| {
            if table.value(i).altitude <= table.value(best).altitude {
                i
            } else {
                best
            }
        })
        .filter(|&i| i != first)
        .map(|i| table.time(i));

    let cut = [low_reliability, lowest].into_iter().flatten().reduce(f64::max)?;
    let removed = invalidate_where(table, |time| time < cut);
    if removed == 0 {
        return None;
    }
    let first = table.first_valid().unwrap_or(0);
    while phases.len() > 1 && phases[1].start_index <= first {
        phases.remove(0);
    }
    if let Some(phase) = phases.first_mut() {
        phase.start_index = phase.start_index.max(first);
    }
    Some(cut)
}

/// Marks samples redundant where linear interpolation between kept anchors
/// stays within `threshold_ft`.
pub fn thin_phases(
    table: &mut SampleTable<AltitudeSample>,
    phases: &[FlightPhase],
    threshold_ft: f64,
) -> usize {
    let mut changed = 0;
    for k in 0..phases.len() {
        let Some(end) = phase_end(table, phases, k) else {
            continue;
        };
        let valid: Vec<usize> = (phases[k].start_index..=end.min(table.len() - 1))
            .filter(|&i| table.is_valid(i))
            .collect();
        if valid.len() <= 2 {
            continue;
        }
        for &i in &valid[1..valid.len() - 1] {
            changed += usize::from(table.mark_redundant(i));
        }

        let mut pending = vec![(0, valid.len() - 1)];
        while let Some((lo, hi)) = pending.pop() {
            let worst = (lo + 1..hi)
                .map(|m| (m, deviation(table, valid[lo], valid[hi], valid[m])))
                .max_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((m, dev)) = worst {
                if dev > threshold_ft {
                    changed += usize::from(table.mark_required(valid[m]));
                    pending.push((lo, m));
                    pending.push((m, hi));
                }
            }
        }
    }
    changed
}

fn deviation(table: &SampleTable<AltitudeSample>, lo: usize, hi: usize, at: usize) -> f64 {
    let (t0, t1, t) = (table.time(lo), table.time(hi), table.time(at));
    let (a0, a1) = (table.value(lo).altitude, table.value(hi).altitude);
    let expected = a0 + (a1 - a0) * (t - t0) / (t1 - t0);
    (table.value(at).altitude - expected).abs()
}

/// Moves each phase start onto its first active sample; phases without one are dropped.
pub fn snap_phase_starts(table: &SampleTable<AltitudeSample>, phases: &mut Vec<FlightPhase>) {
    let bounds: Vec<usize> = phases
        .iter()
        .skip(1)
        .map(|p| p.start_index)
        .chain(std::iter::once(table.len()))
        .collect();
    let snapped: Vec<FlightPhase> = phases
        .iter()
        .zip(bounds)
        .filter_map(|(phase, next)| {
            (phase.start_index..next)
                .find(|&i| table.is_active(i))
                .map(|start| FlightPhase::new(phase.kind, start))
        })
        .collect();
    *phases = snapped;
}
