//! Flight-phase bookkeeping for the vertical pass.
//!
//! Phases are built by a cursor sweep over the detected segments and then
//! repaired by a second cursor machine that dissolves implausible UNDEFINED
//! phases into their neighbours.

use crate::processing::sample_table::SampleTable;
use crate::processing::vertical::AltitudeSample;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseKind {
    Undefined,
    Cruise,
    Level,
    Climb,
    Descent,
}

impl PhaseKind {
    /// Cruise or level flight.
    pub fn is_level_flight(self) -> bool {
        matches!(self, PhaseKind::Cruise | PhaseKind::Level)
    }

    pub fn name(self) -> &'static str {
        match self {
            PhaseKind::Undefined => "UNDEFINED",
            PhaseKind::Cruise => "CRUISE",
            PhaseKind::Level => "LEVEL",
            PhaseKind::Climb => "CLIMB",
            PhaseKind::Descent => "DESCENT",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A phase runs from `start_index` up to the next phase's start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightPhase {
    pub kind: PhaseKind,
    pub start_index: usize,
}

impl FlightPhase {
    pub fn new(kind: PhaseKind, start_index: usize) -> Self {
        Self { kind, start_index }
    }
}

/// Inclusive index interval of a detected segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Whether the sweep cursor lies in `[start, end)`.
    fn covers(&self, cursor: usize) -> bool {
        self.start <= cursor && cursor < self.end
    }
}

/// Detected segments per kind, consumed by the phase sweep.
#[derive(Debug, Clone, Default)]
pub struct PhaseCandidates {
    pub cruise: Vec<Segment>,
    pub level: Vec<Segment>,
    pub climb: Vec<Segment>,
    pub descent: Vec<Segment>,
}

impl PhaseCandidates {
    /// Removes and returns the first segment covering `cursor`, in priority
    /// cruise, level, climb, descent.
    fn take_covering(&mut self, cursor: usize) -> Option<(PhaseKind, Segment)> {
        [
            (PhaseKind::Cruise, &mut self.cruise),
            (PhaseKind::Level, &mut self.level),
            (PhaseKind::Climb, &mut self.climb),
            (PhaseKind::Descent, &mut self.descent),
        ]
        .into_iter()
        .find_map(|(kind, segments)| {
            let position = segments.iter().position(|s| s.covers(cursor))?;
            Some((kind, segments.remove(position)))
        })
    }
}

enum SweepStep {
    Advance,
    Enter { kind: PhaseKind, resume_at: usize },
    Split,
}

/// Assigns every index to the segment covering it; uncovered stretches split
/// off UNDEFINED phases. The first phase is anchored at index 0.
pub fn sweep_phases(
    table: &SampleTable<AltitudeSample>,
    mut candidates: PhaseCandidates,
) -> Vec<FlightPhase> {
    let mut phases: Vec<FlightPhase> = Vec::new();
    let mut cursor = 0;

    while cursor + 1 < table.len() {
        let step = if !table.is_valid(cursor) {
            SweepStep::Advance
        } else if let Some((kind, segment)) = candidates.take_covering(cursor) {
            SweepStep::Enter {
                kind,
                resume_at: segment.end,
            }
        } else {
            match phases.last() {
                None => SweepStep::Split,
                Some(last)
                    if last.kind != PhaseKind::Undefined
                        && table.next_valid(cursor + 1).is_some() =>
                {
                    SweepStep::Split
                }
                Some(_) => SweepStep::Advance,
            }
        };

        match step {
            SweepStep::Advance => cursor += 1,
            SweepStep::Enter { kind, resume_at } => {
                phases.push(FlightPhase::new(kind, cursor));
                cursor = resume_at;
            }
            SweepStep::Split => {
                phases.push(FlightPhase::new(PhaseKind::Undefined, cursor));
                cursor += 1;
            }
        }
    }

    if let Some(first) = phases.first_mut() {
        first.start_index = 0;
    }
    phases
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RepairStep {
    Advance,
    /// Absorb `absorbed` following phases, or everything up to the end.
    MergeRight { absorbed: usize, to_edge: bool },
    /// Absorb `absorbed` preceding phases, or everything from the start.
    MergeLeft { absorbed: usize, to_edge: bool },
}

/// Inclusive vertical-rate bounds in ft/min.
#[derive(Debug, Clone, Copy)]
pub struct RateBounds {
    pub min: f64,
    pub max: f64,
}

impl RateBounds {
    fn admits(&self, rate: Option<f64>) -> bool {
        rate.is_some_and(|r| r >= self.min && r <= self.max)
    }
}

/// Dissolves UNDEFINED phases whose mean vertical rate is out of bounds.
///
/// Every transition either advances the cursor or removes at least one phase,
/// so `2 * phases.len() - cursor` strictly decreases. Returns the number of
/// samples invalidated.
pub fn repair_undefined(
    table: &mut SampleTable<AltitudeSample>,
    phases: &mut Vec<FlightPhase>,
    bounds: RateBounds,
) -> usize {
    let mut invalidated = 0;
    let mut cursor = 0;

    while cursor < phases.len() {
        let step = plan_repair(table, phases, cursor, bounds);
        let start = table
            .next_valid(phases[cursor].start_index)
            .unwrap_or(phases[cursor].start_index);
        match step {
            RepairStep::Advance => cursor += 1,
            RepairStep::MergeRight { to_edge: true, .. } => {
                invalidated += invalidate_range(table, start + 1, table.len());
                phases.truncate(cursor);
            }
            RepairStep::MergeRight { absorbed, .. } => {
                let new_end = phases[cursor + absorbed + 1].start_index;
                invalidated += invalidate_range(table, start + 1, new_end);
                phases.drain(cursor + 1..=cursor + absorbed);
                let next_is_undefined = phases
                    .get(cursor + 1)
                    .is_some_and(|p| p.kind == PhaseKind::Undefined);
                if next_is_undefined {
                    phases.remove(cursor + 1);
                } else {
                    cursor += 1;
                }
            }
            RepairStep::MergeLeft { to_edge: true, .. } => {
                let end = phase_end(table, phases, cursor).unwrap_or(table.len());
                invalidated += invalidate_range(table, 0, end);
                phases.drain(0..=cursor);
                cursor = 0;
            }
            RepairStep::MergeLeft { absorbed, .. } => {
                let new_start = phases[cursor - absorbed].start_index;
                let end = phase_end(table, phases, cursor).unwrap_or(table.len());
                invalidated += invalidate_range(table, new_start + 1, end);
                phases.drain(cursor - absorbed..cursor);
                cursor -= absorbed;
                phases[cursor].start_index = new_start;
                if cursor > 0 && phases[cursor - 1].kind == PhaseKind::Undefined {
                    phases.remove(cursor);
                    cursor -= 1;
                }
            }
        }
    }
    invalidated
}

fn plan_repair(
    table: &SampleTable<AltitudeSample>,
    phases: &[FlightPhase],
    cursor: usize,
    bounds: RateBounds,
) -> RepairStep {
    if phases[cursor].kind != PhaseKind::Undefined {
        return RepairStep::Advance;
    }
    let Some(start) = table.next_valid(phases[cursor].start_index) else {
        return RepairStep::Advance;
    };
    let Some(end) = phase_end(table, phases, cursor).filter(|&end| end > start) else {
        return RepairStep::Advance;
    };
    if bounds.admits(mean_rate(table, start, end)) {
        return RepairStep::Advance;
    }
    let (Some(first), Some(last)) = (table.first_valid(), table.last_valid()) else {
        return RepairStep::Advance;
    };

    let right = (cursor + 2..phases.len())
        .find(|&target| bounds.admits(mean_rate(table, start, anchor(table, phases[target]))));
    let (right_absorbed, right_cost, right_edge) = match right {
        Some(target) => (
            target - cursor - 1,
            table.time(anchor(table, phases[target])) - table.time(start),
            false,
        ),
        None => (
            phases.len() - cursor - 1,
            table.time(last) - table.time(start),
            true,
        ),
    };

    let left = (0..cursor)
        .rev()
        .find(|&target| bounds.admits(mean_rate(table, anchor(table, phases[target]), end)));
    let (left_absorbed, left_cost, left_edge) = match left {
        Some(target) => (
            cursor - target,
            table.time(end) - table.time(anchor(table, phases[target])),
            false,
        ),
        None => (cursor, table.time(end) - table.time(first), true),
    };

    if right_cost <= left_cost {
        RepairStep::MergeRight {
            absorbed: right_absorbed,
            to_edge: right_edge,
        }
    } else {
        RepairStep::MergeLeft {
            absorbed: left_absorbed,
            to_edge: left_edge,
        }
    }
}

/// Invalidates the interior of UNDEFINED phases. Leading and trailing
/// UNDEFINED phases are removed together with their samples.
pub fn clear_undefined(
    table: &mut SampleTable<AltitudeSample>,
    phases: &mut Vec<FlightPhase>,
) -> usize {
    let mut invalidated = 0;
    let mut cursor = 0;
    while cursor < phases.len() {
        if phases[cursor].kind != PhaseKind::Undefined {
            cursor += 1;
            continue;
        }
        let start = phases[cursor].start_index;
        let next_start = phases.get(cursor + 1).map(|p| p.start_index);
        if cursor == 0 {
            invalidated += invalidate_range(table, start, next_start.unwrap_or(table.len()));
            phases.remove(0);
            continue;
        }
        match next_start {
            Some(next) => {
                invalidated += invalidate_range(table, start + 1, next);
                cursor += 1;
            }
            None => {
                invalidated += invalidate_range(table, start + 1, table.len());
                phases.remove(cursor);
            }
        }
    }
    invalidated
}

/// Index bounding phase `cursor` on the right: the next phase start, or the
/// last valid sample for the final phase.
pub fn phase_end(
    table: &SampleTable<AltitudeSample>,
    phases: &[FlightPhase],
    cursor: usize,
) -> Option<usize> {
    match phases.get(cursor + 1) {
        Some(next) => Some(next.start_index),
        None => table.last_valid(),
    }
}

/// First valid sample of a phase, falling back to its nominal start.
fn anchor(table: &SampleTable<AltitudeSample>, phase: FlightPhase) -> usize {
    table.next_valid(phase.start_index).unwrap_or(phase.start_index)
}

/// Mean vertical rate in ft/min between two samples.
fn mean_rate(table: &SampleTable<AltitudeSample>, from: usize, to: usize) -> Option<f64> {
    let dt = table.time(to) - table.time(from);
    if dt <= 0.0 {
        return None;
    }
    Some((table.value(to).altitude - table.value(from).altitude) / dt * 60.0)
}

fn invalidate_range(table: &mut SampleTable<AltitudeSample>, from: usize, to: usize) -> usize {
    (from..to.min(table.len()))
        .filter(|&i| table.invalidate(i))
        .count()
}
