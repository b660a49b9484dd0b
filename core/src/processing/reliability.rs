use crate::math::stats::StatsHelper;
use crate::prelude::ReliabilityConfig;
use crate::processing::sample_table::SampleTable;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityPoint {
    pub time: f64,
    pub value: f64,
}

/// Local sample-density confidence on a fixed time grid, values in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReliabilityCurve {
    points: Vec<ReliabilityPoint>,
}

impl ReliabilityCurve {
    /// Curve over the valid samples of `table`; empty if none are valid.
    ///
    /// Every valid sample adds `1 / (1 + (dt / window)^2)^2` to the grid points
    /// within `window` seconds of it. The sum is normalized by the window
    /// length and the required density and clamped to 1.
    pub fn from_table<V>(table: &SampleTable<V>, config: &ReliabilityConfig) -> Self {
        let (Some(first), Some(last)) = (table.first_valid(), table.last_valid()) else {
            return Self::default();
        };
        let grid = time_grid(table.time(first), table.time(last), config.step_s);
        let origin = grid[0];
        let mut weights = vec![0.0; grid.len()];

        for index in table.valid_indices() {
            let time = table.time(index);
            let slot = (((time - origin) / config.step_s).round() as usize).min(grid.len() - 1);
            weights[slot] += 1.0;
            for left in (0..slot).rev() {
                let dt = time - grid[left];
                if dt > config.window_s {
                    break;
                }
                weights[left] += window_weight(dt, config.window_s);
            }
            for right in slot + 1..grid.len() {
                let dt = grid[right] - time;
                if dt > config.window_s {
                    break;
                }
                weights[right] += window_weight(dt, config.window_s);
            }
        }

        let points = grid
            .into_iter()
            .zip(weights)
            .map(|(time, weight)| ReliabilityPoint {
                time,
                value: (weight / config.window_s / config.required_density).min(1.0),
            })
            .collect();
        Self { points }
    }

    /// Per-grid-point minimum of two curves over `[start, end]`.
    pub fn combine_min(
        a: &ReliabilityCurve,
        b: &ReliabilityCurve,
        start: f64,
        end: f64,
        step_s: f64,
    ) -> Self {
        let points = time_grid(start, end, step_s)
            .into_iter()
            .map(|time| ReliabilityPoint {
                time,
                value: a.value_at(time).min(b.value_at(time)),
            })
            .collect();
        Self { points }
    }

    /// Linear interpolation; 0 outside the covered window.
    pub fn value_at(&self, time: f64) -> f64 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return 0.0;
        };
        if time < first.time || time > last.time {
            return 0.0;
        }
        let upper = self.points.partition_point(|p| p.time < time);
        let hi = self.points[upper];
        if hi.time == time || upper == 0 {
            return hi.value;
        }
        let lo = self.points[upper - 1];
        lo.value + (hi.value - lo.value) * (time - lo.time) / (hi.time - lo.time)
    }

    pub fn points(&self) -> &[ReliabilityPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn mean(&self) -> f64 {
        let values: Vec<f64> = self.points.iter().map(|p| p.value).collect();
        StatsHelper::mean(&values)
    }
}

fn window_weight(dt: f64, window: f64) -> f64 {
    1.0 / (1.0 + (dt / window).powi(2)).powi(2)
}

/// `start, start + step, ...` with the last point pinned to `end`.
fn time_grid(start: f64, end: f64, step: f64) -> Vec<f64> {
    let steps = (end - start) / step;
    let rounded = steps.round();
    let size = if steps > rounded {
        rounded as usize + 2
    } else {
        rounded as usize + 1
    };
    let mut grid: Vec<f64> = (0..size).map(|i| start + i as f64 * step).collect();
    if let Some(last) = grid.last_mut() {
        *last = end;
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(times: &[f64]) -> SampleTable<()> {
        SampleTable::from_records(times.iter().map(|&t| (t, ())))
    }

    #[test]
    fn grid_ends_exactly_at_last_sample() {
        assert_eq!(time_grid(0.0, 12.0, 5.0), vec![0.0, 5.0, 10.0, 12.0]);
        assert_eq!(time_grid(0.0, 13.0, 5.0), vec![0.0, 5.0, 10.0, 13.0]);
        assert_eq!(time_grid(0.0, 10.0, 5.0), vec![0.0, 5.0, 10.0]);
        assert_eq!(time_grid(3.0, 3.0, 5.0), vec![3.0]);
    }

    #[test]
    fn dense_sampling_saturates() {
        let times: Vec<f64> = (0..600).map(|i| i as f64).collect();
        let curve = ReliabilityCurve::from_table(&table(&times), &ReliabilityConfig::default());
        assert!(curve.points().iter().all(|p| (0.0..=1.0).contains(&p.value)));
        assert_eq!(curve.value_at(300.0), 1.0);
    }

    #[test]
    fn sparse_sampling_stays_below_one() {
        let times: Vec<f64> = (0..20).map(|i| i as f64 * 30.0).collect();
        let curve = ReliabilityCurve::from_table(&table(&times), &ReliabilityConfig::default());
        assert!(curve.points().iter().all(|p| p.value > 0.0 && p.value < 1.0));
        assert_eq!(curve.value_at(-1.0), 0.0);
        assert_eq!(curve.value_at(10_000.0), 0.0);
    }

    #[test]
    fn invalid_samples_do_not_count() {
        let mut t = table(&[0.0, 10.0, 20.0]);
        t.invalidate(0);
        t.invalidate(1);
        t.invalidate(2);
        assert!(ReliabilityCurve::from_table(&t, &ReliabilityConfig::default()).is_empty());
    }

    #[test]
    fn combined_curve_is_pointwise_minimum() {
        let dense: Vec<f64> = (0..200).map(|i| i as f64).collect();
        let sparse: Vec<f64> = (0..20).map(|i| i as f64 * 10.0).collect();
        let config = ReliabilityConfig::default();
        let a = ReliabilityCurve::from_table(&table(&dense), &config);
        let b = ReliabilityCurve::from_table(&table(&sparse), &config);
        let combined = ReliabilityCurve::combine_min(&a, &b, 20.0, 150.0, 5.0);
        for point in combined.points() {
            assert_eq!(point.value, a.value_at(point.time).min(b.value_at(point.time)));
        }
    }
}
