use crate::interface::airport::AirportLookup;
use crate::math::geodesy::{great_circle_distance_estimate, track_angle_change, GeoPosition};
use crate::processing::merge::{MergedSample, MergedTrajectory};
use serde::{Deserialize, Serialize};

/// Spikes sharper than this are penalized.
const SPIKE_THRESHOLD_DEG: f64 = 30.0;
/// Spikes whose two legs add up to this length receive the full penalty.
const SPIKE_FULL_WEIGHT_NM: f64 = 20.0;
const SPIKE_SCALE_DEG: f64 = 270.0;
const MAX_DETOUR_RATIO: f64 = 1.5;
const ENDPOINT_WEIGHT: f64 = 0.5;

/// Scalar quality scores of a merged trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryMetrics {
    pub reliability: f64,
    /// `None` when no airport elevation was available.
    pub completeness: Option<f64>,
    pub plausibility: f64,
}

impl TrajectoryMetrics {
    pub fn evaluate(merged: &MergedTrajectory, airports: Option<&dyn AirportLookup>) -> Self {
        Self {
            reliability: merged.reliability.mean(),
            completeness: airports.and_then(|lookup| completeness(&merged.samples, lookup)),
            plausibility: plausibility(&merged.samples),
        }
    }
}

/// Penalizes endpoints that hang above the nearest airport's elevation.
pub fn completeness(samples: &[MergedSample], airports: &dyn AirportLookup) -> Option<f64> {
    let max_altitude = samples
        .iter()
        .map(|s| s.baro_altitude)
        .filter(|a| a.is_finite() && *a < f64::MAX)
        .reduce(f64::max)?;
    if max_altitude <= 0.0 {
        return None;
    }
    let first = samples.iter().find_map(endpoint)?;
    let last = samples.iter().rev().find_map(endpoint)?;

    let mut score = 1.0;
    for (position, altitude) in [first, last] {
        let elevation = airports.nearest_with_elevation(position)?.elevation_ft?;
        let gap = altitude - elevation;
        if gap > 0.0 {
            score -= ENDPOINT_WEIGHT * gap / max_altitude;
        }
    }
    Some(score)
}

fn endpoint(sample: &MergedSample) -> Option<(GeoPosition, f64)> {
    let position = sample.position()?;
    (sample.baro_altitude < f64::MAX).then_some((position, sample.baro_altitude))
}

/// Starts at 1 and subtracts altitude oscillation, track spikes and detours.
pub fn plausibility(samples: &[MergedSample]) -> f64 {
    let mut score = 1.0 - altitude_oscillation(samples);
    if score <= 0.0 {
        return 0.0;
    }

    let positions: Vec<GeoPosition> = samples.iter().filter_map(MergedSample::position).collect();
    for window in positions.windows(3) {
        let change = track_angle_change(window[0], window[1], window[2])
            .abs()
            .to_degrees();
        if change > SPIKE_THRESHOLD_DEG {
            let legs = great_circle_distance_estimate(window[0], window[1])
                + great_circle_distance_estimate(window[1], window[2]);
            score -= (legs / SPIKE_FULL_WEIGHT_NM).min(1.0) * change / SPIKE_SCALE_DEG;
        }
    }

    if let (Some(&first), Some(&last)) = (positions.first(), positions.last()) {
        let direct = great_circle_distance_estimate(first, last);
        let track: f64 = positions
            .windows(2)
            .map(|w| great_circle_distance_estimate(w[0], w[1]))
            .sum();
        if direct > 0.0 && track / direct > MAX_DETOUR_RATIO {
            score -= track / direct - MAX_DETOUR_RATIO;
        }
    }
    score.max(0.0)
}

/// Excursions against the climb before the peak plus excursions against the
/// descent after it, relative to the peak altitude. An excursion only counts
/// once the altitude has come back to its previous extreme.
fn altitude_oscillation(samples: &[MergedSample]) -> f64 {
    let altitudes: Vec<f64> = samples
        .iter()
        .map(|s| s.baro_altitude)
        .filter(|a| *a < f64::MAX)
        .collect();
    let Some(&first) = altitudes.first() else {
        return 0.0;
    };
    let mut peak_index = 0;
    for (i, &altitude) in altitudes.iter().enumerate() {
        if altitude > altitudes[peak_index] {
            peak_index = i;
        }
    }
    let peak = altitudes[peak_index];
    if peak <= 0.0 {
        return 0.0;
    }

    let mut recovered = 0.0;
    let mut latest_max = first;
    let mut deepest = 0.0_f64;
    for &altitude in altitudes.iter().take(peak_index).skip(1) {
        if altitude >= latest_max {
            recovered += deepest;
            deepest = 0.0;
            latest_max = altitude;
        } else {
            deepest = deepest.max(latest_max - altitude);
        }
    }

    let mut latest_min = peak;
    deepest = 0.0;
    for &altitude in &altitudes[peak_index..altitudes.len() - 1] {
        if altitude <= latest_min {
            recovered += deepest;
            deepest = 0.0;
            latest_min = altitude;
        } else {
            deepest = deepest.max(altitude - latest_min);
        }
    }
    recovered / peak
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::airport::{Airport, AirportTable};

    fn row(time: f64, lat: f64, lon: f64, altitude: f64) -> MergedSample {
        MergedSample {
            time,
            lat,
            lon,
            baro_altitude: altitude,
        }
    }

    fn airport(icao: &str, lat: f64, lon: f64, elevation_ft: Option<f64>) -> Airport {
        Airport {
            name: icao.into(),
            city: String::new(),
            country: String::new(),
            iata: None,
            icao: Some(icao.into()),
            lat,
            lon,
            elevation_ft,
        }
    }

    fn flight() -> Vec<MergedSample> {
        vec![
            row(0.0, 50.0, 8.0, 1_000.0),
            row(600.0, 50.5, 8.5, 20_000.0),
            row(1200.0, 51.0, 9.0, 20_000.0),
            row(1800.0, 51.5, 9.5, 3_000.0),
        ]
    }

    #[test]
    fn smooth_flight_is_fully_plausible() {
        assert_eq!(plausibility(&flight()), 1.0);
    }

    /// Straight northbound track, one row per altitude.
    fn northbound(altitudes: &[f64]) -> Vec<MergedSample> {
        altitudes
            .iter()
            .enumerate()
            .map(|(i, &alt)| row(i as f64 * 60.0, 50.0 + i as f64 * 0.1, 8.0, alt))
            .collect()
    }

    #[test]
    fn recovered_descent_dip_is_penalized() {
        let samples = northbound(&[1_000.0, 20_000.0, 15_000.0, 18_000.0, 14_000.0, 3_000.0]);
        let score = plausibility(&samples);
        assert!((score - (1.0 - 3_000.0 / 20_000.0)).abs() < 1e-9);
    }

    #[test]
    fn multi_dip_climb_counts_deepest_dip_once() {
        let samples = northbound(&[
            10_000.0, 5_000.0, 9_000.0, 6_000.0, 11_000.0, 12_000.0, 12_000.0,
        ]);
        let score = plausibility(&samples);
        assert!((score - (1.0 - 5_000.0 / 12_000.0)).abs() < 1e-9);
    }

    #[test]
    fn unrecovered_dip_is_not_penalized() {
        let samples = northbound(&[1_000.0, 20_000.0, 15_000.0, 18_000.0]);
        assert_eq!(plausibility(&samples), 1.0);
    }

    #[test]
    fn spike_weight_uses_both_legs() {
        let lat_b: f64 = 50.0 + 19.0 / 60.0;
        let lon_c = 8.0 + 1.0 / (60.0 * lat_b.to_radians().cos());
        let samples = vec![
            row(0.0, 50.0, 8.0, 10_000.0),
            row(600.0, lat_b, 8.0, 10_000.0),
            row(630.0, lat_b, lon_c, 10_000.0),
        ];
        let score = plausibility(&samples);
        assert!((score - (1.0 - 90.0 / 270.0)).abs() < 0.01, "{score}");
    }

    #[test]
    fn detour_is_penalized() {
        let samples = vec![
            row(0.0, 50.0, 8.0, 10_000.0),
            row(600.0, 51.0, 8.0, 10_000.0),
            row(1200.0, 50.0, 8.01, 10_000.0),
        ];
        assert!(plausibility(&samples) < 1.0);
    }

    #[test]
    fn completeness_uses_endpoint_airports() {
        let airports = AirportTable::new(vec![
            airport("EDDF", 50.03, 8.57, Some(364.0)),
            airport("EDDL", 51.29, 6.77, None),
            airport("EDDK", 51.5, 9.5, Some(302.0)),
        ]);
        let samples = vec![
            row(0.0, 50.03, 8.57, 364.0),
            row(600.0, 50.8, 9.0, 30_000.0),
            row(1200.0, 51.5, 9.5, 3_302.0),
        ];
        let score = completeness(&samples, &airports).unwrap();
        assert!((score - (1.0 - 0.5 * 3_000.0 / 30_000.0)).abs() < 1e-9);
    }

    #[test]
    fn completeness_needs_elevation() {
        let airports = AirportTable::new(vec![airport("EDDL", 51.29, 6.77, None)]);
        assert_eq!(completeness(&flight(), &airports), None);
    }
}
