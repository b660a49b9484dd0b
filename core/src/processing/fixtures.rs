//! Synthetic trajectories shared by the unit tests.

use crate::interface::state_vector::{LoadedSamples, RawStateVectorSample};
use crate::math::geodesy::{interpolate_on_great_circle, GeoPosition};

pub const START_TIME: f64 = 1_600_000_000.0;
pub const STEP_S: f64 = 5.0;
pub const CLIMB_S: f64 = 1_020.0;
pub const CRUISE_S: f64 = 1_200.0;
pub const DESCENT_S: f64 = 1_360.0;

const METERS_PER_FOOT: f64 = 0.3048;

/// 1,000 ft to 35,000 ft at 2,000 ft/min, 20 minutes level, down at 1,500 ft/min.
pub fn flight_altitude_ft(elapsed: f64) -> f64 {
    if elapsed <= CLIMB_S {
        1_000.0 + elapsed * 2_000.0 / 60.0
    } else if elapsed <= CLIMB_S + CRUISE_S {
        35_000.0
    } else {
        35_000.0 - (elapsed - CLIMB_S - CRUISE_S) * 1_500.0 / 60.0
    }
}

/// Frankfurt to Copenhagen on the great circle, one report every five seconds.
pub fn synthetic_flight(icao24: &str, callsign: &str) -> Vec<RawStateVectorSample> {
    let origin = GeoPosition::from_degrees(50.033, 8.570);
    let destination = GeoPosition::from_degrees(55.618, 12.656);
    let duration = CLIMB_S + CRUISE_S + DESCENT_S;
    let count = (duration / STEP_S) as usize + 1;
    (0..count)
        .map(|i| {
            let elapsed = i as f64 * STEP_S;
            let time = START_TIME + elapsed;
            let (lat, lon) =
                interpolate_on_great_circle(origin, destination, elapsed / duration).to_degrees();
            RawStateVectorSample {
                time,
                icao24: Some(icao24.to_string()),
                callsign: Some(callsign.to_string()),
                lat: Some(lat),
                lon: Some(lon),
                baro_altitude: Some(flight_altitude_ft(elapsed) * METERS_PER_FOOT),
                on_ground: Some(false),
                last_position_update: Some(time),
                last_contact: Some(time),
                ..Default::default()
            }
        })
        .collect()
}

pub fn loaded_flight(icao24: &str, callsign: &str) -> LoadedSamples {
    LoadedSamples::new(synthetic_flight(icao24, callsign))
}
