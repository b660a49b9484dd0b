use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use trajcore::batch::{SampleSource, WorkItemId};
use trajcore::interface::state_vector::{LoadedSamples, RawStateVectorSample};
use trajcore::math::geodesy::{great_circle_distance, ArcInterpolator, GeoPosition, KM_PER_NM};
use trajcore::prelude::{StageResult, TrajectoryError};

const ID_PREFIX: &str = "synthetic-";
const METERS_PER_FOOT: f64 = 0.3048;

/// Configuration for generating synthetic climb, cruise and descent flights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub flights: usize,
    pub seed: u64,
    /// Mean spacing between reports in seconds.
    pub sample_interval_s: f64,
    pub altitude_noise_ft: f64,
    pub position_noise_deg: f64,
    /// Share of reports whose position is thrown far off track.
    pub outlier_rate: f64,
    pub min_cruise_s: f64,
    pub max_cruise_s: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            flights: 10,
            seed: 0,
            sample_interval_s: 5.0,
            altitude_noise_ft: 20.0,
            position_noise_deg: 0.000_5,
            outlier_rate: 0.01,
            min_cruise_s: 900.0,
            max_cruise_s: 3_600.0,
        }
    }
}

/// Shape of one generated flight, drawn from the item's own rng.
#[derive(Debug, Clone, Copy)]
struct FlightPlan {
    start_ft: f64,
    cruise_ft: f64,
    climb_ft_per_s: f64,
    descent_ft_per_s: f64,
    cruise_s: f64,
    groundspeed_kt: f64,
}

impl FlightPlan {
    fn draw(config: &GeneratorConfig, rng: &mut StdRng) -> Self {
        let max_cruise = config.max_cruise_s.max(config.min_cruise_s);
        Self {
            start_ft: rng.gen_range(1_000.0..2_000.0),
            cruise_ft: f64::from(rng.gen_range(28_u32..=39)) * 1_000.0,
            climb_ft_per_s: rng.gen_range(1_500.0..2_500.0) / 60.0,
            descent_ft_per_s: rng.gen_range(1_000.0..2_000.0) / 60.0,
            cruise_s: rng.gen_range(config.min_cruise_s..=max_cruise),
            groundspeed_kt: rng.gen_range(380.0..480.0),
        }
    }

    fn climb_s(&self) -> f64 {
        (self.cruise_ft - self.start_ft) / self.climb_ft_per_s
    }

    fn descent_s(&self) -> f64 {
        (self.cruise_ft - self.start_ft) / self.descent_ft_per_s
    }

    fn duration_s(&self) -> f64 {
        self.climb_s() + self.cruise_s + self.descent_s()
    }

    fn altitude_ft(&self, elapsed: f64) -> f64 {
        let top_of_climb = self.climb_s();
        let top_of_descent = top_of_climb + self.cruise_s;
        if elapsed <= top_of_climb {
            self.start_ft + elapsed * self.climb_ft_per_s
        } else if elapsed <= top_of_descent {
            self.cruise_ft
        } else {
            self.cruise_ft - (elapsed - top_of_descent) * self.descent_ft_per_s
        }
    }
}

/// Deterministic source of synthetic flights; item `n` always yields the same samples.
pub struct SyntheticSource {
    config: GeneratorConfig,
}

impl SyntheticSource {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn work_items(&self) -> Vec<WorkItemId> {
        (0..self.config.flights)
            .map(|index| format!("{ID_PREFIX}{index:05}"))
            .collect()
    }

    pub fn build_flight(&self, index: u64) -> Vec<RawStateVectorSample> {
        let config = &self.config;
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(index));
        let plan = FlightPlan::draw(config, &mut rng);

        let origin =
            GeoPosition::from_degrees(rng.gen_range(40.0..60.0), rng.gen_range(-5.0..20.0));
        let heading_point = GeoPosition::from_degrees(
            origin.to_degrees().0 + rng.gen_range(-2.0..2.0),
            origin.to_degrees().1 + rng.gen_range(1.0..3.0),
        );
        let arc = ArcInterpolator::new(origin, heading_point);
        let reference_km = great_circle_distance(origin, heading_point);
        let km_per_s = plan.groundspeed_kt * KM_PER_NM / 3_600.0;

        let icao24 = format!("{:06x}", rng.gen_range(0x30_0000_u32..0x50_0000));
        let callsign = format!("SYN{:04}", index % 10_000);
        let start_time = 1_600_000_000.0 + rng.gen_range(0.0..86_400.0_f64).floor();
        let interval = config.sample_interval_s.max(0.5);
        let duration = plan.duration_s();

        let mut samples = Vec::new();
        let mut elapsed = 0.0;
        while elapsed <= duration {
            let time = start_time + elapsed;
            let (mut lat, mut lon) = arc.at(elapsed * km_per_s / reference_km).to_degrees();
            if config.position_noise_deg > 0.0 {
                lat += rng.gen_range(-config.position_noise_deg..config.position_noise_deg);
                lon += rng.gen_range(-config.position_noise_deg..config.position_noise_deg);
            }
            if rng.gen_bool(config.outlier_rate.clamp(0.0, 1.0)) {
                lat += rng.gen_range(0.5..1.5);
            }
            let mut altitude_ft = plan.altitude_ft(elapsed);
            if config.altitude_noise_ft > 0.0 {
                altitude_ft += rng.gen_range(-config.altitude_noise_ft..config.altitude_noise_ft);
            }
            samples.push(RawStateVectorSample {
                time,
                icao24: Some(icao24.clone()),
                callsign: Some(callsign.clone()),
                lat: Some(lat),
                lon: Some(lon),
                velocity: Some(plan.groundspeed_kt * KM_PER_NM / 3.6),
                baro_altitude: Some(altitude_ft * METERS_PER_FOOT),
                on_ground: Some(false),
                squawk: Some("1000".into()),
                last_position_update: Some(time),
                last_contact: Some(time),
                ..Default::default()
            });
            elapsed += rng.gen_range(0.5 * interval..1.5 * interval).round().max(1.0);
        }
        samples
    }
}

impl SampleSource for SyntheticSource {
    fn load(&self, id: &str) -> StageResult<LoadedSamples> {
        let index = id
            .strip_prefix(ID_PREFIX)
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(|| TrajectoryError::Ingest(format!("unknown synthetic item {id}")))?;
        Ok(LoadedSamples::new(self.build_flight(index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trajcore::prelude::StageConfig;
    use trajcore::processing::{PhaseKind, TrajectoryPipeline};

    fn source() -> SyntheticSource {
        SyntheticSource::new(GeneratorConfig {
            flights: 3,
            seed: 7,
            ..Default::default()
        })
    }

    #[test]
    fn flights_are_reproducible() {
        let source = source();
        assert_eq!(source.build_flight(1), source.build_flight(1));
        assert_ne!(source.build_flight(1), source.build_flight(2));
        assert_eq!(
            source.work_items(),
            vec!["synthetic-00000", "synthetic-00001", "synthetic-00002"]
        );
    }

    #[test]
    fn report_times_increase() {
        let samples = source().build_flight(0);
        assert!(samples.len() > 100);
        assert!(samples.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn generated_flight_reconstructs_with_cruise() {
        let loaded = source().load("synthetic-00002").unwrap();
        let bundle = TrajectoryPipeline::new(StageConfig::default())
            .run(loaded, None)
            .unwrap();
        assert!(bundle
            .merged
            .phases
            .iter()
            .any(|p| p.kind == PhaseKind::Cruise));
        assert!(bundle.code() >= 0);
    }

    #[test]
    fn unknown_ids_are_rejected() {
        assert_eq!(source().load("flight-1").unwrap_err().code(), -1);
    }
}
