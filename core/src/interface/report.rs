use crate::prelude::SoftIssue;
use crate::processing::merge::MergedSample;
use crate::processing::pipeline::TrajectoryBundle;
use crate::processing::quality::TrajectoryMetrics;
use crate::processing::reliability::ReliabilityPoint;
use serde::{Deserialize, Serialize};

/// Serializable view of one reconstructed trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryReport {
    pub id: String,
    pub icao24: String,
    pub callsign: String,
    pub code: i32,
    pub metrics: TrajectoryMetrics,
    pub samples: Vec<ReportSample>,
    pub phases: Vec<ReportPhase>,
    pub reliability: Vec<ReliabilityPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<SoftIssue>,
}

/// Placeholder coordinates are written as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportSample {
    pub time: f64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub baro_altitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPhase {
    pub time: f64,
    pub phase: String,
}

impl From<&MergedSample> for ReportSample {
    fn from(sample: &MergedSample) -> Self {
        let position = sample.position().map(|p| p.to_degrees());
        Self {
            time: sample.time,
            lat: position.map(|(lat, _)| lat),
            lon: position.map(|(_, lon)| lon),
            baro_altitude: (sample.baro_altitude < f64::MAX).then_some(sample.baro_altitude),
        }
    }
}

impl TrajectoryReport {
    pub fn from_bundle(id: &str, bundle: &TrajectoryBundle) -> Self {
        let merged = &bundle.merged;
        let phases = merged
            .phases
            .iter()
            .filter_map(|phase| {
                merged.samples.get(phase.start_index).map(|s| ReportPhase {
                    time: s.time,
                    phase: phase.kind.name().to_string(),
                })
            })
            .collect();
        Self {
            id: id.to_string(),
            icao24: merged.identity.icao24.clone(),
            callsign: merged.identity.callsign.clone(),
            code: bundle.code(),
            metrics: bundle.metrics,
            samples: merged.samples.iter().map(ReportSample::from).collect(),
            phases,
            reliability: merged.reliability.points().to_vec(),
            issues: bundle.issues.clone(),
        }
    }

    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::StageConfig;
    use crate::processing::fixtures::loaded_flight;
    use crate::processing::pipeline::TrajectoryPipeline;

    #[test]
    fn report_lists_phases_by_time() {
        let bundle = TrajectoryPipeline::new(StageConfig::default())
            .run(loaded_flight("3c6444", "DLH4AB"), None)
            .unwrap();
        let report = TrajectoryReport::from_bundle("3c6444-0", &bundle);

        assert_eq!(report.callsign, "DLH4AB");
        assert_eq!(report.samples.len(), bundle.merged.samples.len());
        let names: Vec<&str> = report.phases.iter().map(|p| p.phase.as_str()).collect();
        assert_eq!(names, vec!["CLIMB", "CRUISE", "DESCENT"]);
        assert_eq!(report.phases[0].time, report.samples[0].time);

        let line = report.to_json_line().unwrap();
        assert!(!line.contains('\n'));
        let parsed: TrajectoryReport = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.phases, report.phases);
        assert!(!line.contains("issues"));
    }

    #[test]
    fn placeholder_coordinates_become_null() {
        let sample = MergedSample {
            time: 10.0,
            lat: f64::MAX,
            lon: f64::MAX,
            baro_altitude: 12_000.0,
        };
        let row = ReportSample::from(&sample);
        assert_eq!(row.lat, None);
        assert_eq!(row.lon, None);
        assert_eq!(row.baro_altitude, Some(12_000.0));
    }
}
