use crate::math::geodesy::GeoPosition;
use crate::prelude::{SoftIssue, StageResult, TrajectoryError};
use crate::processing::horizontal::PositionSample;
use crate::processing::sample_table::SampleTable;
use crate::processing::vertical::AltitudeSample;
use serde::{Deserialize, Serialize};

/// One ADS-B state-vector report. Absent fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawStateVectorSample {
    pub time: f64,
    pub icao24: Option<String>,
    pub callsign: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub velocity: Option<f64>,
    pub heading: Option<f64>,
    pub vert_rate: Option<f64>,
    pub on_ground: Option<bool>,
    pub alert: Option<bool>,
    pub spi: Option<bool>,
    pub squawk: Option<String>,
    /// Barometric altitude in metres.
    pub baro_altitude: Option<f64>,
    pub geo_altitude: Option<f64>,
    pub last_position_update: Option<f64>,
    pub last_contact: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub icao24: String,
    pub callsign: String,
}

impl Identity {
    pub fn new(icao24: impl Into<String>, callsign: impl Into<String>) -> Self {
        Self {
            icao24: icao24.into(),
            callsign: callsign.into(),
        }
    }

    /// Identity used when two halves of a trajectory disagree.
    pub fn sentinel() -> Self {
        Self::new("error", "error")
    }
}

/// Samples handed over by an ingest collaborator, with the issues it already found.
#[derive(Debug, Clone, Default)]
pub struct LoadedSamples {
    pub samples: Vec<RawStateVectorSample>,
    pub issues: Vec<SoftIssue>,
}

impl LoadedSamples {
    pub fn new(samples: Vec<RawStateVectorSample>) -> Self {
        Self {
            samples,
            issues: Vec::new(),
        }
    }
}

/// Normalized, immutable state-vector table of one aircraft.
///
/// Time is strictly increasing and unique; the identity is taken from the
/// first report that carries it.
#[derive(Debug, Clone)]
pub struct StateVectorTable {
    identity: Identity,
    samples: Vec<RawStateVectorSample>,
}

impl StateVectorTable {
    pub fn normalize(
        mut samples: Vec<RawStateVectorSample>,
    ) -> StageResult<(Self, Vec<SoftIssue>)> {
        if samples.is_empty() {
            return Err(TrajectoryError::EmptyInput);
        }
        if let Some(bad) = samples.iter().find(|s| !s.time.is_finite()) {
            return Err(TrajectoryError::InconsistentTime(format!(
                "non-finite timestamp {}",
                bad.time
            )));
        }

        let mut issues = Vec::new();
        samples.sort_by(|a, b| a.time.total_cmp(&b.time));
        let before = samples.len();
        samples.dedup_by(|later, earlier| later.time == earlier.time);
        if samples.len() < before {
            issues.push(SoftIssue::DuplicateTimestamps {
                count: before - samples.len(),
            });
        }

        let icao24 = first_present(&samples, |s| s.icao24.as_deref())
            .ok_or(TrajectoryError::MissingIdentity("icao24"))?;
        let callsign = first_present(&samples, |s| s.callsign.as_deref())
            .ok_or(TrajectoryError::MissingIdentity("callsign"))?;

        issues.extend(identity_mismatch(&samples, "icao24", &icao24, |s| {
            s.icao24.as_deref()
        }));
        issues.extend(identity_mismatch(&samples, "callsign", &callsign, |s| {
            s.callsign.as_deref()
        }));

        Ok((
            Self {
                identity: Identity::new(icao24, callsign),
                samples,
            },
            issues,
        ))
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn samples(&self) -> &[RawStateVectorSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples carrying both baro-altitude and last-contact time.
    pub fn vertical_samples(&self) -> SampleTable<AltitudeSample> {
        SampleTable::from_records(self.samples.iter().filter_map(|s| {
            Some((
                s.time,
                AltitudeSample {
                    altitude: s.baro_altitude?,
                    last_contact: s.last_contact?,
                },
            ))
        }))
    }

    /// Samples carrying latitude, longitude and last-position-update time.
    pub fn horizontal_samples(&self) -> SampleTable<PositionSample> {
        SampleTable::from_records(self.samples.iter().filter_map(|s| {
            Some((
                s.time,
                PositionSample {
                    position: GeoPosition::from_degrees(s.lat?, s.lon?),
                    last_position_update: s.last_position_update?,
                },
            ))
        }))
    }
}

fn first_present<F>(samples: &[RawStateVectorSample], read: F) -> Option<String>
where
    F: Fn(&RawStateVectorSample) -> Option<&str>,
{
    samples
        .iter()
        .filter_map(read)
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn identity_mismatch<F>(
    samples: &[RawStateVectorSample],
    field: &str,
    expected: &str,
    read: F,
) -> Option<SoftIssue>
where
    F: Fn(&RawStateVectorSample) -> Option<&str>,
{
    let count = samples
        .iter()
        .filter_map(read)
        .filter(|value| value.trim() != expected)
        .count();
    (count > 0).then(|| SoftIssue::IdentityMismatch {
        field: field.to_string(),
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(time: f64, icao24: &str, callsign: &str) -> RawStateVectorSample {
        RawStateVectorSample {
            time,
            icao24: Some(icao24.into()),
            callsign: Some(callsign.into()),
            lat: Some(52.0),
            lon: Some(10.0),
            baro_altitude: Some(1000.0),
            last_position_update: Some(time),
            last_contact: Some(time),
            ..Default::default()
        }
    }

    #[test]
    fn normalize_sorts_and_drops_duplicate_times() {
        let samples = vec![
            report(3.0, "3c6444", "DLH4AB"),
            report(1.0, "3c6444", "DLH4AB"),
            report(3.0, "3c6444", "DLH4AB"),
            report(2.0, "3c6444", "DLH4AB"),
        ];
        let (table, issues) = StateVectorTable::normalize(samples).unwrap();
        let times: Vec<f64> = table.samples().iter().map(|s| s.time).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
        assert_eq!(issues, vec![SoftIssue::DuplicateTimestamps { count: 1 }]);
    }

    #[test]
    fn identity_mismatch_is_soft() {
        let samples = vec![
            report(1.0, "3c6444", "DLH4AB"),
            report(2.0, "3c6444", "DLH9XY"),
        ];
        let (table, issues) = StateVectorTable::normalize(samples).unwrap();
        assert_eq!(table.identity(), &Identity::new("3c6444", "DLH4AB"));
        assert_eq!(
            issues,
            vec![SoftIssue::IdentityMismatch {
                field: "callsign".into(),
                count: 1
            }]
        );
    }

    #[test]
    fn empty_or_anonymous_input_is_fatal() {
        assert_eq!(
            StateVectorTable::normalize(Vec::new()).unwrap_err(),
            TrajectoryError::EmptyInput
        );
        let anonymous = RawStateVectorSample {
            time: 1.0,
            ..Default::default()
        };
        assert_eq!(
            StateVectorTable::normalize(vec![anonymous]).unwrap_err(),
            TrajectoryError::MissingIdentity("icao24")
        );
    }

    #[test]
    fn axis_tables_skip_incomplete_reports() {
        let mut partial = report(2.0, "3c6444", "DLH4AB");
        partial.baro_altitude = None;
        partial.lat = None;
        let samples = vec![report(1.0, "3c6444", "DLH4AB"), partial];
        let (table, _) = StateVectorTable::normalize(samples).unwrap();
        assert_eq!(table.vertical_samples().len(), 1);
        assert_eq!(table.horizontal_samples().len(), 1);
    }
}
