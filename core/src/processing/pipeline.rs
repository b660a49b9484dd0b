use crate::interface::airport::AirportLookup;
use crate::interface::state_vector::{LoadedSamples, StateVectorTable};
use crate::prelude::{ProcessingStage, SoftIssue, StageConfig, StageInput, StageResult};
use crate::processing::horizontal::HorizontalStage;
use crate::processing::merge::{AxisPair, MergeStage, MergedTrajectory};
use crate::processing::quality::TrajectoryMetrics;
use crate::processing::vertical::VerticalStage;
use crate::telemetry::log::LogManager;

/// Everything produced for one aircraft.
#[derive(Debug, Clone)]
pub struct TrajectoryBundle {
    pub raw: StateVectorTable,
    pub merged: MergedTrajectory,
    pub metrics: TrajectoryMetrics,
    pub issues: Vec<SoftIssue>,
}

impl TrajectoryBundle {
    /// Highest soft-issue code, 0 for a clean trajectory.
    pub fn code(&self) -> i32 {
        self.issues.iter().map(SoftIssue::code).max().unwrap_or(0)
    }

    pub fn is_degraded(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// Per-item chain: normalize, vertical, horizontal, merge, metrics.
pub struct TrajectoryPipeline {
    config: StageConfig,
    vertical: VerticalStage,
    horizontal: HorizontalStage,
    merge: MergeStage,
}

impl TrajectoryPipeline {
    pub fn new(config: StageConfig) -> Self {
        Self {
            config,
            vertical: VerticalStage::new(),
            horizontal: HorizontalStage::new(),
            merge: MergeStage::new(),
        }
    }

    pub fn run(
        &mut self,
        loaded: LoadedSamples,
        airports: Option<&dyn AirportLookup>,
    ) -> StageResult<TrajectoryBundle> {
        let LoadedSamples {
            samples,
            mut issues,
        } = loaded;
        let (raw, normalize_issues) = StateVectorTable::normalize(samples)?;
        issues.extend(normalize_issues);
        let logger = LogManager::for_trajectory(raw.identity());
        logger.record(&format!("processing {} state vectors", raw.len()));

        let vertical = run_stage(
            &mut self.vertical,
            &self.config,
            StageInput {
                identity: raw.identity().clone(),
                samples: raw.vertical_samples(),
            },
        )?;
        let horizontal = run_stage(
            &mut self.horizontal,
            &self.config,
            StageInput {
                identity: raw.identity().clone(),
                samples: raw.horizontal_samples(),
            },
        )?;
        if horizontal.unresolved_spikes() > 0 {
            issues.push(SoftIssue::UnresolvedTrackSpikes {
                count: horizontal.unresolved_spikes(),
            });
        }

        let merged = run_stage(
            &mut self.merge,
            &self.config,
            AxisPair {
                vertical,
                horizontal,
            },
        )?;
        issues.extend(merged.issues.iter().cloned());
        let metrics = TrajectoryMetrics::evaluate(&merged, airports);

        for issue in &issues {
            logger.warn(&format!("soft issue {issue:?}"));
        }
        logger.record(&format!(
            "reliability {:.3}, plausibility {:.3}",
            metrics.reliability, metrics.plausibility
        ));
        Ok(TrajectoryBundle {
            raw,
            merged,
            metrics,
            issues,
        })
    }
}

fn run_stage<S: ProcessingStage>(
    stage: &mut S,
    config: &StageConfig,
    input: S::Input,
) -> StageResult<S::Output> {
    stage.initialize(config)?;
    let output = stage.execute(input);
    stage.cleanup();
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::airport::{Airport, AirportTable};
    use crate::prelude::{Axis, TrajectoryError};
    use crate::processing::fixtures::{loaded_flight, synthetic_flight};
    use crate::processing::phase::PhaseKind;

    fn pipeline() -> TrajectoryPipeline {
        TrajectoryPipeline::new(StageConfig::default())
    }

    #[test]
    fn synthetic_flight_is_segmented() {
        let bundle = pipeline().run(loaded_flight("3c6444", "DLH4AB"), None).unwrap();
        let kinds: Vec<PhaseKind> = bundle.merged.phases.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![PhaseKind::Climb, PhaseKind::Cruise, PhaseKind::Descent]
        );
        assert_eq!(bundle.merged.phases[0].start_index, 0);
        assert_eq!(bundle.code(), 0);
        assert_eq!(bundle.metrics.completeness, None);
        assert!(bundle.metrics.plausibility > 0.99);
        assert!(bundle.metrics.reliability > 0.0 && bundle.metrics.reliability <= 1.0);
        assert!(bundle.merged.samples.iter().all(|s| s.position().is_some()));
    }

    #[test]
    fn combined_reliability_matches_axes_at_merged_times() {
        let bundle = pipeline().run(loaded_flight("3c6444", "DLH4AB"), None).unwrap();
        let merged = &bundle.merged;
        for sample in &merged.samples {
            let expected = merged
                .vertical
                .reliability_at(sample.time)
                .min(merged.horizontal.reliability_at(sample.time));
            assert!((merged.reliability.value_at(sample.time) - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn without_thinning_every_report_is_merged() {
        let config = StageConfig {
            redundancy_filtration: false,
            ..StageConfig::default()
        };
        let samples = synthetic_flight("3c6444", "DLH4AB");
        let count = samples.len();
        let bundle = TrajectoryPipeline::new(config)
            .run(LoadedSamples::new(samples), None)
            .unwrap();
        assert_eq!(bundle.merged.samples.len(), count);
        assert_eq!(bundle.merged.phases.len(), 3);
    }

    #[test]
    fn callsign_change_is_a_soft_issue() {
        let mut samples = synthetic_flight("3c6444", "DLH4AB");
        samples[100].callsign = Some("DLH4AC".into());
        let bundle = pipeline().run(LoadedSamples::new(samples), None).unwrap();
        assert_eq!(bundle.code(), 2);
        assert!(bundle.is_degraded());
    }

    #[test]
    fn ingest_issues_are_carried_through() {
        let mut loaded = loaded_flight("3c6444", "DLH4AB");
        loaded.issues.push(SoftIssue::UnparseableField {
            field: "squawk".into(),
            count: 3,
        });
        let bundle = pipeline().run(loaded, None).unwrap();
        assert_eq!(bundle.code(), 1000);
    }

    #[test]
    fn missing_altitudes_are_fatal() {
        let mut samples = synthetic_flight("3c6444", "DLH4AB");
        for sample in &mut samples {
            sample.baro_altitude = None;
        }
        let err = pipeline().run(LoadedSamples::new(samples), None).unwrap_err();
        assert_eq!(err, TrajectoryError::NoUsableSamples(Axis::Vertical));
        assert_eq!(
            pipeline().run(LoadedSamples::default(), None).unwrap_err(),
            TrajectoryError::EmptyInput
        );
    }

    #[test]
    fn completeness_with_airports() {
        let airports = AirportTable::new(vec![
            Airport {
                name: "Frankfurt".into(),
                city: "Frankfurt".into(),
                country: "Germany".into(),
                iata: Some("FRA".into()),
                icao: Some("EDDF".into()),
                lat: 50.033,
                lon: 8.570,
                elevation_ft: Some(364.0),
            },
            Airport {
                name: "Kastrup".into(),
                city: "Copenhagen".into(),
                country: "Denmark".into(),
                iata: Some("CPH".into()),
                icao: Some("EKCH".into()),
                lat: 55.618,
                lon: 12.656,
                elevation_ft: Some(17.0),
            },
        ]);
        let bundle = pipeline()
            .run(loaded_flight("3c6444", "DLH4AB"), Some(&airports))
            .unwrap();
        // One-sided edge medians sit two and a half reports above the end points.
        let first = 1_000.0 + 2.5 * 2_000.0 / 12.0;
        let last = 1_000.0 + 2.5 * 1_500.0 / 12.0;
        let expected = 1.0 - 0.5 * (first - 364.0) / 35_000.0 - 0.5 * (last - 17.0) / 35_000.0;
        let completeness = bundle.metrics.completeness.unwrap();
        assert!((completeness - expected).abs() < 1e-3);
    }
}
