//! Digital Twin Orchestration
//!
//! Combines the baseline estimator, physics engine, residual classifier,
//! fusion policy and calibration store into the per-record analysis loop.
//!
//! Sequencing contract per record (later steps depend on earlier outputs):
//! 1. baseline prediction (memoized — pure function of the immutable record)
//! 2. add the segment's current calibration offset → calibrated expectation
//! 3. physics checker and residual classifier run against that expectation
//! 4. fusion reconciles the two sub-verdicts
//! 5. the realized residual plus the fused-LEAK flag feed the calibration store
//! 6. the full verdict is assembled, carrying both raw and calibrated
//!    expectations so callers can audit the calibration contribution
//!
//! Everything is single-threaded and synchronous: the dataset is materialized
//! before analysis begins and the hot path does no I/O. Per-segment state is
//! temporal — records for one segment must be analyzed in increasing index
//! order, or the rolling windows change meaning.

use crate::baseline::{BaselineModel, PredictionCache};
use crate::calibration::CalibrationStore;
use crate::config::NetworkConfig;
use crate::datasource::Dataset;
use crate::detection::{fuse, is_correct, ResidualClassifier};
use crate::network::NetworkState;
use crate::physics_engine::PhysicsEngine;
use crate::types::{round2, SegmentSummary, Status, SystemStatistics, Verdict};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Cap on records evaluated by [`DigitalTwin::system_statistics`]; larger
/// ranges are subsampled at a stride
const STATISTICS_SAMPLE_CAP: usize = 500;

/// The leak-detection reasoning engine for one network.
///
/// Owns all per-segment evolving state. Construction takes the segment
/// registry explicitly so tests can inject isolated instances.
pub struct DigitalTwin {
    config: NetworkConfig,
    dataset: Dataset,
    model: BaselineModel,
    physics: PhysicsEngine,
    classifier: ResidualClassifier,
    calibration: CalibrationStore,
    network: NetworkState,
    predictions: PredictionCache,
}

impl DigitalTwin {
    pub fn new(
        config: NetworkConfig,
        model: BaselineModel,
        dataset: Dataset,
        network: NetworkState,
    ) -> Self {
        debug_assert!(!dataset.is_empty(), "digital twin requires a non-empty dataset");
        info!(
            records = dataset.len(),
            features = ?model.features(),
            "Digital twin initialized"
        );
        let physics = PhysicsEngine::new(config.physics.clone(), config.pipes.clone());
        let classifier = ResidualClassifier::new(config.detection.clone());
        let calibration = CalibrationStore::new(config.calibration.clone());
        Self {
            config,
            dataset,
            model,
            physics,
            classifier,
            calibration,
            network,
            predictions: PredictionCache::new(),
        }
    }

    /// Analyze one sensor record and return the fused verdict.
    ///
    /// Out-of-range indices clamp to the last record — the engine always
    /// returns a best-effort verdict rather than failing.
    ///
    /// Replaying an index with no intervening calls for the same segment
    /// returns an identical verdict, but the replay still consumes into the
    /// calibration and pressure windows. Callers driving the calibration loop
    /// must feed each segment's indices in order, exactly once.
    pub fn analyze(&mut self, index: usize) -> Verdict {
        let index = self.dataset.clamp_index(index);
        // Clone keeps the record immutable while per-segment state mutates
        let record = match self.dataset.get(index) {
            Some(r) => r.clone(),
            None => unreachable!("clamp_index always yields a valid index"),
        };

        // 1. Baseline prediction (memoized)
        let model = &self.model;
        let baseline_expected = self
            .predictions
            .get_or_insert_with(index, || model.predict(&record));

        // 2. Calibrated expectation
        let offset = self.network.segment_or_create(&record).offset();
        let calibrated_expected = baseline_expected + offset;

        // 3. Two independent detectors against the calibrated expectation
        let physics = self.physics.analyze_segment(
            record.flow_rate,
            record.pressure,
            calibrated_expected,
            self.config.pipes.length_m,
            self.config.pipes.base_pressure_psi,
        );
        let ml = self.classifier.classify(
            &record.segment_id,
            calibrated_expected,
            record.flow_rate,
            record.pressure,
        );

        // 4. Fusion
        let fused = fuse(&ml, &physics);

        // 5. Calibration consumes the realized residual
        let residual = record.flow_rate - calibrated_expected;
        let segment = self.network.segment_or_create(&record);
        let calibration_fired = self.calibration.observe(
            &record.segment_id,
            segment,
            residual,
            fused.status == Status::Leak,
        );

        if fused.status != Status::Normal {
            debug!(
                index,
                segment = %record.segment_id,
                status = %fused.status,
                confidence = fused.confidence,
                "Detection"
            );
        }

        // 6. Assemble the auditable verdict
        let ground_truth = record.ground_truth();
        Verdict {
            index,
            segment_id: record.segment_id,
            zone: record.zone,
            block: record.block,
            pipe: record.pipe,
            location: record.location,
            baseline_expected_flow: baseline_expected,
            calibrated_expected_flow: calibrated_expected,
            calibration_offset: offset,
            observed_flow: record.flow_rate,
            observed_pressure: record.pressure,
            temperature: record.temperature,
            rpm: record.rpm,
            vibration: record.vibration,
            physics,
            ml,
            status: fused.status,
            confidence: fused.confidence,
            reasoning: fused.reasoning,
            calibration_fired,
            ground_truth,
            is_correct: is_correct(fused.status, ground_truth.is_leak()),
        }
    }

    /// Status of every segment appearing in a symmetric record window around
    /// `index`, using each segment's most recent record inside the window.
    ///
    /// Convenience aggregation for dashboards. Note it calls [`Self::analyze`]
    /// per segment, so it consumes into the calibration windows like any
    /// other analysis.
    pub fn network_snapshot(
        &mut self,
        index: usize,
        window_radius: usize,
    ) -> BTreeMap<String, SegmentSummary> {
        let index = self.dataset.clamp_index(index);
        let start = index.saturating_sub(window_radius);
        let end = (index + window_radius).min(self.dataset.len());

        // Most recent record per segment inside the window
        let mut latest: BTreeMap<String, usize> = BTreeMap::new();
        for i in start..end {
            if let Some(record) = self.dataset.get(i) {
                latest.insert(record.segment_id.clone(), i);
            }
        }

        latest
            .into_iter()
            .map(|(segment_id, record_index)| {
                let verdict = self.analyze(record_index);
                let summary = SegmentSummary {
                    status: verdict.status,
                    confidence: verdict.confidence,
                    flow: verdict.observed_flow,
                    zone: verdict.zone,
                    block: verdict.block,
                    location: verdict.location,
                };
                (segment_id, summary)
            })
            .collect()
    }

    /// Detection quality over `[start, end)`, scored against ground truth.
    ///
    /// Subsamples at a stride so at most ~500 records are evaluated
    /// regardless of range size.
    pub fn system_statistics(&mut self, start: usize, end: usize) -> SystemStatistics {
        let end = end.min(self.dataset.len());
        if start >= end {
            return SystemStatistics::default();
        }

        let stride = ((end - start) / STATISTICS_SAMPLE_CAP).max(1);

        let mut stats = SystemStatistics {
            total_records: end - start,
            ..SystemStatistics::default()
        };

        for index in (start..end).step_by(stride) {
            let verdict = self.analyze(index);
            let truth_leak = verdict.ground_truth.is_leak();

            match verdict.status {
                Status::Leak => {
                    stats.leaks_detected += 1;
                    if truth_leak {
                        stats.true_positives += 1;
                    } else {
                        stats.false_positives += 1;
                    }
                }
                Status::Suspect => {
                    stats.suspects_detected += 1;
                    if truth_leak {
                        stats.true_positives += 1;
                    } else {
                        stats.false_positives += 1;
                    }
                }
                _ => {
                    if truth_leak {
                        stats.false_negatives += 1;
                    } else {
                        stats.true_negatives += 1;
                    }
                }
            }
        }

        stats.total_checked = stats.true_positives
            + stats.false_positives
            + stats.true_negatives
            + stats.false_negatives;

        if stats.total_checked > 0 {
            stats.accuracy = round2(
                (stats.true_positives + stats.true_negatives) as f64
                    / stats.total_checked as f64
                    * 100.0,
            );
        }
        let positive_calls = stats.true_positives + stats.false_positives;
        if positive_calls > 0 {
            stats.precision = round2(stats.true_positives as f64 / positive_calls as f64 * 100.0);
        }
        let actual_leaks = stats.true_positives + stats.false_negatives;
        if actual_leaks > 0 {
            stats.recall = round2(stats.true_positives as f64 / actual_leaks as f64 * 100.0);
        }

        stats
    }

    /// Number of records in the underlying dataset
    pub fn record_count(&self) -> usize {
        self.dataset.len()
    }

    /// Read access to the segment registry (for dashboards and tests)
    pub fn network(&self) -> &NetworkState {
        &self.network
    }

    /// Number of memoized baseline predictions
    pub fn cached_predictions(&self) -> usize {
        self.predictions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::{ModelArtifact, ARTIFACT_SCHEMA_VERSION};
    use crate::types::{GeoPoint, SensorRecord};
    use chrono::Utc;

    const PIPE_A: &str = "Zone_1_Block_1_Pipe_1";
    const PIPE_B: &str = "Zone_1_Block_2_Pipe_1";

    /// Model that predicts a constant 50 L/min whatever the conditions
    fn constant_model() -> BaselineModel {
        BaselineModel::from_artifact(ModelArtifact {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            trained_at: Utc::now(),
            features: vec!["pressure".to_string()],
            coefficients: vec![0.0],
            intercept: 50.0,
        })
        .unwrap()
    }

    fn record(segment_id: &str, flow: f64, pressure: f64, leak: bool) -> SensorRecord {
        SensorRecord {
            segment_id: segment_id.to_string(),
            zone: "Zone_1".to_string(),
            block: "Block_1".to_string(),
            pipe: "Pipe_1".to_string(),
            location: GeoPoint { lat: 3.1, lon: 101.6 },
            flow_rate: flow,
            pressure,
            temperature: 25.0,
            rpm: 1450.0,
            operational_hours: 1000.0,
            vibration: 0.4,
            leak_flag: leak,
        }
    }

    fn twin(records: Vec<SensorRecord>) -> DigitalTwin {
        DigitalTwin::new(
            NetworkConfig::default(),
            constant_model(),
            Dataset::from_records(records),
            NetworkState::new(),
        )
    }

    #[test]
    fn test_normal_record_fuses_to_normal() {
        // 4% over a 50 L/min expectation, pressure near the 100 PSI base
        let mut twin = twin(vec![record(PIPE_A, 52.0, 95.0, false)]);
        let verdict = twin.analyze(0);

        assert_eq!(verdict.status, Status::Normal);
        assert!(verdict.is_correct);
        assert_eq!(verdict.baseline_expected_flow, 50.0);
        assert_eq!(verdict.calibrated_expected_flow, 50.0);
        assert_eq!(verdict.calibration_offset, 0.0);
    }

    #[test]
    fn test_leak_record_fuses_to_leak() {
        // 50% excess flow with a hard pressure sag: both detectors fire
        let mut twin = twin(vec![record(PIPE_A, 75.0, 70.0, true)]);
        let verdict = twin.analyze(0);

        assert_eq!(verdict.status, Status::Leak);
        assert_eq!(verdict.physics.status, Status::Leak);
        assert_eq!(verdict.ml.status, Status::Leak);
        // Agreement boost lifts the fused confidence above the weaker signal
        assert!(verdict.confidence > verdict.ml.confidence.min(verdict.physics.confidence));
        assert!(verdict.confidence <= 100.0);
        assert!(verdict.is_correct);
    }

    #[test]
    fn test_fused_status_never_anomaly() {
        // Strong NEGATIVE residual: classifier says ANOMALY, fusion absorbs it
        let mut twin = twin(vec![record(PIPE_A, 20.0, 98.0, false)]);
        let verdict = twin.analyze(0);

        assert_eq!(verdict.ml.status, Status::Anomaly);
        assert!(matches!(
            verdict.status,
            Status::Normal | Status::Suspect | Status::Leak
        ));
    }

    #[test]
    fn test_out_of_range_index_clamps() {
        let mut twin = twin(vec![
            record(PIPE_A, 52.0, 95.0, false),
            record(PIPE_A, 53.0, 95.0, false),
        ]);
        let verdict = twin.analyze(10_000);
        assert_eq!(verdict.index, 1);
    }

    #[test]
    fn test_replay_same_index_returns_identical_verdict() {
        let mut twin = twin(vec![record(PIPE_A, 52.0, 95.0, false)]);
        let first = twin.analyze(0);
        let second = twin.analyze(0);

        assert_eq!(first.status, second.status);
        assert_eq!(first.confidence.to_bits(), second.confidence.to_bits());
        assert_eq!(
            first.calibrated_expected_flow.to_bits(),
            second.calibrated_expected_flow.to_bits()
        );
    }

    #[test]
    fn test_predictions_are_memoized() {
        let mut twin = twin(vec![
            record(PIPE_A, 52.0, 95.0, false),
            record(PIPE_A, 53.0, 95.0, false),
        ]);
        twin.analyze(0);
        twin.analyze(0);
        twin.analyze(1);
        assert_eq!(twin.cached_predictions(), 2);
    }

    #[test]
    fn test_persistent_benign_offset_calibrates_and_stops_biasing() {
        // 54 L/min against a 50 L/min expectation: +4 residual, NORMAL every
        // time. After 20 records the store should absorb the offset.
        let records: Vec<_> = (0..30)
            .map(|_| record(PIPE_A, 54.0, 95.0, false))
            .collect();
        let mut twin = twin(records);

        let mut fired_at = None;
        for i in 0..30 {
            let verdict = twin.analyze(i);
            if verdict.calibration_fired && fired_at.is_none() {
                fired_at = Some(i);
            }
        }

        // Fires exactly when the 20th sample lands (index 19)
        assert_eq!(fired_at, Some(19));

        let segment = twin.network().get(PIPE_A).unwrap();
        assert!(segment.calibration_offset.is_some());

        // Post-calibration verdicts see the calibrated expectation
        let verdict = twin.analyze(29);
        assert!(verdict.calibration_offset > 0.0);
        assert_eq!(
            verdict.calibrated_expected_flow,
            verdict.baseline_expected_flow + verdict.calibration_offset
        );
        // Residual against the calibrated expectation shrinks
        assert!(verdict.ml.residual.abs() < 4.0);
    }

    #[test]
    fn test_snapshot_reports_latest_record_per_segment() {
        let mut twin = twin(vec![
            record(PIPE_A, 52.0, 95.0, false),
            record(PIPE_B, 75.0, 70.0, true),
            record(PIPE_A, 51.0, 95.0, false),
        ]);

        let snapshot = twin.network_snapshot(1, 10);
        assert_eq!(snapshot.len(), 2);
        // PIPE_A's latest record in the window is index 2 (flow 51.0)
        assert_eq!(snapshot[PIPE_A].flow, 51.0);
        assert_eq!(snapshot[PIPE_B].status, Status::Leak);
    }

    #[test]
    fn test_statistics_confusion_counts() {
        let mut twin = twin(vec![
            record(PIPE_A, 52.0, 95.0, false), // normal, truth normal → TN
            record(PIPE_A, 75.0, 70.0, true),  // leak, truth leak → TP
            record(PIPE_A, 51.0, 95.0, true),  // normal, truth leak → FN
        ]);

        let stats = twin.system_statistics(0, 3);
        assert_eq!(stats.total_checked, 3);
        assert_eq!(stats.true_positives, 1);
        assert_eq!(stats.true_negatives, 1);
        assert_eq!(stats.false_negatives, 1);
        assert_eq!(stats.false_positives, 0);
        assert_eq!(stats.accuracy, 66.67);
        assert_eq!(stats.precision, 100.0);
        assert_eq!(stats.recall, 50.0);
    }

    #[test]
    fn test_statistics_stride_caps_evaluations() {
        let records: Vec<_> = (0..2000)
            .map(|_| record(PIPE_A, 52.0, 95.0, false))
            .collect();
        let mut twin = twin(records);

        let stats = twin.system_statistics(0, 2000);
        // stride = 2000/500 = 4 → exactly 500 evaluations
        assert_eq!(stats.total_checked, 500);
        assert_eq!(stats.total_records, 2000);
    }

    #[test]
    fn test_empty_range_statistics() {
        let mut twin = twin(vec![record(PIPE_A, 52.0, 95.0, false)]);
        let stats = twin.system_statistics(5, 5);
        assert_eq!(stats.total_checked, 0);
        assert_eq!(stats.accuracy, 0.0);
    }
}
