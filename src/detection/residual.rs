//! Residual Classifier
//!
//! Compares the calibrated expected flow against the sensor reading and
//! cross-validates with each segment's own rolling pressure baseline. This is
//! the digital-twin comparison: residual = what IS happening minus what
//! SHOULD be happening.
//!
//! Ordering note: the current pressure reading is pushed into the rolling
//! window BEFORE the drop flag is evaluated, so a reading participates in its
//! own baseline. Detection thresholds were tuned against this exact ordering;
//! do not reorder.

use crate::config::DetectionConfig;
use crate::types::{ResidualAssessment, Status};
use std::collections::{HashMap, VecDeque};

/// Flow-residual anomaly classifier with per-segment pressure memory.
///
/// Owns its rolling windows exclusively; nothing is shared with the physics
/// engine. Per-segment windows must be fed in record order — they are
/// temporal, not set-based.
#[derive(Debug)]
pub struct ResidualClassifier {
    config: DetectionConfig,
    /// Rolling observed-pressure window per segment, FIFO, bounded capacity
    pressure_history: HashMap<String, VecDeque<f64>>,
}

impl ResidualClassifier {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            pressure_history: HashMap::new(),
        }
    }

    /// Push a pressure reading into a segment's rolling baseline, evicting
    /// the oldest once the window is full.
    fn update_pressure_baseline(&mut self, segment_id: &str, pressure: f64) {
        let capacity = self.config.pressure_window;
        let window = self
            .pressure_history
            .entry(segment_id.to_string())
            .or_insert_with(|| VecDeque::with_capacity(capacity));

        if window.len() == capacity {
            window.pop_front();
        }
        window.push_back(pressure);
    }

    /// Mean of a segment's pressure window. The window always contains at
    /// least the current reading by the time this is called.
    fn mean_pressure(&self, segment_id: &str, fallback: f64) -> f64 {
        match self.pressure_history.get(segment_id) {
            Some(window) if !window.is_empty() => {
                window.iter().sum::<f64>() / window.len() as f64
            }
            _ => fallback,
        }
    }

    /// Number of pressure readings currently held for a segment
    pub fn history_len(&self, segment_id: &str) -> usize {
        self.pressure_history.get(segment_id).map_or(0, VecDeque::len)
    }

    /// Classify one segment at one timestep.
    ///
    /// A strong positive residual (too much water flowing) is a LEAK call —
    /// full confidence when the segment's own pressure corroborates, 30%
    /// discounted when it does not. A strong negative residual is an ANOMALY
    /// (blockage-like, not leakage). Everything else is NORMAL.
    pub fn classify(
        &mut self,
        segment_id: &str,
        expected_flow: f64,
        observed_flow: f64,
        pressure: f64,
    ) -> ResidualAssessment {
        // Current reading enters the baseline before the drop check
        self.update_pressure_baseline(segment_id, pressure);

        let residual = observed_flow - expected_flow;
        let residual_pct = if expected_flow > 0.0 {
            residual / expected_flow * 100.0
        } else {
            0.0
        };

        let mean_pressure = self.mean_pressure(segment_id, pressure);
        let pressure_drop = pressure < mean_pressure * self.config.pressure_sensitivity;

        let threshold = self.config.residual_threshold_pct;

        let (status, confidence, reasoning) = if residual_pct.abs() > threshold && residual > 0.0 {
            if pressure_drop {
                (
                    Status::Leak,
                    residual_pct.abs().min(100.0),
                    format!(
                        "LEAK: flow is {:.1}% higher than expected AND pressure dropped",
                        residual_pct
                    ),
                )
            } else {
                (
                    Status::Leak,
                    (residual_pct.abs() * self.config.uncorroborated_discount).min(100.0),
                    format!(
                        "LEAK: flow is {:.1}% higher than expected (pressure stable)",
                        residual_pct
                    ),
                )
            }
        } else if residual_pct.abs() > threshold && residual < 0.0 {
            (
                Status::Anomaly,
                residual_pct.abs().min(100.0),
                format!(
                    "ANOMALY: flow is {:.1}% LOWER than expected (possible blockage)",
                    residual_pct.abs()
                ),
            )
        } else {
            (
                Status::Normal,
                (100.0 - residual_pct.abs()).max(0.0),
                format!(
                    "NORMAL: flow within expected range (±{:.1}%)",
                    residual_pct.abs()
                ),
            )
        };

        ResidualAssessment {
            status,
            confidence,
            residual,
            residual_pct,
            pressure_drop,
            reasoning,
        }
    }
}

impl Default for ResidualClassifier {
    fn default() -> Self {
        Self::new(DetectionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPE: &str = "Zone_1_Block_1_Pipe_1";

    #[test]
    fn test_normal_within_threshold() {
        let mut classifier = ResidualClassifier::default();
        // 4% over expectation, pressure stable
        let a = classifier.classify(PIPE, 50.0, 52.0, 65.0);
        assert_eq!(a.status, Status::Normal);
        assert!((a.residual_pct - 4.0).abs() < 1e-9);
        assert!((a.confidence - 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_leak_with_pressure_corroboration() {
        let mut classifier = ResidualClassifier::default();
        // Build a baseline at 70 PSI, then read 55 (>10% below it)
        for _ in 0..5 {
            classifier.classify(PIPE, 50.0, 50.0, 70.0);
        }
        let a = classifier.classify(PIPE, 50.0, 65.0, 55.0);
        assert_eq!(a.status, Status::Leak);
        assert!(a.pressure_drop);
        assert!((a.confidence - 30.0).abs() < 1e-9);
        assert!(a.reasoning.contains("pressure dropped"));
    }

    #[test]
    fn test_leak_without_corroboration_is_discounted() {
        let mut classifier = ResidualClassifier::default();
        // 40% over expectation, pressure flat at 70
        let a = classifier.classify(PIPE, 50.0, 70.0, 70.0);
        assert_eq!(a.status, Status::Leak);
        assert!(!a.pressure_drop);
        assert!((a.confidence - 28.0).abs() < 1e-9);
        assert!(a.reasoning.contains("pressure stable"));
    }

    #[test]
    fn test_negative_residual_is_anomaly_not_leak() {
        let mut classifier = ResidualClassifier::default();
        let a = classifier.classify(PIPE, 50.0, 30.0, 70.0);
        assert_eq!(a.status, Status::Anomaly);
        assert!((a.confidence - 40.0).abs() < 1e-9);
        assert!(a.reasoning.contains("blockage"));
    }

    #[test]
    fn test_zero_expectation_guard() {
        let mut classifier = ResidualClassifier::default();
        let a = classifier.classify(PIPE, 0.0, 50.0, 70.0);
        assert_eq!(a.residual_pct, 0.0);
        assert_eq!(a.status, Status::Normal);
    }

    #[test]
    fn test_first_reading_is_its_own_baseline() {
        let mut classifier = ResidualClassifier::default();
        // With an empty history the current reading IS the mean, so the drop
        // flag cannot fire on first contact
        let a = classifier.classify(PIPE, 50.0, 80.0, 40.0);
        assert!(!a.pressure_drop);
    }

    #[test]
    fn test_pressure_window_capped_at_50() {
        let mut classifier = ResidualClassifier::default();
        for i in 0..120 {
            classifier.classify(PIPE, 50.0, 50.0, 60.0 + f64::from(i));
        }
        assert_eq!(classifier.history_len(PIPE), 50);
    }

    #[test]
    fn test_segments_are_independent() {
        let mut classifier = ResidualClassifier::default();
        for _ in 0..10 {
            classifier.classify("Zone_1_Block_1_Pipe_A", 50.0, 50.0, 70.0);
        }
        assert_eq!(classifier.history_len("Zone_1_Block_1_Pipe_B"), 0);
    }
}
