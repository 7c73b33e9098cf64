//! Shared data structures for the water-network leak detection pipeline
//!
//! This module defines the core types flowing between the engines:
//! - `SensorRecord`: one timestamped telemetry row from the data source
//! - `PhysicsAssessment` / `ResidualAssessment`: the two independent sub-verdicts
//! - `Verdict`: the fused per-record result returned by the digital twin
//! - `SegmentSummary` / `SystemStatistics`: aggregation outputs

use serde::{Deserialize, Serialize};

// ============================================================================
// Detection Status
// ============================================================================

/// Detection status for a segment at one timestep.
///
/// `Anomaly` is only reachable inside the residual classifier's sub-verdict
/// (flow well below expectation, i.e. blockage-like). Fusion never emits it:
/// the fused top-level status is always one of `Normal`, `Suspect`, `Leak`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum Status {
    #[default]
    Normal,
    Suspect,
    Leak,
    Anomaly,
}

impl Status {
    /// Short code for logs and CSV output
    pub fn short_code(&self) -> &'static str {
        match self {
            Status::Normal => "NORMAL",
            Status::Suspect => "SUSPECT",
            Status::Leak => "LEAK",
            Status::Anomaly => "ANOMALY",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_code())
    }
}

/// Labeled outcome from historical data. Used only to score detection
/// accuracy, never as a detector input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GroundTruth {
    Leak,
    NoLeak,
}

impl GroundTruth {
    pub fn is_leak(&self) -> bool {
        matches!(self, GroundTruth::Leak)
    }
}

impl std::fmt::Display for GroundTruth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroundTruth::Leak => write!(f, "LEAK"),
            GroundTruth::NoLeak => write!(f, "NORMAL"),
        }
    }
}

/// Health tag carried by each segment. Reserved for maintenance scheduling;
/// the detection loop reads it but only the calibration layer may write it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
}

// ============================================================================
// Sensor Telemetry
// ============================================================================

/// Geographic position of a segment's sensor cluster
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// One immutable telemetry row for a single network segment.
///
/// The record's position in the data source is a stable, monotonically
/// increasing time surrogate; there is no wall-clock timestamp column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorRecord {
    /// Unique segment identifier (e.g. "Zone_1_Block_2_Pipe_3")
    pub segment_id: String,
    /// Zone label within the network hierarchy
    pub zone: String,
    /// Block label within the zone
    pub block: String,
    /// Pipe label within the block
    pub pipe: String,
    /// Sensor cluster position
    pub location: GeoPoint,
    /// Observed flow rate (L/min)
    pub flow_rate: f64,
    /// Observed line pressure (PSI)
    pub pressure: f64,
    /// Water temperature (°C)
    pub temperature: f64,
    /// Pump rotational speed (RPM)
    pub rpm: f64,
    /// Cumulative operational hours of the pump/segment assembly
    pub operational_hours: f64,
    /// Pump vibration (mm/s)
    pub vibration: f64,
    /// Ground-truth leak flag. Scoring only — never fed into detection.
    pub leak_flag: bool,
}

impl SensorRecord {
    /// Look up a named operating-condition field for the baseline estimator.
    ///
    /// The estimator artifact declares its feature list by name; this is the
    /// single mapping from those names to record fields. Flow rate is the
    /// prediction target and deliberately not addressable here.
    pub fn condition(&self, name: &str) -> Option<f64> {
        match name {
            "pressure" => Some(self.pressure),
            "temperature" => Some(self.temperature),
            "rpm" => Some(self.rpm),
            "operational_hours" => Some(self.operational_hours),
            "vibration" => Some(self.vibration),
            _ => None,
        }
    }

    pub fn ground_truth(&self) -> GroundTruth {
        if self.leak_flag {
            GroundTruth::Leak
        } else {
            GroundTruth::NoLeak
        }
    }
}

// ============================================================================
// Physics Engine Outputs
// ============================================================================

/// Result of comparing observed pressure against the physics-derived expectation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressureCheck {
    /// Whether the observed pressure is within tolerance of the expectation
    pub consistent: bool,
    /// observed − expected (PSI); negative means the line is under-pressured
    pub deviation: f64,
    /// Deviation as a percentage of the expectation (0 when expectation is 0)
    pub deviation_pct: f64,
    /// Human-readable explanation, sign-aware (drop vs rise)
    pub explanation: String,
}

/// Result of a mass-balance check across a segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConservation {
    pub conserved: bool,
    /// Unaccounted flow (L/min); positive means water is being lost
    pub residual: f64,
    pub residual_pct: f64,
    pub explanation: String,
}

/// Complete physics assessment of one segment at one timestep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsAssessment {
    /// Pressure the friction model expects given the calibrated flow (PSI)
    pub expected_pressure: f64,
    /// Sensor pressure reading (PSI)
    pub observed_pressure: f64,
    pub pressure_check: PressureCheck,
    /// observed flow − calibrated expected flow (L/min)
    pub flow_residual: f64,
    pub flow_residual_pct: f64,
    /// Independent physical signals that fired (each one a reason string)
    pub signals: Vec<String>,
    pub status: Status,
    /// 0–100
    pub confidence: f64,
}

// ============================================================================
// Residual Classifier Output
// ============================================================================

/// Verdict from the residual classifier (the "second opinion")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidualAssessment {
    pub status: Status,
    /// 0–100
    pub confidence: f64,
    /// observed flow − calibrated expected flow (L/min)
    pub residual: f64,
    pub residual_pct: f64,
    /// Whether current pressure sits more than (1 − sensitivity) below its
    /// own rolling baseline
    pub pressure_drop: bool,
    pub reasoning: String,
}

// ============================================================================
// Fused Verdict
// ============================================================================

/// Final per-record verdict produced by the digital twin.
///
/// All numeric fields carry full precision; rounding to two decimals happens
/// only at the presentation boundary (the `Display` impl and report output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    // Identity
    pub index: usize,
    pub segment_id: String,
    pub zone: String,
    pub block: String,
    pub pipe: String,
    pub location: GeoPoint,

    // Expectation chain (raw → calibrated, auditable)
    /// Baseline estimator output before any calibration
    pub baseline_expected_flow: f64,
    /// Baseline plus the segment's calibration offset
    pub calibrated_expected_flow: f64,
    /// calibrated − baseline (0 when the segment is uncalibrated)
    pub calibration_offset: f64,

    // Observations
    pub observed_flow: f64,
    pub observed_pressure: f64,
    pub temperature: f64,
    pub rpm: f64,
    pub vibration: f64,

    // Sub-verdicts
    pub physics: PhysicsAssessment,
    pub ml: ResidualAssessment,

    // Fused decision
    pub status: Status,
    /// 0–100
    pub confidence: f64,
    /// Reasoning trail; every entry traces back to one of the two sub-signals
    pub reasoning: Vec<String>,
    /// Whether the calibration store adjusted this segment on this call
    pub calibration_fired: bool,

    // Scoring
    pub ground_truth: GroundTruth,
    pub is_correct: bool,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} {} ({:.2}%) flow {:.2}/{:.2} L/min, pressure {:.2} PSI (physics {} {:.2}%, ml {} {:.2}%)",
            self.index,
            self.segment_id,
            self.status,
            self.confidence,
            self.observed_flow,
            self.calibrated_expected_flow,
            self.observed_pressure,
            self.physics.status,
            self.physics.confidence,
            self.ml.status,
            self.ml.confidence,
        )
    }
}

// ============================================================================
// Aggregation Outputs
// ============================================================================

/// Condensed per-segment entry in a network snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub status: Status,
    pub confidence: f64,
    pub flow: f64,
    pub zone: String,
    pub block: String,
    pub location: GeoPoint,
}

/// Detection quality over a record range, scored against ground truth.
///
/// Percentages are rounded to two decimals — this struct is a report, not an
/// intermediate.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SystemStatistics {
    pub total_records: usize,
    /// Records actually evaluated after stride subsampling
    pub total_checked: usize,
    pub leaks_detected: usize,
    pub suspects_detected: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl std::fmt::Display for SystemStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "checked {}/{} | accuracy {:.2}% precision {:.2}% recall {:.2}% | TP {} FP {} TN {} FN {}",
            self.total_checked,
            self.total_records,
            self.accuracy,
            self.precision,
            self.recall,
            self.true_positives,
            self.false_positives,
            self.true_negatives,
            self.false_negatives,
        )
    }
}

/// Round to two decimals. Presentation-boundary use only — internal math must
/// keep full precision so calibration updates don't compound rounding error.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_lookup_covers_model_features() {
        let record = SensorRecord {
            segment_id: "Zone_1_Block_1_Pipe_1".to_string(),
            zone: "Zone_1".to_string(),
            block: "Block_1".to_string(),
            pipe: "Pipe_1".to_string(),
            location: GeoPoint { lat: 1.0, lon: 2.0 },
            flow_rate: 50.0,
            pressure: 65.0,
            temperature: 22.0,
            rpm: 1500.0,
            operational_hours: 1200.0,
            vibration: 0.3,
            leak_flag: false,
        };

        for feature in ["pressure", "temperature", "rpm", "operational_hours", "vibration"] {
            assert!(record.condition(feature).is_some(), "missing feature {feature}");
        }
        // Flow is the target, never a condition
        assert!(record.condition("flow_rate").is_none());
    }

    #[test]
    fn test_round2_is_presentation_only() {
        assert_eq!(round2(10.006), 10.01);
        assert_eq!(round2(-3.333), -3.33);
    }
}
