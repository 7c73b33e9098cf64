//! Decision Fusion
//!
//! Reconciles the residual classifier's verdict and the physics engine's
//! verdict into one final status. This is the explainability layer: every
//! emitted reasoning string traces back to one of the two source signals.
//!
//! Policy:
//! - Both say LEAK → LEAK, averaged confidence boosted 30% (capped at 100)
//! - Exactly one says LEAK → SUSPECT, best confidence discounted 30%
//! - Neither says LEAK → NORMAL, the more pessimistic confidence wins
//!
//! An ANOMALY from the residual classifier counts as "not LEAK" here. That is
//! intentional: blockage-like signals must not masquerade as leak suspicion.
//! It does mean blockages never surface at the fused level on their own — a
//! known product gap, tracked upstream, not a defect to repair here.

use crate::types::{PhysicsAssessment, ResidualAssessment, Status};
use serde::{Deserialize, Serialize};

/// Agreement boost applied when both detectors call LEAK
const AGREEMENT_BOOST: f64 = 1.3;
/// Discount applied when only one detector calls LEAK
const SINGLE_SIGNAL_DISCOUNT: f64 = 0.7;

/// Outcome of fusing the two sub-verdicts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedDecision {
    /// One of Normal / Suspect / Leak — fusion never emits Anomaly
    pub status: Status,
    /// 0–100
    pub confidence: f64,
    pub reasoning: Vec<String>,
}

/// Combine the residual-classifier and physics verdicts.
pub fn fuse(ml: &ResidualAssessment, physics: &PhysicsAssessment) -> FusedDecision {
    let ml_leak = ml.status == Status::Leak;
    let physics_leak = physics.status == Status::Leak;

    if ml_leak && physics_leak {
        FusedDecision {
            status: Status::Leak,
            confidence: ((ml.confidence + physics.confidence) / 2.0 * AGREEMENT_BOOST).min(100.0),
            reasoning: vec![
                "Residual model detected anomaly".to_string(),
                "Physics rules violated".to_string(),
                "High confidence: both signals agree".to_string(),
            ],
        }
    } else if ml_leak || physics_leak {
        FusedDecision {
            status: Status::Suspect,
            confidence: ml.confidence.max(physics.confidence) * SINGLE_SIGNAL_DISCOUNT,
            reasoning: vec![
                "Single signal detection".to_string(),
                "Requires confirmation".to_string(),
            ],
        }
    } else {
        FusedDecision {
            status: Status::Normal,
            confidence: ml.confidence.min(physics.confidence),
            reasoning: vec!["All signals normal".to_string()],
        }
    }
}

/// Score a fused status against ground truth.
///
/// LEAK and SUSPECT both count as a positive call; NORMAL as a negative.
/// Fusion never emits ANOMALY, so that case cannot reach this comparison.
pub fn is_correct(status: Status, ground_truth_leak: bool) -> bool {
    match status {
        Status::Leak | Status::Suspect => ground_truth_leak,
        Status::Normal => !ground_truth_leak,
        Status::Anomaly => false,
    }
}
