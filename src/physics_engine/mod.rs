//! Physics Engine Module
//!
//! Deterministic hydraulic plausibility checks for one pipe segment. All math
//! here is closed-form and explainable — this is NOT a CFD or network-flow
//! solver, and it knows nothing about the ML layer or calibration internals.
//!
//! Physical principles encoded:
//! 1. Pressure-flow relationship (simplified Darcy-Weisbach): drop ∝ flow²
//! 2. Conservation of flow across a segment (mass balance)
//! 3. A leak adds an exit point, so observed pressure sags below the
//!    friction-model expectation while flow runs above it

use crate::config::{PhysicsConfig, PipeConfig};
use crate::types::{FlowConservation, PhysicsAssessment, PressureCheck, Status};

/// Pascals to PSI
const PA_TO_PSI: f64 = 0.000_145_038;
/// Litres per minute to cubic metres per second
const LMIN_TO_M3S: f64 = 1.0 / 60_000.0;

/// Closed-form hydraulic checks against assumed pipe geometry.
///
/// Holds only configuration — no per-segment state — so one instance serves
/// the whole network.
#[derive(Debug, Clone)]
pub struct PhysicsEngine {
    physics: PhysicsConfig,
    pipes: PipeConfig,
}

impl PhysicsEngine {
    pub fn new(physics: PhysicsConfig, pipes: PipeConfig) -> Self {
        Self { physics, pipes }
    }

    /// Expected friction pressure drop along a pipe (PSI).
    ///
    /// Simplified Darcy-Weisbach: Δp = f · (L/D) · (ρ·v²/2) with a
    /// roughness-derived friction factor. Quadratic in flow, never negative,
    /// exactly zero at zero flow.
    pub fn pressure_drop(&self, flow_lmin: f64, length_m: f64, diameter_m: f64, roughness: Option<f64>) -> f64 {
        let roughness = roughness.unwrap_or(self.physics.default_roughness);

        let flow_m3s = flow_lmin * LMIN_TO_M3S;
        let area = std::f64::consts::PI * (diameter_m / 2.0).powi(2);
        let velocity = if area > 0.0 { flow_m3s / area } else { 0.0 };

        let friction_factor = roughness * 0.1;
        let drop_pa = friction_factor
            * (length_m / diameter_m)
            * (self.physics.water_density * velocity.powi(2) / 2.0);

        (drop_pa * PA_TO_PSI).max(0.0)
    }

    /// Expected pressure at the segment given inlet pressure and flow (PSI).
    /// Clamped at zero — a line cannot carry negative pressure.
    pub fn expected_pressure(&self, base_pressure: f64, flow_lmin: f64, length_m: f64) -> f64 {
        let drop = self.pressure_drop(flow_lmin, length_m, self.pipes.diameter_m, None);
        (base_pressure - drop).max(0.0)
    }

    /// Compare observed pressure against the friction-model expectation.
    ///
    /// The deviation's sign matters: under-pressure points at water escaping,
    /// over-pressure at a blockage or closed valve downstream.
    pub fn pressure_consistency(&self, expected: f64, observed: f64) -> PressureCheck {
        let deviation = observed - expected;
        let deviation_pct = if expected > 0.0 {
            deviation / expected * 100.0
        } else {
            0.0
        };

        let consistent = deviation_pct.abs() <= self.physics.pressure_tolerance * 100.0;

        let explanation = if consistent {
            format!(
                "Pressure normal: {:+.1} PSI ({:+.1}%) from expected",
                deviation, deviation_pct
            )
        } else if deviation < 0.0 {
            format!(
                "PRESSURE DROP DETECTED: {:.1} PSI below expected ({:.1}%) - water may be escaping",
                deviation.abs(),
                deviation_pct.abs()
            )
        } else {
            format!(
                "Unexpected pressure rise: {:.1} PSI above expected ({:.1}%) - possible blockage or valve closure",
                deviation, deviation_pct
            )
        };

        PressureCheck {
            consistent,
            deviation,
            deviation_pct,
            explanation,
        }
    }

    /// Mass-balance check across a segment: inflow should equal outflow plus
    /// expected consumption. Positive residual means water is unaccounted for.
    pub fn flow_conservation(
        &self,
        flow_in: f64,
        flow_out: f64,
        expected_consumption: f64,
    ) -> FlowConservation {
        let residual = flow_in - (flow_out + expected_consumption);
        let residual_pct = if flow_in > 0.0 {
            residual / flow_in * 100.0
        } else {
            0.0
        };

        let conserved = residual_pct.abs() <= self.physics.conservation_tolerance * 100.0;

        let explanation = if conserved {
            format!(
                "Flow conserved: {:.1} L/min discrepancy ({:.1}%) is within tolerance",
                residual, residual_pct
            )
        } else if residual > 0.0 {
            format!(
                "Flow NOT conserved: {:.1} L/min excess ({:.1}%) - POSSIBLE LEAK",
                residual, residual_pct
            )
        } else {
            format!(
                "Flow NOT conserved: {:.1} L/min deficit ({:.1}%) - possible blockage",
                residual.abs(),
                residual_pct.abs()
            )
        };

        FlowConservation {
            conserved,
            residual,
            residual_pct,
            explanation,
        }
    }

    /// Comprehensive physics assessment of one segment at one timestep.
    ///
    /// Two independent signals can fire: excess flow over the calibrated
    /// expectation, and a confirmed (inconsistent, negative) pressure drop.
    /// Both firing is a physics-level LEAK; one alone is a SUSPECT; neither
    /// is NORMAL. The confidence formula differs per tier on purpose — a
    /// single signal is capped at 50.
    pub fn analyze_segment(
        &self,
        observed_flow: f64,
        observed_pressure: f64,
        calibrated_expected_flow: f64,
        pipe_length_m: f64,
        base_pressure: f64,
    ) -> PhysicsAssessment {
        let expected_pressure =
            self.expected_pressure(base_pressure, calibrated_expected_flow, pipe_length_m);
        let pressure_check = self.pressure_consistency(expected_pressure, observed_pressure);

        let flow_residual = observed_flow - calibrated_expected_flow;
        let flow_residual_pct = if calibrated_expected_flow > 0.0 {
            flow_residual / calibrated_expected_flow * 100.0
        } else {
            0.0
        };

        let mut signals = Vec::new();
        if flow_residual_pct > self.physics.excess_flow_pct {
            signals.push("Excess flow detected".to_string());
        }
        if !pressure_check.consistent && pressure_check.deviation < 0.0 {
            signals.push("Pressure drop confirmed".to_string());
        }

        let (status, confidence) = match signals.len() {
            n if n >= 2 => (
                Status::Leak,
                (flow_residual_pct.abs() + pressure_check.deviation_pct.abs()).min(100.0),
            ),
            1 => (Status::Suspect, flow_residual_pct.abs().min(50.0)),
            _ => (Status::Normal, (100.0 - flow_residual_pct.abs()).max(0.0)),
        };

        PhysicsAssessment {
            expected_pressure,
            observed_pressure,
            pressure_check,
            flow_residual,
            flow_residual_pct,
            signals,
            status,
            confidence,
        }
    }
}

impl Default for PhysicsEngine {
    fn default() -> Self {
        Self::new(PhysicsConfig::default(), PipeConfig::default())
    }
}
