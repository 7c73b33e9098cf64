//! HydroSentry: Water Network Operational Intelligence
//!
//! Multi-signal leak detection engine for piped water distribution networks.
//!
//! ## Architecture
//!
//! - **Baseline Estimator**: Trained linear model mapping operating conditions to
//!   expected flow (loaded from a JSON artifact, consumed as a pure function)
//! - **Physics Engine**: Closed-form pressure-from-flow consistency checks
//! - **Residual Classifier**: Flow-residual + rolling-pressure anomaly detection
//! - **Fusion**: Reconciles the two independent verdicts into one status
//! - **Calibration Store**: Per-segment adaptive offsets that absorb benign bias
//!
//! The [`twin::DigitalTwin`] orchestrates all of the above per sensor record.

pub mod baseline;
pub mod calibration;
pub mod config;
pub mod datasource;
pub mod detection;
pub mod network;
pub mod physics_engine;
pub mod twin;
pub mod types;

// Re-export network configuration
pub use config::NetworkConfig;

// Re-export commonly used types
pub use types::{
    GroundTruth, HealthStatus, PhysicsAssessment, PressureCheck, ResidualAssessment,
    SegmentSummary, SensorRecord, Status, SystemStatistics, Verdict,
};

// Re-export engines
pub use baseline::{BaselineError, BaselineModel};
pub use calibration::CalibrationStore;
pub use datasource::{Dataset, DatasetError};
pub use detection::ResidualClassifier;
pub use network::{NetworkState, Segment};
pub use physics_engine::PhysicsEngine;
pub use twin::DigitalTwin;
