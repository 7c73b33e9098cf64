//! Baseline Flow Estimator
//!
//! Loads the trained demand model artifact and exposes it as a pure function
//! from operating conditions to expected flow. Training happens offline
//! against known-normal historical records; this module only consumes the
//! result. A missing or malformed artifact is a fatal startup error — the
//! engine has no degraded mode without an expectation to compare against.
//!
//! The artifact is schema-versioned JSON carrying an ordered feature list,
//! one coefficient per feature, and an intercept:
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "trained_at": "2026-08-01T00:00:00Z",
//!   "features": ["pressure", "temperature", "rpm", "operational_hours", "vibration"],
//!   "coefficients": [0.42, -0.03, 0.021, 0.0001, -1.2],
//!   "intercept": 12.5
//! }
//! ```

use crate::types::SensorRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Artifact schema version this build understands
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

/// Error type for baseline model loading
#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("model artifact not found at {path}: {source}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model artifact at {path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported artifact schema version {found} (expected {ARTIFACT_SCHEMA_VERSION})")]
    SchemaVersion { found: u32 },
    #[error("artifact declares {features} features but carries {coefficients} coefficients")]
    CoefficientMismatch { features: usize, coefficients: usize },
    #[error("artifact references unknown condition field '{0}'")]
    UnknownFeature(String),
}

/// On-disk artifact layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema_version: u32,
    pub trained_at: DateTime<Utc>,
    /// Condition field names, in coefficient order
    pub features: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

/// Trained linear demand model: conditions → expected flow (L/min).
///
/// Deterministic and side-effect-free; predictions for an immutable record
/// are safe to memoize indefinitely (see [`PredictionCache`]).
#[derive(Debug, Clone)]
pub struct BaselineModel {
    features: Vec<String>,
    coefficients: Vec<f64>,
    intercept: f64,
}

impl BaselineModel {
    /// Load the model artifact from disk, validating schema and feature names.
    pub fn load(path: &Path) -> Result<Self, BaselineError> {
        let contents = std::fs::read_to_string(path).map_err(|source| BaselineError::NotFound {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: ModelArtifact =
            serde_json::from_str(&contents).map_err(|source| BaselineError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        let model = Self::from_artifact(artifact)?;
        info!(
            path = %path.display(),
            features = ?model.features,
            "Baseline demand model loaded"
        );
        Ok(model)
    }

    /// Build a model from an in-memory artifact (used by tests and the
    /// simulation generator).
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, BaselineError> {
        if artifact.schema_version != ARTIFACT_SCHEMA_VERSION {
            return Err(BaselineError::SchemaVersion {
                found: artifact.schema_version,
            });
        }
        if artifact.features.len() != artifact.coefficients.len() {
            return Err(BaselineError::CoefficientMismatch {
                features: artifact.features.len(),
                coefficients: artifact.coefficients.len(),
            });
        }
        // Validate feature names once at load so predict() can stay infallible
        let probe = probe_record();
        for name in &artifact.features {
            if probe.condition(name).is_none() {
                return Err(BaselineError::UnknownFeature(name.clone()));
            }
        }
        Ok(Self {
            features: artifact.features,
            coefficients: artifact.coefficients,
            intercept: artifact.intercept,
        })
    }

    /// Predict expected flow for one record's operating conditions.
    ///
    /// Pure function of the record: same record, same answer.
    pub fn predict(&self, record: &SensorRecord) -> f64 {
        let mut flow = self.intercept;
        for (name, coefficient) in self.features.iter().zip(&self.coefficients) {
            // Names were validated at load time
            let value = record.condition(name).unwrap_or(0.0);
            flow += coefficient * value;
        }
        flow
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }
}

/// Zeroed record used to validate feature names at artifact load time
fn probe_record() -> SensorRecord {
    SensorRecord {
        segment_id: String::new(),
        zone: String::new(),
        block: String::new(),
        pipe: String::new(),
        location: crate::types::GeoPoint::default(),
        flow_rate: 0.0,
        pressure: 0.0,
        temperature: 0.0,
        rpm: 0.0,
        operational_hours: 0.0,
        vibration: 0.0,
        leak_flag: false,
    }
}

// ============================================================================
// Prediction Cache
// ============================================================================

/// Memo of baseline predictions keyed by record index.
///
/// Records are immutable and the model is pure, so entries never invalidate;
/// the map only grows, bounded by the dataset length.
#[derive(Debug, Default)]
pub struct PredictionCache {
    entries: HashMap<usize, f64>,
}

impl PredictionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the cached prediction for `index`, computing and storing it on miss.
    pub fn get_or_insert_with(&mut self, index: usize, compute: impl FnOnce() -> f64) -> f64 {
        *self.entries.entry(index).or_insert_with(compute)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoPoint;
    use std::io::Write;

    fn artifact() -> ModelArtifact {
        ModelArtifact {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            trained_at: Utc::now(),
            features: vec![
                "pressure".to_string(),
                "temperature".to_string(),
                "rpm".to_string(),
                "operational_hours".to_string(),
                "vibration".to_string(),
            ],
            coefficients: vec![0.5, 0.1, 0.01, 0.0, -2.0],
            intercept: 10.0,
        }
    }

    fn record() -> SensorRecord {
        SensorRecord {
            segment_id: "Zone_1_Block_1_Pipe_1".to_string(),
            zone: "Zone_1".to_string(),
            block: "Block_1".to_string(),
            pipe: "Pipe_1".to_string(),
            location: GeoPoint { lat: 0.0, lon: 0.0 },
            flow_rate: 48.0,
            pressure: 60.0,
            temperature: 20.0,
            rpm: 1000.0,
            operational_hours: 500.0,
            vibration: 0.5,
            leak_flag: false,
        }
    }

    #[test]
    fn test_predict_is_linear_in_conditions() {
        let model = BaselineModel::from_artifact(artifact()).unwrap();
        let expected = 10.0 + 0.5 * 60.0 + 0.1 * 20.0 + 0.01 * 1000.0 + 0.0 * 500.0 - 2.0 * 0.5;
        assert!((model.predict(&record()) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_predict_is_deterministic() {
        let model = BaselineModel::from_artifact(artifact()).unwrap();
        let r = record();
        assert_eq!(model.predict(&r).to_bits(), model.predict(&r).to_bits());
    }

    #[test]
    fn test_artifact_file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&artifact()).unwrap()).unwrap();

        let model = BaselineModel::load(file.path()).unwrap();
        assert_eq!(model.features().len(), 5);
    }

    #[test]
    fn test_missing_artifact_is_fatal() {
        let err = BaselineModel::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, BaselineError::NotFound { .. }));
    }

    #[test]
    fn test_unknown_feature_rejected_at_load() {
        let mut bad = artifact();
        bad.features[0] = "flux_capacitance".to_string();
        let err = BaselineModel::from_artifact(bad).unwrap_err();
        assert!(matches!(err, BaselineError::UnknownFeature(_)));
    }

    #[test]
    fn test_coefficient_count_must_match() {
        let mut bad = artifact();
        bad.coefficients.pop();
        let err = BaselineModel::from_artifact(bad).unwrap_err();
        assert!(matches!(err, BaselineError::CoefficientMismatch { .. }));
    }

    #[test]
    fn test_cache_computes_once() {
        let mut cache = PredictionCache::new();
        let mut calls = 0;
        let first = cache.get_or_insert_with(7, || {
            calls += 1;
            42.0
        });
        let mut calls2 = 0;
        let second = cache.get_or_insert_with(7, || {
            calls2 += 1;
            99.0
        });
        assert_eq!(first, 42.0);
        assert_eq!(second, 42.0);
        assert_eq!(calls, 1);
        assert_eq!(calls2, 0);
        assert_eq!(cache.len(), 1);
    }
}
