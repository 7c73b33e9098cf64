//! Network State Registry
//!
//! Per-segment mutable state, keyed by segment identifier. Segments are
//! created lazily on first encounter in the data source and live for the
//! whole process — there is no eviction and no persistence across runs.
//!
//! The registry is passed explicitly into the digital twin's construction so
//! tests can inject isolated instances; there is no global singleton.

use crate::types::{GeoPoint, HealthStatus, SensorRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default pipe roughness coefficient. Per-segment survey values are a
/// planned future input; until then every segment carries this constant.
pub const DEFAULT_ROUGHNESS: f64 = 0.01;

/// Mutable state for one uniquely identified stretch of pipe.
///
/// Mutated only by the calibration layer; everything else reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub zone: String,
    pub block: String,
    pub pipe: String,
    pub location: GeoPoint,
    /// Additive correction applied to baseline predictions.
    /// `None` means the segment has not calibrated yet.
    pub calibration_offset: Option<f64>,
    /// Pipe roughness coefficient, currently the network-wide constant
    pub roughness: f64,
    pub health: HealthStatus,
}

impl Segment {
    /// Build an uncalibrated segment from its first sensor record
    pub fn from_record(record: &SensorRecord) -> Self {
        Self {
            zone: record.zone.clone(),
            block: record.block.clone(),
            pipe: record.pipe.clone(),
            location: record.location,
            calibration_offset: None,
            roughness: DEFAULT_ROUGHNESS,
            health: HealthStatus::Healthy,
        }
    }

    /// Effective calibration offset: zero while uncalibrated
    pub fn offset(&self) -> f64 {
        self.calibration_offset.unwrap_or(0.0)
    }
}

/// Registry of all segments seen so far
#[derive(Debug, Default)]
pub struct NetworkState {
    segments: HashMap<String, Segment>,
}

impl NetworkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a segment's state, creating it from the record on first
    /// encounter. Unknown identifiers are never an error.
    pub fn segment_or_create(&mut self, record: &SensorRecord) -> &mut Segment {
        self.segments
            .entry(record.segment_id.clone())
            .or_insert_with(|| Segment::from_record(record))
    }

    pub fn get(&self, segment_id: &str) -> Option<&Segment> {
        self.segments.get(segment_id)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Count of segments currently holding a calibration offset
    pub fn calibrated_count(&self) -> usize {
        self.segments
            .values()
            .filter(|s| s.calibration_offset.is_some())
            .count()
    }
}
