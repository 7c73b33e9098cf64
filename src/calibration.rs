//! Calibration Store
//!
//! Absorbs systematic, non-leak flow offsets per segment so the same benign
//! bias stops triggering detections. This is NOT online retraining of the
//! baseline estimator — it only nudges the expectation the estimator
//! produced, and only when the recent residual history looks like a small,
//! consistent, non-leak-associated offset.
//!
//! Gate (all three must hold, with at least `min_samples` entries banked):
//! - residual standard deviation below `max_residual_std`
//! - fraction of leak-flagged entries below `max_leak_rate`
//! - mean residual magnitude above `min_mean_offset`
//!
//! A segment oscillating between leak and non-leak verdicts, or one with
//! noisy residuals, never calibrates.

use crate::config::CalibrationConfig;
use crate::network::Segment;
use crate::types::HealthStatus;
use statrs::statistics::Statistics;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Leak-verdict fraction at which a segment is tagged for maintenance review
const DEGRADED_LEAK_RATE: f64 = 0.5;

/// One banked observation: realized flow residual plus whether the fused
/// verdict that produced it was LEAK.
#[derive(Debug, Clone, Copy)]
struct CalibrationSample {
    residual: f64,
    was_leak: bool,
}

/// Per-segment rolling residual history driving offset updates.
///
/// Windows are bounded deques (capacity from config, default 50) with FIFO
/// eviction, so the capacity invariant is structural. Entries must arrive in
/// record order for a given segment — the window is temporal.
#[derive(Debug)]
pub struct CalibrationStore {
    config: CalibrationConfig,
    windows: HashMap<String, VecDeque<CalibrationSample>>,
}

impl CalibrationStore {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
        }
    }

    /// Bank one residual observation for a segment and apply a calibration
    /// update if the gate opens. Returns whether calibration fired — callers
    /// use this for display and audit only, never for control flow.
    pub fn observe(&mut self, segment_id: &str, segment: &mut Segment, residual: f64, was_leak: bool) -> bool {
        let capacity = self.config.window;
        let window = self
            .windows
            .entry(segment_id.to_string())
            .or_insert_with(|| VecDeque::with_capacity(capacity));

        if window.len() == capacity {
            window.pop_front();
        }
        window.push_back(CalibrationSample { residual, was_leak });

        if window.len() < self.config.min_samples {
            return false;
        }

        let residuals: Vec<f64> = window.iter().map(|s| s.residual).collect();
        let mean = residuals.iter().mean();
        // Population std, matching how the gate thresholds were tuned
        let std = residuals.iter().population_std_dev();
        let leak_rate =
            window.iter().filter(|s| s.was_leak).count() as f64 / window.len() as f64;

        // A window dominated by leak verdicts marks the segment for
        // maintenance review. Calibration itself stays blocked below.
        if leak_rate >= DEGRADED_LEAK_RATE {
            segment.health = HealthStatus::Degraded;
        }

        let gate_open = std < self.config.max_residual_std
            && leak_rate < self.config.max_leak_rate
            && mean.abs() > self.config.min_mean_offset;

        if !gate_open {
            return false;
        }

        match segment.calibration_offset {
            None => {
                segment.calibration_offset = Some(mean);
                debug!(
                    segment = segment_id,
                    offset = mean,
                    "Calibration offset established"
                );
            }
            Some(ref mut offset) => {
                // Damped update so an already-calibrated segment converges
                // instead of oscillating
                *offset += mean * self.config.smoothing;
                debug!(
                    segment = segment_id,
                    offset = *offset,
                    nudge = mean * self.config.smoothing,
                    "Calibration offset nudged"
                );
            }
        }

        true
    }

    /// Number of banked observations for a segment
    pub fn window_len(&self, segment_id: &str) -> usize {
        self.windows.get(segment_id).map_or(0, VecDeque::len)
    }

    /// Oldest banked residual for a segment, if any
    pub fn oldest_residual(&self, segment_id: &str) -> Option<f64> {
        self.windows
            .get(segment_id)
            .and_then(|w| w.front())
            .map(|s| s.residual)
    }
}

impl Default for CalibrationStore {
    fn default() -> Self {
        Self::new(CalibrationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoPoint, HealthStatus};

    const PIPE: &str = "Zone_1_Block_1_Pipe_1";

    fn segment() -> Segment {
        Segment {
            zone: "Zone_1".to_string(),
            block: "Block_1".to_string(),
            pipe: "Pipe_1".to_string(),
            location: GeoPoint::default(),
            calibration_offset: None,
            roughness: 0.01,
            health: HealthStatus::Healthy,
        }
    }

    #[test]
    fn test_never_fires_before_min_samples() {
        let mut store = CalibrationStore::default();
        let mut seg = segment();
        // 19 extreme but consistent residuals: still below the sample floor
        for _ in 0..19 {
            assert!(!store.observe(PIPE, &mut seg, 40.0, false));
        }
        assert!(seg.calibration_offset.is_none());
    }

    #[test]
    fn test_consistent_offset_calibrates_at_min_samples() {
        let mut store = CalibrationStore::default();
        let mut seg = segment();
        for i in 0..20 {
            let fired = store.observe(PIPE, &mut seg, 4.0, false);
            assert_eq!(fired, i == 19, "should fire exactly on the 20th sample");
        }
        assert_eq!(seg.calibration_offset, Some(4.0));
    }

    #[test]
    fn test_existing_offset_gets_damped_update() {
        let mut store = CalibrationStore::default();
        let mut seg = segment();
        for _ in 0..20 {
            store.observe(PIPE, &mut seg, 4.0, false);
        }
        assert_eq!(seg.calibration_offset, Some(4.0));

        // Next consistent observation nudges by mean * 0.1, not a reset
        assert!(store.observe(PIPE, &mut seg, 4.0, false));
        let offset = seg.calibration_offset.unwrap();
        assert!((offset - 4.4).abs() < 1e-9);
    }

    #[test]
    fn test_high_variance_never_calibrates() {
        let mut store = CalibrationStore::default();
        let mut seg = segment();
        // Mean ~10 but wildly noisy: std far above the gate
        for i in 0..50 {
            let residual = if i % 2 == 0 { 30.0 } else { -10.0 };
            assert!(!store.observe(PIPE, &mut seg, residual, false));
        }
        assert!(seg.calibration_offset.is_none());
    }

    #[test]
    fn test_leak_heavy_window_never_calibrates() {
        let mut store = CalibrationStore::default();
        let mut seg = segment();
        // Consistent offset but 20% of entries carried a leak verdict
        for i in 0..50 {
            assert!(!store.observe(PIPE, &mut seg, 4.0, i % 5 == 0));
        }
        assert!(seg.calibration_offset.is_none());
    }

    #[test]
    fn test_small_mean_offset_not_worth_absorbing() {
        let mut store = CalibrationStore::default();
        let mut seg = segment();
        for _ in 0..50 {
            assert!(!store.observe(PIPE, &mut seg, 2.0, false));
        }
        assert!(seg.calibration_offset.is_none());
    }

    #[test]
    fn test_leak_dominated_window_degrades_health() {
        let mut store = CalibrationStore::default();
        let mut seg = segment();
        for _ in 0..30 {
            store.observe(PIPE, &mut seg, 10.0, true);
        }
        assert_eq!(seg.health, HealthStatus::Degraded);
        assert!(seg.calibration_offset.is_none());
    }

    #[test]
    fn test_window_capped_with_fifo_eviction() {
        let mut store = CalibrationStore::default();
        let mut seg = segment();
        // First entry is distinguishable
        store.observe(PIPE, &mut seg, -99.0, true);
        for _ in 0..49 {
            store.observe(PIPE, &mut seg, 1.0, true);
        }
        assert_eq!(store.window_len(PIPE), 50);
        assert_eq!(store.oldest_residual(PIPE), Some(-99.0));

        // The 51st entry evicts exactly the oldest
        store.observe(PIPE, &mut seg, 1.0, true);
        assert_eq!(store.window_len(PIPE), 50);
        assert_eq!(store.oldest_residual(PIPE), Some(1.0));
    }
}
