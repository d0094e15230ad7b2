use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::calibration::ComponentAccuracy;
use crate::persist::SnapshotStore;

/// Blend weights for `stat_model_prob`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    #[serde(rename = "STAT_ELO_WEIGHT")]
    pub elo: f64,
    #[serde(rename = "STAT_FORM_WEIGHT")]
    pub form: f64,
    #[serde(rename = "STAT_RECORD_WEIGHT")]
    pub record: f64,
    #[serde(rename = "STAT_H2H_WEIGHT")]
    pub h2h: f64,
    #[serde(rename = "STAT_INJURY_WEIGHT")]
    pub injury: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            elo: 0.40,
            form: 0.20,
            record: 0.15,
            h2h: 0.10,
            injury: 0.15,
        }
    }
}

impl BlendWeights {
    pub const KEYS: [&'static str; 5] = [
        "STAT_ELO_WEIGHT",
        "STAT_FORM_WEIGHT",
        "STAT_RECORD_WEIGHT",
        "STAT_H2H_WEIGHT",
        "STAT_INJURY_WEIGHT",
    ];

    pub fn to_array(self) -> [f64; 5] {
        [self.elo, self.form, self.record, self.h2h, self.injury]
    }

    pub fn from_array(w: [f64; 5]) -> Self {
        Self {
            elo: w[0],
            form: w[1],
            record: w[2],
            h2h: w[3],
            injury: w[4],
        }
    }

    pub fn sum(self) -> f64 {
        self.to_array().iter().sum()
    }

    pub fn is_valid(self) -> bool {
        self.to_array().iter().all(|w| w.is_finite() && *w >= 0.0) && self.sum() > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationEntry {
    pub timestamp: String,
    pub predictions_analyzed: usize,
    pub accuracy_before: f64,
    pub brier_before: f64,
    pub brier_after: f64,
    pub weight_changes: BTreeMap<String, f64>,
    #[serde(default)]
    pub component_accuracy: BTreeMap<String, ComponentAccuracy>,
}

/// Persisted calibration state: current weights plus an append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsFile {
    pub current_weights: BlendWeights,
    #[serde(default)]
    pub last_calibrated: Option<String>,
    #[serde(default)]
    pub calibration_history: Vec<CalibrationEntry>,
    #[serde(default)]
    pub component_accuracy: BTreeMap<String, ComponentAccuracy>,
}

impl Default for WeightsFile {
    fn default() -> Self {
        Self {
            current_weights: BlendWeights::default(),
            last_calibrated: None,
            calibration_history: Vec::new(),
            component_accuracy: BTreeMap::new(),
        }
    }
}

/// Readers take an `Arc` snapshot; the calibrator swaps in a new one.
pub struct WeightsStore {
    current: RwLock<Arc<BlendWeights>>,
    file: Mutex<WeightsFile>,
    calibrating: Mutex<()>,
    backend: Arc<dyn SnapshotStore<WeightsFile>>,
}

impl WeightsStore {
    pub fn open(backend: Arc<dyn SnapshotStore<WeightsFile>>) -> Self {
        let file = match backend.load() {
            Ok(Some(file)) if file.current_weights.is_valid() => file,
            Ok(Some(_)) => {
                warn!("stored blend weights are invalid, using defaults");
                WeightsFile::default()
            }
            Ok(None) => WeightsFile::default(),
            Err(err) => {
                warn!(error = %err, "could not load blend weights, using defaults");
                WeightsFile::default()
            }
        };
        Self {
            current: RwLock::new(Arc::new(file.current_weights)),
            file: Mutex::new(file),
            calibrating: Mutex::new(()),
            backend,
        }
    }

    pub fn snapshot(&self) -> Arc<BlendWeights> {
        self.current.read().clone()
    }

    pub fn state(&self) -> WeightsFile {
        self.file.lock().clone()
    }

    /// Single-writer token for calibration runs against this store. `None`
    /// while another run, from any calibrator, holds it.
    pub fn try_begin_calibration(&self) -> Option<MutexGuard<'_, ()>> {
        self.calibrating.try_lock()
    }

    /// Records a calibration result, persists it, then publishes the new weights.
    pub fn commit(&self, weights: BlendWeights, entry: CalibrationEntry) {
        let mut file = self.file.lock();
        file.current_weights = weights;
        file.last_calibrated = Some(entry.timestamp.clone());
        file.component_accuracy = entry.component_accuracy.clone();
        file.calibration_history.push(entry);
        if let Err(err) = self.backend.save(&file) {
            warn!(error = %err, "failed to persist blend weights, keeping in-memory state");
        }
        *self.current.write() = Arc::new(weights);
        info!(?weights, "published blend weights");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;

    #[test]
    fn serializes_with_upper_case_keys() {
        let json = serde_json::to_value(BlendWeights::default()).unwrap();
        for key in BlendWeights::KEYS {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert!((BlendWeights::default().sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_stored_weights_fall_back_to_default() {
        let mut file = WeightsFile::default();
        file.current_weights.elo = f64::NAN;
        let store = WeightsStore::open(Arc::new(MemoryStore::with_value(file)));
        assert_eq!(*store.snapshot(), BlendWeights::default());
    }

    #[test]
    fn commit_swaps_snapshot_but_old_arc_is_unchanged() {
        let store = WeightsStore::open(Arc::new(MemoryStore::new()));
        let before = store.snapshot();
        let next = BlendWeights::from_array([0.42, 0.18, 0.15, 0.10, 0.15]);
        store.commit(
            next,
            CalibrationEntry {
                timestamp: "2024-03-01T00:00:00Z".to_string(),
                predictions_analyzed: 60,
                accuracy_before: 0.6,
                brier_before: 0.22,
                brier_after: 0.21,
                weight_changes: BTreeMap::new(),
                component_accuracy: BTreeMap::new(),
            },
        );
        assert_eq!(*before, BlendWeights::default());
        assert_eq!(*store.snapshot(), next);
        let state = store.state();
        assert_eq!(state.calibration_history.len(), 1);
        assert_eq!(state.last_calibrated.as_deref(), Some("2024-03-01T00:00:00Z"));
    }
}
