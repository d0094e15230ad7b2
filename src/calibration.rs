use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::opt::{HypergridSearchConfig, hypergrid_search};
use crate::outcomes::{OutcomeSource, VerifiedPrediction};
use crate::weights::{BlendWeights, CalibrationEntry, WeightsStore};

pub const DEFAULT_MIN_PREDICTIONS: usize = 50;
pub const DEFAULT_MAX_ADJUSTMENT: f64 = 0.05;
/// Per-component sample floor for accuracy reporting.
pub const COMPONENT_MIN_SAMPLES: usize = 10;
/// Share of the blend the optimized trio is rescaled to; H2H and injury keep the rest.
const OPTIMIZED_SHARE: f64 = 0.85;
const STALE_AFTER_HOURS: i64 = 168;
const HISTORY_IN_STATUS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

impl Metrics {
    pub fn empty() -> Self {
        Self {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

/// Brier, log loss and directional accuracy for home-win probabilities.
pub fn evaluate_probs(predictions: &[f64], outcomes: &[bool]) -> Metrics {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::empty();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (&p, &home_won) in predictions.iter().zip(outcomes) {
        let y = if home_won { 1.0 } else { 0.0 };
        brier_sum += (p - y).powi(2);

        let actual_prob = if home_won { p } else { 1.0 - p }.clamp(1e-12, 1.0);
        log_loss_sum += -actual_prob.ln();

        if (p > 0.5) == home_won {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

pub fn calibration_bins(predictions: &[f64], outcomes: &[bool], bins: usize) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (&p, &home_won) in predictions.iter().zip(outcomes) {
        let p = p.clamp(0.0, 1.0);
        let idx = ((p * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += p;
        if home_won {
            actual_sum[idx] += 1.0;
        }
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentAccuracy {
    pub accuracy: f64,
    pub brier_score: f64,
    pub log_loss: f64,
    pub count: usize,
}

/// Accuracy per model component; components with fewer than `min_samples`
/// usable probabilities are left out.
pub fn component_accuracy(
    records: &[VerifiedPrediction],
    min_samples: usize,
) -> BTreeMap<String, ComponentAccuracy> {
    type Pick = fn(&VerifiedPrediction) -> Option<f64>;
    let components: [(&str, Pick); 5] = [
        ("elo_prob", |r| Some(r.elo_prob)),
        ("form_prob", |r| Some(r.form_prob)),
        ("stat_model_prob", |r| Some(r.stat_model_prob)),
        ("market_prob", |r| r.market_prob),
        ("home_win_prob", |r| Some(r.home_win_prob)),
    ];

    let mut out = BTreeMap::new();
    for (name, pick) in components {
        let (preds, actuals): (Vec<f64>, Vec<bool>) = records
            .iter()
            .filter_map(|r| pick(r).filter(|p| p.is_finite()).map(|p| (p, r.home_won)))
            .unzip();
        if preds.len() < min_samples.max(1) {
            continue;
        }
        let m = evaluate_probs(&preds, &actuals);
        out.insert(
            name.to_string(),
            ComponentAccuracy {
                accuracy: m.accuracy,
                brier_score: m.brier,
                log_loss: m.log_loss,
                count: m.samples,
            },
        );
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibratorConfig {
    pub min_predictions: usize,
    pub max_adjustment: f64,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            min_predictions: DEFAULT_MIN_PREDICTIONS,
            max_adjustment: DEFAULT_MAX_ADJUSTMENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub success: bool,
    pub message: String,
    pub predictions_analyzed: usize,
    pub weights_before: BlendWeights,
    pub weights_after: Option<BlendWeights>,
    pub weight_changes: BTreeMap<String, f64>,
    pub accuracy_before: f64,
    pub brier_before: Option<f64>,
    pub brier_after: Option<f64>,
    pub component_accuracy: BTreeMap<String, ComponentAccuracy>,
}

impl CalibrationReport {
    fn failure(message: String, weights: BlendWeights, analyzed: usize) -> Self {
        Self {
            success: false,
            message,
            predictions_analyzed: analyzed,
            weights_before: weights,
            weights_after: None,
            weight_changes: BTreeMap::new(),
            accuracy_before: 0.0,
            brier_before: None,
            brier_after: None,
            component_accuracy: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStatus {
    pub calibrated: bool,
    pub last_calibrated: Option<String>,
    pub current_weights: BlendWeights,
    pub calibration_count: usize,
    pub component_accuracy: BTreeMap<String, ComponentAccuracy>,
    pub recent_history: Vec<CalibrationEntry>,
    pub overall: Metrics,
    pub recommendations: Vec<String>,
}

/// Sample used by the blend objective: elo, form, record proxy, actual.
#[derive(Debug, Clone, Copy)]
struct Sample {
    elo: f64,
    form: f64,
    record: f64,
    actual: f64,
}

impl Sample {
    fn from_record(r: &VerifiedPrediction) -> Self {
        let neutral = |p: f64| if p.is_finite() { p } else { 0.5 };
        Self {
            elo: neutral(r.elo_prob),
            form: neutral(r.form_prob),
            record: neutral(r.stat_model_prob),
            actual: if r.home_won { 1.0 } else { 0.0 },
        }
    }
}

fn blend_brier(samples: &[Sample], w: &[f64]) -> f64 {
    if samples.is_empty() {
        return f64::INFINITY;
    }
    let sum: f64 = samples
        .iter()
        .map(|s| (w[0] * s.elo + w[1] * s.form + w[2] * s.record - s.actual).powi(2))
        .sum();
    sum / samples.len() as f64
}

fn feasible(w: &[f64]) -> bool {
    let total: f64 = w.iter().sum();
    w.iter().all(|x| *x >= 0.0) && (0.5..=1.0).contains(&total)
}

/// Rescales the optimized trio, caps every move at `max_adjustment`, and
/// renormalizes to 1. If renormalizing pushes a move past the cap, the whole
/// move is shrunk uniformly until it fits.
pub fn adjust_weights(old: BlendWeights, optimized: [f64; 3], max_adjustment: f64) -> BlendWeights {
    let trio: f64 = optimized.iter().sum();
    let scale = if trio > 0.0 { OPTIMIZED_SHARE / trio } else { 0.0 };
    let old_w = old.to_array();
    let proposed = [
        optimized[0] * scale,
        optimized[1] * scale,
        optimized[2] * scale,
        old.h2h,
        old.injury,
    ];

    let mut clipped = [0.0; 5];
    for i in 0..5 {
        clipped[i] = old_w[i] + (proposed[i] - old_w[i]).clamp(-max_adjustment, max_adjustment);
    }
    let total: f64 = clipped.iter().sum();
    if total <= 0.0 {
        return old;
    }
    let renorm = clipped.map(|w| w / total);

    let largest_move = (0..5)
        .map(|i| (renorm[i] - old_w[i]).abs())
        .fold(0.0_f64, f64::max);
    let t = if largest_move > max_adjustment {
        max_adjustment / largest_move
    } else {
        1.0
    };
    let mut out = [0.0; 5];
    for i in 0..5 {
        out[i] = old_w[i] + t * (renorm[i] - old_w[i]);
    }
    BlendWeights::from_array(out)
}

/// Offline optimizer for the `stat_model_prob` blend weights.
pub struct WeightCalibrator {
    weights: Arc<WeightsStore>,
    config: CalibratorConfig,
}

impl WeightCalibrator {
    pub fn new(weights: Arc<WeightsStore>, config: CalibratorConfig) -> Self {
        Self {
            weights,
            config,
        }
    }

    pub fn config(&self) -> CalibratorConfig {
        self.config
    }

    pub fn calibrate<S>(&self, source: &S) -> CalibrationReport
    where
        S: OutcomeSource + ?Sized,
    {
        let Some(_guard) = self.weights.try_begin_calibration() else {
            warn!("calibration already running, rejecting concurrent run");
            let current = *self.weights.snapshot();
            return CalibrationReport::failure("Calibration already in progress".to_string(), current, 0);
        };
        let current = *self.weights.snapshot();

        let records = match source.verified_predictions() {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "could not load verified predictions");
                return CalibrationReport::failure(
                    format!("Could not load verified predictions: {err:#}"),
                    current,
                    0,
                );
            }
        };

        let component_accuracy = component_accuracy(&records, COMPONENT_MIN_SAMPLES);
        let finals: Vec<f64> = records.iter().map(|r| r.home_win_prob).collect();
        let actuals: Vec<bool> = records.iter().map(|r| r.home_won).collect();
        let accuracy_before = evaluate_probs(&finals, &actuals).accuracy;

        if records.len() < self.config.min_predictions {
            warn!(
                have = records.len(),
                need = self.config.min_predictions,
                "not enough verified predictions for calibration"
            );
            let mut report = CalibrationReport::failure(
                format!(
                    "Not enough data for calibration (need {} verified predictions, have {})",
                    self.config.min_predictions,
                    records.len()
                ),
                current,
                records.len(),
            );
            report.accuracy_before = accuracy_before;
            report.component_accuracy = component_accuracy;
            return report;
        }

        let samples: Vec<Sample> = records.iter().map(Sample::from_record).collect();
        let seed = vec![current.elo, current.form, current.record];
        let search = HypergridSearchConfig {
            max_steps: 12,
            acceptable_residual: 0.0,
            bounds: vec![0.1..=0.7, 0.05..=0.5, 0.05..=0.4],
            resolution: 9,
            init_values: Some(seed.clone()),
        };
        let outcome = match hypergrid_search(&search, feasible, |w| blend_brier(&samples, w)) {
            Ok(outcome) if outcome.found() => outcome,
            Ok(_) => {
                return CalibrationReport::failure(
                    "Optimization found no feasible weights".to_string(),
                    current,
                    records.len(),
                );
            }
            Err(err) => {
                return CalibrationReport::failure(
                    format!("Optimization failed: {err:#}"),
                    current,
                    records.len(),
                );
            }
        };

        let optimized = [
            outcome.optimal_values[0],
            outcome.optimal_values[1],
            outcome.optimal_values[2],
        ];
        let adjusted = adjust_weights(current, optimized, self.config.max_adjustment);
        let brier_before = blend_brier(&samples, &seed);
        let brier_after = blend_brier(&samples, &[adjusted.elo, adjusted.form, adjusted.record]);

        let weight_changes: BTreeMap<String, f64> = BlendWeights::KEYS
            .iter()
            .zip(current.to_array().iter().zip(adjusted.to_array()))
            .map(|(key, (old, new))| (key.to_string(), new - old))
            .collect();

        let entry = CalibrationEntry {
            timestamp: Utc::now().to_rfc3339(),
            predictions_analyzed: records.len(),
            accuracy_before,
            brier_before,
            brier_after,
            weight_changes: weight_changes.clone(),
            component_accuracy: component_accuracy.clone(),
        };
        self.weights.commit(adjusted, entry);
        info!(
            analyzed = records.len(),
            brier_before, brier_after, "calibration complete"
        );

        CalibrationReport {
            success: true,
            message: "Calibration successful".to_string(),
            predictions_analyzed: records.len(),
            weights_before: current,
            weights_after: Some(adjusted),
            weight_changes,
            accuracy_before,
            brier_before: Some(brier_before),
            brier_after: Some(brier_after),
            component_accuracy,
        }
    }

    pub fn status<S>(&self, source: &S, now: DateTime<Utc>) -> CalibrationStatus
    where
        S: OutcomeSource + ?Sized,
    {
        let state = self.weights.state();
        let records = source.verified_predictions().unwrap_or_else(|err| {
            warn!(error = %err, "could not load verified predictions for status");
            Vec::new()
        });
        let finals: Vec<f64> = records.iter().map(|r| r.home_win_prob).collect();
        let actuals: Vec<bool> = records.iter().map(|r| r.home_won).collect();
        let overall = evaluate_probs(&finals, &actuals);

        let calibrated = state.last_calibrated.is_some();
        let recommendations = recommendations(
            records.len(),
            self.config.min_predictions,
            calibrated,
            state.last_calibrated.as_deref(),
            &state.component_accuracy,
            now,
        );
        let skip = state.calibration_history.len().saturating_sub(HISTORY_IN_STATUS);
        CalibrationStatus {
            calibrated,
            last_calibrated: state.last_calibrated.clone(),
            current_weights: *self.weights.snapshot(),
            calibration_count: state.calibration_history.len(),
            component_accuracy: state.component_accuracy.clone(),
            recent_history: state.calibration_history[skip..].to_vec(),
            overall,
            recommendations,
        }
    }
}

fn recommendations(
    verified: usize,
    min_predictions: usize,
    calibrated: bool,
    last_calibrated: Option<&str>,
    components: &BTreeMap<String, ComponentAccuracy>,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut out = Vec::new();
    if verified < min_predictions {
        out.push(format!(
            "Need {} more verified predictions before calibration can run",
            min_predictions - verified
        ));
    } else if !calibrated {
        out.push("Run initial calibration to optimize model weights".to_string());
    } else if let Some(last) = last_calibrated.and_then(|s| DateTime::parse_from_rfc3339(s).ok()) {
        let hours = (now - last.with_timezone(&Utc)).num_hours();
        if hours > STALE_AFTER_HOURS {
            out.push("Consider re-running calibration (last run over 1 week ago)".to_string());
        }
    }

    for (name, acc) in components {
        if acc.accuracy < 0.5 {
            out.push(format!(
                "Component '{name}' has low accuracy ({:.1}%), may need investigation",
                acc.accuracy * 100.0
            ));
        }
    }

    if out.is_empty() {
        out.push("Model is well-calibrated. Continue monitoring performance.".to_string());
    }
    out
}
