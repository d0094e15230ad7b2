use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use matchup_edge::calibration::{CalibratorConfig, WeightCalibrator};
use matchup_edge::outcomes::VerifiedPrediction;
use matchup_edge::persist::MemoryStore;
use matchup_edge::weights::{BlendWeights, WeightsStore};

fn noisy_records(n: usize, seed: u64) -> Vec<VerifiedPrediction> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let truth: f64 = rng.gen_range(0.2..0.8);
            let home_won = rng.r#gen::<f64>() < truth;
            let elo = (truth + rng.gen_range(-0.05..0.05)).clamp(0.05, 0.95);
            let form = (0.5 + rng.gen_range(-0.2f64..0.2)).clamp(0.05, 0.95);
            let stat = (0.6 * elo + 0.4 * form).clamp(0.1, 0.9);
            VerifiedPrediction {
                game_id: format!("g{i}"),
                elo_prob: elo,
                form_prob: form,
                stat_model_prob: stat,
                market_prob: (i % 3 == 0).then_some(truth),
                home_win_prob: (0.7 * stat + 0.3 * truth).clamp(0.05, 0.95),
                home_won,
            }
        })
        .collect()
}

fn calibrator(config: CalibratorConfig) -> (WeightCalibrator, Arc<WeightsStore>) {
    let store = Arc::new(WeightsStore::open(Arc::new(MemoryStore::new())));
    (WeightCalibrator::new(store.clone(), config), store)
}

#[test]
fn too_few_predictions_change_nothing() {
    let (cal, store) = calibrator(CalibratorConfig::default());
    let before = store.snapshot();
    let records = noisy_records(49, 1);

    let report = cal.calibrate(records.as_slice());
    assert!(!report.success);
    assert!(report.message.contains("need 50"), "{}", report.message);
    assert_eq!(report.predictions_analyzed, 49);
    assert_eq!(report.weights_after, None);
    assert!(report.weight_changes.is_empty());

    assert!(Arc::ptr_eq(&before, &store.snapshot()));
    let state = store.state();
    assert!(state.calibration_history.is_empty());
    assert!(state.last_calibrated.is_none());
}

#[test]
fn calibration_moves_each_weight_within_cap() {
    let config = CalibratorConfig {
        min_predictions: 50,
        max_adjustment: 0.05,
    };
    let (cal, store) = calibrator(config);
    let held = store.snapshot();
    let records = noisy_records(240, 7);

    let report = cal.calibrate(records.as_slice());
    assert!(report.success, "{}", report.message);
    assert_eq!(report.predictions_analyzed, 240);

    let after = report.weights_after.expect("weights after success");
    assert!((after.sum() - 1.0).abs() < 1e-9, "{after:?}");
    for (old, new) in report.weights_before.to_array().iter().zip(after.to_array()) {
        assert!((old - new).abs() <= config.max_adjustment + 1e-9);
        assert!(new >= 0.0);
    }
    assert_eq!(report.weight_changes.len(), BlendWeights::KEYS.len());
    assert!(report.brier_before.is_some_and(f64::is_finite));
    assert!(report.brier_after.is_some_and(f64::is_finite));
    assert!(report.component_accuracy.contains_key("elo_prob"));
    assert!(report.component_accuracy.contains_key("market_prob"));

    // Readers holding the old snapshot keep seeing it; new readers see the update.
    assert_eq!(*held, BlendWeights::default());
    assert_eq!(*store.snapshot(), after);
    let state = store.state();
    assert_eq!(state.calibration_history.len(), 1);
    assert_eq!(state.current_weights, after);
    assert!(state.last_calibrated.is_some());
}

#[test]
fn status_tracks_calibration_runs() {
    let (cal, _) = calibrator(CalibratorConfig::default());
    let few = noisy_records(20, 3);
    let status = cal.status(few.as_slice(), Utc::now());
    assert!(!status.calibrated);
    assert_eq!(status.calibration_count, 0);
    assert!(status.recommendations[0].starts_with("Need 30 more"));
    assert_eq!(status.overall.samples, 20);

    let many = noisy_records(120, 11);
    assert!(cal.calibrate(many.as_slice()).success);
    let status = cal.status(many.as_slice(), Utc::now());
    assert!(status.calibrated);
    assert_eq!(status.calibration_count, 1);
    assert_eq!(status.recent_history.len(), 1);
    assert!(!status.recommendations.is_empty());
}

#[test]
fn overlapping_runs_never_lose_a_commit() {
    let (cal, store) = calibrator(CalibratorConfig::default());
    let records = noisy_records(150, 5);

    let successes = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| cal.calibrate(records.as_slice()).success))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("calibration thread"))
            .filter(|ok| *ok)
            .count()
    });

    assert!(successes >= 1);
    let state = store.state();
    assert_eq!(state.calibration_history.len(), successes);
    assert!(state.current_weights.is_valid());
}

#[test]
fn exactly_minimum_predictions_calibrates() {
    let config = CalibratorConfig::default();
    let (cal, store) = calibrator(config);
    let records = noisy_records(config.min_predictions, 13);

    let report = cal.calibrate(records.as_slice());
    assert!(report.success, "{}", report.message);
    assert_eq!(report.predictions_analyzed, 50);

    let after = report.weights_after.expect("weights after success");
    assert!((after.sum() - 1.0).abs() < 1e-9, "{after:?}");
    for (old, new) in report.weights_before.to_array().iter().zip(after.to_array()) {
        assert!((old - new).abs() <= config.max_adjustment + 1e-9);
    }
    assert_eq!(store.state().calibration_history.len(), 1);
}

#[test]
fn separate_calibrators_share_one_run_guard() {
    let store = Arc::new(WeightsStore::open(Arc::new(MemoryStore::new())));
    let first = WeightCalibrator::new(store.clone(), CalibratorConfig::default());
    let second = WeightCalibrator::new(store.clone(), CalibratorConfig::default());
    let records = noisy_records(150, 9);

    let held = store.try_begin_calibration().expect("guard is free");
    for cal in [&first, &second] {
        let report = cal.calibrate(records.as_slice());
        assert!(!report.success);
        assert!(report.message.contains("in progress"), "{}", report.message);
    }
    drop(held);

    let shared = records.as_slice();
    let successes = std::thread::scope(|scope| {
        let handles: Vec<_> = [&first, &second, &first, &second]
            .into_iter()
            .map(|cal| scope.spawn(move || cal.calibrate(shared)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("calibration thread"))
            .filter(|r| r.success)
            .collect::<Vec<_>>()
    });

    let state = store.state();
    assert_eq!(state.calibration_history.len(), successes.len());
    // Every run after the first starts from weights another run published.
    for report in &successes {
        let base = report.weights_before;
        assert!(
            base == BlendWeights::default()
                || successes.iter().any(|r| r.weights_after == Some(base)),
            "{base:?}"
        );
    }
    assert!(state.current_weights.is_valid());
}
