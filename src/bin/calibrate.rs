use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;

use matchup_edge::calibration::WeightCalibrator;
use matchup_edge::config::{self, Settings};
use matchup_edge::outcomes::PredictionLedger;
use matchup_edge::persist::JsonFileStore;
use matchup_edge::weights::{BlendWeights, WeightsStore};

fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();
    let settings = Settings::from_env();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let status_only = args.iter().any(|a| a == "--status");
    let as_json = args.iter().any(|a| a == "--json");
    let days_back = parse_days_arg(&args);

    let ledger = PredictionLedger::open(Arc::new(JsonFileStore::new(settings.ledger_path())));
    let weights = Arc::new(WeightsStore::open(Arc::new(JsonFileStore::new(
        settings.weights_path(),
    ))));
    let calibrator = WeightCalibrator::new(weights, settings.calibrator());
    let now = Utc::now();

    if !status_only {
        let report = calibrator.calibrate(&ledger);
        if as_json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("Calibration: {}", report.message);
            println!("Predictions analyzed: {}", report.predictions_analyzed);
            println!("Before: {}", weights_line(&report.weights_before));
            if let Some(after) = &report.weights_after {
                println!("After:  {}", weights_line(after));
            }
            if let (Some(before), Some(after)) = (report.brier_before, report.brier_after) {
                println!("Brier: {before:.4} -> {after:.4}");
            }
        }
    }

    let status = calibrator.status(&ledger, now);
    let accuracy = ledger.accuracy(days_back, now);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        println!("{}", serde_json::to_string_pretty(&accuracy)?);
        return Ok(());
    }

    println!(
        "Ledger: {} records, {} verified{}",
        ledger.len(),
        accuracy.overall.samples,
        days_back.map(|d| format!(" in last {d} days")).unwrap_or_default()
    );
    if accuracy.overall.samples > 0 {
        println!(
            "Overall: accuracy={:.1}% brier={:.4} log_loss={:.4}",
            accuracy.overall.accuracy * 100.0,
            accuracy.overall.brier,
            accuracy.overall.log_loss
        );
    }
    for (name, acc) in &accuracy.by_component {
        println!(
            "  {:<16} acc={:.1}% brier={:.4} n={}",
            name,
            acc.accuracy * 100.0,
            acc.brier_score,
            acc.count
        );
    }
    for bin in accuracy.bins.iter().filter(|b| b.count > 0) {
        println!(
            "  [{:.1}, {:.1}) n={} predicted={:.3} actual={:.3}",
            bin.bucket_start, bin.bucket_end, bin.count, bin.avg_pred, bin.actual_rate
        );
    }
    println!(
        "Calibrations: {} (last {})",
        status.calibration_count,
        status.last_calibrated.as_deref().unwrap_or("never")
    );
    println!("Current: {}", weights_line(&status.current_weights));
    for rec in &status.recommendations {
        println!(" - {rec}");
    }
    Ok(())
}

fn weights_line(w: &BlendWeights) -> String {
    format!(
        "elo={:.3} form={:.3} record={:.3} h2h={:.3} injury={:.3}",
        w.elo, w.form, w.record, w.h2h, w.injury
    )
}

fn parse_days_arg(args: &[String]) -> Option<i64> {
    for (idx, arg) in args.iter().enumerate() {
        let raw = if let Some(raw) = arg.strip_prefix("--days=") {
            raw
        } else if arg == "--days" {
            match args.get(idx + 1) {
                Some(next) => next.as_str(),
                None => continue,
            }
        } else {
            continue;
        };
        if let Ok(days) = raw.trim().parse::<i64>()
            && days > 0
        {
            return Some(days);
        }
    }
    None
}
