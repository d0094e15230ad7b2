use std::env;
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use crate::calibration::{CalibratorConfig, DEFAULT_MAX_ADJUSTMENT, DEFAULT_MIN_PREDICTIONS};
use crate::persist::app_data_dir;

const DEFAULT_LOG_FILTER: &str = "info,matchup_edge=debug";

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub min_predictions: usize,
    pub max_adjustment: f64,
    /// 0 leaves rayon's global pool at its default size.
    pub slate_threads: usize,
}

impl Settings {
    pub fn from_env() -> Self {
        let data_dir = env::var("MATCHUP_DATA_DIR")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(app_data_dir)
            .unwrap_or_else(|| PathBuf::from("data"));
        let min_predictions = env::var("CALIBRATION_MIN_PREDICTIONS")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_MIN_PREDICTIONS)
            .clamp(10, 10_000);
        let max_adjustment = env::var("CALIBRATION_MAX_ADJUSTMENT")
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(DEFAULT_MAX_ADJUSTMENT)
            .clamp(0.005, 0.25);
        let slate_threads = env::var("SLATE_THREADS")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0)
            .min(256);

        Self {
            data_dir,
            min_predictions,
            max_adjustment,
            slate_threads,
        }
    }

    pub fn ratings_path(&self) -> PathBuf {
        self.data_dir.join("elo_ratings.json")
    }

    pub fn weights_path(&self) -> PathBuf {
        self.data_dir.join("model_weights.json")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("predictions_history.json")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.data_dir.join("historical_games.sqlite")
    }

    pub fn calibrator(&self) -> CalibratorConfig {
        CalibratorConfig {
            min_predictions: self.min_predictions,
            max_adjustment: self.max_adjustment,
        }
    }
}

/// `.env.local` then `.env`; missing files are fine.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
