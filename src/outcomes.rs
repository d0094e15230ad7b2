use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::calibration::{
    COMPONENT_MIN_SAMPLES, CalibrationBin, ComponentAccuracy, Metrics, calibration_bins,
    component_accuracy, evaluate_probs,
};
use crate::league::League;
use crate::persist::SnapshotStore;
use crate::win_prob::PredictionResult;

/// One prediction whose game has finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedPrediction {
    pub game_id: String,
    pub elo_prob: f64,
    pub form_prob: f64,
    pub stat_model_prob: f64,
    #[serde(default)]
    pub market_prob: Option<f64>,
    pub home_win_prob: f64,
    pub home_won: bool,
}

pub trait OutcomeSource {
    fn verified_predictions(&self) -> Result<Vec<VerifiedPrediction>>;
}

impl OutcomeSource for [VerifiedPrediction] {
    fn verified_predictions(&self) -> Result<Vec<VerifiedPrediction>> {
        Ok(self.to_vec())
    }
}

impl OutcomeSource for Vec<VerifiedPrediction> {
    fn verified_predictions(&self) -> Result<Vec<VerifiedPrediction>> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSnapshot {
    pub home_win_prob: f64,
    pub stat_model_prob: f64,
    pub elo_prob: f64,
    pub form_prob: f64,
    #[serde(default)]
    pub market_prob: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameOutcome {
    pub home_won: bool,
    pub home_score: u32,
    pub away_score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub game_id: String,
    pub league: League,
    pub recorded_at: String,
    pub home_team: String,
    pub away_team: String,
    pub game_date: String,
    pub prediction: PredictionSnapshot,
    #[serde(default)]
    pub outcome: Option<GameOutcome>,
    #[serde(default)]
    pub verified_at: Option<String>,
}

impl LedgerRecord {
    fn verified(&self) -> Option<VerifiedPrediction> {
        let outcome = self.outcome?;
        Some(VerifiedPrediction {
            game_id: self.game_id.clone(),
            elo_prob: self.prediction.elo_prob,
            form_prob: self.prediction.form_prob,
            stat_model_prob: self.prediction.stat_model_prob,
            market_prob: self.prediction.market_prob,
            home_win_prob: self.prediction.home_win_prob,
            home_won: outcome.home_won,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyReport {
    pub overall: Metrics,
    pub bins: Vec<CalibrationBin>,
    pub by_component: BTreeMap<String, ComponentAccuracy>,
}

/// Pre-game predictions and, once known, their outcomes.
pub struct PredictionLedger {
    records: RwLock<Vec<LedgerRecord>>,
    backend: Arc<dyn SnapshotStore<Vec<LedgerRecord>>>,
}

impl PredictionLedger {
    pub fn open(backend: Arc<dyn SnapshotStore<Vec<LedgerRecord>>>) -> Self {
        let records = match backend.load() {
            Ok(records) => records.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "could not load prediction ledger, starting empty");
                Vec::new()
            }
        };
        Self {
            records: RwLock::new(records),
            backend,
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn records(&self) -> Vec<LedgerRecord> {
        self.records.read().clone()
    }

    /// Stores a pre-game prediction. A pending entry for the same game is replaced.
    pub fn record_prediction(&self, result: &PredictionResult, now: DateTime<Utc>) {
        let record = LedgerRecord {
            game_id: result.game_id.clone(),
            league: result.league,
            recorded_at: now.to_rfc3339(),
            home_team: result.home_team.clone(),
            away_team: result.away_team.clone(),
            game_date: result.game_date.clone(),
            prediction: PredictionSnapshot {
                home_win_prob: result.home_win_prob,
                stat_model_prob: result.stat_model_prob,
                elo_prob: result.components.elo_prob,
                form_prob: result.components.form_prob,
                market_prob: result
                    .market
                    .home_market_id
                    .as_ref()
                    .or(result.market.away_market_id.as_ref())
                    .map(|_| result.market.home_prob),
            },
            outcome: None,
            verified_at: None,
        };
        let mut records = self.records.write();
        match records
            .iter_mut()
            .find(|r| r.game_id == record.game_id && r.outcome.is_none())
        {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.persist(&records);
    }

    /// Attaches the final score to the pending prediction for `game_id`.
    /// Returns false when there is nothing pending for that game.
    pub fn record_outcome(
        &self,
        game_id: &str,
        home_score: u32,
        away_score: u32,
        now: DateTime<Utc>,
    ) -> bool {
        let mut records = self.records.write();
        let Some(record) = records
            .iter_mut()
            .find(|r| r.game_id == game_id && r.outcome.is_none())
        else {
            debug!(game_id, "no pending prediction for finished game");
            return false;
        };
        record.outcome = Some(GameOutcome {
            home_won: home_score > away_score,
            home_score,
            away_score,
        });
        record.verified_at = Some(now.to_rfc3339());
        self.persist(&records);
        true
    }

    /// Accuracy of final probabilities recorded within `days_back` of `now`
    /// (all of them when `None`).
    pub fn accuracy(&self, days_back: Option<i64>, now: DateTime<Utc>) -> AccuracyReport {
        let cutoff = days_back.map(|d| now - Duration::days(d));
        let verified: Vec<VerifiedPrediction> = self
            .records
            .read()
            .iter()
            .filter(|r| match cutoff {
                Some(cutoff) => DateTime::parse_from_rfc3339(&r.recorded_at)
                    .map(|t| t.with_timezone(&Utc) >= cutoff)
                    .unwrap_or(false),
                None => true,
            })
            .filter_map(LedgerRecord::verified)
            .collect();

        let preds: Vec<f64> = verified.iter().map(|v| v.home_win_prob).collect();
        let actuals: Vec<bool> = verified.iter().map(|v| v.home_won).collect();
        AccuracyReport {
            overall: evaluate_probs(&preds, &actuals),
            bins: calibration_bins(&preds, &actuals, 10),
            by_component: component_accuracy(&verified, COMPONENT_MIN_SAMPLES),
        }
    }

    fn persist(&self, records: &Vec<LedgerRecord>) {
        if let Err(err) = self.backend.save(records) {
            warn!(error = %err, "failed to persist prediction ledger, keeping in-memory state");
        }
    }
}

impl OutcomeSource for PredictionLedger {
    fn verified_predictions(&self) -> Result<Vec<VerifiedPrediction>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter_map(LedgerRecord::verified)
            .collect())
    }
}
