use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Duration, TimeZone, Utc};

use matchup_edge::archive::GameArchive;
use matchup_edge::calibration::{CalibratorConfig, WeightCalibrator};
use matchup_edge::elo::{DEFAULT_RATING, RatingStore};
use matchup_edge::games::{HistoricalGame, ScheduledGame};
use matchup_edge::league::League;
use matchup_edge::market::MatchedMarketResult;
use matchup_edge::outcomes::{OutcomeSource, PredictionLedger};
use matchup_edge::persist::{JsonFileStore, MemoryStore};
use matchup_edge::weights::{BlendWeights, WeightsStore};
use matchup_edge::win_prob::{EnsembleEngine, GameInput, PredictionResult};

fn scratch_dir(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("matchup_edge_{tag}_{}_{nanos}", std::process::id()))
}

fn finished(id: &str, home: &str, away: &str, hs: u32, aw: u32, date: &str) -> HistoricalGame {
    HistoricalGame {
        game_id: id.to_string(),
        league: League::Nfl,
        home_team_id: home.to_string(),
        away_team_id: away.to_string(),
        home_score: hs,
        away_score: aw,
        home_won: hs > aw,
        game_date: date.to_string(),
        status: "Final".to_string(),
        home_team_name: None,
        away_team_name: None,
    }
}

fn upcoming(id: &str) -> ScheduledGame {
    ScheduledGame {
        game_id: id.to_string(),
        league: League::Nfl,
        home_team_id: "12".to_string(),
        away_team_id: "25".to_string(),
        home_team_name: "Kansas City Chiefs".to_string(),
        away_team_name: "San Francisco 49ers".to_string(),
        home_team_abbrev: "KC".to_string(),
        away_team_abbrev: "SF".to_string(),
        home_record: Some("11-3".to_string()),
        away_record: Some("9-5".to_string()),
        home_score: None,
        away_score: None,
        game_date: "2024-12-22T18:00:00Z".to_string(),
        status: "scheduled".to_string(),
    }
}

fn predict(id: &str) -> PredictionResult {
    let ratings = Arc::new(RatingStore::open(Arc::new(MemoryStore::new())));
    let weights = Arc::new(WeightsStore::open(Arc::new(MemoryStore::new())));
    let engine = EnsembleEngine::new(ratings, weights);
    let game = upcoming(id);
    engine.evaluate(&GameInput {
        game: &game,
        history: &[],
        markets: &MatchedMarketResult::None,
        home_injuries: &[],
        away_injuries: &[],
    })
}

#[test]
fn ratings_survive_reopen_from_json() {
    let path = scratch_dir("ratings").join("elo_ratings.json");
    let history = vec![
        finished("a", "12", "25", 27, 20, "2024-10-06"),
        finished("b", "25", "7", 31, 10, "2024-10-13"),
        finished("c", "7", "12", 14, 24, "2024-10-20"),
    ];

    let store = RatingStore::open(Arc::new(JsonFileStore::new(&path)));
    assert_eq!(store.seed(League::Nfl, &history, false).expect("seed"), 3);
    let chiefs = store.get("12", League::Nfl);
    assert!(chiefs > DEFAULT_RATING);

    let reopened = RatingStore::open(Arc::new(JsonFileStore::new(&path)));
    assert!((reopened.get("12", League::Nfl) - chiefs).abs() < 1e-9);
    assert_eq!(reopened.total_games_processed(), 3);
    assert_eq!(reopened.team("12", League::Nfl).games_processed, 2);
    // Already seeded, so a plain seed is a no-op.
    assert_eq!(reopened.seed(League::Nfl, &history, false).expect("seed"), 0);
    assert_eq!(reopened.get("99", League::Nfl), DEFAULT_RATING);
}

#[test]
fn archive_feeds_rating_seed() {
    let mut archive = GameArchive::in_memory().expect("in-memory archive");
    let mut rows = vec![
        finished("b", "25", "7", 31, 10, "2024-10-13"),
        finished("a", "12", "25", 27, 20, "2024-10-06"),
    ];
    rows.push(HistoricalGame {
        status: "Scheduled".to_string(),
        ..finished("z", "12", "7", 0, 0, "2024-12-29")
    });

    let summary = archive.insert_games(&rows).expect("insert");
    assert_eq!(summary.offered, 3);
    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.skipped_unfinished, 1);
    let again = archive.insert_games(&rows[..1]).expect("insert duplicate");
    assert_eq!(again.duplicates, 1);
    assert_eq!(archive.count(League::Nfl).expect("count"), 2);
    assert_eq!(archive.count(League::Nba).expect("count"), 0);

    let games = archive.games_for_league(League::Nfl).expect("query");
    assert_eq!(games[0].game_id, "a");

    let from_archive = RatingStore::open(Arc::new(MemoryStore::new()));
    from_archive.seed(League::Nfl, &archive, false).expect("seed");
    let from_slice = RatingStore::open(Arc::new(MemoryStore::new()));
    from_slice.seed(League::Nfl, &rows, false).expect("seed");
    assert_eq!(from_archive.snapshot().ratings, from_slice.snapshot().ratings);
}

#[test]
fn weights_survive_reopen_and_bad_files_fall_back() {
    let dir = scratch_dir("weights");
    let path = dir.join("model_weights.json");
    let store = Arc::new(WeightsStore::open(Arc::new(JsonFileStore::new(&path))));
    let records: Vec<_> = (0..80)
        .map(|i| matchup_edge::outcomes::VerifiedPrediction {
            game_id: format!("g{i}"),
            elo_prob: if i % 4 == 0 { 0.35 } else { 0.7 },
            form_prob: 0.55,
            stat_model_prob: 0.6,
            market_prob: None,
            home_win_prob: 0.62,
            home_won: i % 4 != 0,
        })
        .collect();
    let cal = WeightCalibrator::new(store.clone(), CalibratorConfig::default());
    let report = cal.calibrate(records.as_slice());
    assert!(report.success, "{}", report.message);

    let reopened = WeightsStore::open(Arc::new(JsonFileStore::new(&path)));
    let (a, b) = (reopened.snapshot(), store.snapshot());
    for (x, y) in a.to_array().iter().zip(b.to_array()) {
        assert!((x - y).abs() < 1e-12);
    }
    assert_eq!(reopened.state().calibration_history.len(), 1);

    let raw = std::fs::read_to_string(&path).expect("weights file");
    assert!(raw.contains("STAT_ELO_WEIGHT"));

    std::fs::write(&path, "{ \"current_weights\": 7 }").expect("overwrite");
    let fallback = WeightsStore::open(Arc::new(JsonFileStore::new(&path)));
    assert_eq!(*fallback.snapshot(), BlendWeights::default());
}

#[test]
fn ledger_records_then_verifies_predictions() {
    let path = scratch_dir("ledger").join("predictions_history.json");
    let ledger = PredictionLedger::open(Arc::new(JsonFileStore::new(&path)));
    let now = Utc.with_ymd_and_hms(2024, 12, 22, 12, 0, 0).single().expect("valid time");

    let first = predict("401671001");
    ledger.record_prediction(&first, now);
    ledger.record_prediction(&first, now + Duration::minutes(30));
    assert_eq!(ledger.len(), 1, "re-recording a pending game replaces it");
    assert_eq!(ledger.records()[0].prediction.market_prob, None);
    ledger.record_prediction(&predict("401671002"), now);
    assert!(ledger.verified_predictions().expect("verified").is_empty());

    assert!(ledger.record_outcome("401671001", 24, 17, now + Duration::hours(8)));
    assert!(!ledger.record_outcome("401671001", 24, 17, now + Duration::hours(9)));
    assert!(!ledger.record_outcome("missing", 1, 0, now));

    let verified = ledger.verified_predictions().expect("verified");
    assert_eq!(verified.len(), 1);
    assert!(verified[0].home_won);
    assert_eq!(verified[0].elo_prob, first.components.elo_prob);

    let report = ledger.accuracy(Some(7), now + Duration::days(1));
    assert_eq!(report.overall.samples, 1);
    assert_eq!(report.bins.iter().map(|b| b.count).sum::<usize>(), 1);
    assert!(ledger.accuracy(Some(7), now + Duration::days(30)).overall.samples == 0);
    assert_eq!(ledger.accuracy(None, now + Duration::days(30)).overall.samples, 1);

    let reopened = PredictionLedger::open(Arc::new(JsonFileStore::new(&path)));
    assert_eq!(reopened.len(), 2);
    let ids = |l: &PredictionLedger| {
        l.records()
            .into_iter()
            .map(|r| (r.game_id, r.outcome.map(|o| o.home_score)))
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&reopened), ids(&ledger));
}
