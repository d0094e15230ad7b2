use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use matchup_edge::config::{self, Settings};
use matchup_edge::elo::RatingStore;
use matchup_edge::games::is_final_status;
use matchup_edge::outcomes::PredictionLedger;
use matchup_edge::persist::JsonFileStore;
use matchup_edge::slate::Slate;
use matchup_edge::weights::WeightsStore;
use matchup_edge::win_prob::{EnsembleEngine, PredictionResult};

const USAGE: &str = "usage: matchup_edge <slate.json> [--json] [--record]";

fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();
    let settings = Settings::from_env();

    if settings.slate_threads > 0
        && let Err(err) = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.slate_threads)
            .build_global()
    {
        warn!(error = %err, "could not size slate thread pool, using default");
    }

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let slate_path = parse_slate_arg(&args).context(USAGE)?;
    let as_json = args.iter().any(|a| a == "--json");
    let record = args.iter().any(|a| a == "--record");

    let slate = Slate::from_path(&slate_path)?;
    let ratings = Arc::new(RatingStore::open(Arc::new(JsonFileStore::new(
        settings.ratings_path(),
    ))));
    let weights = Arc::new(WeightsStore::open(Arc::new(JsonFileStore::new(
        settings.weights_path(),
    ))));
    let ledger = PredictionLedger::open(Arc::new(JsonFileStore::new(settings.ledger_path())));

    for league in slate.leagues() {
        ratings.seed(league, &slate.history, false)?;
    }

    let now = Utc::now();
    let mut settled = 0usize;
    for game in &slate.games {
        let Some(done) = game.to_historical() else {
            continue;
        };
        // Only games we priced earlier move ratings; the rest are already in history.
        if ledger.record_outcome(&done.game_id, done.home_score, done.away_score, now) {
            ratings.apply_game(&done);
            settled += 1;
        }
    }
    if settled > 0 {
        info!(settled, "settled finished games");
    }

    let matched = slate.match_markets();
    let inputs = slate
        .inputs(&matched, &slate.history)
        .into_iter()
        .filter(|input| !is_final_status(&input.game.status))
        .collect::<Vec<_>>();

    let engine = EnsembleEngine::new(ratings, weights);
    let results = engine.evaluate_slate(&inputs);

    if record {
        for result in &results {
            ledger.record_prediction(result, now);
        }
        info!(recorded = results.len(), ledger = ledger.len(), "recorded predictions");
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for result in &results {
            println!("{}", summary_line(result));
        }
    }
    Ok(())
}

fn summary_line(r: &PredictionResult) -> String {
    format!(
        "{:<5} {} @ {}  home {:>5.1}%  stat {:>5.1}%  market {:>5.1}% ({})  {:?}  {}  {}",
        r.league.as_str(),
        r.away_team,
        r.home_team,
        r.home_win_prob * 100.0,
        r.stat_model_prob * 100.0,
        r.market.home_prob * 100.0,
        r.market.tier.as_str(),
        r.confidence,
        r.signal.recommendation.as_str(),
        r.wager.display,
    )
}

fn parse_slate_arg(args: &[String]) -> Option<PathBuf> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--slate=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--slate"
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    args.iter()
        .filter(|a| !a.starts_with("--"))
        .find(|a| !a.trim().is_empty())
        .map(PathBuf::from)
}
