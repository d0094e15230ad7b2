use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use matchup_edge::archive::GameArchive;
use matchup_edge::config::{self, Settings};
use matchup_edge::elo::RatingStore;
use matchup_edge::games::HistoricalGame;
use matchup_edge::league::League;
use matchup_edge::persist::JsonFileStore;

fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();
    let settings = Settings::from_env();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let leagues = parse_leagues_arg(&args).unwrap_or_else(|| League::ALL.into_iter().collect());
    if leagues.is_empty() {
        return Err(anyhow!("no leagues resolved for ingest"));
    }
    let force = args.iter().any(|a| a == "--force");
    let db_path = parse_path_arg(&args, "--db").unwrap_or_else(|| settings.archive_path());

    let mut archive = GameArchive::open(&db_path)?;
    if let Some(input) = parse_path_arg(&args, "--input") {
        let raw = std::fs::read_to_string(&input)
            .with_context(|| format!("read games {}", input.display()))?;
        let rows: Vec<HistoricalGame> = serde_json::from_str(&raw)
            .with_context(|| format!("parse games {}", input.display()))?;
        let summary = archive.insert_games(&rows)?;

        println!("Historical ingest complete");
        println!("DB: {}", db_path.display());
        println!("Input: {}", input.display());
        println!(
            "Games: offered={} inserted={} duplicates={} unfinished={}",
            summary.offered, summary.inserted, summary.duplicates, summary.skipped_unfinished
        );
    }

    let ratings = RatingStore::open(Arc::new(JsonFileStore::new(settings.ratings_path())));
    for league in leagues {
        let stored = archive.count(league)?;
        let replayed = ratings.seed(league, &archive, force)?;
        let table = ratings.all(league);
        println!(
            "league {}: archived={} replayed={} teams={}",
            league,
            stored,
            replayed,
            table.len()
        );
        for team in table.iter().take(3) {
            println!("   {:<12} {:>7.1} ({} games)", team.team_id, team.rating, team.games_processed);
        }
    }
    println!("Ratings: {}", settings.ratings_path().display());

    Ok(())
}

fn parse_path_arg(args: &[String], flag: &str) -> Option<PathBuf> {
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&prefix) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}

fn parse_leagues_arg(args: &[String]) -> Option<BTreeSet<League>> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix("--leagues=") {
            let leagues = parse_leagues(raw);
            if !leagues.is_empty() {
                return Some(leagues);
            }
        }
        if arg == "--leagues"
            && let Some(next) = args.get(idx + 1)
        {
            let leagues = parse_leagues(next);
            if !leagues.is_empty() {
                return Some(leagues);
            }
        }
    }
    None
}

fn parse_leagues(raw: &str) -> BTreeSet<League> {
    raw.split([',', ';', ' '])
        .filter(|part| !part.trim().is_empty())
        .filter_map(|part| match part.parse::<League>() {
            Ok(league) => Some(league),
            Err(err) => {
                eprintln!("skipping {err}");
                None
            }
        })
        .collect()
}
