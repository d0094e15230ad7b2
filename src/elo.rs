use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::games::{self, GameSource, HistoricalGame};
use crate::league::League;
use crate::persist::SnapshotStore;

pub const DEFAULT_RATING: f64 = 1500.0;
const K_FACTOR: f64 = 32.0;
const MOV_DIVISOR: f64 = 25.0;
const MOV_CAP: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TeamRating {
    pub league: League,
    pub team_id: String,
    pub rating: f64,
    pub games_processed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredRating {
    pub rating: f64,
    pub games_processed: u32,
}

/// On-disk shape: flat `"{league}_{team_id}"` mapping plus bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingTable {
    pub ratings: BTreeMap<String, StoredRating>,
    #[serde(default)]
    pub games_processed: u64,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl RatingTable {
    fn league_prefix(league: League) -> String {
        format!("{}_", league.as_str())
    }

    fn has_league(&self, league: League) -> bool {
        let prefix = Self::league_prefix(league);
        self.ratings.keys().any(|k| k.starts_with(&prefix))
    }
}

pub fn rating_key(league: League, team_id: &str) -> String {
    format!("{}_{}", league.as_str(), team_id)
}

/// Expected score of side `a` against side `b`.
pub fn expected_score(r_a: f64, r_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((r_b - r_a) / 400.0))
}

/// Home win expectation with the league's home bonus applied.
pub fn home_win_expectation(home: f64, away: f64, league: League) -> f64 {
    expected_score(home + league.home_advantage_elo(), away)
}

pub fn mov_multiplier(home_score: u32, away_score: u32) -> f64 {
    let diff = (home_score as f64 - away_score as f64).abs();
    (1.0 + diff / MOV_DIVISOR).min(MOV_CAP)
}

/// Elo ledger shared between the result monitor (writer) and the engine (readers).
pub struct RatingStore {
    table: RwLock<RatingTable>,
    backend: Arc<dyn SnapshotStore<RatingTable>>,
}

impl RatingStore {
    /// Loads the persisted table, falling back to an empty one if it is unreadable.
    pub fn open(backend: Arc<dyn SnapshotStore<RatingTable>>) -> Self {
        let table = match backend.load() {
            Ok(Some(table)) => {
                info!(teams = table.ratings.len(), "loaded elo ratings");
                table
            }
            Ok(None) => RatingTable::default(),
            Err(err) => {
                warn!(error = %err, "could not load elo ratings, starting fresh");
                RatingTable::default()
            }
        };
        Self {
            table: RwLock::new(table),
            backend,
        }
    }

    pub fn get(&self, team_id: &str, league: League) -> f64 {
        self.table
            .read()
            .ratings
            .get(&rating_key(league, team_id))
            .map(|r| r.rating)
            .unwrap_or(DEFAULT_RATING)
    }

    pub fn team(&self, team_id: &str, league: League) -> TeamRating {
        let stored = self
            .table
            .read()
            .ratings
            .get(&rating_key(league, team_id))
            .copied()
            .unwrap_or(StoredRating {
                rating: DEFAULT_RATING,
                games_processed: 0,
            });
        TeamRating {
            league,
            team_id: team_id.to_string(),
            rating: stored.rating,
            games_processed: stored.games_processed,
        }
    }

    /// Every rated team in `league`, strongest first.
    pub fn all(&self, league: League) -> Vec<TeamRating> {
        let prefix = RatingTable::league_prefix(league);
        let mut out: Vec<TeamRating> = self
            .table
            .read()
            .ratings
            .iter()
            .filter_map(|(key, stored)| {
                let team_id = key.strip_prefix(&prefix)?;
                Some(TeamRating {
                    league,
                    team_id: team_id.to_string(),
                    rating: stored.rating,
                    games_processed: stored.games_processed,
                })
            })
            .collect();
        out.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        out
    }

    pub fn total_games_processed(&self) -> u64 {
        self.table.read().games_processed
    }

    pub fn snapshot(&self) -> RatingTable {
        self.table.read().clone()
    }

    /// Applies one result and writes the whole table through to the backend.
    /// Returns the new (home, away) ratings.
    pub fn apply_result(
        &self,
        home_id: &str,
        away_id: &str,
        league: League,
        home_won: bool,
        home_score: u32,
        away_score: u32,
    ) -> (f64, f64) {
        let mut table = self.table.write();
        let updated = apply_to_table(
            &mut table, home_id, away_id, league, home_won, home_score, away_score,
        );
        table.last_updated = Some(Utc::now().to_rfc3339());
        self.persist(&table);
        updated
    }

    /// Applies a feed game if it is final; anything else is ignored.
    pub fn apply_game(&self, game: &HistoricalGame) -> Option<(f64, f64)> {
        if !game.is_final() {
            debug!(game_id = %game.game_id, status = %game.status, "skipping non-final game");
            return None;
        }
        let updated = self.apply_result(
            &game.home_team_id,
            &game.away_team_id,
            game.league,
            game.home_score > game.away_score,
            game.home_score,
            game.away_score,
        );
        info!(
            game_id = %game.game_id,
            home = game.home_team_name.as_deref().unwrap_or(&game.home_team_id),
            away = game.away_team_name.as_deref().unwrap_or(&game.away_team_id),
            "updated elo ratings"
        );
        Some(updated)
    }

    /// Replays league history in date order. A no-op when the league already
    /// has ratings, unless `force` is set, in which case the league is cleared first.
    /// Returns the number of games replayed.
    pub fn seed<S>(&self, league: League, source: &S, force: bool) -> Result<usize>
    where
        S: GameSource + ?Sized,
    {
        // Held from the check through persist so concurrent seeds replay once.
        let mut table = self.table.write();
        if !force && table.has_league(league) {
            info!(league = %league, "elo ratings already initialized");
            return Ok(0);
        }

        let mut history = source.completed_games(league)?;
        history.retain(|g| g.league == league && g.is_final());
        if history.is_empty() {
            warn!(league = %league, "no historical games found for seeding");
            return Ok(0);
        }
        games::sort_by_date(&mut history);

        if force {
            clear_league(&mut table, league);
        }
        for g in &history {
            apply_to_table(
                &mut table,
                &g.home_team_id,
                &g.away_team_id,
                league,
                g.home_won,
                g.home_score,
                g.away_score,
            );
        }
        table.last_updated = Some(Utc::now().to_rfc3339());
        self.persist(&table);
        info!(league = %league, games = history.len(), "seeded elo ratings");
        Ok(history.len())
    }

    /// Clears one league, or everything when `league` is `None`.
    pub fn reset(&self, league: Option<League>) {
        let mut table = self.table.write();
        match league {
            Some(league) => {
                let removed = clear_league(&mut table, league);
                info!(league = %league, removed, "reset elo ratings");
            }
            None => {
                table.ratings.clear();
                table.games_processed = 0;
                info!("reset all elo ratings");
            }
        }
        self.persist(&table);
    }

    fn persist(&self, table: &RatingTable) {
        if let Err(err) = self.backend.save(table) {
            warn!(error = %err, "failed to persist elo ratings, keeping in-memory state");
        }
    }
}

fn clear_league(table: &mut RatingTable, league: League) -> usize {
    let prefix = RatingTable::league_prefix(league);
    let before = table.ratings.len();
    table.ratings.retain(|k, _| !k.starts_with(&prefix));
    before - table.ratings.len()
}

fn apply_to_table(
    table: &mut RatingTable,
    home_id: &str,
    away_id: &str,
    league: League,
    home_won: bool,
    home_score: u32,
    away_score: u32,
) -> (f64, f64) {
    let home_key = rating_key(league, home_id);
    let away_key = rating_key(league, away_id);
    let fresh = StoredRating {
        rating: DEFAULT_RATING,
        games_processed: 0,
    };
    let home = table.ratings.get(&home_key).copied().unwrap_or(fresh);
    let away = table.ratings.get(&away_key).copied().unwrap_or(fresh);

    let home_expected = home_win_expectation(home.rating, away.rating, league);
    let away_expected = 1.0 - home_expected;
    let home_actual = if home_won { 1.0 } else { 0.0 };
    let away_actual = 1.0 - home_actual;
    let mov = mov_multiplier(home_score, away_score);

    let new_home = home.rating + K_FACTOR * mov * (home_actual - home_expected);
    let new_away = away.rating + K_FACTOR * mov * (away_actual - away_expected);

    table.ratings.insert(
        home_key,
        StoredRating {
            rating: new_home,
            games_processed: home.games_processed + 1,
        },
    );
    table.ratings.insert(
        away_key,
        StoredRating {
            rating: new_away,
            games_processed: away.games_processed + 1,
        },
    );
    table.games_processed += 1;
    (new_home, new_away)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{MemoryStore, PersistError};

    fn store() -> RatingStore {
        RatingStore::open(Arc::new(MemoryStore::new()))
    }

    fn final_game(id: &str, date: &str, home: &str, away: &str, hs: u32, aw: u32) -> HistoricalGame {
        HistoricalGame {
            game_id: id.to_string(),
            league: League::Nba,
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

    struct FailingStore;

    impl SnapshotStore<RatingTable> for FailingStore {
        fn load(&self) -> Result<Option<RatingTable>, PersistError> {
            Ok(None)
        }

        fn save(&self, _value: &RatingTable) -> Result<(), PersistError> {
            Err(PersistError::Io {
                path: "/dev/full".into(),
                source: std::io::Error::other("disk full"),
            })
        }
    }

    #[test]
    fn unknown_team_defaults_to_1500() {
        let s = store();
        assert_eq!(s.get("99", League::Nba), DEFAULT_RATING);
        assert_eq!(s.team("99", League::Nfl).games_processed, 0);
    }

    #[test]
    fn home_win_moves_ratings_in_the_right_direction() {
        let s = store();
        let (h, a) = s.apply_result("1", "2", League::Nba, true, 110, 100);
        assert!(h > DEFAULT_RATING);
        assert!(a < DEFAULT_RATING);
        // Zero-sum for a single game.
        assert!(((h - DEFAULT_RATING) + (a - DEFAULT_RATING)).abs() < 1e-9);
        assert_eq!(s.team("1", League::Nba).games_processed, 1);
        assert_eq!(s.team("2", League::Nba).games_processed, 1);
    }

    #[test]
    fn update_matches_closed_form() {
        let s = store();
        let (h, _) = s.apply_result("1", "2", League::Nfl, false, 17, 27);
        let expected = home_win_expectation(1500.0, 1500.0, League::Nfl);
        let mov = 1.0 + 10.0 / 25.0;
        assert!((h - (1500.0 - 32.0 * mov * expected)).abs() < 1e-9);
    }

    #[test]
    fn mov_multiplier_caps_at_two() {
        assert_eq!(mov_multiplier(100, 100), 1.0);
        assert!((mov_multiplier(120, 100) - 1.8).abs() < 1e-12);
        assert_eq!(mov_multiplier(150, 90), 2.0);
    }

    #[test]
    fn expectation_is_monotonic_in_home_rating() {
        let mut last = 0.0;
        for home in [1300.0, 1400.0, 1500.0, 1600.0, 1700.0] {
            let p = home_win_expectation(home, 1500.0, League::Nba);
            assert!(p > last);
            last = p;
        }
    }

    #[test]
    fn seed_replays_in_date_order_and_is_idempotent() {
        let history = vec![
            final_game("b", "2024-01-02", "1", "2", 90, 100),
            final_game("a", "2024-01-01", "1", "2", 100, 90),
        ];
        let s = store();
        assert_eq!(s.seed(League::Nba, &history, false).unwrap(), 2);
        let after_seed = s.get("1", League::Nba);

        let manual = store();
        manual.apply_result("1", "2", League::Nba, true, 100, 90);
        manual.apply_result("1", "2", League::Nba, false, 90, 100);
        assert!((after_seed - manual.get("1", League::Nba)).abs() < 1e-9);

        assert_eq!(s.seed(League::Nba, &history, false).unwrap(), 0);
        assert_eq!(s.get("1", League::Nba), after_seed);

        assert_eq!(s.seed(League::Nba, &history, true).unwrap(), 2);
        assert!((s.get("1", League::Nba) - after_seed).abs() < 1e-9);
    }

    #[test]
    fn concurrent_seeds_replay_history_once() {
        let history: Vec<HistoricalGame> = (0..200)
            .map(|i| {
                let date = format!("2024-{:02}-{:02}", 1 + i % 12, 1 + i % 28);
                let (home, away) = if i % 2 == 0 { ("1", "2") } else { ("3", "4") };
                final_game(&format!("g{i}"), &date, home, away, 100 + i % 9, 98)
            })
            .collect();

        for _ in 0..20 {
            let s = store();
            let barrier = std::sync::Barrier::new(4);
            let replayed: usize = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..4)
                    .map(|_| {
                        scope.spawn(|| {
                            barrier.wait();
                            s.seed(League::Nba, &history, false).unwrap()
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).sum()
            });
            assert_eq!(replayed, history.len());
            assert_eq!(s.total_games_processed(), history.len() as u64);
            assert_eq!(s.team("1", League::Nba).games_processed, 100);
        }
    }

    #[test]
    fn apply_game_ignores_unfinished() {
        let s = store();
        let mut g = final_game("x", "2024-01-01", "1", "2", 0, 0);
        g.status = "Scheduled".to_string();
        assert!(s.apply_game(&g).is_none());
        assert_eq!(s.total_games_processed(), 0);
    }

    #[test]
    fn persistence_failure_keeps_memory_state() {
        let s = RatingStore::open(Arc::new(FailingStore));
        let (h, _) = s.apply_result("1", "2", League::Nba, true, 100, 99);
        assert_eq!(s.get("1", League::Nba), h);
    }

    #[test]
    fn reset_league_leaves_others() {
        let s = store();
        s.apply_result("1", "2", League::Nba, true, 100, 99);
        s.apply_result("1", "2", League::Nfl, true, 21, 20);
        s.reset(Some(League::Nba));
        assert_eq!(s.get("1", League::Nba), DEFAULT_RATING);
        assert!(s.get("1", League::Nfl) > DEFAULT_RATING);
        assert_eq!(s.all(League::Nfl).len(), 2);
    }
}
