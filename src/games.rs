use std::cmp::Ordering;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::league::League;

/// A completed (or at least reported) game, as kept in the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalGame {
    pub game_id: String,
    pub league: League,
    pub home_team_id: String,
    pub away_team_id: String,
    pub home_score: u32,
    pub away_score: u32,
    pub home_won: bool,
    pub game_date: String,
    pub status: String,
    #[serde(default)]
    pub home_team_name: Option<String>,
    #[serde(default)]
    pub away_team_name: Option<String>,
}

impl HistoricalGame {
    pub fn is_final(&self) -> bool {
        is_final_status(&self.status)
    }

    pub fn involves(&self, team_id: &str) -> bool {
        self.home_team_id == team_id || self.away_team_id == team_id
    }

    /// (points for, points against, won) from `team_id`'s side.
    pub fn side_of(&self, team_id: &str) -> Option<(u32, u32, bool)> {
        if self.home_team_id == team_id {
            Some((self.home_score, self.away_score, self.home_score > self.away_score))
        } else if self.away_team_id == team_id {
            Some((self.away_score, self.home_score, self.away_score > self.home_score))
        } else {
            None
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        parse_game_datetime(&self.game_date).map(|dt| dt.date())
    }
}

/// A game from the schedule feed, possibly not yet played.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledGame {
    pub game_id: String,
    pub league: League,
    pub home_team_id: String,
    pub away_team_id: String,
    #[serde(default)]
    pub home_team_name: String,
    #[serde(default)]
    pub away_team_name: String,
    #[serde(default)]
    pub home_team_abbrev: String,
    #[serde(default)]
    pub away_team_abbrev: String,
    #[serde(default)]
    pub home_record: Option<String>,
    #[serde(default)]
    pub away_record: Option<String>,
    #[serde(default)]
    pub home_score: Option<u32>,
    #[serde(default)]
    pub away_score: Option<u32>,
    #[serde(default)]
    pub game_date: String,
    #[serde(default)]
    pub status: String,
}

impl ScheduledGame {
    /// Converts a finished feed entry into an archive row.
    pub fn to_historical(&self) -> Option<HistoricalGame> {
        if !is_final_status(&self.status) {
            return None;
        }
        let (home_score, away_score) = (self.home_score?, self.away_score?);
        Some(HistoricalGame {
            game_id: self.game_id.clone(),
            league: self.league,
            home_team_id: self.home_team_id.clone(),
            away_team_id: self.away_team_id.clone(),
            home_score,
            away_score,
            home_won: home_score > away_score,
            game_date: self.game_date.clone(),
            status: self.status.clone(),
            home_team_name: Some(self.home_team_name.clone()).filter(|s| !s.is_empty()),
            away_team_name: Some(self.away_team_name.clone()).filter(|s| !s.is_empty()),
        })
    }
}

/// Supplies completed games for seeding ratings.
pub trait GameSource {
    fn completed_games(&self, league: League) -> Result<Vec<HistoricalGame>>;
}

impl GameSource for [HistoricalGame] {
    fn completed_games(&self, league: League) -> Result<Vec<HistoricalGame>> {
        Ok(self
            .iter()
            .filter(|g| g.league == league && g.is_final())
            .cloned()
            .collect())
    }
}

impl GameSource for Vec<HistoricalGame> {
    fn completed_games(&self, league: League) -> Result<Vec<HistoricalGame>> {
        self.as_slice().completed_games(league)
    }
}

pub fn is_final_status(status: &str) -> bool {
    status.to_ascii_lowercase().contains("final")
}

/// Stable ascending sort by game date; unparseable dates fall back to string order.
pub fn sort_by_date(games: &mut [HistoricalGame]) {
    games.sort_by(|a, b| match (parse_game_datetime(&a.game_date), parse_game_datetime(&b.game_date)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.game_date.cmp(&b.game_date),
    });
}

/// Accepts RFC 3339, ESPN-style `2024-01-05T00:30Z`, naive timestamps and bare dates.
pub fn parse_game_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    let naive = s.trim_end_matches('Z');
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Parses a `"W-L"` (or `"W-L-T"`) record. Anything else reads as 0-0.
pub fn parse_record(raw: &str) -> (u32, u32) {
    let mut parts = raw.trim().split('-').map(|p| p.trim().parse::<u32>());
    match (parts.next(), parts.next()) {
        (Some(Ok(wins)), Some(Ok(losses))) => (wins, losses),
        _ => (0, 0),
    }
}

pub fn record_win_pct(raw: Option<&str>) -> f64 {
    let (wins, losses) = raw.map(parse_record).unwrap_or((0, 0));
    match wins.checked_add(losses) {
        Some(total) if total > 0 => wins as f64 / total as f64,
        _ => 0.5,
    }
}
