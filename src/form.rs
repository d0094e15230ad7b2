use serde::{Deserialize, Serialize};

use crate::games::HistoricalGame;
use crate::league::League;

pub const FORM_WINDOW: usize = 5;
/// Games each side needs before season points replace the W-L record.
pub const PYTHAGOREAN_MIN_GAMES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FormStrength {
    Strong,
    Good,
    Neutral,
    Weak,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecentForm {
    pub win_pct: f64,
    pub avg_point_diff: f64,
    pub momentum: f64,
    pub strength: FormStrength,
    pub games_analyzed: usize,
}

impl RecentForm {
    pub fn neutral() -> Self {
        Self {
            win_pct: 0.5,
            avg_point_diff: 0.0,
            momentum: 0.0,
            strength: FormStrength::Neutral,
            games_analyzed: 0,
        }
    }
}

/// Form over the team's last `FORM_WINDOW` games. `history` must already be
/// finished games in ascending date order.
pub fn recent_form(team_id: &str, history: &[HistoricalGame]) -> RecentForm {
    let mut sides: Vec<(f64, bool)> = history
        .iter()
        .rev()
        .filter_map(|g| g.side_of(team_id))
        .take(FORM_WINDOW)
        .map(|(pf, pa, won)| (pf as f64 - pa as f64, won))
        .collect();
    if sides.is_empty() {
        return RecentForm::neutral();
    }
    sides.reverse();

    let n = sides.len() as f64;
    let wins = sides.iter().filter(|(_, won)| *won).count() as f64;
    let diffs: Vec<f64> = sides.iter().map(|(d, _)| *d).collect();
    let win_pct = wins / n;
    let avg_point_diff = mean(&diffs);
    let momentum = if diffs.len() >= FORM_WINDOW {
        mean(&diffs[diffs.len() - 3..]) - mean(&diffs[diffs.len() - 5..diffs.len() - 3])
    } else {
        avg_point_diff
    };

    RecentForm {
        win_pct,
        avg_point_diff,
        momentum,
        strength: classify_strength(win_pct, avg_point_diff),
        games_analyzed: sides.len(),
    }
}

fn classify_strength(win_pct: f64, avg_diff: f64) -> FormStrength {
    if win_pct >= 0.7 && avg_diff > 5.0 {
        FormStrength::Strong
    } else if win_pct >= 0.5 && avg_diff > 0.0 {
        FormStrength::Good
    } else if win_pct < 0.3 && avg_diff < -5.0 {
        FormStrength::Weak
    } else {
        FormStrength::Neutral
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Blends both teams' recent form into a home win probability in [0.12, 0.88].
pub fn form_probability(home: &RecentForm, away: &RecentForm) -> f64 {
    let win_diff = home.win_pct - away.win_pct;
    let momentum_diff = home.momentum - away.momentum;
    let home_strong = home.strength == FormStrength::Strong;
    let away_strong = away.strength == FormStrength::Strong;
    let bonus = match (home_strong, away_strong) {
        (true, false) => 0.03,
        (false, true) => -0.03,
        _ => 0.0,
    };
    let p = 0.5 + 0.35 * win_diff + 0.15 * momentum_diff / 10.0 + bonus + 0.05;
    if p.is_nan() {
        return 0.5;
    }
    p.clamp(0.12, 0.88)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadToHead {
    pub home_wins: u32,
    pub away_wins: u32,
    pub home_win_pct: f64,
    pub avg_point_diff: f64,
    pub games_played: u32,
}

impl HeadToHead {
    /// Additive nudge toward the side that has won the series.
    pub fn adjustment(&self) -> f64 {
        if self.games_played == 0 {
            return 0.0;
        }
        (self.home_win_pct - 0.5) * 0.1
    }
}

pub fn head_to_head(home_id: &str, away_id: &str, history: &[HistoricalGame]) -> HeadToHead {
    let mut home_wins = 0u32;
    let mut diffs = Vec::new();
    for g in history {
        let meeting = (g.home_team_id == home_id && g.away_team_id == away_id)
            || (g.home_team_id == away_id && g.away_team_id == home_id);
        if !meeting {
            continue;
        }
        if let Some((pf, pa, won)) = g.side_of(home_id) {
            if won {
                home_wins += 1;
            }
            diffs.push(pf as f64 - pa as f64);
        }
    }
    let games_played = diffs.len() as u32;
    if games_played == 0 {
        return HeadToHead {
            home_wins: 0,
            away_wins: 0,
            home_win_pct: 0.5,
            avg_point_diff: 0.0,
            games_played: 0,
        };
    }
    HeadToHead {
        home_wins,
        away_wins: games_played - home_wins,
        home_win_pct: home_wins as f64 / games_played as f64,
        avg_point_diff: mean(&diffs),
        games_played,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeasonStats {
    pub points_for: u64,
    pub points_against: u64,
    pub pythagorean_win_pct: f64,
    pub games_played: usize,
}

pub fn season_stats(team_id: &str, league: League, history: &[HistoricalGame]) -> SeasonStats {
    let mut points_for = 0u64;
    let mut points_against = 0u64;
    let mut games_played = 0usize;
    for (pf, pa, _) in history.iter().filter_map(|g| g.side_of(team_id)) {
        points_for += pf as u64;
        points_against += pa as u64;
        games_played += 1;
    }
    SeasonStats {
        points_for,
        points_against,
        pythagorean_win_pct: pythagorean(points_for as f64, points_against as f64, league),
        games_played,
    }
}

/// `PF^e / (PF^e + PA^e)`, evaluated as a ratio so season totals cannot overflow.
pub fn pythagorean(points_for: f64, points_against: f64, league: League) -> f64 {
    if points_for <= 0.0 && points_against <= 0.0 {
        return 0.5;
    }
    if points_for <= 0.0 {
        return 0.0;
    }
    let ratio = (points_against / points_for).powf(league.pythagorean_exponent());
    let p = 1.0 / (1.0 + ratio);
    if p.is_finite() { p } else { 0.5 }
}

/// Bill James' log5: chance that a `p_a` team beats a `p_b` team.
pub fn log5(p_a: f64, p_b: f64) -> f64 {
    let p_a = p_a.clamp(0.01, 0.99);
    let p_b = p_b.clamp(0.01, 0.99);
    let denom = p_a + p_b - 2.0 * p_a * p_b;
    if denom == 0.0 {
        return 0.5;
    }
    (p_a - p_a * p_b) / denom
}
