use serde::{Deserialize, Serialize};

use crate::league::Sport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryReport {
    pub player_name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub injury_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InjurySeverity {
    None,
    Low,
    Moderate,
    High,
    Critical,
}

impl InjurySeverity {
    fn from_impact(total: f64) -> Self {
        if total >= 5.0 {
            InjurySeverity::Critical
        } else if total >= 3.0 {
            InjurySeverity::High
        } else if total >= 1.5 {
            InjurySeverity::Moderate
        } else if total > 0.0 {
            InjurySeverity::Low
        } else {
            InjurySeverity::None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InjurySeverity::None => "NONE",
            InjurySeverity::Low => "LOW",
            InjurySeverity::Moderate => "MODERATE",
            InjurySeverity::High => "HIGH",
            InjurySeverity::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPlayerOut {
    pub name: String,
    pub position: String,
    pub injury_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryImpact {
    pub total_impact: f64,
    pub severity: InjurySeverity,
    pub key_players_out: Vec<KeyPlayerOut>,
    pub total_count: usize,
}

impl InjuryImpact {
    pub fn none() -> Self {
        Self {
            total_impact: 0.0,
            severity: InjurySeverity::None,
            key_players_out: Vec::new(),
            total_count: 0,
        }
    }
}

fn position_weight(sport: Sport, position: &str) -> f64 {
    match (sport, position) {
        (Sport::Football, "QB") => 4.0,
        (Sport::Football, "OL") => 2.5,
        (Sport::Football, "RB" | "WR") => 1.8,
        (Sport::Football, "TE" | "S") => 1.2,
        (Sport::Football, "DL" | "CB") => 1.5,
        (Sport::Football, "LB") => 1.3,
        (Sport::Football, "K") => 0.5,
        (Sport::Football, "P") => 0.3,
        (Sport::Basketball, "PG") => 2.5,
        (Sport::Basketball, "SG" | "PF") => 1.8,
        (Sport::Basketball, "SF") => 2.0,
        (Sport::Basketball, "C") => 2.2,
        _ => 1.0,
    }
}

fn is_critical_position(sport: Sport, position: &str) -> bool {
    match sport {
        Sport::Football => matches!(position, "QB" | "OL"),
        Sport::Basketball => matches!(position, "PG" | "C"),
    }
}

fn status_weight(status: &str) -> f64 {
    match status {
        "OUT" => 1.0,
        "DOUBTFUL" => 0.7,
        "QUESTIONABLE" => 0.4,
        "PROBABLE" => 0.1,
        _ => 0.5,
    }
}

pub fn injury_impact(reports: &[InjuryReport], sport: Sport) -> InjuryImpact {
    if reports.is_empty() {
        return InjuryImpact::none();
    }
    let mut total = 0.0;
    let mut key_players_out = Vec::new();
    for report in reports {
        let position = report.position.trim().to_ascii_uppercase();
        let status = report.status.trim().to_ascii_uppercase();
        total += position_weight(sport, &position) * status_weight(&status);
        if status == "OUT" && is_critical_position(sport, &position) {
            key_players_out.push(KeyPlayerOut {
                name: report.player_name.clone(),
                position,
                injury_type: report.injury_type.clone(),
            });
        }
    }
    InjuryImpact {
        total_impact: total,
        severity: InjurySeverity::from_impact(total),
        key_players_out,
        total_count: reports.len(),
    }
}

/// Home win probability implied by the injury gap, in [0.20, 0.80].
pub fn injury_probability(home: &InjuryImpact, away: &InjuryImpact) -> f64 {
    let p = 0.5 + 0.04 * (away.total_impact - home.total_impact);
    if p.is_nan() {
        return 0.5;
    }
    p.clamp(0.20, 0.80)
}
