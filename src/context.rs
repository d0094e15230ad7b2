use std::collections::HashMap;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::games::{HistoricalGame, parse_game_datetime};
use crate::league::{League, Sport};

pub const DEFAULT_REST_DAYS: i64 = 7;
const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Venue {
    pub lat: f64,
    pub lon: f64,
}

const fn venue(lat: f64, lon: f64) -> Venue {
    Venue { lat, lon }
}

const NFL_VENUES: &[(&str, Venue)] = &[
    ("KC", venue(39.0997, -94.5786)),
    ("BUF", venue(42.8864, -78.8784)),
    ("MIA", venue(25.7617, -80.1918)),
    ("PHI", venue(39.9526, -75.1652)),
    ("DAL", venue(32.7767, -96.7970)),
    ("NE", venue(42.3662, -71.0621)),
    ("GB", venue(44.5013, -88.0622)),
    ("CHI", venue(41.8625, -87.6167)),
    ("NYG", venue(40.8136, -74.0744)),
    ("NYJ", venue(40.8136, -74.0744)),
    ("LAR", venue(34.0522, -118.2437)),
    ("LAC", venue(33.9533, -118.3389)),
    ("SF", venue(37.4033, -121.9694)),
    ("SEA", venue(47.5952, -122.3316)),
    ("DEN", venue(39.7392, -104.9903)),
    ("BAL", venue(39.2780, -76.6227)),
    ("PIT", venue(40.4468, -80.0158)),
    ("CLE", venue(41.5045, -81.6904)),
    ("CIN", venue(39.0951, -84.5160)),
    ("TEN", venue(36.1665, -86.7713)),
    ("IND", venue(39.7601, -86.1639)),
    ("JAX", venue(30.3239, -81.6373)),
    ("HOU", venue(29.7604, -95.3698)),
    ("ATL", venue(33.7490, -84.3880)),
    ("CAR", venue(35.2271, -80.8431)),
    ("NO", venue(29.9511, -90.0815)),
    ("TB", venue(27.9506, -82.4572)),
    ("ARI", venue(33.5275, -112.2625)),
    ("LV", venue(36.1673, -115.1485)),
    ("MIN", venue(44.9778, -93.2650)),
    ("DET", venue(42.3314, -83.0458)),
    ("WAS", venue(38.9072, -76.8644)),
];

const NBA_VENUES: &[(&str, Venue)] = &[
    ("BOS", venue(42.3662, -71.0621)),
    ("BKN", venue(40.6826, -73.9748)),
    ("NYK", venue(40.7505, -73.9934)),
    ("PHI", venue(39.9526, -75.1652)),
    ("TOR", venue(43.6532, -79.3832)),
    ("CHI", venue(41.8625, -87.6167)),
    ("CLE", venue(41.5045, -81.6904)),
    ("DET", venue(42.3314, -83.0458)),
    ("IND", venue(39.7601, -86.1639)),
    ("MIL", venue(43.0389, -87.9065)),
    ("ATL", venue(33.7490, -84.3880)),
    ("CHA", venue(35.2271, -80.8431)),
    ("MIA", venue(25.7617, -80.1918)),
    ("ORL", venue(28.5383, -81.3792)),
    ("WAS", venue(38.9072, -76.8644)),
    ("DEN", venue(39.7392, -104.9903)),
    ("MIN", venue(44.9778, -93.2650)),
    ("OKC", venue(35.4634, -97.5151)),
    ("POR", venue(45.5152, -122.6784)),
    ("UTA", venue(40.7608, -111.8910)),
    ("GSW", venue(37.7680, -122.3879)),
    ("LAC", venue(34.0522, -118.2437)),
    ("LAL", venue(34.0522, -118.2437)),
    ("PHX", venue(33.4484, -112.0740)),
    ("SAC", venue(38.5816, -121.4944)),
    ("DAL", venue(32.7767, -96.7970)),
    ("HOU", venue(29.7604, -95.3698)),
    ("MEM", venue(35.1495, -90.0490)),
    ("NO", venue(29.9511, -90.0815)),
    ("SA", venue(29.4241, -98.4936)),
];

/// Feed abbreviations that differ from the venue table keys.
const ABBREV_ALIASES: &[(Sport, &str, &str)] = &[
    (Sport::Football, "WSH", "WAS"),
    (Sport::Football, "JAC", "JAX"),
    (Sport::Football, "LA", "LAR"),
    (Sport::Basketball, "WSH", "WAS"),
    (Sport::Basketball, "GS", "GSW"),
    (Sport::Basketball, "NY", "NYK"),
    (Sport::Basketball, "SAS", "SA"),
    (Sport::Basketball, "NOP", "NO"),
    (Sport::Basketball, "UTAH", "UTA"),
    (Sport::Basketball, "PHO", "PHX"),
    (Sport::Basketball, "BRK", "BKN"),
];

static FOOTBALL_VENUES: Lazy<HashMap<&'static str, Venue>> =
    Lazy::new(|| NFL_VENUES.iter().copied().collect());
static BASKETBALL_VENUES: Lazy<HashMap<&'static str, Venue>> =
    Lazy::new(|| NBA_VENUES.iter().copied().collect());

/// Venue lookup by feed abbreviation. Only the professional leagues carry a table.
pub fn venue_for(league: League, abbrev: &str) -> Option<Venue> {
    if !matches!(league, League::Nba | League::Nfl) {
        return None;
    }
    let sport = league.sport();
    let upper = abbrev.trim().to_ascii_uppercase();
    let key = ABBREV_ALIASES
        .iter()
        .find(|(s, from, _)| *s == sport && *from == upper)
        .map(|(_, _, to)| *to)
        .unwrap_or(upper.as_str());
    let table = match sport {
        Sport::Football => &*FOOTBALL_VENUES,
        Sport::Basketball => &*BASKETBALL_VENUES,
    };
    table.get(key).copied()
}

pub fn haversine_km(a: Venue, b: Venue) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelImpact {
    pub distance_km: f64,
    pub time_zone_shift: f64,
    /// Probability points credited to the home side.
    pub home_edge: f64,
    pub description: String,
}

impl TravelImpact {
    fn unknown() -> Self {
        Self {
            distance_km: 0.0,
            time_zone_shift: 0.0,
            home_edge: 0.0,
            description: String::new(),
        }
    }
}

pub fn travel_impact(league: League, home_abbrev: &str, away_abbrev: &str) -> TravelImpact {
    let (Some(home), Some(away)) = (venue_for(league, home_abbrev), venue_for(league, away_abbrev))
    else {
        return TravelImpact::unknown();
    };
    let distance_km = haversine_km(home, away);
    let time_zone_shift = (away.lon - home.lon) / 15.0;

    let mut home_edge = 0.0;
    let mut reasons = Vec::new();
    if distance_km > 3000.0 {
        home_edge += 0.02;
        reasons.push(format!("Long travel ({}km)", distance_km as i64));
    } else if distance_km > 1500.0 {
        home_edge += 0.01;
    }
    if time_zone_shift.abs() >= 2.5 {
        home_edge += 0.015;
        reasons.push(format!("Time zone shift ({}h)", time_zone_shift.abs() as i64));
    }

    TravelImpact {
        distance_km,
        time_zone_shift,
        home_edge,
        description: if reasons.is_empty() {
            "Normal travel".to_string()
        } else {
            reasons.join(", ")
        },
    }
}

/// Days since `team_id`'s most recent game strictly before `game_day`.
pub fn rest_days(team_id: &str, game_day: Option<NaiveDate>, history: &[HistoricalGame]) -> i64 {
    let Some(day) = game_day else {
        return DEFAULT_REST_DAYS;
    };
    history
        .iter()
        .filter(|g| g.involves(team_id))
        .filter_map(HistoricalGame::date)
        .filter(|d| *d < day)
        .max()
        .map(|last| (day - last).num_days())
        .unwrap_or(DEFAULT_REST_DAYS)
}

pub fn rest_adjustment(sport: Sport, home_rest: i64, away_rest: i64) -> f64 {
    let mut adj = 0.0;
    match sport {
        Sport::Basketball => {
            if home_rest == 1 {
                adj -= 0.03;
            }
            if away_rest == 1 {
                adj += 0.03;
            }
            if home_rest >= 3 && away_rest == 1 {
                adj -= 0.01;
            }
        }
        Sport::Football => {
            if home_rest < 6 {
                adj -= 0.02;
            }
            if away_rest < 6 {
                adj += 0.02;
            }
            if home_rest > 10 {
                adj += 0.02;
            }
            if away_rest > 10 {
                adj -= 0.02;
            }
        }
    }
    adj
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameContext {
    pub home_rest_days: i64,
    pub away_rest_days: i64,
    pub rest_adjustment: f64,
    pub travel: TravelImpact,
    pub context_prob: f64,
}

pub fn game_context(
    league: League,
    home_id: &str,
    away_id: &str,
    home_abbrev: &str,
    away_abbrev: &str,
    game_date: &str,
    history: &[HistoricalGame],
) -> GameContext {
    let day = parse_game_datetime(game_date).map(|dt| dt.date());
    let home_rest_days = rest_days(home_id, day, history);
    let away_rest_days = rest_days(away_id, day, history);
    let rest = rest_adjustment(league.sport(), home_rest_days, away_rest_days);
    let travel = travel_impact(league, home_abbrev, away_abbrev);
    let context_prob = 0.5 + rest + travel.home_edge;
    GameContext {
        home_rest_days,
        away_rest_days,
        rest_adjustment: rest,
        travel,
        context_prob,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn played(team: &str, date: &str) -> HistoricalGame {
        HistoricalGame {
            game_id: format!("{team}-{date}"),
            league: League::Nba,
            home_team_id: team.to_string(),
            away_team_id: "99".to_string(),
            home_score: 100,
            away_score: 95,
            home_won: true,
            game_date: date.to_string(),
            status: "Final".to_string(),
            home_team_name: None,
            away_team_name: None,
        }
    }

    #[test]
    fn coast_to_coast_trip_favours_home() {
        let t = travel_impact(League::Nba, "BOS", "LAL");
        assert!(t.distance_km > 4000.0);
        assert!(t.time_zone_shift < -2.5);
        assert!((t.home_edge - 0.035).abs() < 1e-12);
    }

    #[test]
    fn aliases_and_unknowns() {
        assert_eq!(venue_for(League::Nba, "gs"), venue_for(League::Nba, "GSW"));
        assert!(venue_for(League::Nfl, "WSH").is_some());
        assert!(venue_for(League::Ncaab, "BOS").is_none());
        assert_eq!(travel_impact(League::Nba, "???", "LAL").home_edge, 0.0);
    }

    #[test]
    fn rest_days_counts_calendar_days() {
        let history = vec![
            played("1", "2024-01-01T00:30Z"),
            played("1", "2024-01-08T01:00Z"),
            played("1", "2024-01-12"),
        ];
        let day = NaiveDate::from_ymd_opt(2024, 1, 10);
        assert_eq!(rest_days("1", day, &history), 2);
        assert_eq!(rest_days("2", day, &history), DEFAULT_REST_DAYS);
        assert_eq!(rest_days("1", None, &history), DEFAULT_REST_DAYS);
    }

    #[test]
    fn basketball_back_to_back_rules() {
        assert!((rest_adjustment(Sport::Basketball, 1, 2) + 0.03).abs() < 1e-12);
        assert!((rest_adjustment(Sport::Basketball, 3, 1) - 0.02).abs() < 1e-12);
        assert_eq!(rest_adjustment(Sport::Basketball, 7, 7), 0.0);
    }

    #[test]
    fn football_short_week_and_bye() {
        assert!((rest_adjustment(Sport::Football, 4, 7) + 0.02).abs() < 1e-12);
        assert!((rest_adjustment(Sport::Football, 14, 7) - 0.02).abs() < 1e-12);
        assert_eq!(rest_adjustment(Sport::Football, 7, 7), 0.0);
    }
}
