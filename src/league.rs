use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sport {
    Basketball,
    Football,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    Nba,
    Ncaab,
    Nfl,
    Ncaaf,
}

impl League {
    pub const ALL: [League; 4] = [League::Nba, League::Ncaab, League::Nfl, League::Ncaaf];

    pub fn as_str(self) -> &'static str {
        match self {
            League::Nba => "nba",
            League::Ncaab => "ncaab",
            League::Nfl => "nfl",
            League::Ncaaf => "ncaaf",
        }
    }

    pub fn sport(self) -> Sport {
        match self {
            League::Nba | League::Ncaab => Sport::Basketball,
            League::Nfl | League::Ncaaf => Sport::Football,
        }
    }

    /// Elo points credited to the home side before computing expectation.
    pub fn home_advantage_elo(self) -> f64 {
        match self.sport() {
            Sport::Basketball => 65.0,
            Sport::Football => 55.0,
        }
    }

    pub fn pythagorean_exponent(self) -> f64 {
        match self.sport() {
            Sport::Basketball => 13.91,
            Sport::Football => 2.37,
        }
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLeague(pub String);

impl fmt::Display for UnknownLeague {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown league '{}', expected nba, ncaab, nfl or ncaaf", self.0)
    }
}

impl std::error::Error for UnknownLeague {}

impl FromStr for League {
    type Err = UnknownLeague;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "nba" | "basketball" => Ok(League::Nba),
            "ncaab" | "ncaam" | "cbb" => Ok(League::Ncaab),
            "nfl" | "football" => Ok(League::Nfl),
            "ncaaf" | "cfb" => Ok(League::Ncaaf),
            other => Err(UnknownLeague(other.to_string())),
        }
    }
}
