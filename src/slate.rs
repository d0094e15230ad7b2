use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::games::{HistoricalGame, ScheduledGame};
use crate::injuries::InjuryReport;
use crate::league::League;
use crate::market::{MatchedMarketResult, RawMarketQuote, match_game_to_markets};
use crate::win_prob::GameInput;

/// A batch of games to price, with the feeds they are priced against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slate {
    pub games: Vec<ScheduledGame>,
    #[serde(default)]
    pub markets: Vec<RawMarketQuote>,
    /// Injury reports keyed by team id.
    #[serde(default)]
    pub injuries: BTreeMap<String, Vec<InjuryReport>>,
    #[serde(default)]
    pub history: Vec<HistoricalGame>,
}

impl Slate {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read slate {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse slate {}", path.display()))
    }

    pub fn leagues(&self) -> BTreeSet<League> {
        self.games.iter().map(|g| g.league).collect()
    }

    pub fn match_markets(&self) -> Vec<MatchedMarketResult> {
        self.games
            .iter()
            .map(|g| match_game_to_markets(g, &self.markets))
            .collect()
    }

    fn injuries_for(&self, team_id: &str) -> &[InjuryReport] {
        self.injuries.get(team_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Pairs each game with its matched markets; `matched` must come from
    /// [`Slate::match_markets`].
    pub fn inputs<'a>(
        &'a self,
        matched: &'a [MatchedMarketResult],
        history: &'a [HistoricalGame],
    ) -> Vec<GameInput<'a>> {
        self.games
            .iter()
            .zip(matched)
            .map(|(game, markets)| GameInput {
                game,
                history,
                markets,
                home_injuries: self.injuries_for(&game.home_team_id),
                away_injuries: self.injuries_for(&game.away_team_id),
            })
            .collect()
    }
}
