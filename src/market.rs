use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::games::ScheduledGame;

/// Minimum title/ticker score for a lone market to stand in for the game.
const SINGLE_MARKET_MIN_SCORE: f64 = 1.5;
const NO_MARKET_SPREAD: f64 = 15.0;

/// A binary contract as delivered by the market feed. Prices are in cents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMarketQuote {
    pub ticker: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub event_ticker: Option<String>,
    #[serde(default)]
    pub last_price: Option<f64>,
    #[serde(default)]
    pub yes_bid: Option<f64>,
    #[serde(default)]
    pub yes_ask: Option<f64>,
    #[serde(default)]
    pub volume_24h: Option<f64>,
    #[serde(default)]
    pub open_interest: Option<f64>,
    #[serde(default)]
    pub liquidity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMarket {
    pub market_id: String,
    pub title: String,
    pub subtitle: String,
    /// The side the "yes" contract pays out on.
    pub subject: String,
    pub probability: f64,
    pub yes_bid: f64,
    pub yes_ask: f64,
    pub volume: f64,
    pub raw: RawMarketQuote,
}

impl NormalizedMarket {
    pub fn spread(&self) -> f64 {
        self.yes_ask - self.yes_bid
    }
}

pub fn normalize(quote: &RawMarketQuote) -> NormalizedMarket {
    let subtitle = quote.subtitle.clone().unwrap_or_default();
    let subject = if subtitle.is_empty() {
        quote.title.clone()
    } else {
        subtitle.clone()
    };
    let yes_bid = finite_or(quote.yes_bid, 0.0);
    let yes_ask = finite_or(quote.yes_ask, 100.0);

    let last = finite_or(quote.last_price, 0.0);
    let probability = if last != 0.0 {
        last / 100.0
    } else if yes_bid != 0.0 && yes_ask != 0.0 {
        (yes_bid + yes_ask) / 200.0
    } else {
        0.5
    };

    NormalizedMarket {
        market_id: quote.ticker.clone(),
        title: quote.title.clone(),
        subtitle,
        subject,
        probability,
        yes_bid,
        yes_ask,
        volume: finite_or(quote.volume_24h, 0.0),
        raw: quote.clone(),
    }
}

fn finite_or(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => default,
    }
}

/// Lower-case tokens that identify a team: words longer than two chars, the
/// mascot (last word), all words joined, and the abbreviation.
pub fn team_keys(name: &str, abbrev: &str) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    let words = canonical_words(name);
    if let Some(last) = words.last() {
        keys.insert(last.clone());
        keys.insert(words.concat());
    }
    keys.extend(words);
    let abbrev = abbrev.trim().to_ascii_lowercase();
    if !abbrev.is_empty() {
        keys.insert(abbrev);
    }
    keys.retain(|k| !k.is_empty());
    keys
}

fn canonical_words(name: &str) -> Vec<String> {
    let cleaned: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|w| w.len() > 2)
        .map(str::to_string)
        .collect()
}

fn mentions(text: &str, keys: &BTreeSet<String>) -> bool {
    keys.iter().any(|k| text.contains(k.as_str()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchedMarketResult {
    Dual {
        home: NormalizedMarket,
        away: NormalizedMarket,
    },
    SingleHome {
        home: NormalizedMarket,
    },
    SingleAway {
        away: NormalizedMarket,
    },
    None,
}

impl MatchedMarketResult {
    pub fn kind(&self) -> &'static str {
        match self {
            MatchedMarketResult::Dual { .. } => "dual",
            MatchedMarketResult::SingleHome { .. } => "single_home",
            MatchedMarketResult::SingleAway { .. } => "single_away",
            MatchedMarketResult::None => "none",
        }
    }

    pub fn is_matched(&self) -> bool {
        !matches!(self, MatchedMarketResult::None)
    }
}

/// Binds a scheduled game to its market(s). Pure; order of `markets` matters
/// only for tie-breaking (first wins).
pub fn match_game_to_markets(game: &ScheduledGame, markets: &[RawMarketQuote]) -> MatchedMarketResult {
    let home_keys = team_keys(&game.home_team_name, &game.home_team_abbrev);
    let away_keys = team_keys(&game.away_team_name, &game.away_team_abbrev);

    let mut home_match: Option<NormalizedMarket> = None;
    let mut away_match: Option<NormalizedMarket> = None;
    let mut best: Option<(f64, NormalizedMarket)> = None;

    for quote in markets {
        let norm = normalize(quote);
        let subject = norm.subject.to_lowercase();
        let is_home = mentions(&subject, &home_keys);
        let is_away = mentions(&subject, &away_keys);
        if is_home && !is_away && home_match.is_none() {
            home_match = Some(norm.clone());
        } else if is_away && !is_home && away_match.is_none() {
            away_match = Some(norm.clone());
        }

        let text = format!("{} {}", quote.title, quote.ticker).to_lowercase();
        let mut score = 0.0;
        if mentions(&text, &home_keys) {
            score += 1.0;
        }
        if mentions(&text, &away_keys) {
            score += 1.0;
        }
        let best_score = best.as_ref().map(|(s, _)| *s).unwrap_or(0.0);
        if score > best_score {
            best = Some((score, norm));
        }
    }

    if let (Some(home), Some(away)) = (&home_match, &away_match)
        && home.market_id != away.market_id
    {
        return MatchedMarketResult::Dual {
            home: home.clone(),
            away: away.clone(),
        };
    }

    match best {
        Some((score, market)) if score >= SINGLE_MARKET_MIN_SCORE => {
            let subject = market.subject.to_lowercase();
            let is_home = mentions(&subject, &home_keys);
            let is_away = mentions(&subject, &away_keys);
            if is_away && !is_home {
                MatchedMarketResult::SingleAway { away: market }
            } else {
                // Home-only, or a "BOS vs LAL" style market naming both sides.
                MatchedMarketResult::SingleHome { home: market }
            }
        }
        _ => MatchedMarketResult::None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketTier {
    High,
    Medium,
    Low,
}

impl MarketTier {
    pub fn classify(volume: f64, spread: f64) -> Self {
        if volume > 500.0 && spread <= 5.0 {
            MarketTier::High
        } else if volume > 100.0 && spread <= 15.0 {
            MarketTier::Medium
        } else {
            MarketTier::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MarketTier::High => "HIGH",
            MarketTier::Medium => "MEDIUM",
            MarketTier::Low => "LOW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn from_prob(p: f64) -> Self {
        if p > 0.6 {
            Trend::Up
        } else if p < 0.4 {
            Trend::Down
        } else {
            Trend::Flat
        }
    }
}

/// Home-perspective read of whatever markets matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketView {
    pub home_prob: f64,
    pub away_prob: f64,
    pub volume: f64,
    pub spread: f64,
    pub yes_bid: f64,
    pub yes_ask: f64,
    pub tier: MarketTier,
    pub trend: Trend,
    pub market_kind: String,
    pub home_market_id: Option<String>,
    pub away_market_id: Option<String>,
}

impl MarketView {
    pub fn from_match(matched: &MatchedMarketResult) -> Self {
        let (home_prob, away_prob, volume, spread, yes_bid, yes_ask, home_id, away_id) =
            match matched {
                MatchedMarketResult::Dual { home, away } => (
                    home.probability,
                    away.probability,
                    home.volume + away.volume,
                    (home.spread() + away.spread()) / 2.0,
                    home.yes_bid,
                    home.yes_ask,
                    Some(home.market_id.clone()),
                    Some(away.market_id.clone()),
                ),
                MatchedMarketResult::SingleHome { home } => (
                    home.probability,
                    1.0 - home.probability,
                    home.volume,
                    home.spread(),
                    home.yes_bid,
                    home.yes_ask,
                    Some(home.market_id.clone()),
                    None,
                ),
                MatchedMarketResult::SingleAway { away } => (
                    1.0 - away.probability,
                    away.probability,
                    away.volume,
                    away.spread(),
                    100.0 - away.yes_ask,
                    100.0 - away.yes_bid,
                    None,
                    Some(away.market_id.clone()),
                ),
                MatchedMarketResult::None => {
                    (0.5, 0.5, 0.0, NO_MARKET_SPREAD, 0.0, 0.0, None, None)
                }
            };

        let home_prob = if home_prob.is_finite() { home_prob } else { 0.5 };
        let away_prob = if away_prob.is_finite() { away_prob } else { 0.5 };
        Self {
            home_prob,
            away_prob,
            volume,
            spread,
            yes_bid,
            yes_ask,
            tier: MarketTier::classify(volume, spread),
            trend: Trend::from_prob(home_prob),
            market_kind: matched.kind().to_string(),
            home_market_id: home_id,
            away_market_id: away_id,
        }
    }
}
