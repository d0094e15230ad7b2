use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::{GameContext, game_context};
use crate::elo::{RatingStore, home_win_expectation};
use crate::form::{
    HeadToHead, PYTHAGOREAN_MIN_GAMES, RecentForm, FormStrength, SeasonStats, form_probability,
    head_to_head, log5, recent_form, season_stats,
};
use crate::games::{self, HistoricalGame, ScheduledGame, record_win_pct};
use crate::injuries::{InjuryImpact, InjuryReport, InjurySeverity, injury_impact, injury_probability};
use crate::league::League;
use crate::market::{MarketTier, MarketView, MatchedMarketResult};
use crate::weights::{BlendWeights, WeightsStore};

const ELO_DIFF_COEF: f64 = 0.008;
const FORM_DIFF_COEF: f64 = 0.6;
const RECORD_DIFF_COEF: f64 = 0.4;
const ENSEMBLE_INTERCEPT: f64 = 0.05;
const PYTHAGOREAN_HOME_EDGE: f64 = 0.04;
const RECORD_HOME_EDGE: f64 = 0.055;
const CONTEXT_WEIGHT: f64 = 0.10;

const STRONG_DIVERGENCE: f64 = 0.15;
const MODERATE_DIVERGENCE: f64 = 0.08;
const MIN_BET_EDGE: f64 = 0.05;
const KELLY_FRACTION: f64 = 0.25;
const BASE_WAGER: f64 = 50.0;

/// Everything the engine needs to price one game. The history window may
/// contain anything; it is filtered before use.
#[derive(Debug, Clone, Copy)]
pub struct GameInput<'a> {
    pub game: &'a ScheduledGame,
    pub history: &'a [HistoricalGame],
    pub markets: &'a MatchedMarketResult,
    pub home_injuries: &'a [InjuryReport],
    pub away_injuries: &'a [InjuryReport],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_final(p: f64) -> Self {
        let lean = (p - 0.5).abs();
        if lean > 0.2 {
            ConfidenceLevel::High
        } else if lean > 0.1 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStrength {
    Strong,
    Moderate,
    Weak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "Follow Market")]
    FollowMarket,
    #[serde(rename = "Fade Market")]
    FadeMarket,
    #[serde(rename = "Lean Market")]
    LeanMarket,
    #[serde(rename = "Lean Model")]
    LeanModel,
    Neutral,
}

impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::FollowMarket => "Follow Market",
            Recommendation::FadeMarket => "Fade Market",
            Recommendation::LeanMarket => "Lean Market",
            Recommendation::LeanModel => "Lean Model",
            Recommendation::Neutral => "Neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Home,
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DivergenceSignal {
    pub divergence: f64,
    pub strength: SignalStrength,
    pub recommendation: Recommendation,
}

pub fn divergence_signal(model: f64, market: f64) -> DivergenceSignal {
    let divergence = (model - market).abs();
    let (strength, recommendation) = if divergence > STRONG_DIVERGENCE {
        let rec = if market > model {
            Recommendation::FollowMarket
        } else {
            Recommendation::FadeMarket
        };
        (SignalStrength::Strong, rec)
    } else if divergence > MODERATE_DIVERGENCE {
        let rec = if market > model {
            Recommendation::LeanMarket
        } else {
            Recommendation::LeanModel
        };
        (SignalStrength::Moderate, rec)
    } else {
        (SignalStrength::Weak, Recommendation::Neutral)
    };
    DivergenceSignal {
        divergence,
        strength,
        recommendation,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    pub side: Side,
    pub team: String,
    pub edge: f64,
    pub kelly_fraction: f64,
    pub amount: u32,
    pub display: String,
    pub action: String,
    pub value_proposition: String,
}

/// Quarter-Kelly stake on the side the model prefers over the market.
pub fn size_wager(
    model: f64,
    market: f64,
    strength: SignalStrength,
    home_team: &str,
    away_team: &str,
) -> Wager {
    let (side, team, edge, kelly) = if model > market {
        let kelly = if market < 1.0 { (model - market) / (1.0 - market) } else { 0.0 };
        (Side::Home, home_team, model - market, kelly)
    } else {
        let kelly = if market > 0.0 { (market - model) / market } else { 0.0 };
        (Side::Away, away_team, market - model, kelly)
    };
    let kelly_fraction = (kelly * KELLY_FRACTION).max(0.0);

    if edge <= MIN_BET_EDGE {
        return Wager {
            side,
            team: team.to_string(),
            edge,
            kelly_fraction,
            amount: 0,
            display: "No Bet".to_string(),
            action: "Stay Away".to_string(),
            value_proposition: "No significant edge found. Market and Model are aligned."
                .to_string(),
        };
    }

    let raw = (BASE_WAGER * (1.0 + kelly_fraction * 5.0)).floor() as u32;
    let (amount, display, action) = match strength {
        SignalStrength::Strong => {
            let a = raw.clamp(25, 100);
            (a, format!("${a}-${}", a + 25), format!("Bet {team}"))
        }
        SignalStrength::Moderate => {
            let a = raw.clamp(15, 50);
            (a, format!("${a}-${}", a + 15), format!("Lean {team}"))
        }
        SignalStrength::Weak => (10, "$10-$20".to_string(), format!("Lean {team}")),
    };

    let (model_p, market_p) = match side {
        Side::Home => (model, market),
        Side::Away => (1.0 - model, 1.0 - market),
    };
    let value_proposition = if model_p < 0.5 {
        format!(
            "Value Opportunity: {team} is the underdog ({:.0}% win prob) but the market price ({:.0}%) is too low.",
            model_p * 100.0,
            market_p * 100.0
        )
    } else {
        format!(
            "Edge Play: model sees {team} winning {:.0}% of the time against a market price of {:.0}%.",
            model_p * 100.0,
            market_p * 100.0
        )
    };

    Wager {
        side,
        team: team.to_string(),
        edge,
        kelly_fraction,
        amount,
        display,
        action,
        value_proposition,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentProbs {
    pub elo_prob: f64,
    pub form_prob: f64,
    pub record_prob: f64,
    pub injury_prob: f64,
    pub context_prob: f64,
    pub ensemble_prob: f64,
    pub h2h_adjustment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub home_elo: f64,
    pub away_elo: f64,
    pub home_form: RecentForm,
    pub away_form: RecentForm,
    pub head_to_head: HeadToHead,
    pub home_season: SeasonStats,
    pub away_season: SeasonStats,
    pub used_pythagorean: bool,
    pub home_injuries: InjuryImpact,
    pub away_injuries: InjuryImpact,
    pub context: GameContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub game_id: String,
    pub league: League,
    pub home_team: String,
    pub away_team: String,
    pub game_date: String,
    pub components: ComponentProbs,
    pub stat_model_prob: f64,
    pub market: MarketView,
    pub home_win_prob: f64,
    pub confidence: ConfidenceLevel,
    pub signal: DivergenceSignal,
    pub wager: Wager,
    pub weights: BlendWeights,
    pub analytics: Analytics,
    pub reasoning: Vec<String>,
}

/// Final-blend weights by market tier: (stats, market, elo, form, ensemble).
fn final_blend(tier: MarketTier) -> [f64; 5] {
    match tier {
        MarketTier::High => [0.20, 0.50, 0.15, 0.10, 0.05],
        MarketTier::Medium => [0.30, 0.40, 0.15, 0.10, 0.05],
        MarketTier::Low => [0.35, 0.15, 0.25, 0.20, 0.05],
    }
}

fn tier_term(tier: MarketTier) -> f64 {
    match tier {
        MarketTier::High => 0.02,
        MarketTier::Medium => 0.0,
        MarketTier::Low => -0.01,
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn neutral(p: f64) -> f64 {
    if p.is_finite() { p } else { 0.5 }
}

/// Finished games touching either team, minus the game being priced, in date order.
pub fn prepare_history(game: &ScheduledGame, history: &[HistoricalGame]) -> Vec<HistoricalGame> {
    let mut out: Vec<HistoricalGame> = history
        .iter()
        .filter(|g| g.is_final())
        .filter(|g| g.game_id != game.game_id)
        .filter(|g| g.involves(&game.home_team_id) || g.involves(&game.away_team_id))
        .cloned()
        .collect();
    games::sort_by_date(&mut out);
    out
}

struct RecordView {
    prob: f64,
    diff: f64,
    used_pythagorean: bool,
}

fn record_view(
    game: &ScheduledGame,
    home_season: &SeasonStats,
    away_season: &SeasonStats,
) -> RecordView {
    if home_season.games_played >= PYTHAGOREAN_MIN_GAMES
        && away_season.games_played >= PYTHAGOREAN_MIN_GAMES
    {
        let (h, a) = (home_season.pythagorean_win_pct, away_season.pythagorean_win_pct);
        let p = log5(h, a) + PYTHAGOREAN_HOME_EDGE;
        return RecordView {
            prob: neutral(p).clamp(0.15, 0.85),
            diff: neutral(h - a),
            used_pythagorean: true,
        };
    }
    let h = record_win_pct(game.home_record.as_deref());
    let a = record_win_pct(game.away_record.as_deref());
    let p = 0.5 + 0.35 * (h - a) + RECORD_HOME_EDGE;
    RecordView {
        prob: neutral(p).clamp(0.15, 0.85),
        diff: neutral(h - a),
        used_pythagorean: false,
    }
}

pub struct EnsembleEngine {
    ratings: Arc<RatingStore>,
    weights: Arc<WeightsStore>,
}

impl EnsembleEngine {
    pub fn new(ratings: Arc<RatingStore>, weights: Arc<WeightsStore>) -> Self {
        Self { ratings, weights }
    }

    pub fn ratings(&self) -> &Arc<RatingStore> {
        &self.ratings
    }

    pub fn evaluate(&self, input: &GameInput<'_>) -> PredictionResult {
        let weights = self.weights.snapshot();
        evaluate_with(&self.ratings, &weights, input)
    }

    /// Prices a slate in parallel; results come back in input order.
    pub fn evaluate_slate(&self, inputs: &[GameInput<'_>]) -> Vec<PredictionResult> {
        let weights = self.weights.snapshot();
        inputs
            .par_iter()
            .map(|input| evaluate_with(&self.ratings, &weights, input))
            .collect()
    }
}

fn evaluate_with(
    ratings: &RatingStore,
    weights: &BlendWeights,
    input: &GameInput<'_>,
) -> PredictionResult {
    let game = input.game;
    let league = game.league;
    let history = prepare_history(game, input.history);

    let home_elo = ratings.get(&game.home_team_id, league);
    let away_elo = ratings.get(&game.away_team_id, league);
    let elo_prob = neutral(home_win_expectation(home_elo, away_elo, league));

    let home_form = recent_form(&game.home_team_id, &history);
    let away_form = recent_form(&game.away_team_id, &history);
    let form_prob = form_probability(&home_form, &away_form);

    let home_season = season_stats(&game.home_team_id, league, &history);
    let away_season = season_stats(&game.away_team_id, league, &history);
    let record = record_view(game, &home_season, &away_season);

    let h2h = head_to_head(&game.home_team_id, &game.away_team_id, &history);
    let h2h_adj = h2h.adjustment();

    let home_injuries = injury_impact(input.home_injuries, league.sport());
    let away_injuries = injury_impact(input.away_injuries, league.sport());
    let injury_prob = injury_probability(&home_injuries, &away_injuries);

    let context = game_context(
        league,
        &game.home_team_id,
        &game.away_team_id,
        &game.home_team_abbrev,
        &game.away_team_abbrev,
        &game.game_date,
        &history,
    );
    let context_prob = neutral(context.context_prob);

    let market = MarketView::from_match(input.markets);

    let z = ELO_DIFF_COEF * (home_elo - away_elo)
        + FORM_DIFF_COEF * (home_form.win_pct - away_form.win_pct)
        + RECORD_DIFF_COEF * record.diff
        + ENSEMBLE_INTERCEPT;
    let ensemble_prob =
        neutral(sigmoid(z) + h2h_adj + tier_term(market.tier)).clamp(0.05, 0.95);

    let stat_model_prob = neutral(
        elo_prob * weights.elo
            + form_prob * weights.form
            + record.prob * weights.record
            + (0.5 + h2h_adj) * weights.h2h
            + injury_prob * weights.injury
            + (context_prob - 0.5) * CONTEXT_WEIGHT,
    )
    .clamp(0.10, 0.90);

    let [w_stats, w_market, w_elo, w_form, w_ensemble] = final_blend(market.tier);
    let home_win_prob = neutral(
        stat_model_prob * w_stats
            + market.home_prob * w_market
            + elo_prob * w_elo
            + form_prob * w_form
            + ensemble_prob * w_ensemble
            + h2h_adj,
    )
    .clamp(0.05, 0.95);

    let signal = divergence_signal(stat_model_prob, market.home_prob);
    let home_team = display_name(&game.home_team_name, "Home");
    let away_team = display_name(&game.away_team_name, "Away");
    let wager = size_wager(
        stat_model_prob,
        market.home_prob,
        signal.strength,
        &home_team,
        &away_team,
    );

    let analytics = Analytics {
        home_elo,
        away_elo,
        home_form,
        away_form,
        head_to_head: h2h,
        home_season,
        away_season,
        used_pythagorean: record.used_pythagorean,
        home_injuries,
        away_injuries,
        context,
    };
    let reasoning = reasoning(elo_prob, &signal, &analytics, &market);

    debug!(
        game_id = %game.game_id,
        stat_model_prob,
        home_win_prob,
        tier = market.tier.as_str(),
        "evaluated game"
    );

    PredictionResult {
        game_id: game.game_id.clone(),
        league,
        home_team,
        away_team,
        game_date: game.game_date.clone(),
        components: ComponentProbs {
            elo_prob,
            form_prob,
            record_prob: record.prob,
            injury_prob,
            context_prob,
            ensemble_prob,
            h2h_adjustment: h2h_adj,
        },
        stat_model_prob,
        market,
        home_win_prob,
        confidence: ConfidenceLevel::from_final(home_win_prob),
        signal,
        wager,
        weights: *weights,
        analytics,
        reasoning,
    }
}

fn display_name(name: &str, fallback: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        fallback.to_string()
    } else {
        name.to_string()
    }
}

fn reasoning(
    elo_prob: f64,
    signal: &DivergenceSignal,
    a: &Analytics,
    market: &MarketView,
) -> Vec<String> {
    let mut out = Vec::new();
    if signal.divergence > STRONG_DIVERGENCE {
        out.push(format!(
            "Model sees {}% divergence from market, strong edge signal.",
            (signal.divergence * 100.0) as i64
        ));
    }
    if (elo_prob - 0.5).abs() > 0.15 {
        let side = if elo_prob > 0.5 { "home" } else { "away" };
        out.push(format!(
            "Elo ratings favor {side} team ({:.1}% Elo win prob).",
            elo_prob * 100.0
        ));
    }
    let strong_form = if a.home_form.strength == FormStrength::Strong {
        Some(("Home", &a.home_form))
    } else if a.away_form.strength == FormStrength::Strong {
        Some(("Away", &a.away_form))
    } else {
        None
    };
    if let Some((side, f)) = strong_form {
        out.push(format!(
            "{side} team in strong recent form ({:.0}% win rate, {:+.1} avg margin).",
            f.win_pct * 100.0,
            f.avg_point_diff
        ));
    }
    if a.used_pythagorean {
        let gap = a.home_season.pythagorean_win_pct - a.away_season.pythagorean_win_pct;
        if gap.abs() > 0.15 {
            let leader = if gap > 0.0 { "Home" } else { "Away" };
            out.push(format!(
                "{leader} team has significantly better underlying scoring (Pythagorean expectation)."
            ));
        }
    }
    for (side, impact) in [("Home", &a.home_injuries), ("Away", &a.away_injuries)] {
        if impact.severity >= InjurySeverity::High {
            out.push(format!(
                "{side} team has {} injury impact ({} key players out).",
                impact.severity.as_str(),
                impact.key_players_out.len()
            ));
        }
    }
    if market.tier == MarketTier::High {
        out.push(format!(
            "High market liquidity ({} contracts) suggests efficient pricing.",
            market.volume as i64
        ));
    }
    out
}
