use std::fs;
use std::path::PathBuf;

use matchup_edge::games::ScheduledGame;
use matchup_edge::league::League;
use matchup_edge::market::{
    MarketTier, MarketView, MatchedMarketResult, RawMarketQuote, match_game_to_markets,
};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn fixture_markets() -> Vec<RawMarketQuote> {
    serde_json::from_str(&read_fixture("markets.json")).expect("fixture should parse")
}

fn game(home: (&str, &str), away: (&str, &str)) -> ScheduledGame {
    ScheduledGame {
        game_id: format!("{}-{}", away.1, home.1),
        league: League::Nba,
        home_team_id: home.1.to_string(),
        away_team_id: away.1.to_string(),
        home_team_name: home.0.to_string(),
        away_team_name: away.0.to_string(),
        home_team_abbrev: home.1.to_string(),
        away_team_abbrev: away.1.to_string(),
        home_record: None,
        away_record: None,
        home_score: None,
        away_score: None,
        game_date: "2025-03-02T01:30:00Z".to_string(),
        status: "scheduled".to_string(),
    }
}

#[test]
fn pairs_per_team_contracts_into_dual_match() {
    let markets = fixture_markets();
    let g = game(("Los Angeles Lakers", "LAL"), ("Boston Celtics", "BOS"));
    let matched = match_game_to_markets(&g, &markets);
    let MatchedMarketResult::Dual { home, away } = &matched else {
        panic!("expected dual match, got {matched:?}");
    };
    assert_eq!(home.market_id, "KXNBAGAME-25MAR01BOSLAL-LAL");
    assert_eq!(away.market_id, "KXNBAGAME-25MAR01BOSLAL-BOS");

    let view = MarketView::from_match(&matched);
    assert!((view.home_prob - 0.63).abs() < 1e-12);
    assert!((view.away_prob - 0.38).abs() < 1e-12);
    assert_eq!(view.volume, 5600.0);
    assert_eq!(view.spread, 2.0);
    assert_eq!(view.tier, MarketTier::High);
    assert_eq!(view.market_kind, "dual");
}

#[test]
fn full_team_name_subtitles_pair_up() {
    let quote = |ticker: &str, subtitle: &str, price: f64| RawMarketQuote {
        ticker: ticker.to_string(),
        title: "Boston vs Los Angeles Winner?".to_string(),
        subtitle: Some(subtitle.to_string()),
        last_price: Some(price),
        ..RawMarketQuote::default()
    };
    let markets = vec![
        quote("KX-LAL", "Los Angeles Lakers", 41.0),
        quote("KX-BOS", "Boston Celtics", 60.0),
    ];
    let g = game(("Boston Celtics", "BOS"), ("Los Angeles Lakers", "LAL"));
    let matched = match_game_to_markets(&g, &markets);
    let MatchedMarketResult::Dual { home, away } = &matched else {
        panic!("expected dual match, got {matched:?}");
    };
    assert_eq!(home.market_id, "KX-BOS");
    assert_eq!(away.market_id, "KX-LAL");
    assert!((MarketView::from_match(&matched).home_prob - 0.60).abs() < 1e-12);
}

#[test]
fn market_naming_both_teams_resolves_to_home() {
    let markets = fixture_markets();
    let g = game(("New York Knicks", "NYK"), ("Miami Heat", "MIA"));
    let matched = match_game_to_markets(&g, &markets);
    let MatchedMarketResult::SingleHome { home } = &matched else {
        panic!("expected single home match, got {matched:?}");
    };
    assert_eq!(home.market_id, "KXNBAGAME-25MAR01MIANYK");

    let view = MarketView::from_match(&matched);
    assert!((view.home_prob - 0.55).abs() < 1e-12);
    assert_eq!(view.tier, MarketTier::Medium);
    assert_eq!(view.away_market_id, None);
}

#[test]
fn away_only_market_is_mirrored_to_home_view() {
    let markets = fixture_markets();
    let g = game(("Chicago Bulls", "CHI"), ("Phoenix Suns", "PHX"));
    let matched = match_game_to_markets(&g, &markets);
    assert_eq!(matched.kind(), "single_away");

    let view = MarketView::from_match(&matched);
    // No last trade, so the away price is the bid/ask mid.
    assert!((view.away_prob - 0.46).abs() < 1e-12);
    assert!((view.home_prob - 0.54).abs() < 1e-12);
    assert_eq!(view.yes_bid, 52.0);
    assert_eq!(view.yes_ask, 56.0);
    assert_eq!(view.tier, MarketTier::Low);
}

#[test]
fn unrelated_markets_leave_game_unmatched() {
    let markets = fixture_markets();
    let g = game(("Denver Nuggets", "DEN"), ("Golden State Warriors", "GSW"));
    let matched = match_game_to_markets(&g, &markets);
    assert_eq!(matched, MatchedMarketResult::None);
    assert!(!matched.is_matched());

    let view = MarketView::from_match(&matched);
    assert_eq!(view.home_prob, 0.5);
    assert_eq!(view.volume, 0.0);
    assert_eq!(view.tier, MarketTier::Low);
    assert!(match_game_to_markets(&g, &[]) == MatchedMarketResult::None);
}

#[test]
fn first_listed_team_contract_wins_ties() {
    let mut markets = fixture_markets();
    markets.insert(
        2,
        RawMarketQuote {
            ticker: "KXNBASERIES-LAL".to_string(),
            title: "Lakers series".to_string(),
            subtitle: Some("Lakers".to_string()),
            last_price: Some(70.0),
            ..RawMarketQuote::default()
        },
    );
    let g = game(("Los Angeles Lakers", "LAL"), ("Boston Celtics", "BOS"));
    let MatchedMarketResult::Dual { home, .. } = match_game_to_markets(&g, &markets) else {
        panic!("expected dual match");
    };
    assert_eq!(home.market_id, "KXNBAGAME-25MAR01BOSLAL-LAL");
}

#[test]
fn match_result_serializes_with_type_tag() {
    let json = serde_json::to_value(MatchedMarketResult::None).expect("serialize");
    assert_eq!(json["type"], "none");

    let markets = fixture_markets();
    let g = game(("Chicago Bulls", "CHI"), ("Phoenix Suns", "PHX"));
    let json = serde_json::to_value(match_game_to_markets(&g, &markets)).expect("serialize");
    assert_eq!(json["type"], "single_away");
    assert_eq!(json["away"]["market_id"], "KXNBAGAME-25MAR01PHXCHI-PHX");
}
