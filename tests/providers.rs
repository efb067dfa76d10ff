//! Provider adapters against wiremock-served fixtures, and the fallback chain
//! wired to real adapters.

use std::sync::Arc;
use std::time::Duration;

use apex_stats::config::RateLimitConfig;
use apex_stats::models::{CanonicalRows, DataType, GameStatus, Sport};
use apex_stats::providers::{
    EspnProvider, FallbackChain, FetchOrigin, OddsApiProvider, ProviderError, SportsProvider,
};
use apex_stats::resilience::{
    BreakerRegistry, CircuitBreakerConfig, CircuitState, RequestGovernor, TtlCache,
};
use chrono::Utc;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn governor(name: &str) -> RequestGovernor {
    RequestGovernor::new(
        name,
        &RateLimitConfig {
            requests_per_second: 100,
            burst_size: 100,
            max_retries: 0,
            backoff_base_ms: 1,
            backoff_max_ms: 1,
        },
    )
}

fn espn(server: &MockServer) -> EspnProvider {
    EspnProvider::new(&server.uri(), Duration::from_secs(2), governor("espn"), 0, 1).unwrap()
}

fn teams_fixture() -> serde_json::Value {
    json!({
        "sports": [{
            "leagues": [{
                "teams": [
                    {"team": {"displayName": "Boston Celtics", "abbreviation": "BOS", "name": "Celtics", "location": "Boston"}},
                    {"team": {"displayName": "New York Knicks", "abbreviation": "NY", "name": "Knicks", "location": "New York"}}
                ]
            }]
        }]
    })
}

fn scoreboard_fixture() -> serde_json::Value {
    json!({
        "events": [{
            "id": "401584793",
            "date": "2024-10-22T23:30Z",
            "competitions": [{
                "competitors": [
                    {"homeAway": "home", "score": "132",
                     "team": {"displayName": "Boston Celtics", "abbreviation": "BOS", "name": "Celtics"}},
                    {"homeAway": "away", "score": "109",
                     "team": {"displayName": "New York Knicks", "abbreviation": "NY", "name": "Knicks"}}
                ],
                "status": {"type": {"state": "post", "completed": true, "description": "Final"}}
            }]
        }]
    })
}

#[tokio::test]
async fn espn_parses_team_directory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/basketball/nba/teams"))
        .respond_with(ResponseTemplate::new(200).set_body_json(teams_fixture()))
        .mount(&server)
        .await;

    let rows = espn(&server)
        .fetch(Sport::Basketball, DataType::Teams)
        .await
        .unwrap();

    let CanonicalRows::Teams(teams) = rows else {
        panic!("expected team rows");
    };
    assert_eq!(teams.len(), 2);
    assert_eq!(teams[0].name, "Celtics");
    assert_eq!(teams[0].city, "Boston");
    assert_eq!(teams[0].league, "nba");
}

#[tokio::test]
async fn espn_parses_scoreboard_into_games() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/basketball/nba/scoreboard"))
        .respond_with(ResponseTemplate::new(200).set_body_json(scoreboard_fixture()))
        .mount(&server)
        .await;

    let rows = tokio_test::assert_ok!(espn(&server).fetch(Sport::Basketball, DataType::Games).await);

    let CanonicalRows::Games(games) = rows else {
        panic!("expected game rows");
    };
    assert_eq!(games.len(), 1);
    let game = &games[0];
    assert_eq!(game.home_team, "Celtics");
    assert_eq!(game.away_team, "Knicks");
    assert_eq!(game.status, GameStatus::Completed);
    assert_eq!((game.home_score, game.away_score), (Some(132), Some(109)));
    assert_eq!(game.external_id.as_deref(), Some("401584793"));
}

#[tokio::test]
async fn espn_maps_error_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = espn(&server)
        .fetch(Sport::Hockey, DataType::Teams)
        .await
        .unwrap_err();
    assert_eq!(err, ProviderError::RateLimited);
}

#[tokio::test]
async fn espn_reports_malformed_body_as_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = espn(&server)
        .fetch(Sport::Basketball, DataType::Teams)
        .await
        .unwrap_err();
    assert_eq!(err.category(), "parse");
}

#[tokio::test]
async fn odds_api_parses_lines() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/sports/basketball_nba/odds"))
        .and(query_param("apiKey", "test-key"))
        .and(query_param("oddsFormat", "american"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "home_team": "Boston Celtics",
            "away_team": "New York Knicks",
            "commence_time": Utc::now().to_rfc3339(),
            "bookmakers": [{
                "key": "draftkings",
                "markets": [
                    {"key": "h2h", "outcomes": [
                        {"name": "Boston Celtics", "price": -240},
                        {"name": "New York Knicks", "price": 195}
                    ]},
                    {"key": "spreads", "outcomes": [
                        {"name": "Boston Celtics", "price": -110, "point": -6.5},
                        {"name": "New York Knicks", "price": -110, "point": 6.5}
                    ]},
                    {"key": "totals", "outcomes": [
                        {"name": "Over", "price": -110, "point": 221.5}
                    ]}
                ]
            }]
        }])))
        .mount(&server)
        .await;

    let provider = OddsApiProvider::new(
        &server.uri(),
        Some(SecretString::from("test-key")),
        "us",
        Duration::from_secs(2),
        governor("odds_api"),
    )
    .unwrap();
    assert!(provider.supports(Sport::Basketball, DataType::Odds));

    let CanonicalRows::Odds(odds) = provider.fetch(Sport::Basketball, DataType::Odds).await.unwrap()
    else {
        panic!("expected odds rows");
    };
    assert_eq!(odds.len(), 1);
    assert_eq!(odds[0].home_team, "Celtics");
    assert_eq!(odds[0].home_moneyline, Some(dec!(-240)));
    assert_eq!(odds[0].spread, Some(dec!(-6.5)));
    assert_eq!(odds[0].total, Some(dec!(221.5)));
}

#[tokio::test]
async fn odds_api_without_key_is_not_configured() {
    let provider = OddsApiProvider::new(
        "http://127.0.0.1:1",
        None,
        "us",
        Duration::from_secs(1),
        governor("odds_api"),
    )
    .unwrap();
    assert!(!provider.supports(Sport::Basketball, DataType::Odds));
    let err = provider
        .fetch(Sport::Basketball, DataType::Odds)
        .await
        .unwrap_err();
    assert!(!err.counts_against_breaker());
}

fn chain_with(provider: EspnProvider, threshold: u32) -> FallbackChain {
    let breakers = Arc::new(BreakerRegistry::new(CircuitBreakerConfig {
        failure_threshold: threshold,
        recovery_timeout: Duration::from_secs(60),
        half_open_success_threshold: 1,
    }));
    FallbackChain::new(
        vec![Arc::new(provider) as Arc<dyn SportsProvider>],
        breakers,
        Arc::new(TtlCache::new(Duration::from_secs(60))),
        Duration::from_secs(30),
        Duration::from_secs(3600),
    )
}

#[tokio::test]
async fn chain_serves_cache_after_provider_outage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/basketball/nba/teams"))
        .respond_with(ResponseTemplate::new(200).set_body_json(teams_fixture()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let chain = chain_with(espn(&server), 5);

    let first = chain.fetch(Sport::Basketball, DataType::Teams).await;
    assert_eq!(
        first.origin,
        FetchOrigin::Live {
            provider: "espn".into()
        }
    );

    let second = chain.fetch(Sport::Basketball, DataType::Teams).await;
    assert!(matches!(second.origin, FetchOrigin::Cache { .. }));
    assert!(!second.degraded, "copy younger than live_ttl is fresh");
    assert_eq!(second.rows.len(), 2);
    assert_eq!(second.attempts[0].outcome, "status");
}

#[tokio::test]
async fn chain_trips_breaker_and_falls_back_to_static() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let chain = chain_with(espn(&server), 2);

    for _ in 0..2 {
        let outcome = chain.fetch(Sport::Basketball, DataType::Teams).await;
        assert_eq!(outcome.origin, FetchOrigin::Static);
        assert!(outcome.degraded);
        assert_eq!(outcome.rows.len(), 30);
    }

    let breaker = chain.breakers().get("espn");
    assert_eq!(breaker.state().await, CircuitState::Open);

    let requests_before = server.received_requests().await.unwrap_or_default().len();
    let outcome = chain.fetch(Sport::Basketball, DataType::Teams).await;
    assert_eq!(outcome.attempts[0].outcome, "circuit_open");
    let requests_after = server.received_requests().await.unwrap_or_default().len();
    assert_eq!(requests_before, requests_after, "open circuit must not call the provider");
}
