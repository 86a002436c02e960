// tests/providers_newsapi.rs
mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use common::{spawn_server, t0};
use news_digest::ingest::providers::newsapi::{NewsApiAdapter, NewsApiCfg};
use news_digest::ingest::types::{FetchError, FetchWindow, SourceAdapter};

const EVERYTHING: &str = include_str!("fixtures/newsapi_everything.json");

fn window() -> FetchWindow {
    FetchWindow::hours(t0(), 8)
}

#[tokio::test]
async fn fixture_maps_articles_and_drops_unusable_ones() {
    let items = NewsApiAdapter::from_fixture(EVERYTHING)
        .fetch(window())
        .await
        .expect("fixture parses");

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].source, "Tech Wire");
    assert_eq!(items[0].summary.as_deref(), Some("A look at agentic features."));

    // blank source name and blank description fall back
    assert_eq!(items[1].source, "NewsAPI");
    assert_eq!(
        items[1].summary.as_deref(),
        Some("Content fallback used as summary")
    );
}

#[derive(Default)]
struct Seen {
    key: Option<String>,
    query: HashMap<String, String>,
}

#[tokio::test]
async fn http_request_carries_key_query_and_window() {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let app = Router::new()
        .route(
            "/v2/everything",
            get(
                |State(seen): State<Arc<Mutex<Seen>>>,
                 headers: HeaderMap,
                 Query(q): Query<HashMap<String, String>>| async move {
                    let mut s = seen.lock().unwrap();
                    s.key = headers
                        .get("x-api-key")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    s.query = q;
                    EVERYTHING
                },
            ),
        )
        .with_state(seen.clone());
    let base = spawn_server(app).await;

    let cfg = NewsApiCfg {
        base_url: base,
        page_size: 500,
        ..NewsApiCfg::new("secret-key")
    };
    let adapter = NewsApiAdapter::new(
        cfg,
        vec!["OpenAI".to_string(), "Gemini".to_string()],
        reqwest::Client::new(),
    );
    let items = adapter.fetch(window()).await.unwrap();
    assert_eq!(items.len(), 2);

    let s = seen.lock().unwrap();
    assert_eq!(s.key.as_deref(), Some("secret-key"));
    assert_eq!(s.query["q"], r#""OpenAI" OR "Gemini""#);
    assert_eq!(s.query["from"], "2025-06-01T05:00:00Z");
    assert_eq!(s.query["language"], "en");
    assert_eq!(s.query["sortBy"], "publishedAt");
    assert_eq!(s.query["pageSize"], "100");
}

#[tokio::test]
async fn rejected_key_is_an_http_error() {
    let app = Router::new().route(
        "/v2/everything",
        get(|| async {
            (
                StatusCode::UNAUTHORIZED,
                r#"{"status":"error","code":"apiKeyInvalid","message":"bad key"}"#,
            )
        }),
    );
    let base = spawn_server(app).await;

    let cfg = NewsApiCfg {
        base_url: base,
        ..NewsApiCfg::new("wrong")
    };
    let err = NewsApiAdapter::new(cfg, vec!["AI".into()], reqwest::Client::new())
        .fetch(window())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Http { status: 401 }));
}

#[tokio::test]
async fn empty_key_never_hits_the_network() {
    let cfg = NewsApiCfg {
        base_url: "http://127.0.0.1:9".into(),
        ..NewsApiCfg::new("")
    };
    let err = NewsApiAdapter::new(cfg, vec!["AI".into()], reqwest::Client::new())
        .fetch(window())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Unconfigured(_)));
}
