// src/ingest/providers/newsapi.rs
//! Keyword-search source backed by the NewsAPI `/v2/everything` endpoint.

use async_trait::async_trait;
use serde::Deserialize;

use crate::ingest::normalize_text;
use crate::ingest::providers::rss::parse_feed_date;
use crate::ingest::types::{Article, FetchError, FetchWindow, SourceAdapter};

pub const DEFAULT_NEWSAPI_BASE: &str = "https://newsapi.org";
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct Resp {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    #[serde(default)]
    source: Option<ItemSource>,
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemSource {
    name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewsApiCfg {
    pub api_key: String,
    pub base_url: String,
    pub language: String,
    pub page_size: u32,
}

impl NewsApiCfg {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_NEWSAPI_BASE.to_string(),
            language: "en".to_string(),
            page_size: MAX_PAGE_SIZE,
        }
    }
}

pub struct NewsApiAdapter {
    keywords: Vec<String>,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        cfg: NewsApiCfg,
        client: reqwest::Client,
    },
}

/// `"kw1" OR "kw2"`; quotes keep multi-word keywords together.
pub fn build_query(keywords: &[String]) -> String {
    keywords
        .iter()
        .map(|k| format!("\"{}\"", k.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

impl NewsApiAdapter {
    pub fn new(cfg: NewsApiCfg, keywords: Vec<String>, client: reqwest::Client) -> Self {
        Self {
            keywords,
            mode: Mode::Http { cfg, client },
        }
    }

    pub fn from_fixture(json: &str) -> Self {
        Self {
            keywords: Vec::new(),
            mode: Mode::Fixture(json.to_string()),
        }
    }

    fn parse_body(body: &str, window: FetchWindow) -> Result<Vec<Article>, FetchError> {
        let resp: Resp =
            serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
        if resp.status != "ok" {
            return Err(FetchError::Malformed(format!(
                "newsapi status {}: {}",
                resp.status,
                resp.message.unwrap_or_default()
            )));
        }

        let mut out = Vec::with_capacity(resp.articles.len());
        for it in resp.articles {
            let Some(url) = it.url.filter(|u| !u.trim().is_empty()) else {
                continue;
            };
            let published_at = it.published_at.as_deref().and_then(parse_feed_date);
            if !window.admits(published_at) {
                continue;
            }
            let source = it
                .source
                .and_then(|s| s.name)
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "NewsAPI".to_string());
            let title = it
                .title
                .map(|t| normalize_text(&t))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Untitled".to_string());
            let summary = it
                .description
                .filter(|d| !d.trim().is_empty())
                .or(it.content)
                .map(|d| normalize_text(&d));

            out.push(Article::new(source, title, Some(url), published_at, summary));
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for NewsApiAdapter {
    async fn fetch(&self, window: FetchWindow) -> Result<Vec<Article>, FetchError> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_body(s, window),
            Mode::Http { cfg, client } => {
                if cfg.api_key.is_empty() {
                    return Err(FetchError::Unconfigured("NEWSAPI_KEY is empty".into()));
                }
                let from = window.cutoff().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
                let page_size = cfg.page_size.clamp(1, MAX_PAGE_SIZE).to_string();
                let query = build_query(&self.keywords);
                let endpoint = format!("{}/v2/everything", cfg.base_url.trim_end_matches('/'));

                let resp = client
                    .get(endpoint)
                    .header("X-Api-Key", &cfg.api_key)
                    .query(&[
                        ("q", query.as_str()),
                        ("from", from.as_str()),
                        ("language", cfg.language.as_str()),
                        ("sortBy", "publishedAt"),
                        ("pageSize", page_size.as_str()),
                    ])
                    .send()
                    .await?;
                let status = resp.status();
                let body = resp.text().await?;
                if !status.is_success() {
                    tracing::debug!(target: "ingest", %status, body = %body, "newsapi non-2xx");
                    return Err(FetchError::Http {
                        status: status.as_u16(),
                    });
                }
                Self::parse_body(&body, window)
            }
        }
    }

    fn name(&self) -> &str {
        "NewsAPI"
    }
}
