pub mod newsapi;
pub mod rss;

use std::time::Duration;

use crate::config::DigestConfig;
use crate::ingest::types::SourceAdapter;
use newsapi::{NewsApiAdapter, NewsApiCfg};
use rss::RssFeedAdapter;

pub const USER_AGENT: &str = concat!("news-digest/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for every source; the per-source timeout is applied here too.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .timeout(timeout)
        .build()
}

/// Build the configured adapters: one per feed, plus NewsAPI when it has a key.
pub fn from_config(cfg: &DigestConfig, client: reqwest::Client) -> Vec<Box<dyn SourceAdapter>> {
    let mut out: Vec<Box<dyn SourceAdapter>> = cfg
        .feeds
        .iter()
        .map(|f| {
            Box::new(RssFeedAdapter::from_url(f.name.clone(), f.url.clone(), client.clone()))
                as Box<dyn SourceAdapter>
        })
        .collect();

    if cfg.newsapi.enabled {
        if cfg.newsapi.api_key.is_empty() {
            tracing::warn!(target: "ingest", "NewsAPI enabled but no key (NEWSAPI_KEY); skipping it");
        } else {
            let api = NewsApiCfg {
                api_key: cfg.newsapi.api_key.clone(),
                base_url: cfg.newsapi.base_url.clone(),
                language: cfg.newsapi.language.clone(),
                page_size: cfg.newsapi.page_size,
            };
            out.push(Box::new(NewsApiAdapter::new(api, cfg.keywords.clone(), client)));
        }
    }
    out
}
