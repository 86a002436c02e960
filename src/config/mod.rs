// src/config/mod.rs
//! Run configuration: one immutable `DigestConfig` per invocation.
//!
//! Lookup order: explicit path (`--config`), then `$NEWS_DIGEST_CONFIG`, then
//! `config/news_digest.toml`, then `config/news_digest.json`, then built-in defaults.
//! Secrets set to `"ENV"` (or left empty) are read from the environment.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::filter::MatchMode;
use crate::ingest::CollectCfg;
use crate::notify::RetryPolicy;

pub const ENV_CONFIG_PATH: &str = "NEWS_DIGEST_CONFIG";
pub const ENV_NEWSAPI_KEY: &str = "NEWSAPI_KEY";
pub const ENV_TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

const DEFAULT_TOML_PATH: &str = "config/news_digest.toml";
const DEFAULT_JSON_PATH: &str = "config/news_digest.json";

fn default_keywords() -> Vec<String> {
    [
        "OpenAI",
        "Anthropic",
        "Gemini AI",
        "AI agents",
        "agentic AI",
        "agentic commerce",
        "agentic payments",
        "financial agents",
        "agent protocol",
        "agent SDK",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_feeds() -> Vec<FeedCfg> {
    [
        ("VentureBeat", "https://venturebeat.com/feed/"),
        ("MIT Tech Review", "https://www.technologyreview.com/feed/"),
        ("Ars Technica", "https://feeds.arstechnica.com/arstechnica/index"),
    ]
    .iter()
    .map(|(name, url)| FeedCfg {
        name: name.to_string(),
        url: url.to_string(),
    })
    .collect()
}

fn default_env_marker() -> String {
    "ENV".to_string()
}
fn default_window_hours() -> u32 {
    8
}
fn default_digest_size() -> usize {
    5
}
fn default_source_timeout_secs() -> u64 {
    10
}
fn default_fetch_deadline_secs() -> u64 {
    30
}
fn default_concurrency_limit() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCfg {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsApiSection {
    pub enabled: bool,
    /// "ENV" means: read from NEWSAPI_KEY
    pub api_key: String,
    pub base_url: String,
    pub language: String,
    pub page_size: u32,
}

impl Default for NewsApiSection {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: default_env_marker(),
            base_url: crate::ingest::providers::newsapi::DEFAULT_NEWSAPI_BASE.to_string(),
            language: "en".to_string(),
            page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSection {
    /// "ENV" means: read from TELEGRAM_BOT_TOKEN
    pub bot_token: String,
    /// "ENV" means: read from TELEGRAM_CHAT_ID
    pub chat_id: String,
    pub api_base: String,
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            bot_token: default_env_marker(),
            chat_id: default_env_marker(),
            api_base: crate::notify::telegram::DEFAULT_TELEGRAM_API.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySection {
    /// Total send attempts, first one included.
    pub max_attempts: u8,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub timeout_secs: u64,
    /// Best-effort "run failed" message on fatal errors.
    pub error_alerts: bool,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,
            timeout_secs: 10,
            error_alerts: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub path: PathBuf,
    /// Prune records older than this at commit time; `None` keeps everything.
    pub retention_days: Option<u32>,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/sent_articles.json"),
            retention_days: Some(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestSection {
    pub title: String,
    /// Offset of the header clock from UTC, in minutes (Lima is -300).
    pub utc_offset_minutes: i32,
}

impl Default for DigestSection {
    fn default() -> Self {
        Self {
            title: crate::digest::DEFAULT_DIGEST_TITLE.to_string(),
            utc_offset_minutes: -300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub match_mode: MatchMode,
    #[serde(default = "default_feeds")]
    pub feeds: Vec<FeedCfg>,
    #[serde(default)]
    pub newsapi: NewsApiSection,
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
    #[serde(default = "default_digest_size")]
    pub digest_size: usize,
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
    #[serde(default = "default_fetch_deadline_secs")]
    pub fetch_deadline_secs: u64,
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    #[serde(default)]
    pub notify: NotifySection,
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub digest: DigestSection,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            match_mode: MatchMode::default(),
            feeds: default_feeds(),
            newsapi: NewsApiSection::default(),
            window_hours: default_window_hours(),
            digest_size: default_digest_size(),
            source_timeout_secs: default_source_timeout_secs(),
            fetch_deadline_secs: default_fetch_deadline_secs(),
            concurrency_limit: default_concurrency_limit(),
            notify: NotifySection::default(),
            telegram: TelegramSection::default(),
            store: StoreSection::default(),
            digest: DigestSection::default(),
        }
    }
}

impl DigestConfig {
    /// Load from an explicit path. Supports TOML or JSON (by extension, then by sniffing).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.finish()
    }

    /// Explicit path, then env var, then the conventional locations, then defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit {
            return Self::load_from(p);
        }
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
        }
        for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let p = PathBuf::from(candidate);
            if p.exists() {
                return Self::load_from(&p);
            }
        }
        tracing::info!("no config file found; using built-in defaults");
        Self::default().finish()
    }

    /// Resolve secrets and sanitize values.
    fn finish(mut self) -> Result<Self> {
        self.keywords = clean_keywords(std::mem::take(&mut self.keywords));
        if self.keywords.is_empty() {
            bail!("at least one keyword must be configured");
        }
        self.feeds.retain(|f| !f.url.trim().is_empty());

        self.digest_size = self.digest_size.max(1);
        self.concurrency_limit = self.concurrency_limit.max(1);
        self.window_hours = self.window_hours.max(1);
        self.source_timeout_secs = self.source_timeout_secs.max(1);
        self.fetch_deadline_secs = self.fetch_deadline_secs.max(self.source_timeout_secs);
        self.notify.max_attempts = self.notify.max_attempts.max(1);
        self.notify.timeout_secs = self.notify.timeout_secs.max(1);
        if self.notify.backoff_max_ms < self.notify.backoff_base_ms {
            // swap to keep a valid interval
            std::mem::swap(&mut self.notify.backoff_base_ms, &mut self.notify.backoff_max_ms);
        }
        if !(-14 * 60..=14 * 60).contains(&self.digest.utc_offset_minutes) {
            bail!(
                "digest.utc_offset_minutes out of range: {}",
                self.digest.utc_offset_minutes
            );
        }

        self.newsapi.api_key = resolve_secret(&self.newsapi.api_key, ENV_NEWSAPI_KEY);
        self.telegram.bot_token = resolve_secret(&self.telegram.bot_token, ENV_TELEGRAM_BOT_TOKEN);
        self.telegram.chat_id = resolve_secret(&self.telegram.chat_id, ENV_TELEGRAM_CHAT_ID);

        if self.feeds.is_empty() && !self.newsapi.enabled {
            return Err(anyhow!("no sources configured: add feeds or enable newsapi"));
        }
        Ok(self)
    }

    pub fn collect_cfg(&self) -> CollectCfg {
        CollectCfg {
            concurrency_limit: self.concurrency_limit,
            source_timeout: Duration::from_secs(self.source_timeout_secs),
            deadline: Duration::from_secs(self.fetch_deadline_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.notify.max_attempts,
            base_delay: Duration::from_millis(self.notify.backoff_base_ms),
            max_delay: Duration::from_millis(self.notify.backoff_max_ms),
        }
    }

    pub fn retention(&self) -> Option<chrono::Duration> {
        self.store
            .retention_days
            .filter(|d| *d > 0)
            .map(|d| chrono::Duration::days(i64::from(d)))
    }

    pub fn utc_offset(&self) -> chrono::FixedOffset {
        use chrono::Offset;
        // Range is checked in `finish`.
        chrono::FixedOffset::east_opt(self.digest.utc_offset_minutes * 60)
            .unwrap_or_else(|| chrono::Utc.fix())
    }
}

fn resolve_secret(value: &str, env_name: &str) -> String {
    let v = value.trim();
    if v.is_empty() || v.eq_ignore_ascii_case("env") {
        std::env::var(env_name).unwrap_or_default().trim().to_string()
    } else {
        v.to_string()
    }
}

fn clean_keywords(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty() && seen.insert(k.to_lowercase()))
        .collect()
}

fn parse_config(s: &str, hint_ext: &str) -> Result<DigestConfig> {
    match hint_ext {
        "toml" => return Ok(toml::from_str(s)?),
        "json" => return Ok(serde_json::from_str(s)?),
        _ => {}
    }
    // No usable extension: JSON documents start with '{'.
    if s.trim_start().starts_with('{') {
        Ok(serde_json::from_str(s)?)
    } else {
        Ok(toml::from_str(s)?)
    }
}
