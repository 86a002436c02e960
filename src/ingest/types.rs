// src/ingest/types.rs
use std::collections::BTreeSet;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::fingerprint::fingerprint_for;

/// Canonical record every source adapter produces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Article {
    pub fingerprint: String,
    pub title: String,
    pub url: Option<String>,
    pub source: String, // e.g. "VentureBeat", "NewsAPI"
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    /// Filled by the keyword filter; empty until filtering runs.
    #[serde(default)]
    pub matched_keywords: BTreeSet<String>,
}

impl Article {
    /// Build an article and derive its fingerprint from `url` (or source + title).
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        url: Option<String>,
        published_at: Option<DateTime<Utc>>,
        summary: Option<String>,
    ) -> Self {
        let source = source.into();
        let title = title.into();
        let url = url.filter(|u| !u.trim().is_empty());
        let fingerprint = fingerprint_for(url.as_deref(), &source, &title);
        Self {
            fingerprint,
            title,
            url,
            source,
            published_at,
            summary: summary.filter(|s| !s.is_empty()),
            matched_keywords: BTreeSet::new(),
        }
    }
}

/// Lookback window handed to adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub now: DateTime<Utc>,
    pub lookback: ChronoDuration,
}

impl FetchWindow {
    pub fn hours(now: DateTime<Utc>, hours: u32) -> Self {
        Self {
            now,
            lookback: ChronoDuration::hours(i64::from(hours)),
        }
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.now - self.lookback
    }

    /// Undated items are treated as published "now" and always admitted.
    pub fn admits(&self, published_at: Option<DateTime<Utc>>) -> bool {
        match published_at {
            Some(ts) => ts >= self.cutoff(),
            None => true,
        }
    }
}

/// Typed failure of a single source. Never fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("timed out")]
    Timeout,
    #[error("HTTP status {status}")]
    Http { status: u16 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("source not configured: {0}")]
    Unconfigured(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return FetchError::Timeout;
        }
        if let Some(status) = e.status() {
            return FetchError::Http {
                status: status.as_u16(),
            };
        }
        if e.is_decode() {
            return FetchError::Malformed(e.to_string());
        }
        FetchError::Transport(e.to_string())
    }
}

/// A failure attributed to one named source.
#[derive(Debug)]
pub struct SourceFailure {
    pub source: String,
    pub error: FetchError,
}

#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, window: FetchWindow) -> Result<Vec<Article>, FetchError>;
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_admits_recent_and_undated() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let w = FetchWindow::hours(now, 8);
        assert!(w.admits(None));
        assert!(w.admits(Some(now - ChronoDuration::hours(8))));
        assert!(!w.admits(Some(now - ChronoDuration::hours(9))));
    }

    #[test]
    fn blank_url_falls_back_to_title_fingerprint() {
        let a = Article::new("Wire", "Same headline", Some("  ".into()), None, None);
        let b = Article::new("wire", "SAME HEADLINE", None, None, None);
        assert!(a.url.is_none());
        assert_eq!(a.fingerprint, b.fingerprint);
    }
}
