// tests/common/mod.rs
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use news_digest::ingest::types::{Article, FetchError, FetchWindow, SourceAdapter};
use news_digest::notify::{Notifier, NotifyError};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap()
}

pub fn article(source: &str, slug: &str, title: &str, minutes_ago: Option<i64>) -> Article {
    Article::new(
        source,
        title,
        Some(format!("https://news.example/{slug}")),
        minutes_ago.map(|m| t0() - chrono::Duration::minutes(m)),
        None,
    )
}

/// Returns a fixed list after an optional delay.
pub struct StaticSource {
    pub name: String,
    pub articles: Vec<Article>,
    pub delay: Duration,
    pub in_flight: Option<Arc<InFlight>>,
}

impl StaticSource {
    pub fn new(name: &str, articles: Vec<Article>) -> Self {
        Self {
            name: name.to_string(),
            articles,
            delay: Duration::ZERO,
            in_flight: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn tracked(mut self, t: Arc<InFlight>) -> Self {
        self.in_flight = Some(t);
        self
    }
}

#[async_trait]
impl SourceAdapter for StaticSource {
    async fn fetch(&self, _window: FetchWindow) -> Result<Vec<Article>, FetchError> {
        if let Some(t) = &self.in_flight {
            t.enter();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(t) = &self.in_flight {
            t.leave();
        }
        Ok(self.articles.clone())
    }
    fn name(&self) -> &str {
        &self.name
    }
}

pub struct FailingSource(pub &'static str);

#[async_trait]
impl SourceAdapter for FailingSource {
    async fn fetch(&self, _window: FetchWindow) -> Result<Vec<Article>, FetchError> {
        Err(FetchError::Transport("connection refused".into()))
    }
    fn name(&self) -> &str {
        self.0
    }
}

/// Never completes; only a timeout gets rid of it.
pub struct HangingSource(pub &'static str);

#[async_trait]
impl SourceAdapter for HangingSource {
    async fn fetch(&self, _window: FetchWindow) -> Result<Vec<Article>, FetchError> {
        std::future::pending::<()>().await;
        unreachable!()
    }
    fn name(&self) -> &str {
        self.0
    }
}

/// Tracks how many fetches run at once.
#[derive(Default)]
pub struct InFlight {
    now: AtomicUsize,
    pub max: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let n = self.now.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(n, Ordering::SeqCst);
    }
    fn leave(&self) {
        self.now.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Records every message; can fail the first N sends (transient) or always (fatal).
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
    pub transient_failures: usize,
    pub always_fatal: bool,
}

impl RecordingNotifier {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            always_fatal: true,
            ..Self::default()
        }
    }

    pub fn flaky(transient_failures: usize) -> Self {
        Self {
            transient_failures,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.always_fatal {
            return Err(NotifyError::Fatal("chat not found".into()));
        }
        if n < self.transient_failures {
            return Err(NotifyError::Transient("timeout".into()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Serve `app` on an ephemeral local port; returns `http://127.0.0.1:<port>`.
pub async fn spawn_server(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
