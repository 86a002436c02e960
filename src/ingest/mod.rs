// src/ingest/mod.rs
pub mod fingerprint;
pub mod providers;
pub mod types;

use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;

use crate::ingest::types::{Article, FetchError, FetchWindow, SourceAdapter, SourceFailure};

/// One-time metrics registration (so series show up in the exposition).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "digest_fetch_articles_total",
            "Articles returned by sources inside the lookback window."
        );
        describe_counter!(
            "digest_source_failures_total",
            "Source fetches that failed or timed out."
        );
        describe_counter!(
            "digest_fetch_duplicates_total",
            "Articles collapsed because another source already returned them this run."
        );
        describe_histogram!("digest_fetch_ms", "Per-source fetch time in milliseconds.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// Knobs for one fan-out.
#[derive(Clone, Copy, Debug)]
pub struct CollectCfg {
    pub concurrency_limit: usize,
    pub source_timeout: Duration,
    /// Global budget for the whole fetch stage; whatever is still running is dropped.
    pub deadline: Duration,
}

/// Merged output of all sources plus the per-source failures.
#[derive(Debug, Default)]
pub struct Collected {
    pub articles: Vec<Article>,
    pub failures: Vec<SourceFailure>,
    pub duplicates: usize,
}

/// Run every adapter with at most `concurrency_limit` in flight.
///
/// A failing or hung source only costs its own timeout budget. Results are merged
/// in adapter order, not completion order, and repeated fingerprints are collapsed
/// to their first occurrence.
pub async fn collect(
    sources: &[Box<dyn SourceAdapter>],
    window: FetchWindow,
    cfg: CollectCfg,
) -> Collected {
    ensure_metrics_described();

    let limit = cfg.concurrency_limit.clamp(1, sources.len().max(1));
    let source_timeout = cfg.source_timeout;

    let mut pending: BTreeSet<usize> = (0..sources.len()).collect();
    let mut finished: Vec<(usize, Result<Vec<Article>, FetchError>)> =
        Vec::with_capacity(sources.len());

    let mut in_flight = stream::iter(sources.iter().enumerate())
        .map(|(idx, src)| async move {
            let t0 = Instant::now();
            let res = match tokio::time::timeout(source_timeout, src.fetch(window)).await {
                Ok(r) => r,
                Err(_) => Err(FetchError::Timeout),
            };
            histogram!("digest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
            (idx, res)
        })
        .buffer_unordered(limit);

    let deadline = tokio::time::Instant::now() + cfg.deadline;
    loop {
        match tokio::time::timeout_at(deadline, in_flight.next()).await {
            Ok(Some((idx, res))) => {
                pending.remove(&idx);
                finished.push((idx, res));
            }
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(
                    target: "ingest",
                    still_running = pending.len(),
                    deadline_ms = cfg.deadline.as_millis() as u64,
                    "fetch deadline reached; abandoning remaining sources"
                );
                break;
            }
        }
    }
    // Dropping the stream cancels everything still in flight.
    drop(in_flight);

    for idx in pending {
        finished.push((idx, Err(FetchError::Timeout)));
    }
    finished.sort_by_key(|(idx, _)| *idx);

    let mut out = Collected::default();
    let mut seen: HashSet<String> = HashSet::new();
    for (idx, res) in finished {
        let name = sources[idx].name().to_string();
        match res {
            Ok(articles) => {
                tracing::info!(target: "ingest", source = %name, count = articles.len(), "source fetched");
                counter!("digest_fetch_articles_total").increment(articles.len() as u64);
                for a in articles {
                    if seen.insert(a.fingerprint.clone()) {
                        out.articles.push(a);
                    } else {
                        out.duplicates += 1;
                    }
                }
            }
            Err(error) => {
                tracing::warn!(target: "ingest", source = %name, error = %error, "source failed");
                counter!("digest_source_failures_total").increment(1);
                out.failures.push(SourceFailure {
                    source: name,
                    error,
                });
            }
        }
    }
    counter!("digest_fetch_duplicates_total").increment(out.duplicates as u64);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_tags_and_entities() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b></p>\n\n&ldquo;ok&rdquo; ";
        assert_eq!(normalize_text(s), r#"Hello, world "ok""#);
    }

    #[test]
    fn normalize_text_caps_length() {
        let long = "a ".repeat(2_000);
        assert_eq!(normalize_text(&long).chars().count(), 1500);
    }
}
