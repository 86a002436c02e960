// src/pipeline.rs
//! One invocation: fetch → filter → drop seen → select → compose → notify → commit.
//!
//! The only durable side effect is the store commit, and it happens strictly after
//! the notifier reports success. Every early exit leaves the store file untouched.

use chrono::{DateTime, FixedOffset, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

use crate::config::DigestConfig;
use crate::digest;
use crate::filter::KeywordFilter;
use crate::ingest::types::{Article, FetchWindow, SourceAdapter};
use crate::ingest::{self, CollectCfg};
use crate::notify::{send_with_retry, Notifier, NotifyError, RetryPolicy};
use crate::select;
use crate::store::{CommitReport, DedupStore, NewRecord};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_filtered_total", "Articles that matched at least one keyword.");
        describe_counter!("digest_seen_total", "Matching articles dropped as already sent.");
        describe_counter!("digest_selected_total", "Articles placed into a delivered digest.");
        describe_counter!("digest_runs_total", "Pipeline runs by outcome.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Filtering,
    Selecting,
    Composing,
    Notifying,
    Committing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    NoArticles,
    NoMatches,
    AllSeen,
}

#[derive(Debug)]
pub enum Recorded {
    Committed(CommitReport),
    /// Dry run: delivery went to stdout, the store is left alone.
    Skipped,
    /// Delivered but the store write failed; the next run may send these again.
    Failed(String),
}

#[derive(Debug)]
pub enum RunOutcome {
    Empty(EmptyReason),
    Delivered { attempts: u8, recorded: Recorded },
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub fetched: usize,
    pub failed_sources: Vec<String>,
    pub matched: usize,
    pub unseen: usize,
    pub selected: Vec<Article>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("digest not delivered, nothing recorded: {0}")]
    Notify(#[from] NotifyError),
}

/// Process exit status for a finished run: 0 when the run did what it should
/// (or had nothing to do), 1 when the digest was not delivered or the store
/// could not record a delivered digest.
pub fn exit_code_for<E>(result: &Result<RunReport, E>) -> u8 {
    match result {
        Ok(report) => match &report.outcome {
            RunOutcome::Empty(_) => 0,
            RunOutcome::Delivered { recorded: Recorded::Failed(_), .. } => 1,
            RunOutcome::Delivered { .. } => 0,
        },
        Err(_) => 1,
    }
}

/// Per-run knobs, lifted out of `DigestConfig`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub collect: CollectCfg,
    pub window_hours: u32,
    pub digest_size: usize,
    pub retry: RetryPolicy,
    pub retention: Option<chrono::Duration>,
    pub digest_title: String,
    pub utc_offset: FixedOffset,
    /// False for dry runs.
    pub commit: bool,
}

impl RunOptions {
    pub fn from_config(cfg: &DigestConfig, commit: bool) -> Self {
        Self {
            collect: cfg.collect_cfg(),
            window_hours: cfg.window_hours,
            digest_size: cfg.digest_size,
            retry: cfg.retry_policy(),
            retention: cfg.retention(),
            digest_title: cfg.digest.title.clone(),
            utc_offset: cfg.utc_offset(),
            commit,
        }
    }
}

pub struct PipelineRunner<'a> {
    sources: &'a [Box<dyn SourceAdapter>],
    filter: &'a KeywordFilter,
    notifier: &'a dyn Notifier,
    opts: RunOptions,
}

fn enter(stage: Stage) {
    tracing::debug!(target: "pipeline", ?stage, "entering stage");
}

fn truncate_for_log(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

impl<'a> PipelineRunner<'a> {
    pub fn new(
        sources: &'a [Box<dyn SourceAdapter>],
        filter: &'a KeywordFilter,
        notifier: &'a dyn Notifier,
        opts: RunOptions,
    ) -> Self {
        Self {
            sources,
            filter,
            notifier,
            opts,
        }
    }

    /// Execute one run against `store` with `now` as the logical run time.
    pub async fn run(&self, store: DedupStore, now: DateTime<Utc>) -> Result<RunReport, RunError> {
        ensure_metrics_described();
        let result = self.run_inner(store, now).await;
        let label = match &result {
            Ok(r) => match &r.outcome {
                RunOutcome::Empty(_) => "empty",
                RunOutcome::Delivered {
                    recorded: Recorded::Failed(_),
                    ..
                } => "delivered_unrecorded",
                RunOutcome::Delivered { .. } => "delivered",
            },
            Err(_) => "notify_failed",
        };
        counter!("digest_runs_total", "outcome" => label).increment(1);
        result
    }

    async fn run_inner(&self, store: DedupStore, now: DateTime<Utc>) -> Result<RunReport, RunError> {
        enter(Stage::Fetching);
        let window = FetchWindow::hours(now, self.opts.window_hours);
        let collected = ingest::collect(self.sources, window, self.opts.collect).await;
        let failed_sources: Vec<String> = collected
            .failures
            .iter()
            .map(|f| f.source.clone())
            .collect();
        let mut report = RunReport {
            outcome: RunOutcome::Empty(EmptyReason::NoArticles),
            fetched: collected.articles.len(),
            failed_sources,
            matched: 0,
            unseen: 0,
            selected: Vec::new(),
        };
        tracing::info!(
            target: "pipeline",
            fetched = report.fetched,
            failed_sources = report.failed_sources.len(),
            duplicates = collected.duplicates,
            "fetch finished"
        );
        if collected.articles.is_empty() {
            tracing::info!(target: "pipeline", "no articles from any source; nothing to send");
            return Ok(report);
        }

        enter(Stage::Filtering);
        let matched = self.filter.apply(collected.articles);
        report.matched = matched.len();
        counter!("digest_filtered_total").increment(matched.len() as u64);
        if matched.is_empty() {
            tracing::info!(target: "pipeline", "no articles matched the configured keywords");
            report.outcome = RunOutcome::Empty(EmptyReason::NoMatches);
            return Ok(report);
        }
        let stats: Vec<String> = self
            .filter
            .keyword_stats(&matched)
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .map(|(k, n)| format!("{k}={n}"))
            .collect();
        tracing::info!(target: "pipeline", matched = report.matched, keyword_stats = %stats.join(", "), "keyword filter done");

        let unseen = store.filter_unseen(matched);
        report.unseen = unseen.len();
        counter!("digest_seen_total").increment((report.matched - report.unseen) as u64);
        if unseen.is_empty() {
            tracing::info!(target: "pipeline", "every matching article was already sent");
            report.outcome = RunOutcome::Empty(EmptyReason::AllSeen);
            return Ok(report);
        }

        enter(Stage::Selecting);
        let selection = select::select(unseen, self.opts.digest_size);
        for (idx, a) in selection.iter().enumerate() {
            tracing::info!(
                target: "pipeline",
                rank = idx + 1,
                source = %a.source,
                title = %truncate_for_log(&a.title, 80),
                "selected"
            );
        }

        enter(Stage::Composing);
        let local_now = now.with_timezone(&self.opts.utc_offset);
        let Some(message) = digest::compose(&selection, &self.opts.digest_title, &local_now) else {
            report.outcome = RunOutcome::Empty(EmptyReason::AllSeen);
            return Ok(report);
        };

        enter(Stage::Notifying);
        let attempts = send_with_retry(self.notifier, &message.text, self.opts.retry).await?;
        counter!("digest_selected_total").increment(message.entries as u64);

        let recorded = if self.opts.commit {
            enter(Stage::Committing);
            let new: Vec<NewRecord> = selection.iter().map(NewRecord::from).collect();
            match store.commit(new, now, self.opts.retention) {
                Ok(rep) => {
                    tracing::info!(
                        target: "store",
                        added = rep.added,
                        pruned = rep.pruned,
                        total = rep.total,
                        "sent articles recorded"
                    );
                    Recorded::Committed(rep)
                }
                Err(e) => {
                    tracing::error!(
                        target: "store",
                        error = %e,
                        delivered = selection.len(),
                        "DIGEST DELIVERED BUT NOT RECORDED: the next run may send these articles again"
                    );
                    Recorded::Failed(e.to_string())
                }
            }
        } else {
            tracing::info!(target: "pipeline", "dry run; store left untouched");
            Recorded::Skipped
        };

        report.selected = selection;
        report.outcome = RunOutcome::Delivered { attempts, recorded };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: RunOutcome) -> Result<RunReport, RunError> {
        Ok(RunReport {
            outcome,
            fetched: 3,
            failed_sources: vec![],
            matched: 2,
            unseen: 1,
            selected: vec![],
        })
    }

    fn delivered(recorded: Recorded) -> RunOutcome {
        RunOutcome::Delivered { attempts: 1, recorded }
    }

    #[test]
    fn exit_code_covers_every_outcome() {
        for reason in [EmptyReason::NoArticles, EmptyReason::NoMatches, EmptyReason::AllSeen] {
            assert_eq!(exit_code_for(&report(RunOutcome::Empty(reason))), 0);
        }

        let committed = CommitReport { added: 1, pruned: 0, total: 4 };
        assert_eq!(exit_code_for(&report(delivered(Recorded::Committed(committed)))), 0);
        assert_eq!(exit_code_for(&report(delivered(Recorded::Skipped))), 0);

        let lost = report(delivered(Recorded::Failed("disk full".into())));
        assert_eq!(exit_code_for(&lost), 1);

        let undelivered: Result<RunReport, RunError> =
            Err(NotifyError::Fatal("chat not found".into()).into());
        assert_eq!(exit_code_for(&undelivered), 1);

        let setup: Result<RunReport, anyhow::Error> = Err(anyhow::anyhow!("no usable sources"));
        assert_eq!(exit_code_for(&setup), 1);
    }

    #[test]
    fn log_truncation_is_char_safe() {
        assert_eq!(truncate_for_log("short", 80), "short");
        assert_eq!(truncate_for_log("ééééé", 3), "ééé…");
    }
}
