//! news-digest binary entrypoint.
//! One invocation = one pipeline run; an external scheduler (cron, systemd timer)
//! decides when. Exit code 0 on a recorded or empty run, 1 when delivery failed
//! or a delivered digest could not be recorded.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_digest::cli::Cli;
use news_digest::config::DigestConfig;
use news_digest::digest::compose_error_alert;
use news_digest::filter::KeywordFilter;
use news_digest::ingest::providers;
use news_digest::metrics::Metrics;
use news_digest::notify::stdout::StdoutNotifier;
use news_digest::notify::telegram::TelegramNotifier;
use news_digest::notify::Notifier;
use news_digest::pipeline::{exit_code_for, PipelineRunner, Recorded, RunOptions, RunOutcome, RunReport};
use news_digest::store::DedupStore;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn build_notifier(cfg: &DigestConfig, dry_run: bool) -> Box<dyn Notifier> {
    if dry_run {
        return Box::new(StdoutNotifier);
    }
    if cfg.telegram.bot_token.is_empty() || cfg.telegram.chat_id.is_empty() {
        warn!("Telegram credentials not provided; delivery will fail");
    }
    Box::new(
        TelegramNotifier::new(cfg.telegram.bot_token.clone(), cfg.telegram.chat_id.clone())
            .with_api_base(cfg.telegram.api_base.clone())
            .with_timeout(cfg.notify.timeout_secs),
    )
}

async fn run_pipeline(
    cfg: &DigestConfig,
    store_path: &Path,
    notifier: &dyn Notifier,
    dry_run: bool,
) -> Result<RunReport> {
    let client = providers::http_client(cfg.collect_cfg().source_timeout)
        .context("building HTTP client")?;
    let sources = providers::from_config(cfg, client);
    if sources.is_empty() {
        bail!("no usable sources (feeds empty and NewsAPI has no key)");
    }

    let filter = KeywordFilter::new(&cfg.keywords, cfg.match_mode);
    info!(
        sources = sources.len(),
        keywords = filter.keyword_count(),
        window_hours = cfg.window_hours,
        digest_size = cfg.digest_size,
        "configuration loaded"
    );

    let store = DedupStore::load(store_path);
    let stats = store.stats();
    info!(
        target: "store",
        total = stats.total,
        oldest = ?stats.oldest,
        newest = ?stats.newest,
        "sent articles tracked"
    );

    let runner = PipelineRunner::new(
        &sources,
        &filter,
        notifier,
        RunOptions::from_config(cfg, !dry_run),
    );
    Ok(runner.run(store, Utc::now()).await?)
}

fn log_report(report: &RunReport) {
    match &report.outcome {
        RunOutcome::Empty(reason) => info!(
            ?reason,
            fetched = report.fetched,
            matched = report.matched,
            unseen = report.unseen,
            "run finished without a digest"
        ),
        RunOutcome::Delivered { attempts, recorded } => {
            info!(
                sent = report.selected.len(),
                attempts,
                failed_sources = report.failed_sources.len(),
                "digest run finished"
            );
            if let Recorded::Failed(cause) = recorded {
                error!(%cause, "store not updated after delivery; expect repeats next run");
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let metrics = match &cli.metrics_file {
        Some(_) => match Metrics::init() {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "metrics disabled");
                None
            }
        },
        None => None,
    };

    info!(version = env!("CARGO_PKG_VERSION"), dry_run = cli.dry_run, "news digest starting");

    let cfg = match DigestConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %format!("{e:#}"), "cannot load configuration");
            return ExitCode::FAILURE;
        }
    };
    let store_path = cli.store.clone().unwrap_or_else(|| cfg.store.path.clone());
    let notifier = build_notifier(&cfg, cli.dry_run);

    let result = run_pipeline(&cfg, &store_path, notifier.as_ref(), cli.dry_run).await;
    let failure = match &result {
        Ok(report) => {
            log_report(report);
            match &report.outcome {
                RunOutcome::Delivered { recorded: Recorded::Failed(cause), .. } => {
                    Some(format!("digest delivered but not recorded: {cause}"))
                }
                _ => None,
            }
        }
        Err(e) => {
            let cause = format!("{e:#}");
            error!(error = %cause, "run failed");
            Some(cause)
        }
    };
    // Only the alert goes out here; a delivered digest is never re-sent.
    if let Some(cause) = failure {
        if cfg.notify.error_alerts && !cli.dry_run {
            let alert = compose_error_alert(&cfg.digest.title, &cause);
            if let Err(e) = notifier.send(&alert).await {
                warn!(error = %e, "error alert not delivered");
            }
        }
    }
    let code = ExitCode::from(exit_code_for(&result));

    if let (Some(m), Some(path)) = (&metrics, &cli.metrics_file) {
        if let Err(e) = m.write_to(path) {
            warn!(error = %format!("{e:#}"), "metrics not written");
        }
    }
    code
}
