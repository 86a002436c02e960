// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod cli;
pub mod config;
pub mod digest;
pub mod filter;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod select;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::config::DigestConfig;
pub use crate::ingest::types::{Article, FetchError, FetchWindow, SourceAdapter};
pub use crate::notify::{Notifier, NotifyError};
pub use crate::pipeline::{PipelineRunner, RunOptions, RunOutcome, RunReport};
pub use crate::store::DedupStore;
