// src/store.rs
//! Durable "already sent" set.
//!
//! On disk this is one JSON object keyed by fingerprint. The file is only ever
//! replaced whole: `commit` writes a sibling temp file, fsyncs it, and renames it
//! over the canonical path, so a crash leaves either the old or the new state.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::types::Article;

/// One delivered article. Only `sent_at` matters for correctness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentRecord {
    pub sent_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// What a successful delivery adds to the store.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub fingerprint: String,
    pub title: Option<String>,
    pub url: Option<String>,
}

impl From<&Article> for NewRecord {
    fn from(a: &Article) -> Self {
        Self {
            fingerprint: a.fingerprint.clone(),
            title: Some(a.title.clone()),
            url: a.url.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("creating store directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("serializing store: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("writing {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("replacing {path}: {source}")]
    Replace { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub total: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Result of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    pub added: usize,
    pub pruned: usize,
    pub total: usize,
}

#[derive(Debug)]
pub struct DedupStore {
    path: PathBuf,
    records: BTreeMap<String, SentRecord>,
}

impl DedupStore {
    /// Load the store. Missing, empty, or unreadable state is an empty set, never an error.
    /// A single bad record only loses its timestamp.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(s) if s.trim().is_empty() => {
                tracing::warn!(target: "store", path = %path.display(), "store file is empty; starting fresh");
                BTreeMap::new()
            }
            Ok(s) => match serde_json::from_str::<BTreeMap<String, serde_json::Value>>(&s) {
                Ok(raw) => salvage_records(&path, raw, Utc::now()),
                Err(e) => {
                    tracing::warn!(
                        target: "store",
                        path = %path.display(),
                        error = %e,
                        "store file is not valid; treating as empty (previously sent articles may be re-delivered)"
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(target: "store", path = %path.display(), "no store file yet; first run");
                BTreeMap::new()
            }
            Err(e) => {
                tracing::warn!(target: "store", path = %path.display(), error = %e, "cannot read store; treating as empty");
                BTreeMap::new()
            }
        };
        Self { path, records }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.records.contains_key(fingerprint)
    }

    pub fn fingerprints(&self) -> HashSet<String> {
        self.records.keys().cloned().collect()
    }

    pub fn stats(&self) -> StoreStats {
        let mut times = self.records.values().map(|r| r.sent_at);
        let first = times.next();
        let (oldest, newest) = times.fold((first, first), |(lo, hi), t| {
            (lo.map(|l| l.min(t)), hi.map(|h| h.max(t)))
        });
        StoreStats {
            total: self.records.len(),
            oldest,
            newest,
        }
    }

    /// Drop articles already delivered in an earlier run. Order is preserved.
    pub fn filter_unseen(&self, articles: Vec<Article>) -> Vec<Article> {
        articles
            .into_iter()
            .filter(|a| !self.contains(&a.fingerprint))
            .collect()
    }

    /// Persist loaded state plus `new` (all stamped `now`), optionally pruning
    /// records older than `retention`. Consumes the store: one commit per run.
    pub fn commit(
        mut self,
        new: impl IntoIterator<Item = NewRecord>,
        now: DateTime<Utc>,
        retention: Option<ChronoDuration>,
    ) -> Result<CommitReport, StoreError> {
        let mut added = 0usize;
        for rec in new {
            let entry = SentRecord {
                sent_at: now,
                title: rec.title,
                url: rec.url,
            };
            if self.records.insert(rec.fingerprint, entry).is_none() {
                added += 1;
            }
        }

        let mut pruned = 0usize;
        if let Some(keep) = retention {
            let cutoff = now - keep;
            let before = self.records.len();
            self.records.retain(|_, r| r.sent_at >= cutoff);
            pruned = before - self.records.len();
        }

        let body = serde_json::to_vec_pretty(&self.records)?;
        write_atomic(&self.path, &body)?;

        Ok(CommitReport {
            added,
            pruned,
            total: self.records.len(),
        })
    }
}

/// Decode entries one by one. A record that does not decode keeps its
/// fingerprint, restamped `now`, so one bad entry never costs the others.
fn salvage_records(
    path: &Path,
    raw: BTreeMap<String, serde_json::Value>,
    now: DateTime<Utc>,
) -> BTreeMap<String, SentRecord> {
    let mut restamped = 0usize;
    let records: BTreeMap<String, SentRecord> = raw
        .into_iter()
        .map(|(fp, v)| {
            let rec = match serde_json::from_value::<SentRecord>(v.clone()) {
                Ok(rec) => rec,
                Err(e) => {
                    restamped += 1;
                    tracing::debug!(target: "store", fingerprint = %fp, error = %e, "undecodable record");
                    SentRecord {
                        sent_at: now,
                        title: v.get("title").and_then(|t| t.as_str()).map(str::to_string),
                        url: v.get("url").and_then(|u| u.as_str()).map(str::to_string),
                    }
                }
            };
            (fp, rec)
        })
        .collect();
    if restamped > 0 {
        tracing::warn!(
            target: "store",
            path = %path.display(),
            restamped,
            kept = records.len(),
            "some store records were invalid; fingerprints kept with a fresh timestamp"
        );
    }
    records
}

/// Write `bytes` to `path` via temp file + fsync + rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| StoreError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let tmp = tmp_path(path);
    let write = || -> io::Result<()> {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        Ok(())
    };
    if let Err(source) = write() {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::Write {
            path: tmp.clone(),
            source,
        });
    }

    if let Err(source) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::Replace {
            path: path.to_path_buf(),
            source,
        });
    }

    // Make the rename itself durable; not supported everywhere, so best-effort.
    #[cfg(unix)]
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Ok(d) = fs::File::open(dir) {
            let _ = d.sync_all();
        }
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "store.json".into());
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rec(fp: &str) -> NewRecord {
        NewRecord {
            fingerprint: fp.to_string(),
            title: None,
            url: None,
        }
    }

    #[test]
    fn stats_track_oldest_and_newest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.json");
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let t1 = t0 + ChronoDuration::days(2);

        DedupStore::load(&path).commit(vec![rec("a")], t0, None).unwrap();
        DedupStore::load(&path).commit(vec![rec("b")], t1, None).unwrap();

        let s = DedupStore::load(&path).stats();
        assert_eq!(s.total, 2);
        assert_eq!(s.oldest, Some(t0));
        assert_eq!(s.newest, Some(t1));
    }

    #[test]
    fn empty_store_has_no_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let s = DedupStore::load(dir.path().join("none.json")).stats();
        assert_eq!(s, StoreStats { total: 0, oldest: None, newest: None });
    }

    #[test]
    fn recommitting_a_known_fingerprint_refreshes_sent_at() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.json");
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let t1 = t0 + ChronoDuration::hours(1);

        DedupStore::load(&path).commit(vec![rec("a")], t0, None).unwrap();
        let report = DedupStore::load(&path).commit(vec![rec("a")], t1, None).unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(report.total, 1);
        assert_eq!(DedupStore::load(&path).stats().newest, Some(t1));
    }
}
