use std::path::Path;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::store::write_atomic;

/// Prometheus recorder for a single batch run. The exposition is written to a
/// file at exit (textfile-collector style) instead of being served.
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Atomically replace `path` with the current exposition text.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.render().as_bytes())
            .with_context(|| format!("writing metrics to {}", path.display()))
    }
}
