use std::fs;
use std::sync::OnceLock;

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if settings.telemetry().metrics_textfile.is_none() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

/// Writes the current snapshot for a node_exporter textfile collector.
pub(crate) fn flush(settings: &Settings) -> anyhow::Result<()> {
    let (Some(path), Some(snapshot)) = (settings.telemetry().metrics_textfile.as_ref(), render())
    else {
        return Ok(());
    };

    let staging = path.with_extension("prom.tmp");
    fs::write(&staging, snapshot)
        .with_context(|| format!("Failed to write metrics to {}", staging.display()))?;
    fs::rename(&staging, path)
        .with_context(|| format!("Failed to move metrics into {}", path.display()))?;

    tracing::info!(path = %path.display(), "Metrics snapshot written");
    Ok(())
}
