use anyhow::Context;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let telemetry = settings.telemetry();
    let filter = log_filter(&telemetry.log_level)?;

    // CLOSE emits one timing line per `course` span, i.e. per provisioned course.
    let json_layer = telemetry
        .json
        .then(|| fmt::layer().json().with_target(false).with_span_events(FmtSpan::CLOSE));
    let text_layer = (!telemetry.json)
        .then(|| fmt::layer().with_target(false).with_span_events(FmtSpan::CLOSE));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))
}

/// `RUST_LOG` wins over `LOG_LEVEL` when set.
fn log_filter(log_level: &str) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(log_level).with_context(|| format!("Invalid LOG_LEVEL '{log_level}'"))
}
