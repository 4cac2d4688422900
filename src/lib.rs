pub(crate) mod core;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use crate::core::{config::Settings, telemetry};
use crate::services::canvas_api::CanvasApiClient;
use crate::services::course_sheet::GoogleSheetSource;
use crate::tasks::orchestrator::Orchestrator;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    tracing::info!(
        rubric_account_id = settings.rubric().account_id,
        rubric_id = settings.rubric().rubric_id,
        "IPE process starting"
    );

    let api = CanvasApiClient::from_settings(&settings)?;
    let source = GoogleSheetSource::from_settings(&settings).inspect_err(|err| {
        tracing::error!(error = %format!("{err:#}"), "Failed to set up course worksheet source");
    })?;
    let result = Orchestrator::new(&settings, &api, &source).start_composing_process().await;

    if let Err(err) = core::metrics::flush(&settings) {
        tracing::error!(error = %err, "Failed to write metrics snapshot");
    }

    let report = result?;
    for course in &report.provisioned {
        tracing::debug!(
            course_id = course.course_id,
            assignment_id = course.assignment_id,
            "Course provisioned"
        );
    }
    for course in &report.failed {
        tracing::warn!(
            course_id = course.course_id,
            step = %course.step,
            error = %course.error,
            "Course left without IPE assignment"
        );
    }
    tracing::info!(
        provisioned = report.provisioned.len(),
        failed = report.failed.len(),
        "IPE process completed"
    );

    Ok(())
}
