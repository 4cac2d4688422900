use anyhow::{anyhow, Context, Result};

use crate::core::config::RubricSettings;
use crate::schemas::canvas::Rubric;
use crate::services::canvas_api::{ApiMethod, CanvasApiClient};

pub(crate) async fn fetch_rubric(api: &CanvasApiClient, rubric: &RubricSettings) -> Result<Rubric> {
    let endpoint = format!("accounts/{}/rubrics/{}", rubric.account_id, rubric.rubric_id);
    let response = api.call(&endpoint, ApiMethod::Get, &[]).await.ok_or_else(|| {
        anyhow!(
            "No usable response fetching rubric {} from account {}",
            rubric.rubric_id,
            rubric.account_id
        )
    })?;

    let fetched: Rubric = response.parse().with_context(|| {
        format!("Unexpected rubric body (status {}): {}", response.status, response.body)
    })?;

    if fetched.id != rubric.rubric_id {
        return Err(anyhow!(
            "Fetched rubric {} does not match configured rubric {}",
            fetched.id,
            rubric.rubric_id
        ));
    }

    tracing::info!(
        rubric_id = fetched.id,
        title = %fetched.title,
        points_possible = fetched.points_possible,
        "Fetched IPE rubric"
    );
    Ok(fetched)
}
