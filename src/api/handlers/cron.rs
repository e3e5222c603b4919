use axum::{extract::State, Json};

use crate::{
    api::state::AppState,
    error::Result,
    jobs::{run_cron_tick, CronReport},
};

/// GET or POST /api/cron/process-jobs, guarded by the cron secret.
pub async fn process_jobs(State(state): State<AppState>) -> Result<Json<CronReport>> {
    let report = run_cron_tick(state.service_context.clone()).await?;
    Ok(Json(report))
}
