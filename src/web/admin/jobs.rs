use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Extension,
};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentAdmin, state::AppState},
    domain::{format_local, JobStatus},
    error::Result,
    web::{
        admin::{action_error, StatusFilter, PAGE_SIZE},
        templates::{redirect_flash, AdminPage, Flash, HtmlTemplate},
    },
};

pub struct JobRow {
    pub id: String,
    pub job_type: String,
    pub status: String,
    pub attempts: String,
    pub run_at: String,
    pub last_error: String,
    pub retryable: bool,
}

#[derive(Template)]
#[template(path = "admin/jobs.html")]
pub struct JobsTemplate {
    pub page: AdminPage,
    pub status_filter: String,
    pub pending: i64,
    pub processing: i64,
    pub failed: i64,
    pub jobs: Vec<JobRow>,
}

// GET /admin/jobs
pub async fn jobs_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Query(filter): Query<StatusFilter>,
    Query(flash): Query<Flash>,
) -> Result<impl IntoResponse> {
    let repo = &state.service_context.job_repo;
    let status = filter.parse(JobStatus::parse);

    let jobs = repo
        .list(status, PAGE_SIZE)
        .await?
        .into_iter()
        .map(|j| JobRow {
            id: j.id.to_string(),
            job_type: j.payload.job_type().to_string(),
            status: j.status.as_str().to_string(),
            attempts: format!("{}/{}", j.attempts, j.max_attempts),
            run_at: format_local(j.run_at),
            last_error: j.last_error.unwrap_or_default(),
            retryable: j.status == JobStatus::Failed,
        })
        .collect();

    Ok(HtmlTemplate(JobsTemplate {
        page: AdminPage::new(&state, &current, "jobs", flash),
        status_filter: filter.value(),
        pending: repo.count_by_status(JobStatus::Pending).await?,
        processing: repo.count_by_status(JobStatus::Processing).await?,
        failed: repo.count_by_status(JobStatus::Failed).await?,
        jobs,
    }))
}

// POST /admin/jobs/:id/retry
pub async fn retry_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.service_context.job_repo.retry(id).await {
        Ok(job) => redirect_flash(
            "/admin/jobs",
            Ok(format!("Job {} queued again", job.payload.job_type())),
        ),
        Err(e) => redirect_flash("/admin/jobs", Err(action_error("Retry job", e))),
    }
}
