use std::collections::HashMap;

use askama::Template;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension,
};
use chrono::{Duration, Utc};

use crate::{
    api::{middleware::auth::CurrentAdmin, state::AppState},
    domain::{format_local, format_sek, JobStatus},
    error::Result,
    web::{
        admin::PaymentRow,
        templates::{AdminPage, Flash, HtmlTemplate},
    },
};

pub struct UpcomingRow {
    pub id: String,
    pub title: String,
    pub starts: String,
    pub booked: i32,
    pub max: i32,
}

pub struct FailedJobRow {
    pub id: String,
    pub job_type: String,
    pub last_error: String,
}

#[derive(Template)]
#[template(path = "admin/dashboard.html")]
pub struct DashboardTemplate {
    pub page: AdminPage,
    pub revenue_30d: String,
    pub pending_jobs: i64,
    pub failed_jobs: i64,
    pub upcoming: Vec<UpcomingRow>,
    pub recent_payments: Vec<PaymentRow>,
    pub failed: Vec<FailedJobRow>,
}

// GET /admin
pub async fn dashboard_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Query(flash): Query<Flash>,
) -> Result<impl IntoResponse> {
    let ctx = &state.service_context;

    let revenue = ctx
        .payment_repo
        .sum_paid_since(Utc::now() - Duration::days(30))
        .await?;
    let pending_jobs = ctx.job_repo.count_by_status(JobStatus::Pending).await?;
    let failed_jobs = ctx.job_repo.count_by_status(JobStatus::Failed).await?;

    let titles: HashMap<_, _> = ctx
        .course_repo
        .list_templates(false)
        .await?
        .into_iter()
        .map(|t| (t.id, t.title))
        .collect();
    let upcoming = ctx
        .course_repo
        .list_upcoming_instances(8)
        .await?
        .into_iter()
        .map(|i| UpcomingRow {
            id: i.id.to_string(),
            title: titles.get(&i.template_id).cloned().unwrap_or_default(),
            starts: format_local(i.starts_at),
            booked: i.current_participants,
            max: i.max_participants,
        })
        .collect();

    let recent_payments = ctx
        .payment_repo
        .list(None, 10, 0)
        .await?
        .iter()
        .map(PaymentRow::from)
        .collect();

    let failed = ctx
        .job_repo
        .list(Some(JobStatus::Failed), 5)
        .await?
        .into_iter()
        .map(|j| FailedJobRow {
            id: j.id.to_string(),
            job_type: j.payload.job_type().to_string(),
            last_error: j.last_error.unwrap_or_default(),
        })
        .collect();

    Ok(HtmlTemplate(DashboardTemplate {
        page: AdminPage::new(&state, &current, "dashboard", flash),
        revenue_30d: format_sek(revenue),
        pending_jobs,
        failed_jobs,
        upcoming,
        recent_payments,
        failed,
    }))
}
