use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Extension,
};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentAdmin, state::AppState},
    domain::PaymentStatus,
    error::Result,
    web::{
        admin::{action_error, PaymentRow, StatusFilter, PAGE_SIZE},
        templates::{redirect_flash, AdminPage, Flash, HtmlTemplate},
    },
};

#[derive(Template)]
#[template(path = "admin/payments.html")]
pub struct PaymentsTemplate {
    pub page: AdminPage,
    pub status_filter: String,
    pub payments: Vec<PaymentRow>,
}

// GET /admin/payments
pub async fn payments_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Query(filter): Query<StatusFilter>,
    Query(flash): Query<Flash>,
) -> Result<impl IntoResponse> {
    let status = filter.parse(PaymentStatus::parse);
    let payments = state
        .service_context
        .payment_repo
        .list(status, PAGE_SIZE, 0)
        .await?
        .iter()
        .map(PaymentRow::from)
        .collect();

    Ok(HtmlTemplate(PaymentsTemplate {
        page: AdminPage::new(&state, &current, "payments", flash),
        status_filter: filter.value(),
        payments,
    }))
}

// POST /admin/payments/:id/mark-paid
pub async fn mark_invoice_paid(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.service_context.fulfillment_service.mark_invoice_paid(id).await {
        Ok(payment) => {
            tracing::info!(payment_id = %payment.id, admin_id = %current.admin.id, "Invoice marked as paid");
            redirect_flash("/admin/payments", Ok(format!("Invoice {} marked as paid", payment.reference)))
        }
        Err(e) => redirect_flash("/admin/payments", Err(action_error("Mark invoice paid", e))),
    }
}
