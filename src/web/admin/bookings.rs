use std::collections::HashMap;

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Extension,
};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentAdmin, state::AppState},
    domain::{format_local, BookingStatus},
    error::Result,
    web::{
        admin::{action_error, StatusFilter, PAGE_SIZE},
        templates::{redirect_flash, AdminPage, Flash, HtmlTemplate},
    },
};

pub struct BookingListRow {
    pub id: String,
    pub reference: String,
    pub instance_id: String,
    pub course: String,
    pub name: String,
    pub email: String,
    pub participants: i32,
    pub method: String,
    pub status: String,
    pub created: String,
    pub cancellable: bool,
}

#[derive(Template)]
#[template(path = "admin/bookings.html")]
pub struct BookingsTemplate {
    pub page: AdminPage,
    pub status_filter: String,
    pub bookings: Vec<BookingListRow>,
}

// GET /admin/bookings
pub async fn bookings_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Query(filter): Query<StatusFilter>,
    Query(flash): Query<Flash>,
) -> Result<impl IntoResponse> {
    let ctx = &state.service_context;
    let status = filter.parse(BookingStatus::parse);

    let titles: HashMap<Uuid, String> = ctx
        .course_repo
        .list_templates(false)
        .await?
        .into_iter()
        .map(|t| (t.id, t.title))
        .collect();

    let mut bookings = Vec::new();
    for b in ctx.booking_repo.list(status, PAGE_SIZE, 0).await? {
        let course = match ctx.course_repo.find_instance(b.course_instance_id).await? {
            Some(i) => format!(
                "{} {}",
                titles.get(&i.template_id).map(String::as_str).unwrap_or("?"),
                format_local(i.starts_at)
            ),
            None => String::new(),
        };
        bookings.push(BookingListRow {
            id: b.id.to_string(),
            instance_id: b.course_instance_id.to_string(),
            cancellable: b.status != BookingStatus::Cancelled,
            reference: b.reference,
            course,
            name: b.customer_name,
            email: b.customer_email,
            participants: b.participants,
            method: b.payment_method.as_str().to_string(),
            status: b.status.as_str().to_string(),
            created: format_local(b.created_at),
        });
    }

    Ok(HtmlTemplate(BookingsTemplate {
        page: AdminPage::new(&state, &current, "bookings", flash),
        status_filter: filter.value(),
        bookings,
    }))
}

// POST /admin/bookings/:id/cancel
pub async fn cancel_booking(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.service_context.fulfillment_service.cancel_booking(id).await {
        Ok(()) => redirect_flash("/admin/bookings", Ok("Booking cancelled".to_string())),
        Err(e) => redirect_flash("/admin/bookings", Err(action_error("Cancel booking", e))),
    }
}
