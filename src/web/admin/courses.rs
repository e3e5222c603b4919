use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Extension, Form,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    api::{middleware::auth::CurrentAdmin, state::AppState},
    domain::{
        format_local, format_sek, non_empty, parse_decimal_to_ore, parse_local_datetime, BookingStatus,
        CourseInstanceStatus, CreateCourseInstanceRequest, CreateCourseTemplateRequest,
        UpdateCourseTemplateRequest,
    },
    error::{AppError, Result},
    web::{
        admin::action_error,
        templates::{redirect_flash, AdminPage, Flash, HtmlTemplate},
    },
};

pub struct TemplateRow {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub price: String,
    pub duration_minutes: i32,
    pub max_participants: i32,
    pub active: bool,
}

pub struct InstanceRow {
    pub id: String,
    pub starts: String,
    pub ends: String,
    pub booked: i32,
    pub max: i32,
    pub status: String,
    pub cancelled: bool,
}

pub struct BookingRow {
    pub id: String,
    pub reference: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub participants: i32,
    pub method: String,
    pub status: String,
    pub cancellable: bool,
}

#[derive(Template)]
#[template(path = "admin/courses.html")]
pub struct CoursesTemplate {
    pub page: AdminPage,
    pub templates: Vec<TemplateRow>,
}

#[derive(Template)]
#[template(path = "admin/course_detail.html")]
pub struct CourseDetailTemplate {
    pub page: AdminPage,
    pub id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price_kr: String,
    pub duration_minutes: i32,
    pub max_participants: i32,
    pub image_url: String,
    pub active: bool,
    pub instances: Vec<InstanceRow>,
}

#[derive(Template)]
#[template(path = "admin/instance_detail.html")]
pub struct InstanceDetailTemplate {
    pub page: AdminPage,
    pub template_id: String,
    pub title: String,
    pub instance: InstanceRow,
    pub notes: String,
    pub bookings: Vec<BookingRow>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateForm {
    pub title: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price_kr: String,
    pub duration_minutes: i32,
    pub default_max_participants: i32,
    pub image_url: Option<String>,
    /// Checkbox; absent when unchecked.
    pub active: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InstanceForm {
    pub starts_at: String,
    pub max_participants: Option<String>,
    pub notes: Option<String>,
}

fn parse_price(value: &str) -> Result<i64> {
    parse_decimal_to_ore(value)
        .ok_or_else(|| AppError::Validation("price: must be an amount in kronor, e.g. 950 or 950,50".to_string()))
}

fn instance_row(instance: &crate::domain::CourseInstance) -> InstanceRow {
    InstanceRow {
        id: instance.id.to_string(),
        starts: format_local(instance.starts_at),
        ends: format_local(instance.ends_at),
        booked: instance.current_participants,
        max: instance.max_participants,
        status: instance.status.as_str().to_string(),
        cancelled: instance.status == CourseInstanceStatus::Cancelled,
    }
}

// GET /admin/courses
pub async fn courses_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Query(flash): Query<Flash>,
) -> Result<impl IntoResponse> {
    let templates = state
        .service_context
        .course_repo
        .list_templates(false)
        .await?
        .into_iter()
        .map(|t| TemplateRow {
            id: t.id.to_string(),
            price: format_sek(t.price_ore),
            title: t.title,
            slug: t.slug,
            duration_minutes: t.duration_minutes,
            max_participants: t.default_max_participants,
            active: t.active,
        })
        .collect();

    Ok(HtmlTemplate(CoursesTemplate {
        page: AdminPage::new(&state, &current, "courses", flash),
        templates,
    }))
}

// POST /admin/courses
pub async fn create_template(State(state): State<AppState>, Form(form): Form<TemplateForm>) -> Response {
    let result = async {
        let request = CreateCourseTemplateRequest {
            title: form.title.trim().to_string(),
            slug: non_empty(form.slug),
            description: form.description,
            price_ore: parse_price(&form.price_kr)?,
            duration_minutes: form.duration_minutes,
            default_max_participants: form.default_max_participants,
            image_url: non_empty(form.image_url),
        };
        request.validate()?;
        state.service_context.course_repo.create_template(request).await
    }
    .await;

    match result {
        Ok(template) => redirect_flash(
            &format!("/admin/courses/{}", template.id),
            Ok(format!("Created course '{}'", template.title)),
        ),
        Err(e) => redirect_flash("/admin/courses", Err(action_error("Create course", e))),
    }
}

// GET /admin/courses/:id
pub async fn template_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Path(id): Path<Uuid>,
    Query(flash): Query<Flash>,
) -> Result<impl IntoResponse> {
    let ctx = &state.service_context;
    let template = ctx
        .course_repo
        .find_template(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;
    let instances = ctx
        .course_repo
        .list_instances_for_template(id, false)
        .await?
        .iter()
        .map(instance_row)
        .collect();

    Ok(HtmlTemplate(CourseDetailTemplate {
        page: AdminPage::new(&state, &current, "courses", flash),
        id: template.id.to_string(),
        price_kr: crate::domain::ore_to_decimal(template.price_ore),
        title: template.title,
        slug: template.slug,
        description: template.description,
        duration_minutes: template.duration_minutes,
        max_participants: template.default_max_participants,
        image_url: template.image_url.unwrap_or_default(),
        active: template.active,
        instances,
    }))
}

// POST /admin/courses/:id/update
pub async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(form): Form<TemplateForm>,
) -> Response {
    let back = format!("/admin/courses/{}", id);
    let result = async {
        let update = UpdateCourseTemplateRequest {
            title: Some(form.title.trim().to_string()).filter(|t| !t.is_empty()),
            description: Some(form.description),
            price_ore: Some(parse_price(&form.price_kr)?),
            duration_minutes: Some(form.duration_minutes),
            default_max_participants: Some(form.default_max_participants),
            image_url: non_empty(form.image_url),
            active: Some(form.active.is_some()),
        };
        state.service_context.course_repo.update_template(id, update).await
    }
    .await;

    match result {
        Ok(_) => redirect_flash(&back, Ok("Course saved".to_string())),
        Err(e) => redirect_flash(&back, Err(action_error("Update course", e))),
    }
}

// POST /admin/courses/:id/delete
pub async fn delete_template(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.service_context.course_repo.delete_template(id).await {
        Ok(()) => redirect_flash("/admin/courses", Ok("Course deleted".to_string())),
        Err(e) => redirect_flash(&format!("/admin/courses/{}", id), Err(action_error("Delete course", e))),
    }
}

// POST /admin/courses/:id/instances
pub async fn create_instance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(form): Form<InstanceForm>,
) -> Response {
    let back = format!("/admin/courses/{}", id);
    let result = async {
        let starts_at = parse_local_datetime(&form.starts_at)
            .ok_or_else(|| AppError::Validation("starts_at: pick a date and time".to_string()))?;
        let max_participants = match non_empty(form.max_participants) {
            Some(v) => Some(
                v.parse::<i32>()
                    .map_err(|_| AppError::Validation("max_participants: must be a number".to_string()))?,
            ),
            None => None,
        };
        state
            .service_context
            .course_repo
            .create_instance(CreateCourseInstanceRequest {
                template_id: id,
                starts_at,
                ends_at: None,
                max_participants,
                notes: non_empty(form.notes),
            })
            .await
    }
    .await;

    match result {
        Ok(instance) => redirect_flash(
            &back,
            Ok(format!("Added date {}", format_local(instance.starts_at))),
        ),
        Err(e) => redirect_flash(&back, Err(action_error("Add date", e))),
    }
}

// GET /admin/instances/:id
pub async fn instance_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Path(id): Path<Uuid>,
    Query(flash): Query<Flash>,
) -> Result<impl IntoResponse> {
    let ctx = &state.service_context;
    let instance = ctx
        .course_repo
        .find_instance(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Course date not found".to_string()))?;
    let template = ctx
        .course_repo
        .find_template(instance.template_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;
    let bookings = ctx
        .booking_repo
        .list_for_instance(id)
        .await?
        .into_iter()
        .map(|b| BookingRow {
            id: b.id.to_string(),
            cancellable: b.status != BookingStatus::Cancelled,
            reference: b.reference,
            name: b.customer_name,
            email: b.customer_email,
            phone: b.customer_phone.unwrap_or_default(),
            participants: b.participants,
            method: b.payment_method.as_str().to_string(),
            status: b.status.as_str().to_string(),
        })
        .collect();

    Ok(HtmlTemplate(InstanceDetailTemplate {
        page: AdminPage::new(&state, &current, "courses", flash),
        template_id: template.id.to_string(),
        title: template.title,
        instance: instance_row(&instance),
        notes: instance.notes.unwrap_or_default(),
        bookings,
    }))
}

// POST /admin/instances/:id/cancel
//
// Cancels the date and every booking on it, which also returns any
// gift-card amounts drawn for those bookings.
pub async fn cancel_instance(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let back = format!("/admin/instances/{}", id);
    let ctx = &state.service_context;
    let result = async {
        ctx.course_repo
            .set_instance_status(id, CourseInstanceStatus::Cancelled)
            .await?;
        let mut cancelled = 0;
        for booking in ctx.booking_repo.list_for_instance(id).await? {
            if booking.status != BookingStatus::Cancelled {
                ctx.fulfillment_service.cancel_booking(booking.id).await?;
                cancelled += 1;
            }
        }
        Ok::<_, AppError>(cancelled)
    }
    .await;

    match result {
        Ok(count) => redirect_flash(&back, Ok(format!("Date cancelled, {} booking(s) cancelled", count))),
        Err(e) => redirect_flash(&back, Err(action_error("Cancel date", e))),
    }
}
