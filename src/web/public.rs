use std::collections::HashMap;

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::state::AppState,
    domain::{
        format_local, format_sek, non_empty, CheckoutRequest, CourseInstance, CourseTemplate, CustomerDetails,
        GiftCardStatus, PaymentMethod, PaymentStatus, Product,
    },
    error::{AppError, Result},
    web::templates::HtmlTemplate,
};

pub struct CourseView {
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price: String,
    pub duration: String,
    pub image_url: Option<String>,
}

impl From<&CourseTemplate> for CourseView {
    fn from(t: &CourseTemplate) -> Self {
        Self {
            title: t.title.clone(),
            slug: t.slug.clone(),
            description: t.description.clone(),
            price: format_sek(t.price_ore),
            duration: format_duration(t.duration_minutes),
            image_url: t.image_url.clone(),
        }
    }
}

pub struct CourseDateView {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub starts: String,
    pub spots_left: i32,
    pub price: String,
}

impl CourseDateView {
    fn new(instance: &CourseInstance, template: &CourseTemplate) -> Self {
        Self {
            id: instance.id.to_string(),
            title: template.title.clone(),
            slug: template.slug.clone(),
            starts: format_local(instance.starts_at),
            spots_left: instance.spots_left(),
            price: format_sek(template.price_ore),
        }
    }
}

pub struct ProductView {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: String,
    pub stock: i32,
    pub image_url: Option<String>,
}

impl From<&Product> for ProductView {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name.clone(),
            slug: p.slug.clone(),
            description: p.description.clone(),
            price: format_sek(p.price_ore),
            stock: p.stock,
            image_url: p.image_url.clone(),
        }
    }
}

pub struct GiftCardLookupView {
    pub code: String,
    pub balance: String,
    pub status: String,
    pub expires: Option<String>,
}

#[derive(Template)]
#[template(path = "public/home.html")]
pub struct HomeTemplate {
    pub studio_name: String,
    pub dates: Vec<CourseDateView>,
    pub products: Vec<ProductView>,
}

#[derive(Template)]
#[template(path = "public/courses.html")]
pub struct CoursesTemplate {
    pub studio_name: String,
    pub courses: Vec<CourseView>,
}

#[derive(Template)]
#[template(path = "public/course.html")]
pub struct CoursePageTemplate {
    pub studio_name: String,
    pub course: CourseView,
    pub dates: Vec<CourseDateView>,
    pub idempotency_key: String,
    pub swish_enabled: bool,
    pub invoice_enabled: bool,
    pub max_participants: i32,
}

#[derive(Template)]
#[template(path = "public/gift_cards.html")]
pub struct GiftCardsTemplate {
    pub studio_name: String,
    pub min_kr: i64,
    pub max_kr: i64,
    pub idempotency_key: String,
    pub swish_enabled: bool,
    pub lookup: Option<GiftCardLookupView>,
    pub lookup_error: Option<String>,
}

#[derive(Template)]
#[template(path = "public/shop.html")]
pub struct ShopTemplate {
    pub studio_name: String,
    pub products: Vec<ProductView>,
}

#[derive(Template)]
#[template(path = "public/product.html")]
pub struct ProductPageTemplate {
    pub studio_name: String,
    pub product: ProductView,
    pub idempotency_key: String,
    pub swish_enabled: bool,
    pub invoice_enabled: bool,
}

#[derive(Template)]
#[template(path = "public/checkout_status.html")]
pub struct CheckoutStatusTemplate {
    pub studio_name: String,
    pub payment_id: String,
    pub reference: String,
    pub amount: String,
    pub method: String,
    pub status: String,
    pub waiting: bool,
    pub succeeded: bool,
    pub error_message: Option<String>,
}

#[derive(Template)]
#[template(path = "public/checkout_error.html")]
pub struct CheckoutErrorTemplate {
    pub studio_name: String,
    pub message: String,
    pub back_url: String,
}

fn format_duration(minutes: i32) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{} min", m),
        (h, 0) => format!("{} h", h),
        (h, m) => format!("{} h {} min", h, m),
    }
}

fn method_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Swish => "Swish",
        PaymentMethod::Invoice => "Faktura",
        PaymentMethod::GiftCard => "Presentkort",
    }
}

fn checkout_error(state: &AppState, error: AppError, back_url: &str) -> Response {
    let status = error.status_code();
    let message = match error {
        AppError::Database(_) | AppError::Internal(_) => "Något gick fel, försök igen om en stund.".to_string(),
        AppError::Validation(msg)
        | AppError::BadRequest(msg)
        | AppError::Conflict(msg)
        | AppError::Payment(msg)
        | AppError::NotFound(msg)
        | AppError::ServiceUnavailable(msg)
        | AppError::External(msg) => msg,
        AppError::Unauthorized | AppError::Forbidden => "Åtkomst nekad.".to_string(),
    };
    (
        status,
        HtmlTemplate(CheckoutErrorTemplate {
            studio_name: state.settings().studio.name.clone(),
            message,
            back_url: back_url.to_string(),
        }),
    )
        .into_response()
}

async fn submit(state: &AppState, request: CheckoutRequest, idempotency_key: Option<String>, back_url: &str) -> Response {
    match state
        .service_context
        .checkout_service
        .start_checkout(request, idempotency_key)
        .await
    {
        Ok(outcome) => Redirect::to(&format!("/checkout/{}", outcome.payment.id)).into_response(),
        Err(e) => checkout_error(state, e, back_url),
    }
}

// GET /
pub async fn home_page(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let ctx = &state.service_context;
    let now = Utc::now();
    let templates: HashMap<Uuid, CourseTemplate> = ctx
        .course_repo
        .list_templates(true)
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();

    let dates = ctx
        .course_repo
        .list_upcoming_instances(6)
        .await?
        .iter()
        .filter(|i| i.is_bookable(now))
        .filter_map(|i| templates.get(&i.template_id).map(|t| CourseDateView::new(i, t)))
        .collect();
    let products = ctx
        .product_repo
        .list(true)
        .await?
        .iter()
        .take(4)
        .map(ProductView::from)
        .collect();

    Ok(HtmlTemplate(HomeTemplate {
        studio_name: state.settings().studio.name.clone(),
        dates,
        products,
    }))
}

// GET /courses
pub async fn courses_page(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let courses = state
        .service_context
        .course_repo
        .list_templates(true)
        .await?
        .iter()
        .map(CourseView::from)
        .collect();

    Ok(HtmlTemplate(CoursesTemplate {
        studio_name: state.settings().studio.name.clone(),
        courses,
    }))
}

// GET /courses/:slug
pub async fn course_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse> {
    let ctx = &state.service_context;
    let template = ctx
        .course_repo
        .find_template_by_slug(&slug)
        .await?
        .filter(|t| t.active)
        .ok_or_else(|| AppError::NotFound("Kursen finns inte".to_string()))?;

    let now = Utc::now();
    let dates = ctx
        .course_repo
        .list_instances_for_template(template.id, true)
        .await?
        .iter()
        .filter(|i| i.is_bookable(now))
        .map(|i| CourseDateView::new(i, &template))
        .collect();
    let config = ctx.settings_service.checkout_config().await?;

    Ok(HtmlTemplate(CoursePageTemplate {
        studio_name: state.settings().studio.name.clone(),
        course: CourseView::from(&template),
        dates,
        idempotency_key: Uuid::new_v4().to_string(),
        swish_enabled: ctx.checkout_service.swish_available(),
        invoice_enabled: config.invoice_enabled,
        max_participants: config.max_participants_per_booking,
    }))
}

#[derive(Debug, Deserialize)]
pub struct GiftCardLookupQuery {
    pub code: Option<String>,
}

// GET /gift-cards
pub async fn gift_cards_page(
    State(state): State<AppState>,
    Query(query): Query<GiftCardLookupQuery>,
) -> Result<impl IntoResponse> {
    let ctx = &state.service_context;
    let config = ctx.settings_service.gift_card_config().await?;

    let (lookup, lookup_error) = match non_empty(query.code) {
        Some(code) => match ctx.gift_card_repo.find_by_code(&code).await? {
            Some(card) if card.status != GiftCardStatus::Pending => (
                Some(GiftCardLookupView {
                    code: card.code.clone(),
                    balance: format_sek(card.balance_ore),
                    status: card.status.as_str().to_string(),
                    expires: card.expires_at.map(|e| format_local(e)[..10].to_string()),
                }),
                None,
            ),
            _ => (None, Some("Hittade inget presentkort med den koden.".to_string())),
        },
        None => (None, None),
    };

    Ok(HtmlTemplate(GiftCardsTemplate {
        studio_name: state.settings().studio.name.clone(),
        min_kr: config.min_amount_ore / 100,
        max_kr: config.max_amount_ore / 100,
        idempotency_key: Uuid::new_v4().to_string(),
        swish_enabled: ctx.checkout_service.swish_available(),
        lookup,
        lookup_error,
    }))
}

// GET /shop
pub async fn shop_page(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let products = state
        .service_context
        .product_repo
        .list(true)
        .await?
        .iter()
        .map(ProductView::from)
        .collect();

    Ok(HtmlTemplate(ShopTemplate {
        studio_name: state.settings().studio.name.clone(),
        products,
    }))
}

// GET /shop/:slug
pub async fn product_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse> {
    let ctx = &state.service_context;
    let product = ctx
        .product_repo
        .find_by_slug(&slug)
        .await?
        .filter(|p| p.published)
        .ok_or_else(|| AppError::NotFound("Produkten finns inte".to_string()))?;
    let config = ctx.settings_service.checkout_config().await?;

    Ok(HtmlTemplate(ProductPageTemplate {
        studio_name: state.settings().studio.name.clone(),
        product: ProductView::from(&product),
        idempotency_key: Uuid::new_v4().to_string(),
        swish_enabled: ctx.checkout_service.swish_available(),
        invoice_enabled: config.invoice_enabled,
    }))
}

#[derive(Debug, Deserialize)]
pub struct BookingForm {
    pub course_instance_id: Uuid,
    pub participants: i32,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub method: PaymentMethod,
    pub gift_card_code: Option<String>,
    pub message: Option<String>,
    pub idempotency_key: Option<String>,
}

// POST /checkout/booking
pub async fn checkout_booking(State(state): State<AppState>, Form(form): Form<BookingForm>) -> Response {
    let request = CheckoutRequest::BookCourse {
        course_instance_id: form.course_instance_id,
        participants: form.participants,
        customer: CustomerDetails {
            name: form.name,
            email: form.email,
            phone: non_empty(form.phone),
        },
        method: form.method,
        gift_card_code: form.gift_card_code,
        message: form.message,
    };
    submit(&state, request, form.idempotency_key, "/courses").await
}

#[derive(Debug, Deserialize)]
pub struct GiftCardForm {
    pub amount_kr: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    pub message: Option<String>,
    pub idempotency_key: Option<String>,
}

// POST /checkout/gift-card
pub async fn checkout_gift_card(State(state): State<AppState>, Form(form): Form<GiftCardForm>) -> Response {
    let request = CheckoutRequest::BuyGiftCard {
        amount_ore: form.amount_kr.saturating_mul(100),
        buyer: CustomerDetails {
            name: form.name,
            email: form.email,
            phone: non_empty(form.phone),
        },
        recipient_name: form.recipient_name,
        recipient_email: form.recipient_email,
        message: form.message,
        method: PaymentMethod::Swish,
    };
    submit(&state, request, form.idempotency_key, "/gift-cards").await
}

#[derive(Debug, Deserialize)]
pub struct ProductForm {
    pub product_id: Uuid,
    pub quantity: i32,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub shipping_address: String,
    pub method: PaymentMethod,
    pub idempotency_key: Option<String>,
}

// POST /checkout/product
pub async fn checkout_product(State(state): State<AppState>, Form(form): Form<ProductForm>) -> Response {
    let request = CheckoutRequest::BuyProduct {
        product_id: form.product_id,
        quantity: form.quantity,
        customer: CustomerDetails {
            name: form.name,
            email: form.email,
            phone: non_empty(form.phone),
        },
        shipping_address: form.shipping_address,
        method: form.method,
    };
    submit(&state, request, form.idempotency_key, "/shop").await
}

// GET /checkout/:payment_id
pub async fn checkout_status_page(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let payment = state
        .service_context
        .fulfillment_service
        .refresh_status(payment_id)
        .await?;

    // Invoices stay CREATED until paid, but the checkout itself is done.
    let succeeded = payment.status == PaymentStatus::Paid
        || (payment.method == PaymentMethod::Invoice && payment.status == PaymentStatus::Created);
    let waiting = payment.status == PaymentStatus::Created && payment.method == PaymentMethod::Swish;

    Ok(HtmlTemplate(CheckoutStatusTemplate {
        studio_name: state.settings().studio.name.clone(),
        payment_id: payment.id.to_string(),
        reference: payment.reference.clone(),
        amount: format_sek(payment.amount_ore),
        method: method_label(payment.method).to_string(),
        status: payment.status.as_str().to_string(),
        waiting,
        succeeded,
        error_message: payment.error_message.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45), "45 min");
        assert_eq!(format_duration(120), "2 h");
        assert_eq!(format_duration(150), "2 h 30 min");
    }

    #[test]
    fn test_booking_form_parses() {
        let id = Uuid::new_v4();
        let body = format!(
            "course_instance_id={}&participants=2&name=Maja&email=maja%40example.se&phone=&method=swish&gift_card_code=&message=&idempotency_key=abc",
            id
        );
        let form: BookingForm = serde_urlencoded::from_str(&body).unwrap();
        assert_eq!(form.course_instance_id, id);
        assert_eq!(form.participants, 2);
        assert_eq!(form.method, PaymentMethod::Swish);
        assert_eq!(form.phone.as_deref(), Some(""));
    }
}
