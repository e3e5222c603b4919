use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    api::state::AppState,
    domain::{CheckoutOutcome, CheckoutRequest, Payment, PaymentKind, PaymentMethod, PaymentStatus},
    error::Result,
    payments::SwishCallback,
};

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub payment_id: Uuid,
    pub reference: String,
    pub kind: PaymentKind,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub amount_ore: i64,
    pub status_url: String,
    pub replayed: bool,
}

impl From<CheckoutOutcome> for CheckoutResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        let payment = outcome.payment;
        Self {
            status_url: format!("/api/payments/{}/status", payment.id),
            payment_id: payment.id,
            reference: payment.reference,
            kind: payment.kind,
            method: payment.method,
            status: payment.status,
            amount_ore: payment.amount_ore,
            replayed: outcome.replayed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub payment_id: Uuid,
    pub reference: String,
    pub status: PaymentStatus,
    pub amount_ore: i64,
    pub error_message: Option<String>,
}

impl From<Payment> for PaymentStatusResponse {
    fn from(payment: Payment) -> Self {
        Self {
            payment_id: payment.id,
            reference: payment.reference,
            status: payment.status,
            amount_ore: payment.amount_ore,
            error_message: payment.error_message,
        }
    }
}

pub fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// POST /api/checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>)> {
    let outcome = state
        .service_context
        .checkout_service
        .start_checkout(request, idempotency_key(&headers))
        .await?;

    let status = if outcome.replayed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(outcome.into())))
}

/// GET /api/payments/:id/status
pub async fn payment_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentStatusResponse>> {
    let payment = state.service_context.fulfillment_service.refresh_status(id).await?;
    Ok(Json(payment.into()))
}

/// POST /api/payments/swish/callback
///
/// Swish retries until it gets a 2xx, so a callback for a payment that is
/// already settled still answers 200.
pub async fn swish_callback(
    State(state): State<AppState>,
    Json(callback): Json<SwishCallback>,
) -> Result<StatusCode> {
    state
        .service_context
        .fulfillment_service
        .handle_swish_callback(callback)
        .await?;
    Ok(StatusCode::OK)
}
