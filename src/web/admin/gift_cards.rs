use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Extension, Form,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentAdmin, state::AppState},
    domain::{format_local, format_sek, parse_decimal_to_ore, CustomerDetails, GiftCardStatus},
    error::{AppError, Result},
    web::{
        admin::{action_error, StatusFilter, PAGE_SIZE},
        templates::{redirect_flash, AdminPage, Flash, HtmlTemplate},
    },
};

pub struct GiftCardRow {
    pub id: String,
    pub code: String,
    pub initial: String,
    pub balance: String,
    pub status: String,
    pub buyer: String,
    pub recipient: String,
    pub expires: String,
    pub created: String,
    pub cancellable: bool,
}

#[derive(Template)]
#[template(path = "admin/gift_cards.html")]
pub struct GiftCardsTemplate {
    pub page: AdminPage,
    pub status_filter: String,
    pub cards: Vec<GiftCardRow>,
}

#[derive(Debug, Deserialize)]
pub struct IssueForm {
    pub amount_kr: String,
    pub buyer_name: String,
    pub buyer_email: String,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    pub message: Option<String>,
}

// GET /admin/gift-cards
pub async fn gift_cards_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Query(filter): Query<StatusFilter>,
    Query(flash): Query<Flash>,
) -> Result<impl IntoResponse> {
    let status = filter.parse(GiftCardStatus::parse);
    let cards = state
        .service_context
        .gift_card_repo
        .list(status, PAGE_SIZE, 0)
        .await?
        .into_iter()
        .map(|c| GiftCardRow {
            id: c.id.to_string(),
            initial: format_sek(c.initial_amount_ore),
            balance: format_sek(c.balance_ore),
            status: c.status.as_str().to_string(),
            expires: c.expires_at.map(format_local).unwrap_or_default(),
            created: format_local(c.created_at),
            cancellable: matches!(c.status, GiftCardStatus::Pending | GiftCardStatus::Active)
                && c.balance_ore == c.initial_amount_ore,
            recipient: c.recipient_name.unwrap_or_default(),
            buyer: format!("{} <{}>", c.buyer_name, c.buyer_email),
            code: c.code,
        })
        .collect();

    Ok(HtmlTemplate(GiftCardsTemplate {
        page: AdminPage::new(&state, &current, "gift-cards", flash),
        status_filter: filter.value(),
        cards,
    }))
}

// POST /admin/gift-cards
pub async fn issue_gift_card(State(state): State<AppState>, Form(form): Form<IssueForm>) -> Response {
    let result = async {
        let amount_ore = parse_decimal_to_ore(&form.amount_kr)
            .ok_or_else(|| AppError::Validation("amount: must be an amount in kronor".to_string()))?;
        state
            .service_context
            .checkout_service
            .issue_gift_card(
                amount_ore,
                CustomerDetails {
                    name: form.buyer_name,
                    email: form.buyer_email,
                    phone: None,
                },
                form.recipient_name,
                form.recipient_email,
                form.message,
            )
            .await
    }
    .await;

    match result {
        Ok(card) => redirect_flash(
            "/admin/gift-cards",
            Ok(format!("Issued gift card {} for {}", card.code, format_sek(card.initial_amount_ore))),
        ),
        Err(e) => redirect_flash("/admin/gift-cards", Err(action_error("Issue gift card", e))),
    }
}

// POST /admin/gift-cards/:id/cancel
pub async fn cancel_gift_card(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.service_context.fulfillment_service.cancel_gift_card(id).await {
        Ok(()) => redirect_flash("/admin/gift-cards", Ok("Gift card cancelled".to_string())),
        Err(e) => redirect_flash("/admin/gift-cards", Err(action_error("Cancel gift card", e))),
    }
}
