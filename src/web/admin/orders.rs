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
    domain::{format_local, format_sek, OrderStatus, PaymentMethod},
    error::Result,
    web::{
        admin::{action_error, StatusFilter, PAGE_SIZE},
        templates::{redirect_flash, AdminPage, Flash, HtmlTemplate},
    },
};

pub struct OrderRow {
    pub id: String,
    pub reference: String,
    pub product: String,
    pub quantity: i32,
    pub total: String,
    pub customer: String,
    pub shipping_address: String,
    pub method: String,
    pub status: String,
    pub created: String,
    pub shippable: bool,
}

#[derive(Template)]
#[template(path = "admin/orders.html")]
pub struct OrdersTemplate {
    pub page: AdminPage,
    pub status_filter: String,
    pub orders: Vec<OrderRow>,
}

// GET /admin/orders
pub async fn orders_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Query(filter): Query<StatusFilter>,
    Query(flash): Query<Flash>,
) -> Result<impl IntoResponse> {
    let ctx = &state.service_context;
    let status = filter.parse(OrderStatus::parse);

    let names: HashMap<Uuid, String> = ctx
        .product_repo
        .list(false)
        .await?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();

    let orders = ctx
        .order_repo
        .list(status, PAGE_SIZE, 0)
        .await?
        .into_iter()
        .map(|o| OrderRow {
            id: o.id.to_string(),
            product: names.get(&o.product_id).cloned().unwrap_or_default(),
            quantity: o.quantity,
            total: format_sek(o.total_ore),
            customer: format!("{} <{}>", o.customer_name, o.customer_email),
            method: o.payment_method.as_str().to_string(),
            status: o.status.as_str().to_string(),
            created: format_local(o.created_at),
            shippable: o.status == OrderStatus::Paid
                || (o.status == OrderStatus::Pending && o.payment_method == PaymentMethod::Invoice),
            shipping_address: o.shipping_address,
            reference: o.reference,
        })
        .collect();

    Ok(HtmlTemplate(OrdersTemplate {
        page: AdminPage::new(&state, &current, "orders", flash),
        status_filter: filter.value(),
        orders,
    }))
}

// POST /admin/orders/:id/ship
pub async fn mark_shipped(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.service_context.order_repo.mark_shipped(id).await {
        Ok(order) => redirect_flash("/admin/orders", Ok(format!("Order {} marked as shipped", order.reference))),
        Err(e) => redirect_flash("/admin/orders", Err(action_error("Mark shipped", e))),
    }
}
