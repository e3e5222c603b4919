use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::state::AppState,
    domain::{normalize_gift_card_code, GiftCardStatus, Product},
    error::{AppError, Result},
};

#[derive(Debug, Deserialize)]
pub struct CoursesQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PublicCourseDate {
    pub course_instance_id: Uuid,
    pub template_id: Uuid,
    pub title: String,
    pub slug: String,
    pub price_ore: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub spots_left: i32,
}

#[derive(Debug, Serialize)]
pub struct PublicProduct {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price_ore: i64,
    pub in_stock: bool,
    pub image_url: Option<String>,
}

impl From<Product> for PublicProduct {
    fn from(p: Product) -> Self {
        Self {
            in_stock: p.stock > 0,
            id: p.id,
            name: p.name,
            slug: p.slug,
            description: p.description,
            price_ore: p.price_ore,
            image_url: p.image_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GiftCardBalance {
    pub code: String,
    pub balance_ore: i64,
    pub status: GiftCardStatus,
    pub expires_at: Option<DateTime<Utc>>,
}

/// GET /api/courses: upcoming bookable dates.
pub async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<CoursesQuery>,
) -> Result<Json<Vec<PublicCourseDate>>> {
    let ctx = &state.service_context;
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let now = Utc::now();

    let templates: HashMap<Uuid, _> = ctx
        .course_repo
        .list_templates(true)
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();

    let dates = ctx
        .course_repo
        .list_upcoming_instances(limit)
        .await?
        .into_iter()
        .filter(|i| i.is_bookable(now))
        .filter_map(|i| {
            let template = templates.get(&i.template_id)?;
            Some(PublicCourseDate {
                course_instance_id: i.id,
                template_id: template.id,
                title: template.title.clone(),
                slug: template.slug.clone(),
                price_ore: template.price_ore,
                starts_at: i.starts_at,
                ends_at: i.ends_at,
                spots_left: i.spots_left(),
            })
        })
        .collect();

    Ok(Json(dates))
}

/// GET /api/products
pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<PublicProduct>>> {
    let products = state.service_context.product_repo.list(true).await?;
    Ok(Json(products.into_iter().map(PublicProduct::from).collect()))
}

/// GET /api/gift-cards/:code
pub async fn gift_card_balance(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<GiftCardBalance>> {
    let card = state
        .service_context
        .gift_card_repo
        .find_by_code(&code)
        .await?
        // Unpaid cards are not revealed.
        .filter(|c| c.status != GiftCardStatus::Pending)
        .ok_or_else(|| AppError::NotFound("Gift card not found".to_string()))?;

    Ok(Json(GiftCardBalance {
        code: normalize_gift_card_code(&card.code),
        balance_ore: card.balance_ore,
        status: card.status,
        expires_at: card.expires_at,
    }))
}
