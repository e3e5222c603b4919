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
        format_sek, non_empty, ore_to_decimal, parse_decimal_to_ore, CreateProductRequest,
        UpdateProductRequest,
    },
    error::{AppError, Result},
    web::{
        admin::action_error,
        templates::{redirect_flash, AdminPage, Flash, HtmlTemplate},
    },
};

pub struct ProductRow {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub price: String,
    pub stock: i32,
    pub published: bool,
}

#[derive(Template)]
#[template(path = "admin/products.html")]
pub struct ProductsTemplate {
    pub page: AdminPage,
    pub products: Vec<ProductRow>,
}

#[derive(Template)]
#[template(path = "admin/product_detail.html")]
pub struct ProductDetailTemplate {
    pub page: AdminPage,
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price_kr: String,
    pub stock: i32,
    pub image_url: String,
    pub published: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProductForm {
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price_kr: String,
    pub stock: i32,
    pub image_url: Option<String>,
    /// Checkbox; absent when unchecked.
    pub published: Option<String>,
}

fn parse_price(value: &str) -> Result<i64> {
    parse_decimal_to_ore(value)
        .ok_or_else(|| AppError::Validation("price: must be an amount in kronor, e.g. 249 or 249,50".to_string()))
}

// GET /admin/products
pub async fn products_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Query(flash): Query<Flash>,
) -> Result<impl IntoResponse> {
    let products = state
        .service_context
        .product_repo
        .list(false)
        .await?
        .into_iter()
        .map(|p| ProductRow {
            id: p.id.to_string(),
            price: format_sek(p.price_ore),
            name: p.name,
            slug: p.slug,
            stock: p.stock,
            published: p.published,
        })
        .collect();

    Ok(HtmlTemplate(ProductsTemplate {
        page: AdminPage::new(&state, &current, "products", flash),
        products,
    }))
}

// POST /admin/products
pub async fn create_product(State(state): State<AppState>, Form(form): Form<ProductForm>) -> Response {
    let result = async {
        let request = CreateProductRequest {
            name: form.name.trim().to_string(),
            slug: non_empty(form.slug),
            description: form.description,
            price_ore: parse_price(&form.price_kr)?,
            stock: form.stock,
            image_url: non_empty(form.image_url),
            published: form.published.is_some(),
        };
        request.validate()?;
        state.service_context.product_repo.create(request).await
    }
    .await;

    match result {
        Ok(product) => redirect_flash(
            &format!("/admin/products/{}", product.id),
            Ok(format!("Created product '{}'", product.name)),
        ),
        Err(e) => redirect_flash("/admin/products", Err(action_error("Create product", e))),
    }
}

// GET /admin/products/:id
pub async fn product_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Path(id): Path<Uuid>,
    Query(flash): Query<Flash>,
) -> Result<impl IntoResponse> {
    let product = state
        .service_context
        .product_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    Ok(HtmlTemplate(ProductDetailTemplate {
        page: AdminPage::new(&state, &current, "products", flash),
        id: product.id.to_string(),
        price_kr: ore_to_decimal(product.price_ore),
        name: product.name,
        slug: product.slug,
        description: product.description,
        stock: product.stock,
        image_url: product.image_url.unwrap_or_default(),
        published: product.published,
    }))
}

// POST /admin/products/:id/update
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(form): Form<ProductForm>,
) -> Response {
    let back = format!("/admin/products/{}", id);
    let result = async {
        let update = UpdateProductRequest {
            name: Some(form.name.trim().to_string()).filter(|n| !n.is_empty()),
            description: Some(form.description),
            price_ore: Some(parse_price(&form.price_kr)?),
            stock: Some(form.stock),
            image_url: non_empty(form.image_url),
            published: Some(form.published.is_some()),
        };
        state.service_context.product_repo.update(id, update).await
    }
    .await;

    match result {
        Ok(_) => redirect_flash(&back, Ok("Product saved".to_string())),
        Err(e) => redirect_flash(&back, Err(action_error("Update product", e))),
    }
}

// POST /admin/products/:id/delete
pub async fn delete_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.service_context.product_repo.delete(id).await {
        Ok(()) => redirect_flash("/admin/products", Ok("Product deleted".to_string())),
        Err(e) => redirect_flash(&format!("/admin/products/{}", id), Err(action_error("Delete product", e))),
    }
}
