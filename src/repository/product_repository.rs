use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{slugify, CreateProductRequest, Product, UpdateProductRequest},
    error::{AppError, Result},
    repository::{parse_uuid, to_utc, ProductRepository},
};

#[derive(FromRow)]
struct ProductRow {
    id: String,
    name: String,
    slug: String,
    description: String,
    price_ore: i64,
    stock: i32,
    image_url: Option<String>,
    published: bool,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const PRODUCT_COLUMNS: &str = r#"
    id, name, slug, description, price_ore, stock, image_url, published,
    created_at, updated_at
"#;

pub struct SqliteProductRepository {
    pool: SqlitePool,
}

impl SqliteProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_product(row: ProductRow) -> Result<Product> {
        Ok(Product {
            id: parse_uuid(&row.id)?,
            name: row.name,
            slug: row.slug,
            description: row.description,
            price_ore: row.price_ore,
            stock: row.stock,
            image_url: row.image_url,
            published: row.published,
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }
}

pub(crate) async fn find_product_in(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Product>> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {} FROM products WHERE id = ?",
        PRODUCT_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(SqliteProductRepository::row_to_product).transpose()
}

/// Takes `quantity` off the shelf, failing rather than going below zero.
pub(crate) async fn decrement_stock_in(
    conn: &mut SqliteConnection,
    id: Uuid,
    quantity: i32,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE products SET stock = stock - ?, updated_at = ? WHERE id = ? AND stock >= ?"
    )
    .bind(quantity)
    .bind(Utc::now().naive_utc())
    .bind(id.to_string())
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict("Product is out of stock".to_string()));
    }
    Ok(())
}

pub(crate) async fn increment_stock_in(
    conn: &mut SqliteConnection,
    id: Uuid,
    quantity: i32,
) -> Result<()> {
    sqlx::query("UPDATE products SET stock = stock + ?, updated_at = ? WHERE id = ?")
        .bind(quantity)
        .bind(Utc::now().naive_utc())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl ProductRepository for SqliteProductRepository {
    async fn create(&self, request: CreateProductRequest) -> Result<Product> {
        let id = Uuid::new_v4();
        let slug = request
            .slug
            .as_deref()
            .map(slugify)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slugify(&request.name));
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, slug, description, price_ore, stock, image_url, published,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(&request.name)
        .bind(&slug)
        .bind(&request.description)
        .bind(request.price_ore)
        .bind(request.stock)
        .bind(&request.image_url)
        .bind(request.published)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.message().contains("UNIQUE") => {
                AppError::Conflict(format!("A product with slug '{}' already exists", slug))
            }
            other => AppError::Database(other.to_string()),
        })?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created product".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        find_product_in(&mut conn, id).await
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE slug = ?",
            PRODUCT_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn list(&self, published_only: bool) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE (? = 0 OR published = 1) ORDER BY name",
            PRODUCT_COLUMNS
        ))
        .bind(published_only)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn update(&self, id: Uuid, update: UpdateProductRequest) -> Result<Product> {
        let current = self.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

        if update.stock.map(|s| s < 0).unwrap_or(false) {
            return Err(AppError::Validation("Stock must not be negative".to_string()));
        }

        sqlx::query(
            r#"
            UPDATE products
            SET name = ?, description = ?, price_ore = ?, stock = ?,
                image_url = ?, published = ?, updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(update.name.unwrap_or(current.name))
        .bind(update.description.unwrap_or(current.description))
        .bind(update.price_ore.unwrap_or(current.price_ore))
        .bind(update.stock.unwrap_or(current.stock))
        .bind(update.image_url.or(current.image_url))
        .bind(update.published.unwrap_or(current.published))
        .bind(Utc::now().naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve updated product".to_string())
        })
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let orders = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM shop_orders WHERE product_id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;

        if orders > 0 {
            return Err(AppError::Conflict(
                "Product has orders; unpublish it instead".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Product not found".to_string()));
        }
        Ok(())
    }
}
