use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{OrderStatus, PaymentMethod, ShopOrder},
    error::{AppError, Result},
    repository::{parse_uuid, to_utc, OrderRepository},
};

#[derive(FromRow)]
struct OrderRow {
    id: String,
    product_id: String,
    reference: String,
    quantity: i32,
    unit_price_ore: i64,
    total_ore: i64,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    shipping_address: String,
    status: String,
    payment_method: String,
    shipped_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const ORDER_COLUMNS: &str = r#"
    id, product_id, reference, quantity, unit_price_ore, total_ore,
    customer_name, customer_email, customer_phone, shipping_address,
    status, payment_method, shipped_at, created_at, updated_at
"#;

pub struct SqliteOrderRepository {
    pool: SqlitePool,
}

impl SqliteOrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: OrderRow) -> Result<ShopOrder> {
        Ok(ShopOrder {
            id: parse_uuid(&row.id)?,
            product_id: parse_uuid(&row.product_id)?,
            reference: row.reference,
            quantity: row.quantity,
            unit_price_ore: row.unit_price_ore,
            total_ore: row.total_ore,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            shipping_address: row.shipping_address,
            status: OrderStatus::parse(&row.status)?,
            payment_method: PaymentMethod::parse(&row.payment_method)?,
            shipped_at: row.shipped_at.map(to_utc),
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }
}

pub(crate) async fn insert_order(conn: &mut SqliteConnection, order: &ShopOrder) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO shop_orders (
            id, product_id, reference, quantity, unit_price_ore, total_ore,
            customer_name, customer_email, customer_phone, shipping_address,
            status, payment_method, shipped_at, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#
    )
    .bind(order.id.to_string())
    .bind(order.product_id.to_string())
    .bind(&order.reference)
    .bind(order.quantity)
    .bind(order.unit_price_ore)
    .bind(order.total_ore)
    .bind(&order.customer_name)
    .bind(&order.customer_email)
    .bind(&order.customer_phone)
    .bind(&order.shipping_address)
    .bind(order.status.as_str())
    .bind(order.payment_method.as_str())
    .bind(order.shipped_at.map(|dt| dt.naive_utc()))
    .bind(order.created_at.naive_utc())
    .bind(order.updated_at.naive_utc())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn find_order_in(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<ShopOrder>> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {} FROM shop_orders WHERE id = ?",
        ORDER_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(SqliteOrderRepository::row_to_order).transpose()
}

pub(crate) async fn set_order_status_in(
    conn: &mut SqliteConnection,
    id: Uuid,
    status: OrderStatus,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE shop_orders SET status = ?, updated_at = ? WHERE id = ? AND status != ?"
    )
    .bind(status.as_str())
    .bind(Utc::now().naive_utc())
    .bind(id.to_string())
    .bind(status.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl OrderRepository for SqliteOrderRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ShopOrder>> {
        let mut conn = self.pool.acquire().await?;
        find_order_in(&mut conn, id).await
    }

    async fn list(&self, status: Option<OrderStatus>, limit: i64, offset: i64) -> Result<Vec<ShopOrder>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {} FROM shop_orders
            WHERE (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
            ORDER_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn mark_shipped(&self, id: Uuid) -> Result<ShopOrder> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE shop_orders
            SET status = 'Shipped', shipped_at = ?, updated_at = ?
            WHERE id = ?
              AND (status = 'Paid' OR (status = 'Pending' AND payment_method = 'Invoice'))
            "#
        )
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict("Only paid or invoiced orders can be shipped".to_string()));
        }

        self.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
    }
}
