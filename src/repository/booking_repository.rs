use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{Booking, BookingStatus, PaymentMethod},
    error::{AppError, Result},
    repository::{parse_uuid, to_utc, BookingRepository},
};

#[derive(FromRow)]
struct BookingRow {
    id: String,
    course_instance_id: String,
    reference: String,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    participants: i32,
    status: String,
    payment_method: String,
    gift_card_code: Option<String>,
    message: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const BOOKING_COLUMNS: &str = r#"
    id, course_instance_id, reference, customer_name, customer_email,
    customer_phone, participants, status, payment_method, gift_card_code,
    message, created_at, updated_at
"#;

pub struct SqliteBookingRepository {
    pool: SqlitePool,
}

impl SqliteBookingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_booking(row: BookingRow) -> Result<Booking> {
        Ok(Booking {
            id: parse_uuid(&row.id)?,
            course_instance_id: parse_uuid(&row.course_instance_id)?,
            reference: row.reference,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            participants: row.participants,
            status: BookingStatus::parse(&row.status)?,
            payment_method: PaymentMethod::parse(&row.payment_method)?,
            gift_card_code: row.gift_card_code,
            message: row.message,
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }
}

pub(crate) async fn insert_booking(conn: &mut SqliteConnection, booking: &Booking) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO bookings (
            id, course_instance_id, reference, customer_name, customer_email,
            customer_phone, participants, status, payment_method, gift_card_code,
            message, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#
    )
    .bind(booking.id.to_string())
    .bind(booking.course_instance_id.to_string())
    .bind(&booking.reference)
    .bind(&booking.customer_name)
    .bind(&booking.customer_email)
    .bind(&booking.customer_phone)
    .bind(booking.participants)
    .bind(booking.status.as_str())
    .bind(booking.payment_method.as_str())
    .bind(&booking.gift_card_code)
    .bind(&booking.message)
    .bind(booking.created_at.naive_utc())
    .bind(booking.updated_at.naive_utc())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn find_booking_in(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Booking>> {
    let row = sqlx::query_as::<_, BookingRow>(&format!(
        "SELECT {} FROM bookings WHERE id = ?",
        BOOKING_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(SqliteBookingRepository::row_to_booking).transpose()
}

/// Moves a booking to `status` unless it already has it. Returns whether a row changed.
pub(crate) async fn set_booking_status_in(
    conn: &mut SqliteConnection,
    id: Uuid,
    status: BookingStatus,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE bookings SET status = ?, updated_at = ? WHERE id = ? AND status != ?"
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
impl BookingRepository for SqliteBookingRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>> {
        let mut conn = self.pool.acquire().await?;
        find_booking_in(&mut conn, id).await
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE reference = ?",
            BOOKING_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_booking).transpose()
    }

    async fn list(&self, status: Option<BookingStatus>, limit: i64, offset: i64) -> Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            SELECT {} FROM bookings
            WHERE (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
            BOOKING_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_booking).collect()
    }

    async fn list_for_instance(&self, course_instance_id: Uuid) -> Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE course_instance_id = ? ORDER BY created_at",
            BOOKING_COLUMNS
        ))
        .bind(course_instance_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_booking).collect()
    }

    async fn update_status(&self, id: Uuid, status: BookingStatus) -> Result<Booking> {
        let mut conn = self.pool.acquire().await?;
        set_booking_status_in(&mut conn, id, status).await?;
        find_booking_in(&mut conn, id).await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))
    }
}
