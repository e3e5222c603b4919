use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{normalize_gift_card_code, GiftCard, GiftCardStatus},
    error::{AppError, Result},
    repository::{parse_uuid, to_utc, GiftCardRepository},
};

#[derive(FromRow)]
struct GiftCardRow {
    id: String,
    code: String,
    initial_amount_ore: i64,
    balance_ore: i64,
    status: String,
    buyer_name: String,
    buyer_email: String,
    recipient_name: Option<String>,
    recipient_email: Option<String>,
    message: Option<String>,
    pdf_path: Option<String>,
    sent_at: Option<NaiveDateTime>,
    expires_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const GIFT_CARD_COLUMNS: &str = r#"
    id, code, initial_amount_ore, balance_ore, status, buyer_name, buyer_email,
    recipient_name, recipient_email, message, pdf_path, sent_at, expires_at,
    created_at, updated_at
"#;

pub struct SqliteGiftCardRepository {
    pool: SqlitePool,
}

impl SqliteGiftCardRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_gift_card(row: GiftCardRow) -> Result<GiftCard> {
        Ok(GiftCard {
            id: parse_uuid(&row.id)?,
            code: row.code,
            initial_amount_ore: row.initial_amount_ore,
            balance_ore: row.balance_ore,
            status: GiftCardStatus::parse(&row.status)?,
            buyer_name: row.buyer_name,
            buyer_email: row.buyer_email,
            recipient_name: row.recipient_name,
            recipient_email: row.recipient_email,
            message: row.message,
            pdf_path: row.pdf_path,
            sent_at: row.sent_at.map(to_utc),
            expires_at: row.expires_at.map(to_utc),
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }
}

pub(crate) async fn insert_gift_card(conn: &mut SqliteConnection, card: &GiftCard) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO gift_cards (
            id, code, initial_amount_ore, balance_ore, status, buyer_name, buyer_email,
            recipient_name, recipient_email, message, pdf_path, expires_at,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#
    )
    .bind(card.id.to_string())
    .bind(&card.code)
    .bind(card.initial_amount_ore)
    .bind(card.balance_ore)
    .bind(card.status.as_str())
    .bind(&card.buyer_name)
    .bind(&card.buyer_email)
    .bind(&card.recipient_name)
    .bind(&card.recipient_email)
    .bind(&card.message)
    .bind(&card.pdf_path)
    .bind(card.expires_at.map(|dt| dt.naive_utc()))
    .bind(card.created_at.naive_utc())
    .bind(card.updated_at.naive_utc())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn find_gift_card_in(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<GiftCard>> {
    let row = sqlx::query_as::<_, GiftCardRow>(&format!(
        "SELECT {} FROM gift_cards WHERE id = ?",
        GIFT_CARD_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(SqliteGiftCardRepository::row_to_gift_card).transpose()
}

pub(crate) async fn find_gift_card_by_code_in(
    conn: &mut SqliteConnection,
    code: &str,
) -> Result<Option<GiftCard>> {
    let row = sqlx::query_as::<_, GiftCardRow>(&format!(
        "SELECT {} FROM gift_cards WHERE code = ?",
        GIFT_CARD_COLUMNS
    ))
    .bind(normalize_gift_card_code(code))
    .fetch_optional(&mut *conn)
    .await?;

    row.map(SqliteGiftCardRepository::row_to_gift_card).transpose()
}

/// Pending → Active with a fresh balance and expiry. No-op for any other status.
pub(crate) async fn activate_gift_card_in(
    conn: &mut SqliteConnection,
    id: Uuid,
    expires_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE gift_cards
        SET status = 'Active', balance_ore = initial_amount_ore, expires_at = ?, updated_at = ?
        WHERE id = ? AND status = 'Pending'
        "#
    )
    .bind(expires_at.naive_utc())
    .bind(Utc::now().naive_utc())
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Draws `amount_ore` from an active, unexpired card. The guard in the WHERE
/// clause makes a concurrent double-spend fail instead of going negative.
pub(crate) async fn draw_balance_in(
    conn: &mut SqliteConnection,
    id: Uuid,
    amount_ore: i64,
) -> Result<()> {
    let now = Utc::now().naive_utc();
    let result = sqlx::query(
        r#"
        UPDATE gift_cards
        SET balance_ore = balance_ore - ?,
            status = CASE WHEN balance_ore - ? = 0 THEN 'Redeemed' ELSE status END,
            updated_at = ?
        WHERE id = ? AND status = 'Active' AND balance_ore >= ?
          AND (expires_at IS NULL OR expires_at > ?)
        "#
    )
    .bind(amount_ore)
    .bind(amount_ore)
    .bind(now)
    .bind(id.to_string())
    .bind(amount_ore)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Payment("Gift card balance is insufficient or the card is not valid".to_string()));
    }
    Ok(())
}

/// Returns a previously drawn amount, re-activating a fully redeemed card.
pub(crate) async fn restore_balance_in(
    conn: &mut SqliteConnection,
    code: &str,
    amount_ore: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE gift_cards
        SET balance_ore = MIN(balance_ore + ?, initial_amount_ore),
            status = CASE WHEN status = 'Redeemed' THEN 'Active' ELSE status END,
            updated_at = ?
        WHERE code = ?
        "#
    )
    .bind(amount_ore)
    .bind(Utc::now().naive_utc())
    .bind(normalize_gift_card_code(code))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn set_gift_card_status_in(
    conn: &mut SqliteConnection,
    id: Uuid,
    status: GiftCardStatus,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE gift_cards SET status = ?, updated_at = ? WHERE id = ? AND status != ?"
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
impl GiftCardRepository for SqliteGiftCardRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<GiftCard>> {
        let mut conn = self.pool.acquire().await?;
        find_gift_card_in(&mut conn, id).await
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<GiftCard>> {
        let mut conn = self.pool.acquire().await?;
        find_gift_card_by_code_in(&mut conn, code).await
    }

    async fn list(&self, status: Option<GiftCardStatus>, limit: i64, offset: i64) -> Result<Vec<GiftCard>> {
        let rows = sqlx::query_as::<_, GiftCardRow>(&format!(
            r#"
            SELECT {} FROM gift_cards
            WHERE (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
            GIFT_CARD_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_gift_card).collect()
    }

    async fn update_status(&self, id: Uuid, status: GiftCardStatus) -> Result<GiftCard> {
        let mut conn = self.pool.acquire().await?;
        set_gift_card_status_in(&mut conn, id, status).await?;
        find_gift_card_in(&mut conn, id).await?
            .ok_or_else(|| AppError::NotFound("Gift card not found".to_string()))
    }

    async fn set_pdf_path(&self, id: Uuid, pdf_path: &str) -> Result<()> {
        sqlx::query("UPDATE gift_cards SET pdf_path = ?, updated_at = ? WHERE id = ?")
            .bind(pdf_path)
            .bind(Utc::now().naive_utc())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_sent(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE gift_cards SET sent_at = ?, updated_at = ? WHERE id = ?")
            .bind(Utc::now().naive_utc())
            .bind(Utc::now().naive_utc())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn expire_overdue(&self) -> Result<u64> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE gift_cards
            SET status = 'Expired', updated_at = ?
            WHERE status = 'Active' AND expires_at IS NOT NULL AND expires_at <= ?
            "#
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
