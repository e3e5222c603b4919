use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{Invoice, Payment, PaymentKind, PaymentMethod, PaymentStatus},
    error::{AppError, Result},
    repository::{parse_uuid, to_utc, PaymentRepository},
};

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    reference: String,
    kind: String,
    subject_id: String,
    method: String,
    amount_ore: i64,
    currency: String,
    status: String,
    provider_id: Option<String>,
    payer_alias: Option<String>,
    idempotency_key: Option<String>,
    error_message: Option<String>,
    paid_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(FromRow)]
struct InvoiceRow {
    id: String,
    payment_id: String,
    invoice_number: i64,
    customer_name: String,
    customer_email: String,
    due_date: NaiveDate,
    pdf_path: Option<String>,
    sent_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
}

const PAYMENT_COLUMNS: &str = r#"
    id, reference, kind, subject_id, method, amount_ore, currency, status,
    provider_id, payer_alias, idempotency_key, error_message, paid_at,
    created_at, updated_at
"#;

const INVOICE_COLUMNS: &str = r#"
    id, payment_id, invoice_number, customer_name, customer_email, due_date,
    pdf_path, sent_at, created_at
"#;

/// First number handed out when the invoices table is empty.
const FIRST_INVOICE_NUMBER: i64 = 1001;

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        Ok(Payment {
            id: parse_uuid(&row.id)?,
            reference: row.reference,
            kind: PaymentKind::parse(&row.kind)?,
            subject_id: parse_uuid(&row.subject_id)?,
            method: PaymentMethod::parse(&row.method)?,
            amount_ore: row.amount_ore,
            currency: row.currency,
            status: PaymentStatus::parse(&row.status)?,
            provider_id: row.provider_id,
            payer_alias: row.payer_alias,
            idempotency_key: row.idempotency_key,
            error_message: row.error_message,
            paid_at: row.paid_at.map(to_utc),
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }

    fn row_to_invoice(row: InvoiceRow) -> Result<Invoice> {
        Ok(Invoice {
            id: parse_uuid(&row.id)?,
            payment_id: parse_uuid(&row.payment_id)?,
            invoice_number: row.invoice_number,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            due_date: row.due_date,
            pdf_path: row.pdf_path,
            sent_at: row.sent_at.map(to_utc),
            created_at: to_utc(row.created_at),
        })
    }

    async fn find_one(&self, column: &str, value: String) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE {} = ?",
            PAYMENT_COLUMNS, column
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }
}

pub(crate) async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, reference, kind, subject_id, method, amount_ore, currency, status,
            provider_id, payer_alias, idempotency_key, error_message, paid_at,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#
    )
    .bind(payment.id.to_string())
    .bind(&payment.reference)
    .bind(payment.kind.as_str())
    .bind(payment.subject_id.to_string())
    .bind(payment.method.as_str())
    .bind(payment.amount_ore)
    .bind(&payment.currency)
    .bind(payment.status.as_str())
    .bind(&payment.provider_id)
    .bind(&payment.payer_alias)
    .bind(&payment.idempotency_key)
    .bind(&payment.error_message)
    .bind(payment.paid_at.map(|dt| dt.naive_utc()))
    .bind(payment.created_at.naive_utc())
    .bind(payment.updated_at.naive_utc())
    .execute(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.message().contains("idempotency_key") => {
            AppError::Conflict("Checkout already submitted".to_string())
        }
        other => AppError::Database(other.to_string()),
    })?;

    Ok(())
}

pub(crate) async fn find_payment_in(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Payment>> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {} FROM payments WHERE id = ?",
        PAYMENT_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(SqlitePaymentRepository::row_to_payment).transpose()
}

pub(crate) async fn find_payments_for_subject_in(
    conn: &mut SqliteConnection,
    kind: PaymentKind,
    subject_id: Uuid,
) -> Result<Vec<Payment>> {
    let rows = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {} FROM payments WHERE kind = ? AND subject_id = ? ORDER BY created_at DESC",
        PAYMENT_COLUMNS
    ))
    .bind(kind.as_str())
    .bind(subject_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(SqlitePaymentRepository::row_to_payment).collect()
}

/// Compare-and-set on status: only a `CREATED` row moves. Returns `false`
/// when another writer (an earlier callback, the cron sweep) got there first.
pub(crate) async fn transition_payment_in(
    conn: &mut SqliteConnection,
    id: Uuid,
    status: PaymentStatus,
    payer_alias: Option<&str>,
    error_message: Option<&str>,
) -> Result<bool> {
    let now = Utc::now().naive_utc();
    let paid_at = (status == PaymentStatus::Paid).then_some(now);

    let result = sqlx::query(
        r#"
        UPDATE payments
        SET status = ?,
            payer_alias = COALESCE(?, payer_alias),
            error_message = ?,
            paid_at = COALESCE(?, paid_at),
            updated_at = ?
        WHERE id = ? AND status = 'CREATED'
        "#
    )
    .bind(status.as_str())
    .bind(payer_alias)
    .bind(error_message)
    .bind(paid_at)
    .bind(now)
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn next_invoice_number_in(conn: &mut SqliteConnection) -> Result<i64> {
    let max = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(invoice_number) FROM invoices")
        .fetch_one(&mut *conn)
        .await?;

    Ok(max.map(|n| n + 1).unwrap_or(FIRST_INVOICE_NUMBER))
}

pub(crate) async fn insert_invoice(conn: &mut SqliteConnection, invoice: &Invoice) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO invoices (
            id, payment_id, invoice_number, customer_name, customer_email, due_date,
            pdf_path, sent_at, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#
    )
    .bind(invoice.id.to_string())
    .bind(invoice.payment_id.to_string())
    .bind(invoice.invoice_number)
    .bind(&invoice.customer_name)
    .bind(&invoice.customer_email)
    .bind(invoice.due_date)
    .bind(&invoice.pdf_path)
    .bind(invoice.sent_at.map(|dt| dt.naive_utc()))
    .bind(invoice.created_at.naive_utc())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        self.find_one("id", id.to_string()).await
    }

    async fn find_by_provider_id(&self, provider_id: &str) -> Result<Option<Payment>> {
        self.find_one("provider_id", provider_id.to_string()).await
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        self.find_one("reference", reference.to_string()).await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>> {
        self.find_one("idempotency_key", key.to_string()).await
    }

    async fn find_by_subject(&self, kind: PaymentKind, subject_id: Uuid) -> Result<Vec<Payment>> {
        let mut conn = self.pool.acquire().await?;
        find_payments_for_subject_in(&mut conn, kind, subject_id).await
    }

    async fn list(&self, status: Option<PaymentStatus>, limit: i64, offset: i64) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            r#"
            SELECT {} FROM payments
            WHERE (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn list_stale_created(&self, method: PaymentMethod, cutoff: DateTime<Utc>) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            r#"
            SELECT {} FROM payments
            WHERE status = 'CREATED' AND method = ? AND created_at < ?
            ORDER BY created_at
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(method.as_str())
        .bind(cutoff.naive_utc())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn set_provider_id(&self, id: Uuid, provider_id: &str) -> Result<()> {
        sqlx::query("UPDATE payments SET provider_id = ?, updated_at = ? WHERE id = ?")
            .bind(provider_id)
            .bind(Utc::now().naive_utc())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn sum_paid_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let sum = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(amount_ore), 0) FROM payments
            WHERE status = 'PAID' AND method != 'GiftCard' AND paid_at >= ?
            "#
        )
        .bind(since.naive_utc())
        .fetch_one(&self.pool)
        .await?;
        Ok(sum)
    }

    async fn find_invoice(&self, id: Uuid) -> Result<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE id = ?",
            INVOICE_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_invoice).transpose()
    }

    async fn find_invoice_by_payment(&self, payment_id: Uuid) -> Result<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE payment_id = ?",
            INVOICE_COLUMNS
        ))
        .bind(payment_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_invoice).transpose()
    }

    async fn set_invoice_pdf(&self, id: Uuid, pdf_path: &str) -> Result<()> {
        sqlx::query("UPDATE invoices SET pdf_path = ? WHERE id = ?")
            .bind(pdf_path)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_invoice_sent(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE invoices SET sent_at = ? WHERE id = ?")
            .bind(Utc::now().naive_utc())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
