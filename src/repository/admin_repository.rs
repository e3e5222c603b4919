use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::AdminUser,
    error::{AppError, Result},
    repository::{parse_uuid, to_utc, AdminRepository},
};

#[derive(FromRow)]
struct AdminRow {
    id: String,
    email: String,
    full_name: String,
    last_login_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
}

pub struct SqliteAdminRepository {
    pool: SqlitePool,
}

impl SqliteAdminRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_admin(row: AdminRow) -> Result<AdminUser> {
        Ok(AdminUser {
            id: parse_uuid(&row.id)?,
            email: row.email,
            full_name: row.full_name,
            last_login_at: row.last_login_at.map(to_utc),
            created_at: to_utc(row.created_at),
        })
    }
}

#[async_trait]
impl AdminRepository for SqliteAdminRepository {
    async fn create(&self, email: &str, full_name: &str, password_hash: &str) -> Result<AdminUser> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO admin_users (id, email, full_name, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(email.trim().to_lowercase())
        .bind(full_name)
        .bind(password_hash)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.message().contains("UNIQUE") => {
                AppError::Conflict("An admin with that email already exists".to_string())
            }
            other => AppError::Database(other.to_string()),
        })?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created admin".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AdminUser>> {
        let row = sqlx::query_as::<_, AdminRow>(
            "SELECT id, email, full_name, last_login_at, created_at FROM admin_users WHERE id = ?"
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_admin).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AdminUser>> {
        let row = sqlx::query_as::<_, AdminRow>(
            "SELECT id, email, full_name, last_login_at, created_at FROM admin_users WHERE email = ?"
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_admin).transpose()
    }

    async fn get_password_hash(&self, email: &str) -> Result<Option<String>> {
        let hash = sqlx::query_scalar::<_, String>(
            "SELECT password_hash FROM admin_users WHERE email = ?"
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(hash)
    }

    async fn record_login(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE admin_users SET last_login_at = ? WHERE id = ?")
            .bind(Utc::now().naive_utc())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM admin_users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
