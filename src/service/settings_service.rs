use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{
        AppSetting, CheckoutConfig, GiftCardConfig, SettingType, SettingsCategory,
        UpdateSettingRequest,
    },
    error::{AppError, Result},
};

#[derive(FromRow)]
struct SettingRow {
    key: String,
    value: String,
    value_type: String,
    category: String,
    description: Option<String>,
    updated_by: Option<String>,
    updated_at: NaiveDateTime,
}

/// Studio-tunable settings kept in `app_settings`, with an audit trail.
pub struct SettingsService {
    pool: SqlitePool,
}

impl SettingsService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_setting(&self, key: &str) -> Result<AppSetting> {
        let row = sqlx::query_as::<_, SettingRow>(
            r#"
            SELECT key, value, value_type, category, description, updated_by, updated_at
            FROM app_settings
            WHERE key = ?
            "#
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Setting not found: {}", key)))?;

        Ok(row_to_setting(row))
    }

    pub async fn get_settings_by_category(&self, category: &str) -> Result<Vec<AppSetting>> {
        let rows = sqlx::query_as::<_, SettingRow>(
            r#"
            SELECT key, value, value_type, category, description, updated_by, updated_at
            FROM app_settings
            WHERE category = ?
            ORDER BY key
            "#
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_setting).collect())
    }

    pub async fn get_all_settings(&self) -> Result<Vec<SettingsCategory>> {
        let rows = sqlx::query_as::<_, SettingRow>(
            r#"
            SELECT key, value, value_type, category, description, updated_by, updated_at
            FROM app_settings
            ORDER BY category, key
            "#
        )
        .fetch_all(&self.pool)
        .await?;

        let mut categories: Vec<SettingsCategory> = Vec::new();
        for setting in rows.into_iter().map(row_to_setting) {
            match categories.last_mut() {
                Some(cat) if cat.name == setting.category => cat.settings.push(setting),
                _ => categories.push(SettingsCategory {
                    name: setting.category.clone(),
                    settings: vec![setting],
                }),
            }
        }

        Ok(categories)
    }

    pub async fn update_setting(
        &self,
        key: &str,
        request: UpdateSettingRequest,
        updated_by: Uuid,
    ) -> Result<AppSetting> {
        let current = self.get_setting(key).await?;
        let value = request.value.trim().to_string();
        validate_value(&current.value_type, &value)
            .map_err(|msg| AppError::Validation(format!("{}: {}", key, msg)))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE app_settings SET value = ?, updated_by = ?, updated_at = ? WHERE key = ?")
            .bind(&value)
            .bind(updated_by.to_string())
            .bind(Utc::now().naive_utc())
            .bind(key)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO settings_audit (id, setting_key, old_value, new_value, changed_by, reason)
            VALUES (?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(Uuid::new_v4().to_string())
        .bind(key)
        .bind(&current.value)
        .bind(&value)
        .bind(updated_by.to_string())
        .bind(&request.reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(key, old = %current.value, new = %value, "Setting updated");
        self.get_setting(key).await
    }

    pub async fn gift_card_config(&self) -> Result<GiftCardConfig> {
        let settings = self.get_settings_by_category("giftcard").await?;
        Ok(GiftCardConfig::from_settings(&settings))
    }

    pub async fn checkout_config(&self) -> Result<CheckoutConfig> {
        let settings = self.get_settings_by_category("checkout").await?;
        Ok(CheckoutConfig::from_settings(&settings))
    }
}

fn row_to_setting(row: SettingRow) -> AppSetting {
    AppSetting {
        key: row.key,
        value: row.value,
        value_type: SettingType::parse(&row.value_type),
        category: row.category,
        description: row.description,
        updated_by: row.updated_by.and_then(|s| Uuid::parse_str(&s).ok()),
        updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
    }
}

fn validate_value(value_type: &SettingType, value: &str) -> std::result::Result<(), &'static str> {
    match value_type {
        SettingType::Number => value
            .parse::<i64>()
            .ok()
            .filter(|n| *n >= 0)
            .map(|_| ())
            .ok_or("must be a non-negative whole number"),
        SettingType::Boolean => value
            .parse::<bool>()
            .map(|_| ())
            .map_err(|_| "must be true or false"),
        SettingType::String => Ok(()),
    }
}
