use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSetting {
    pub key: String,
    pub value: String,
    pub value_type: SettingType,
    pub category: String,
    pub description: Option<String>,
    pub updated_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettingType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "boolean")]
    Boolean,
}

impl SettingType {
    pub fn parse(s: &str) -> Self {
        match s {
            "number" => SettingType::Number,
            "boolean" => SettingType::Boolean,
            _ => SettingType::String,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSettingRequest {
    pub value: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsCategory {
    pub name: String,
    pub settings: Vec<AppSetting>,
}

// Helper struct for gift card rules
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GiftCardConfig {
    pub min_amount_ore: i64,
    pub max_amount_ore: i64,
    pub validity_months: u32,
}

impl Default for GiftCardConfig {
    fn default() -> Self {
        Self {
            min_amount_ore: 20_000,
            max_amount_ore: 500_000,
            validity_months: 12,
        }
    }
}

impl GiftCardConfig {
    pub fn from_settings(settings: &[AppSetting]) -> Self {
        let mut config = Self::default();

        for setting in settings {
            match setting.key.as_str() {
                "giftcard.min_amount_ore" => {
                    config.min_amount_ore = setting.value.parse().unwrap_or(config.min_amount_ore);
                }
                "giftcard.max_amount_ore" => {
                    config.max_amount_ore = setting.value.parse().unwrap_or(config.max_amount_ore);
                }
                "giftcard.validity_months" => {
                    config.validity_months = setting.value.parse().unwrap_or(config.validity_months);
                }
                _ => {}
            }
        }

        config
    }
}

// Helper struct for booking and invoice rules
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutConfig {
    pub invoice_enabled: bool,
    pub invoice_due_days: i64,
    pub max_participants_per_booking: i32,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            invoice_enabled: true,
            invoice_due_days: 30,
            max_participants_per_booking: 6,
        }
    }
}

impl CheckoutConfig {
    pub fn from_settings(settings: &[AppSetting]) -> Self {
        let mut config = Self::default();

        for setting in settings {
            match setting.key.as_str() {
                "checkout.invoice_enabled" => {
                    config.invoice_enabled = setting.value.parse().unwrap_or(config.invoice_enabled);
                }
                "checkout.invoice_due_days" => {
                    config.invoice_due_days = setting.value.parse().unwrap_or(config.invoice_due_days);
                }
                "checkout.max_participants_per_booking" => {
                    config.max_participants_per_booking = setting
                        .value
                        .parse()
                        .unwrap_or(config.max_participants_per_booking);
                }
                _ => {}
            }
        }

        config
    }
}
