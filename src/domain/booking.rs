use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::PaymentMethod;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub course_instance_id: Uuid,
    pub reference: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub participants: i32,
    pub status: BookingStatus,
    pub payment_method: PaymentMethod,
    pub gift_card_code: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(BookingStatus::Pending),
            "Confirmed" => Ok(BookingStatus::Confirmed),
            "Cancelled" => Ok(BookingStatus::Cancelled),
            _ => Err(AppError::Database(format!("Invalid booking status: {}", s))),
        }
    }
}

/// Contact details collected on every checkout form.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CustomerDetails {
    #[validate(length(min = 2, max = 200, message = "must be 2-200 characters"))]
    pub name: String,
    #[validate(email(message = "is not a valid email address"))]
    pub email: String,
    /// Swish payer alias, digits only after normalisation.
    #[validate(length(max = 20))]
    pub phone: Option<String>,
}

impl CustomerDetails {
    /// Swedish mobile number in Swish alias form (`46701234567`).
    pub fn swish_alias(&self) -> Option<String> {
        self.phone.as_deref().and_then(normalize_swish_alias)
    }
}

pub fn normalize_swish_alias(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let alias = if let Some(rest) = digits.strip_prefix("0046") {
        format!("46{}", rest)
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("46{}", rest)
    } else {
        digits
    };
    if (8..=15).contains(&alias.len()) {
        Some(alias)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_swish_alias() {
        assert_eq!(normalize_swish_alias("070-123 45 67").as_deref(), Some("46701234567"));
        assert_eq!(normalize_swish_alias("+46 70 123 45 67").as_deref(), Some("46701234567"));
        assert_eq!(normalize_swish_alias("0046701234567").as_deref(), Some("46701234567"));
        assert_eq!(normalize_swish_alias("123"), None);
    }

    #[test]
    fn test_customer_validation() {
        let ok = CustomerDetails {
            name: "Astrid Lind".to_string(),
            email: "astrid@example.se".to_string(),
            phone: Some("0701234567".to_string()),
        };
        assert!(ok.validate().is_ok());

        let bad = CustomerDetails {
            name: "A".to_string(),
            email: "not-an-email".to_string(),
            phone: None,
        };
        let err = bad.validate().unwrap_err();
        assert!(err.field_errors().contains_key("name"));
        assert!(err.field_errors().contains_key("email"));
    }
}
