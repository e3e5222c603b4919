use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    /// Payee payment reference shown to the customer and sent to Swish.
    pub reference: String,
    pub kind: PaymentKind,
    pub subject_id: Uuid,
    pub method: PaymentMethod,
    pub amount_ore: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider_id: Option<String>,
    pub payer_alias: Option<String>,
    pub idempotency_key: Option<String>,
    pub error_message: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Created,
    Paid,
    Declined,
    Error,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "CREATED",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Declined => "DECLINED",
            PaymentStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "CREATED" => Ok(PaymentStatus::Created),
            "PAID" => Ok(PaymentStatus::Paid),
            "DECLINED" => Ok(PaymentStatus::Declined),
            "ERROR" => Ok(PaymentStatus::Error),
            _ => Err(AppError::Database(format!("Invalid payment status: {}", s))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Created)
    }

    /// Only `CREATED` may move, and only to a terminal status.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        *self == PaymentStatus::Created && next.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentKind {
    Booking,
    GiftCard,
    ShopOrder,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Booking => "Booking",
            PaymentKind::GiftCard => "GiftCard",
            PaymentKind::ShopOrder => "ShopOrder",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Booking" => Ok(PaymentKind::Booking),
            "GiftCard" => Ok(PaymentKind::GiftCard),
            "ShopOrder" => Ok(PaymentKind::ShopOrder),
            _ => Err(AppError::Database(format!("Invalid payment kind: {}", s))),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentKind::Booking => "Kursbokning",
            PaymentKind::GiftCard => "Presentkort",
            PaymentKind::ShopOrder => "Butiksorder",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Swish,
    Invoice,
    GiftCard,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Swish => "Swish",
            PaymentMethod::Invoice => "Invoice",
            PaymentMethod::GiftCard => "GiftCard",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Swish" => Ok(PaymentMethod::Swish),
            "Invoice" => Ok(PaymentMethod::Invoice),
            "GiftCard" => Ok(PaymentMethod::GiftCard),
            _ => Err(AppError::Database(format!("Invalid payment method: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub invoice_number: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub due_date: chrono::NaiveDate,
    pub pdf_path: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Payment outcome as reported by the provider, before it is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub status: PaymentStatus,
    pub amount_ore: Option<i64>,
    pub currency: Option<String>,
    pub payer_alias: Option<String>,
    pub error_message: Option<String>,
}

impl PaymentOutcome {
    /// A `PAID` outcome must report exactly `expected_ore` in SEK. Returns
    /// the reason when it does not; other statuses always pass.
    pub fn paid_mismatch(&self, expected_ore: i64) -> Option<String> {
        if self.status != PaymentStatus::Paid {
            return None;
        }
        match self.currency.as_deref() {
            Some(currency) if currency.eq_ignore_ascii_case(super::CURRENCY) => {}
            Some(other) => return Some(format!("Currency mismatch: expected SEK, provider reported {}", other)),
            None => return Some("Currency mismatch: provider reported no currency".to_string()),
        }
        match self.amount_ore {
            Some(amount) if amount == expected_ore => None,
            Some(amount) => Some(format!(
                "Amount mismatch: expected {} öre, provider reported {} öre",
                expected_ore, amount
            )),
            None => Some("Amount mismatch: provider reported no amount".to_string()),
        }
    }
}

/// Unambiguous uppercase alphabet for references and codes (no 0/O, 1/I/L).
pub const REFERENCE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

pub fn generate_reference(prefix: &str) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let body: String = (0..8)
        .map(|_| REFERENCE_ALPHABET[rng.gen_range(0..REFERENCE_ALPHABET.len())] as char)
        .collect();
    format!("{}{}", prefix, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_created_transitions() {
        assert!(PaymentStatus::Created.can_transition_to(PaymentStatus::Paid));
        assert!(PaymentStatus::Created.can_transition_to(PaymentStatus::Declined));
        assert!(PaymentStatus::Created.can_transition_to(PaymentStatus::Error));
        assert!(!PaymentStatus::Created.can_transition_to(PaymentStatus::Created));
        assert!(!PaymentStatus::Paid.can_transition_to(PaymentStatus::Declined));
        assert!(!PaymentStatus::Error.can_transition_to(PaymentStatus::Paid));
    }

    #[test]
    fn test_status_round_trips_through_db_string() {
        for status in [
            PaymentStatus::Created,
            PaymentStatus::Paid,
            PaymentStatus::Declined,
            PaymentStatus::Error,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(PaymentStatus::parse("CANCELLED").is_err());
    }

    fn paid(amount_ore: Option<i64>, currency: Option<&str>) -> PaymentOutcome {
        PaymentOutcome {
            status: PaymentStatus::Paid,
            amount_ore,
            currency: currency.map(str::to_string),
            payer_alias: None,
            error_message: None,
        }
    }

    #[test]
    fn test_paid_outcome_must_match_amount_and_currency() {
        assert_eq!(paid(Some(50_000), Some("SEK")).paid_mismatch(50_000), None);
        assert!(paid(Some(100), Some("SEK")).paid_mismatch(50_000).unwrap().contains("Amount mismatch"));
        assert!(paid(None, Some("SEK")).paid_mismatch(50_000).unwrap().contains("no amount"));
        assert!(paid(Some(50_000), Some("EUR")).paid_mismatch(50_000).unwrap().contains("Currency"));
        assert!(paid(Some(50_000), None).paid_mismatch(50_000).is_some());

        let declined = PaymentOutcome { status: PaymentStatus::Declined, ..paid(None, None) };
        assert_eq!(declined.paid_mismatch(50_000), None);
    }

    #[test]
    fn test_reference_shape() {
        let reference = generate_reference("B");
        assert_eq!(reference.len(), 9);
        assert!(reference.starts_with('B'));
        assert!(reference.bytes().skip(1).all(|b| REFERENCE_ALPHABET.contains(&b)));
    }
}
