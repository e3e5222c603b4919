use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::REFERENCE_ALPHABET;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftCard {
    pub id: Uuid,
    pub code: String,
    pub initial_amount_ore: i64,
    pub balance_ore: i64,
    pub status: GiftCardStatus,
    pub buyer_name: String,
    pub buyer_email: String,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    pub message: Option<String>,
    pub pdf_path: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GiftCard {
    /// Active, not past expiry, and holding at least `amount_ore`.
    pub fn can_cover(&self, amount_ore: i64, now: DateTime<Utc>) -> bool {
        self.status == GiftCardStatus::Active
            && self.expires_at.map(|e| e > now).unwrap_or(true)
            && self.balance_ore >= amount_ore
    }

    /// Where the card should be delivered: recipient if given, else buyer.
    pub fn delivery_email(&self) -> &str {
        self.recipient_email.as_deref().unwrap_or(&self.buyer_email)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GiftCardStatus {
    Pending,
    Active,
    Redeemed,
    Expired,
    Cancelled,
}

impl GiftCardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GiftCardStatus::Pending => "Pending",
            GiftCardStatus::Active => "Active",
            GiftCardStatus::Redeemed => "Redeemed",
            GiftCardStatus::Expired => "Expired",
            GiftCardStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(GiftCardStatus::Pending),
            "Active" => Ok(GiftCardStatus::Active),
            "Redeemed" => Ok(GiftCardStatus::Redeemed),
            "Expired" => Ok(GiftCardStatus::Expired),
            "Cancelled" => Ok(GiftCardStatus::Cancelled),
            _ => Err(AppError::Database(format!("Invalid gift card status: {}", s))),
        }
    }
}

/// `XXXX-XXXX-XXXX` from the unambiguous reference alphabet.
pub fn generate_gift_card_code() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..3)
        .map(|_| {
            (0..4)
                .map(|_| REFERENCE_ALPHABET[rng.gen_range(0..REFERENCE_ALPHABET.len())] as char)
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Uppercases and re-inserts dashes so `abcd efgh-ijkl` matches `ABCD-EFGH-IJKL`.
pub fn normalize_gift_card_code(input: &str) -> String {
    let compact: String = input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    compact
        .as_bytes()
        .chunks(4)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}
