use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{CustomerDetails, Payment, PaymentMethod};

/// One purchase from the public site. Serialized with a `type` tag so the
/// JSON API accepts `{"type": "book_course", ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckoutRequest {
    BookCourse {
        course_instance_id: Uuid,
        participants: i32,
        customer: CustomerDetails,
        method: PaymentMethod,
        gift_card_code: Option<String>,
        message: Option<String>,
    },
    BuyGiftCard {
        amount_ore: i64,
        buyer: CustomerDetails,
        recipient_name: Option<String>,
        recipient_email: Option<String>,
        message: Option<String>,
        method: PaymentMethod,
    },
    BuyProduct {
        product_id: Uuid,
        quantity: i32,
        customer: CustomerDetails,
        shipping_address: String,
        method: PaymentMethod,
    },
}

impl CheckoutRequest {
    pub fn method(&self) -> PaymentMethod {
        match self {
            CheckoutRequest::BookCourse { method, .. }
            | CheckoutRequest::BuyGiftCard { method, .. }
            | CheckoutRequest::BuyProduct { method, .. } => *method,
        }
    }

    pub fn customer(&self) -> &CustomerDetails {
        match self {
            CheckoutRequest::BookCourse { customer, .. }
            | CheckoutRequest::BuyProduct { customer, .. } => customer,
            CheckoutRequest::BuyGiftCard { buyer, .. } => buyer,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub payment: Payment,
    /// True when the idempotency key matched an earlier checkout.
    pub replayed: bool,
}

/// Treats blank form fields as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
