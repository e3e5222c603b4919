pub mod bookings;
pub mod courses;
pub mod dashboard;
pub mod gift_cards;
pub mod jobs;
pub mod orders;
pub mod payments;
pub mod products;
pub mod settings;

use serde::Deserialize;

use crate::{
    domain::{format_local, format_sek, Payment},
    error::AppError,
};

pub const PAGE_SIZE: i64 = 50;

#[derive(Debug, Default, Deserialize)]
pub struct StatusFilter {
    pub status: Option<String>,
}

impl StatusFilter {
    pub fn value(&self) -> String {
        self.status.clone().unwrap_or_default()
    }

    /// Parses the filter with `parse`; blank means no filter.
    pub fn parse<T>(&self, parse: impl Fn(&str) -> crate::error::Result<T>) -> Option<T> {
        self.status
            .as_deref()
            .filter(|s| !s.is_empty())
            .and_then(|s| parse(s).ok())
    }
}

/// One row in the admin payment tables.
pub struct PaymentRow {
    pub id: String,
    pub reference: String,
    pub kind: String,
    pub method: String,
    pub amount: String,
    pub status: String,
    pub created: String,
    pub can_mark_paid: bool,
}

impl From<&Payment> for PaymentRow {
    fn from(p: &Payment) -> Self {
        Self {
            id: p.id.to_string(),
            reference: p.reference.clone(),
            kind: p.kind.label().to_string(),
            method: p.method.as_str().to_string(),
            amount: format_sek(p.amount_ore),
            status: p.status.as_str().to_string(),
            created: format_local(p.created_at),
            can_mark_paid: p.method == crate::domain::PaymentMethod::Invoice
                && p.status == crate::domain::PaymentStatus::Created,
        }
    }
}

/// Message for the error banner after a failed admin action.
pub fn action_error(action: &str, error: AppError) -> String {
    tracing::warn!("Admin action '{}' failed: {}", action, error);
    match error {
        AppError::Database(_) | AppError::Internal(_) => format!("{} failed, see server log", action),
        other => other.to_string(),
    }
}
