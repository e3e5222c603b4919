use async_trait::async_trait;

use crate::{domain::PaymentOutcome, error::Result};

pub mod swish;

#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

pub use swish::{SwishCallback, SwishClient};

#[cfg(any(test, feature = "test-utils"))]
pub use fake::FakeSwish;

/// What the studio asks the payer's app to approve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub reference: String,
    pub amount_ore: i64,
    /// Payer phone number in Swish alias form (`46701234567`).
    pub payer_alias: Option<String>,
    pub message: String,
    pub callback_url: String,
}

/// Mobile payment provider. Only request creation and lookup are needed;
/// outcomes normally arrive by callback.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Registers the request and returns the provider's id for it.
    async fn create_payment_request(&self, request: &PaymentRequest) -> Result<String>;

    async fn retrieve(&self, provider_id: &str) -> Result<PaymentOutcome>;
}
