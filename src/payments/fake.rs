use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    domain::{PaymentOutcome, PaymentStatus, CURRENCY},
    error::{AppError, Result},
    payments::{swish::new_instruction_id, PaymentProvider, PaymentRequest},
};

/// In-memory provider for tests. Every request is recorded; `retrieve`
/// answers `CREATED` until an outcome is set.
#[derive(Default)]
pub struct FakeSwish {
    requests: Mutex<Vec<(String, PaymentRequest)>>,
    outcomes: Mutex<HashMap<String, PaymentOutcome>>,
    fail_create: Mutex<bool>,
}

impl FakeSwish {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<(String, PaymentRequest)> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn last_provider_id(&self) -> Option<String> {
        self.requests().last().map(|(id, _)| id.clone())
    }

    pub fn set_outcome(&self, provider_id: &str, outcome: PaymentOutcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.insert(provider_id.to_string(), outcome);
        }
    }

    pub fn fail_next_create(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_create.lock() {
            *flag = fail;
        }
    }
}

#[async_trait]
impl PaymentProvider for FakeSwish {
    async fn create_payment_request(&self, request: &PaymentRequest) -> Result<String> {
        let fail = self
            .fail_create
            .lock()
            .map(|mut flag| std::mem::take(&mut *flag))
            .unwrap_or(false);
        if fail {
            return Err(AppError::External("Swish returned HTTP 422: ACMT03".to_string()));
        }

        let id = new_instruction_id();
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((id.clone(), request.clone()));
        }
        Ok(id)
    }

    async fn retrieve(&self, provider_id: &str) -> Result<PaymentOutcome> {
        let known = self
            .requests()
            .into_iter()
            .find(|(id, _)| id == provider_id)
            .map(|(_, request)| request);

        let Some(request) = known else {
            return Err(AppError::NotFound(format!("Swish payment request {}", provider_id)));
        };

        let outcome = self
            .outcomes
            .lock()
            .ok()
            .and_then(|outcomes| outcomes.get(provider_id).cloned());

        Ok(outcome.unwrap_or(PaymentOutcome {
            status: PaymentStatus::Created,
            amount_ore: Some(request.amount_ore),
            currency: Some(CURRENCY.to_string()),
            payer_alias: request.payer_alias,
            error_message: None,
        }))
    }
}
