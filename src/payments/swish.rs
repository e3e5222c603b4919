use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, Client, Identity, StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::SwishConfig,
    domain::{ore_to_decimal, parse_decimal_to_ore, PaymentOutcome, PaymentStatus, CURRENCY},
    error::{AppError, Result},
    payments::{PaymentProvider, PaymentRequest},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Swish caps the payer message at 50 characters.
const MESSAGE_MAX_CHARS: usize = 50;

/// Swish Commerce API client authenticated with the merchant's client certificate.
pub struct SwishClient {
    client: Client,
    api_url: String,
    payee_alias: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentRequestBody<'a> {
    payee_payment_reference: &'a str,
    callback_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payer_alias: Option<&'a str>,
    payee_alias: &'a str,
    amount: String,
    currency: &'a str,
    message: String,
}

/// Body Swish posts to the callback URL; the retrieve endpoint returns the same shape.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwishCallback {
    pub id: String,
    pub payee_payment_reference: Option<String>,
    pub payment_reference: Option<String>,
    pub payer_alias: Option<String>,
    /// Swish sends a JSON number; older sandboxes send a string.
    pub amount: Option<serde_json::Value>,
    pub currency: Option<String>,
    pub status: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl SwishCallback {
    pub fn amount_ore(&self) -> Option<i64> {
        match self.amount.as_ref()? {
            serde_json::Value::Number(n) => parse_decimal_to_ore(&n.to_string()),
            serde_json::Value::String(s) => parse_decimal_to_ore(s),
            _ => None,
        }
    }

    pub fn to_outcome(&self) -> Result<PaymentOutcome> {
        let status = map_status(&self.status)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown Swish status: {}", self.status)))?;

        let error_message = match (&self.error_code, &self.error_message) {
            (Some(code), Some(msg)) => Some(format!("{}: {}", code, msg)),
            (Some(code), None) => Some(code.clone()),
            (None, Some(msg)) => Some(msg.clone()),
            (None, None) => None,
        };

        Ok(PaymentOutcome {
            status,
            amount_ore: self.amount_ore(),
            currency: self.currency.clone(),
            payer_alias: self.payer_alias.clone(),
            error_message,
        })
    }
}

/// `CANCELLED` is the payer backing out in the app, which we treat as a decline.
pub fn map_status(status: &str) -> Option<PaymentStatus> {
    match status {
        "CREATED" => Some(PaymentStatus::Created),
        "PAID" => Some(PaymentStatus::Paid),
        "DECLINED" | "CANCELLED" => Some(PaymentStatus::Declined),
        "ERROR" => Some(PaymentStatus::Error),
        _ => None,
    }
}

/// Swish instruction ids are 32 uppercase hex characters.
pub fn new_instruction_id() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}

/// Strips characters Swish rejects and truncates to the allowed length.
pub fn sanitize_message(message: &str) -> String {
    message
        .chars()
        .filter(|c| c.is_alphanumeric() || " :;.,?!()-\"'+/".contains(*c))
        .take(MESSAGE_MAX_CHARS)
        .collect()
}

impl SwishClient {
    pub fn new(config: &SwishConfig) -> Result<Self> {
        let cert_path = config.cert_path.as_deref().ok_or_else(|| {
            AppError::Internal("swish.cert_path is required when Swish is enabled".to_string())
        })?;
        let key_path = config.key_path.as_deref().ok_or_else(|| {
            AppError::Internal("swish.key_path is required when Swish is enabled".to_string())
        })?;

        let mut pem = read_file(cert_path)?;
        pem.push(b'\n');
        pem.extend(read_file(key_path)?);
        let identity = Identity::from_pem(&pem)
            .map_err(|e| AppError::Internal(format!("Invalid Swish client certificate: {}", e)))?;

        let mut builder = Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .timeout(REQUEST_TIMEOUT);

        if let Some(ca_path) = config.ca_path.as_deref() {
            let ca = Certificate::from_pem(&read_file(ca_path)?)
                .map_err(|e| AppError::Internal(format!("Invalid Swish CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(ca);
        }

        let client = builder
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build Swish HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            payee_alias: config.payee_alias.clone(),
        })
    }
}

fn read_file(path: &str) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| AppError::Internal(format!("Cannot read {}: {}", path, e)))
}

#[async_trait]
impl PaymentProvider for SwishClient {
    async fn create_payment_request(&self, request: &PaymentRequest) -> Result<String> {
        let instruction_id = new_instruction_id();
        let url = format!("{}/api/v2/paymentrequests/{}", self.api_url, instruction_id);

        let body = CreatePaymentRequestBody {
            payee_payment_reference: &request.reference,
            callback_url: &request.callback_url,
            payer_alias: request.payer_alias.as_deref(),
            payee_alias: &self.payee_alias,
            amount: ore_to_decimal(request.amount_ore),
            currency: CURRENCY,
            message: sanitize_message(&request.message),
        };

        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::External(format!("Swish request failed: {}", e)))?;

        let status = response.status();
        if status != StatusCode::CREATED && !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(
                reference = %request.reference,
                status = status.as_u16(),
                "Swish rejected payment request: {}",
                detail
            );
            return Err(AppError::External(format!(
                "Swish returned HTTP {}: {}",
                status.as_u16(),
                detail
            )));
        }

        tracing::info!(
            reference = %request.reference,
            provider_id = %instruction_id,
            "Swish payment request created"
        );
        Ok(instruction_id)
    }

    async fn retrieve(&self, provider_id: &str) -> Result<PaymentOutcome> {
        let url = format!("{}/api/v1/paymentrequests/{}", self.api_url, provider_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::External(format!("Swish request failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("Swish payment request {}", provider_id)));
        }
        if !response.status().is_success() {
            return Err(AppError::External(format!(
                "Swish returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let body: SwishCallback = response
            .json()
            .await
            .map_err(|e| AppError::External(format!("Invalid Swish response: {}", e)))?;

        body.to_outcome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callback(status: &str, amount: serde_json::Value) -> SwishCallback {
        SwishCallback {
            id: new_instruction_id(),
            payee_payment_reference: Some("BABCD2345".to_string()),
            payment_reference: Some("1E2FC19E5E5E4E18916609B7F8911C12".to_string()),
            payer_alias: Some("46701234567".to_string()),
            amount: Some(amount),
            currency: Some("SEK".to_string()),
            status: status.to_string(),
            error_code: None,
            error_message: None,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_status("PAID"), Some(PaymentStatus::Paid));
        assert_eq!(map_status("CANCELLED"), Some(PaymentStatus::Declined));
        assert_eq!(map_status("DECLINED"), Some(PaymentStatus::Declined));
        assert_eq!(map_status("ERROR"), Some(PaymentStatus::Error));
        assert_eq!(map_status("CREATED"), Some(PaymentStatus::Created));
        assert_eq!(map_status("WHATEVER"), None);
    }

    #[test]
    fn test_callback_amount_number_or_string() {
        assert_eq!(callback("PAID", serde_json::json!(450)).amount_ore(), Some(45000));
        assert_eq!(callback("PAID", serde_json::json!(99.5)).amount_ore(), Some(9950));
        assert_eq!(callback("PAID", serde_json::json!("1250.00")).amount_ore(), Some(125000));
    }

    #[test]
    fn test_callback_parses_swish_json() {
        let json = r#"{
            "id": "AB23D7406ECE4542A80152D909EF9F6B",
            "payeePaymentReference": "B7KQ2MZ4R",
            "paymentReference": "6D6CD7406ECE4542A80152D909EF9F6B",
            "callbackUrl": "https://example.com/api/payments/swish/callback",
            "payerAlias": "4671234768",
            "payeeAlias": "1231181189",
            "amount": 100.00,
            "currency": "SEK",
            "message": "Kurs",
            "status": "DECLINED",
            "dateCreated": "2026-01-02T14:29:51.092Z",
            "datePaid": null,
            "errorCode": "RF07",
            "errorMessage": "Transaction declined"
        }"#;
        let callback: SwishCallback = serde_json::from_str(json).unwrap();
        let outcome = callback.to_outcome().unwrap();
        assert_eq!(outcome.status, PaymentStatus::Declined);
        assert_eq!(outcome.amount_ore, Some(10000));
        assert_eq!(outcome.currency.as_deref(), Some("SEK"));
        assert_eq!(outcome.error_message.as_deref(), Some("RF07: Transaction declined"));
    }

    #[test]
    fn test_instruction_id_and_message() {
        let id = new_instruction_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));

        let msg = sanitize_message("Drejkurs <nybörjare> & mer text som är alldeles för lång för Swish");
        assert!(msg.chars().count() <= MESSAGE_MAX_CHARS);
        assert!(!msg.contains('<'));
        assert!(!msg.contains('&'));
    }
}
