use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// A row in `background_jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundJob {
    pub id: Uuid,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub attempts: i64,
    pub max_attempts: i64,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Deferred work. Stored as JSON; `job_type()` is also kept in its own
/// column so the admin list can filter without parsing payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum JobPayload {
    SendBookingConfirmation { booking_id: Uuid },
    SendOrderConfirmation { order_id: Uuid },
    GenerateGiftCardPdf { gift_card_id: Uuid },
    SendGiftCard { gift_card_id: Uuid },
    GenerateInvoice { invoice_id: Uuid },
    SendInvoice { invoice_id: Uuid },
    RecountParticipants { course_instance_id: Uuid },
}

impl JobPayload {
    pub fn job_type(&self) -> &'static str {
        match self {
            JobPayload::SendBookingConfirmation { .. } => "send_booking_confirmation",
            JobPayload::SendOrderConfirmation { .. } => "send_order_confirmation",
            JobPayload::GenerateGiftCardPdf { .. } => "generate_gift_card_pdf",
            JobPayload::SendGiftCard { .. } => "send_gift_card",
            JobPayload::GenerateInvoice { .. } => "generate_invoice",
            JobPayload::SendInvoice { .. } => "send_invoice",
            JobPayload::RecountParticipants { .. } => "recount_participants",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(AppError::Database(format!("Invalid job status: {}", s))),
        }
    }
}

/// Delay before retry number `attempts` (1-based): 2, 4, 8, ... minutes, capped at a day.
pub fn retry_backoff(attempts: i64) -> chrono::Duration {
    let exp = attempts.clamp(1, 11) as u32;
    chrono::Duration::minutes(2_i64.pow(exp).min(24 * 60))
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_json_shape() {
        let id = Uuid::new_v4();
        let payload = JobPayload::SendBookingConfirmation { booking_id: id };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "SendBookingConfirmation");
        assert_eq!(json["data"]["booking_id"], id.to_string());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(retry_backoff(1), chrono::Duration::minutes(2));
        assert_eq!(retry_backoff(3), chrono::Duration::minutes(8));
        assert_eq!(retry_backoff(10), chrono::Duration::minutes(1024));
        assert_eq!(retry_backoff(11), chrono::Duration::hours(24));
        assert_eq!(retry_backoff(50), chrono::Duration::hours(24));
    }
}
