use std::sync::Arc;

use chrono::{Duration, Months, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{
        BookingStatus, GiftCardStatus, JobPayload, OrderStatus, Payment, PaymentKind,
        PaymentMethod, PaymentOutcome, PaymentStatus,
    },
    error::{AppError, Result},
    payments::{PaymentProvider, SwishCallback},
    repository::{
        booking_repository::{find_booking_in, set_booking_status_in},
        course_repository::recount_participants_in,
        gift_card_repository::{
            activate_gift_card_in, restore_balance_in, set_gift_card_status_in,
        },
        job_repository::enqueue_in,
        order_repository::{find_order_in, set_order_status_in},
        payment_repository::{find_payment_in, find_payments_for_subject_in, transition_payment_in},
        product_repository::{decrement_stock_in, increment_stock_in},
        PaymentRepository,
    },
    service::settings_service::SettingsService,
};

/// Applies payment outcomes and runs the side effects that follow them.
/// Every transition and its side effects commit in one transaction.
pub struct FulfillmentService {
    pool: SqlitePool,
    payment_repo: Arc<dyn PaymentRepository>,
    provider: Option<Arc<dyn PaymentProvider>>,
    settings_service: Arc<SettingsService>,
    max_attempts: i64,
}

impl FulfillmentService {
    pub fn new(
        pool: SqlitePool,
        payment_repo: Arc<dyn PaymentRepository>,
        provider: Option<Arc<dyn PaymentProvider>>,
        settings_service: Arc<SettingsService>,
        max_attempts: i64,
    ) -> Self {
        Self {
            pool,
            payment_repo,
            provider,
            settings_service,
            max_attempts,
        }
    }

    /// Moves a `CREATED` payment to the outcome's status. Terminal payments
    /// are left alone, so repeated or late deliveries are harmless.
    pub async fn apply_outcome(&self, payment_id: Uuid, outcome: PaymentOutcome) -> Result<Payment> {
        let payment = self
            .payment_repo
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        if outcome.status == PaymentStatus::Created {
            return Ok(payment);
        }

        if payment.status.is_terminal() {
            if payment.status == outcome.status {
                tracing::debug!(payment_id = %payment.id, status = payment.status.as_str(), "Duplicate payment outcome ignored");
            } else {
                tracing::warn!(
                    payment_id = %payment.id,
                    current = payment.status.as_str(),
                    reported = outcome.status.as_str(),
                    "Conflicting outcome for settled payment ignored"
                );
            }
            return Ok(payment);
        }

        let (status, error_message) = match outcome.paid_mismatch(payment.amount_ore) {
            Some(reason) => {
                tracing::error!(
                    payment_id = %payment.id,
                    expected = payment.amount_ore,
                    reported = ?outcome.amount_ore,
                    currency = ?outcome.currency,
                    "Paid outcome rejected: {}",
                    reason
                );
                (PaymentStatus::Error, Some(reason))
            }
            None => (outcome.status, outcome.error_message.clone()),
        };

        let validity_months = self.settings_service.gift_card_config().await?.validity_months;

        let mut tx = self.pool.begin().await?;
        let moved = transition_payment_in(
            &mut tx,
            payment.id,
            status,
            outcome.payer_alias.as_deref(),
            error_message.as_deref(),
        )
        .await?;

        if !moved {
            // Lost the race to another writer; report what it stored.
            tx.rollback().await?;
            return self
                .payment_repo
                .find_by_id(payment.id)
                .await?
                .ok_or_else(|| AppError::NotFound("Payment not found".to_string()));
        }

        match status {
            PaymentStatus::Paid => self.on_paid(&mut tx, &payment, validity_months).await?,
            _ => self.on_failed(&mut tx, &payment).await?,
        }

        let updated = find_payment_in(&mut tx, payment.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;
        tx.commit().await?;

        tracing::info!(
            payment_id = %updated.id,
            reference = %updated.reference,
            kind = updated.kind.as_str(),
            status = updated.status.as_str(),
            "Payment settled"
        );
        Ok(updated)
    }

    /// The callback body is unauthenticated, so it only says which payment
    /// to look at. The outcome applied is the one Swish reports when asked.
    pub async fn handle_swish_callback(&self, callback: SwishCallback) -> Result<Payment> {
        let payment = self
            .payment_repo
            .find_by_provider_id(&callback.id)
            .await?
            .filter(|p| p.method == PaymentMethod::Swish)
            .ok_or_else(|| {
                tracing::warn!(provider_id = %callback.id, "Swish callback for unknown payment request");
                AppError::NotFound("Payment not found".to_string())
            })?;

        if let Some(reference) = callback.payee_payment_reference.as_deref() {
            if reference != payment.reference {
                tracing::warn!(
                    payment_id = %payment.id,
                    reference,
                    "Swish callback reference does not match stored payment"
                );
                return Err(AppError::BadRequest("Payment reference mismatch".to_string()));
            }
        }

        let claimed = callback.to_outcome()?;
        tracing::info!(
            payment_id = %payment.id,
            provider_id = %callback.id,
            status = %callback.status,
            "Swish callback received"
        );

        if payment.status.is_terminal() {
            return Ok(payment);
        }

        let provider = self.provider.as_ref().ok_or_else(|| {
            AppError::ServiceUnavailable("Swish is not configured; callback cannot be verified".to_string())
        })?;
        let confirmed = provider.retrieve(&callback.id).await?;

        if confirmed.status != claimed.status {
            tracing::warn!(
                payment_id = %payment.id,
                claimed = claimed.status.as_str(),
                confirmed = confirmed.status.as_str(),
                "Swish callback disagrees with payment request status"
            );
        }
        if confirmed.status == PaymentStatus::Created {
            return Ok(payment);
        }
        self.apply_outcome(payment.id, confirmed).await
    }

    /// Admin action: an invoice has been paid to the bankgiro.
    pub async fn mark_invoice_paid(&self, payment_id: Uuid) -> Result<Payment> {
        let payment = self
            .payment_repo
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        if payment.method != PaymentMethod::Invoice {
            return Err(AppError::BadRequest("Payment is not an invoice".to_string()));
        }
        if payment.status != PaymentStatus::Created {
            return Err(AppError::Conflict(format!(
                "Invoice payment is already {}",
                payment.status.as_str()
            )));
        }

        self.apply_outcome(
            payment.id,
            PaymentOutcome {
                status: PaymentStatus::Paid,
                amount_ore: Some(payment.amount_ore),
                currency: Some(payment.currency.clone()),
                payer_alias: None,
                error_message: None,
            },
        )
        .await
    }

    /// Current status; asks Swish once when a callback may have been lost.
    pub async fn refresh_status(&self, payment_id: Uuid) -> Result<Payment> {
        let payment = self
            .payment_repo
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        if payment.status != PaymentStatus::Created || payment.method != PaymentMethod::Swish {
            return Ok(payment);
        }
        let (Some(provider), Some(provider_id)) = (&self.provider, payment.provider_id.as_deref()) else {
            return Ok(payment);
        };

        match provider.retrieve(provider_id).await {
            Ok(outcome) if outcome.status.is_terminal() => self.apply_outcome(payment.id, outcome).await,
            Ok(_) => Ok(payment),
            Err(e) => {
                tracing::warn!(payment_id = %payment.id, "Swish status lookup failed: {}", e);
                Ok(payment)
            }
        }
    }

    /// Settles Swish payments left in `CREATED` past the timeout. Each is
    /// looked up once first so a paid-but-unreported payment is not lost.
    pub async fn expire_abandoned(&self, timeout_minutes: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::minutes(timeout_minutes);
        let stale = self
            .payment_repo
            .list_stale_created(PaymentMethod::Swish, cutoff)
            .await?;

        let mut settled = 0;
        for payment in stale {
            let looked_up = match (&self.provider, payment.provider_id.as_deref()) {
                (Some(provider), Some(provider_id)) => provider.retrieve(provider_id).await.ok(),
                _ => None,
            };

            let outcome = match looked_up {
                Some(outcome) if outcome.status.is_terminal() => outcome,
                _ => PaymentOutcome {
                    status: PaymentStatus::Error,
                    amount_ore: None,
                    currency: None,
                    payer_alias: None,
                    error_message: Some("Payment timed out".to_string()),
                },
            };

            match self.apply_outcome(payment.id, outcome).await {
                Ok(_) => settled += 1,
                Err(e) => tracing::error!(payment_id = %payment.id, "Failed to expire payment: {}", e),
            }
        }

        if settled > 0 {
            tracing::info!(count = settled, "Expired abandoned Swish payments");
        }
        Ok(settled)
    }

    /// Admin cancellation of a booking. Any open payment is declined and a
    /// drawn gift-card amount is put back on the card.
    pub async fn cancel_booking(&self, booking_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let booking = find_booking_in(&mut tx, booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

        if booking.status == BookingStatus::Cancelled {
            return Err(AppError::Conflict("Booking is already cancelled".to_string()));
        }

        let payments = find_payments_for_subject_in(&mut tx, PaymentKind::Booking, booking.id).await?;
        decline_open_payments_in(&mut tx, &payments).await?;

        let paid_by_gift_card = payments
            .iter()
            .find(|p| p.method == PaymentMethod::GiftCard && p.status == PaymentStatus::Paid)
            .map(|p| p.amount_ore);

        set_booking_status_in(&mut tx, booking.id, BookingStatus::Cancelled).await?;
        if let (Some(code), Some(amount)) = (booking.gift_card_code.as_deref(), paid_by_gift_card) {
            restore_balance_in(&mut tx, code, amount).await?;
        }
        recount_participants_in(&mut tx, booking.course_instance_id).await?;
        tx.commit().await?;

        tracing::info!(booking_id = %booking.id, reference = %booking.reference, "Booking cancelled");
        Ok(())
    }

    /// Admin cancellation of a gift card that has not been used.
    pub async fn cancel_gift_card(&self, gift_card_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let payments = find_payments_for_subject_in(&mut tx, PaymentKind::GiftCard, gift_card_id).await?;
        decline_open_payments_in(&mut tx, &payments).await?;

        let changed = set_gift_card_status_in(&mut tx, gift_card_id, GiftCardStatus::Cancelled).await?;
        if !changed {
            return Err(AppError::Conflict("Gift card is already cancelled or does not exist".to_string()));
        }
        tx.commit().await?;

        tracing::info!(gift_card_id = %gift_card_id, "Gift card cancelled");
        Ok(())
    }

    async fn on_paid(&self, conn: &mut SqliteConnection, payment: &Payment, validity_months: u32) -> Result<()> {
        let now = Utc::now();
        match payment.kind {
            PaymentKind::Booking => {
                let booking = find_booking_in(conn, payment.subject_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;
                set_booking_status_in(conn, booking.id, BookingStatus::Confirmed).await?;
                // Invoice bookings got their confirmation at checkout.
                if payment.method != PaymentMethod::Invoice {
                    self.enqueue(conn, JobPayload::SendBookingConfirmation { booking_id: booking.id })
                        .await?;
                }
                self.enqueue(
                    conn,
                    JobPayload::RecountParticipants {
                        course_instance_id: booking.course_instance_id,
                    },
                )
                .await?;
            }
            PaymentKind::GiftCard => {
                let expires_at = now
                    .checked_add_months(Months::new(validity_months))
                    .unwrap_or(now + Duration::days(365));
                if activate_gift_card_in(conn, payment.subject_id, expires_at).await? {
                    self.enqueue(conn, JobPayload::GenerateGiftCardPdf { gift_card_id: payment.subject_id })
                        .await?;
                }
            }
            PaymentKind::ShopOrder => {
                let order = find_order_in(conn, payment.subject_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
                set_order_status_in(conn, order.id, OrderStatus::Paid).await?;
                if payment.method != PaymentMethod::Invoice {
                    if let Err(e) = decrement_stock_in(conn, order.product_id, order.quantity).await {
                        tracing::error!(order_id = %order.id, "Order paid but stock is short: {}", e);
                    }
                    self.enqueue(conn, JobPayload::SendOrderConfirmation { order_id: order.id })
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn on_failed(&self, conn: &mut SqliteConnection, payment: &Payment) -> Result<()> {
        match payment.kind {
            PaymentKind::Booking => {
                let booking = find_booking_in(conn, payment.subject_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;
                set_booking_status_in(conn, booking.id, BookingStatus::Cancelled).await?;
                if let (PaymentMethod::GiftCard, Some(code)) =
                    (payment.method, booking.gift_card_code.as_deref())
                {
                    restore_balance_in(conn, code, payment.amount_ore).await?;
                }
                self.enqueue(
                    conn,
                    JobPayload::RecountParticipants {
                        course_instance_id: booking.course_instance_id,
                    },
                )
                .await?;
            }
            PaymentKind::GiftCard => {
                set_gift_card_status_in(conn, payment.subject_id, GiftCardStatus::Cancelled).await?;
            }
            PaymentKind::ShopOrder => {
                let order = find_order_in(conn, payment.subject_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
                set_order_status_in(conn, order.id, OrderStatus::Cancelled).await?;
                // Invoice orders reserved stock at checkout.
                if payment.method == PaymentMethod::Invoice {
                    increment_stock_in(conn, order.product_id, order.quantity).await?;
                }
            }
        }
        Ok(())
    }

    async fn enqueue(&self, conn: &mut SqliteConnection, payload: JobPayload) -> Result<()> {
        enqueue_in(conn, &payload, Utc::now(), self.max_attempts).await?;
        Ok(())
    }
}

/// Declines every `CREATED` payment in `payments`. A payment that settled in
/// the meantime aborts the cancellation, since it may have taken money.
async fn decline_open_payments_in(conn: &mut SqliteConnection, payments: &[Payment]) -> Result<()> {
    for payment in payments.iter().filter(|p| p.status == PaymentStatus::Created) {
        let declined = transition_payment_in(
            conn,
            payment.id,
            PaymentStatus::Declined,
            None,
            Some("Cancelled by studio"),
        )
        .await?;
        if declined {
            continue;
        }

        let current = find_payment_in(conn, payment.id)
            .await?
            .map(|p| p.status)
            .unwrap_or(PaymentStatus::Error);
        tracing::warn!(
            payment_id = %payment.id,
            reference = %payment.reference,
            status = current.as_str(),
            "Payment settled while cancelling"
        );
        if current == PaymentStatus::Paid {
            return Err(AppError::Conflict(format!(
                "Payment {} was just completed; reload and cancel again to refund manually",
                payment.reference
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::generate_reference, repository::payment_repository::insert_payment};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn swish_payment() -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            reference: generate_reference("K"),
            kind: PaymentKind::Booking,
            subject_id: Uuid::new_v4(),
            method: PaymentMethod::Swish,
            amount_ore: 50_000,
            currency: "SEK".to_string(),
            status: PaymentStatus::Created,
            provider_id: None,
            payer_alias: None,
            idempotency_key: None,
            error_message: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_decline_declines_open_payments() {
        let pool = pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let payment = swish_payment();
        insert_payment(&mut conn, &payment).await.unwrap();

        decline_open_payments_in(&mut conn, &[payment.clone()]).await.unwrap();

        let stored = find_payment_in(&mut conn, payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Declined);
        assert_eq!(stored.error_message.as_deref(), Some("Cancelled by studio"));
    }

    #[tokio::test]
    async fn test_decline_refuses_payment_paid_since_it_was_read() {
        let pool = pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let stale = swish_payment();
        insert_payment(&mut conn, &stale).await.unwrap();

        // A callback lands between reading the payment and cancelling.
        assert!(transition_payment_in(&mut conn, stale.id, PaymentStatus::Paid, None, None)
            .await
            .unwrap());

        let result = decline_open_payments_in(&mut conn, &[stale.clone()]).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let stored = find_payment_in(&mut conn, stale.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Paid);
    }
}
