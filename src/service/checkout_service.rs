use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;
use validator::{Validate, ValidateEmail};

use crate::{
    domain::{
        generate_gift_card_code, generate_reference, non_empty, Booking, BookingStatus,
        CheckoutConfig, CheckoutOutcome, CheckoutRequest, CourseInstanceStatus, CustomerDetails, GiftCard,
        GiftCardConfig, GiftCardStatus, Invoice, JobPayload, OrderStatus, Payment, PaymentKind, PaymentMethod,
        PaymentOutcome, PaymentStatus, ShopOrder, CURRENCY,
    },
    error::{AppError, Result},
    payments::{PaymentProvider, PaymentRequest},
    repository::{
        booking_repository::insert_booking,
        course_repository::{find_instance_in, reserved_participants_in},
        gift_card_repository::{draw_balance_in, find_gift_card_by_code_in, insert_gift_card},
        job_repository::enqueue_in,
        order_repository::insert_order,
        payment_repository::{insert_invoice, insert_payment, next_invoice_number_in},
        product_repository::{decrement_stock_in, find_product_in},
        GiftCardRepository, PaymentRepository,
    },
    service::{fulfillment_service::FulfillmentService, settings_service::SettingsService},
};

const MAX_QUANTITY_PER_ORDER: i32 = 20;

/// What one checkout wrote, before the provider is contacted.
struct Staged {
    payment: Payment,
    swish_message: String,
}

pub struct CheckoutService {
    pool: SqlitePool,
    payment_repo: Arc<dyn PaymentRepository>,
    gift_card_repo: Arc<dyn GiftCardRepository>,
    provider: Option<Arc<dyn PaymentProvider>>,
    settings_service: Arc<SettingsService>,
    fulfillment: Arc<FulfillmentService>,
    callback_url: String,
    max_attempts: i64,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: SqlitePool,
        payment_repo: Arc<dyn PaymentRepository>,
        gift_card_repo: Arc<dyn GiftCardRepository>,
        provider: Option<Arc<dyn PaymentProvider>>,
        settings_service: Arc<SettingsService>,
        fulfillment: Arc<FulfillmentService>,
        callback_url: String,
        max_attempts: i64,
    ) -> Self {
        Self {
            pool,
            payment_repo,
            gift_card_repo,
            provider,
            settings_service,
            fulfillment,
            callback_url,
            max_attempts,
        }
    }

    pub fn swish_available(&self) -> bool {
        self.provider.is_some()
    }

    /// Creates the booking, gift card or order together with its payment.
    /// A repeated `idempotency_key` returns the first checkout's payment.
    pub async fn start_checkout(
        &self,
        request: CheckoutRequest,
        idempotency_key: Option<String>,
    ) -> Result<CheckoutOutcome> {
        let idempotency_key = non_empty(idempotency_key);
        if let Some(existing) = self.replay(idempotency_key.as_deref()).await? {
            return Ok(existing);
        }

        request.customer().validate()?;
        let method = request.method();
        let payer_alias = match method {
            PaymentMethod::Swish => {
                if self.provider.is_none() {
                    return Err(AppError::ServiceUnavailable(
                        "Swish is not available right now".to_string(),
                    ));
                }
                Some(request.customer().swish_alias().ok_or_else(|| {
                    AppError::Validation("phone: a Swedish mobile number is required for Swish".to_string())
                })?)
            }
            _ => None,
        };
        let checkout_config = self.settings_service.checkout_config().await?;
        let gift_card_config = self.settings_service.gift_card_config().await?;

        let mut tx = self.pool.begin().await?;
        let staged = match request {
            CheckoutRequest::BookCourse {
                course_instance_id,
                participants,
                customer,
                method,
                gift_card_code,
                message,
            } => {
                self.stage_booking(
                    &mut tx,
                    &checkout_config,
                    course_instance_id,
                    participants,
                    customer,
                    method,
                    non_empty(gift_card_code),
                    non_empty(message),
                    idempotency_key.clone(),
                )
                .await
            }
            CheckoutRequest::BuyGiftCard {
                amount_ore,
                buyer,
                recipient_name,
                recipient_email,
                message,
                method,
            } => {
                self.stage_gift_card(
                    &mut tx,
                    &gift_card_config,
                    amount_ore,
                    buyer,
                    non_empty(recipient_name),
                    non_empty(recipient_email),
                    non_empty(message),
                    method,
                    idempotency_key.clone(),
                )
                .await
            }
            CheckoutRequest::BuyProduct {
                product_id,
                quantity,
                customer,
                shipping_address,
                method,
            } => {
                self.stage_order(
                    &mut tx,
                    &checkout_config,
                    product_id,
                    quantity,
                    customer,
                    shipping_address,
                    method,
                    idempotency_key.clone(),
                )
                .await
            }
        };

        let staged = match staged {
            Ok(staged) => staged,
            Err(AppError::Conflict(msg)) if msg == DUPLICATE_CHECKOUT => {
                drop(tx);
                return self
                    .replay(idempotency_key.as_deref())
                    .await?
                    .ok_or(AppError::Conflict(msg));
            }
            Err(e) => return Err(e),
        };
        tx.commit().await?;

        let payment = staged.payment;
        tracing::info!(
            payment_id = %payment.id,
            reference = %payment.reference,
            kind = payment.kind.as_str(),
            method = payment.method.as_str(),
            amount_ore = payment.amount_ore,
            "Checkout created"
        );

        if payment.method != PaymentMethod::Swish {
            return Ok(CheckoutOutcome { payment, replayed: false });
        }

        let payment = self
            .request_swish_payment(payment, payer_alias, staged.swish_message)
            .await?;
        Ok(CheckoutOutcome { payment, replayed: false })
    }

    /// Admin-issued card, active immediately without payment.
    pub async fn issue_gift_card(
        &self,
        amount_ore: i64,
        buyer: CustomerDetails,
        recipient_name: Option<String>,
        recipient_email: Option<String>,
        message: Option<String>,
    ) -> Result<GiftCard> {
        buyer.validate()?;
        if amount_ore <= 0 {
            return Err(AppError::Validation("amount_ore: must be positive".to_string()));
        }
        let validity_months = self.settings_service.gift_card_config().await?.validity_months;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let code = unique_gift_card_code(&mut tx).await?;
        let card = GiftCard {
            id: Uuid::new_v4(),
            code,
            initial_amount_ore: amount_ore,
            balance_ore: amount_ore,
            status: GiftCardStatus::Active,
            buyer_name: buyer.name,
            buyer_email: buyer.email,
            recipient_name: non_empty(recipient_name),
            recipient_email: non_empty(recipient_email),
            message: non_empty(message),
            pdf_path: None,
            sent_at: None,
            expires_at: now.checked_add_months(chrono::Months::new(validity_months)),
            created_at: now,
            updated_at: now,
        };
        insert_gift_card(&mut tx, &card).await?;
        enqueue_in(&mut tx, &JobPayload::GenerateGiftCardPdf { gift_card_id: card.id }, now, self.max_attempts)
            .await?;
        tx.commit().await?;

        tracing::info!(gift_card_id = %card.id, amount_ore, "Gift card issued by studio");
        self.gift_card_repo
            .find_by_id(card.id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve issued gift card".to_string()))
    }

    async fn replay(&self, idempotency_key: Option<&str>) -> Result<Option<CheckoutOutcome>> {
        let Some(key) = idempotency_key else {
            return Ok(None);
        };
        Ok(self
            .payment_repo
            .find_by_idempotency_key(key)
            .await?
            .map(|payment| {
                tracing::debug!(payment_id = %payment.id, "Checkout replayed by idempotency key");
                CheckoutOutcome { payment, replayed: true }
            }))
    }

    async fn request_swish_payment(
        &self,
        payment: Payment,
        payer_alias: Option<String>,
        message: String,
    ) -> Result<Payment> {
        let Some(provider) = self.provider.as_ref() else {
            return Err(AppError::ServiceUnavailable("Swish is not available right now".to_string()));
        };

        let request = PaymentRequest {
            reference: payment.reference.clone(),
            amount_ore: payment.amount_ore,
            payer_alias,
            message,
            callback_url: self.callback_url.clone(),
        };

        match provider.create_payment_request(&request).await {
            Ok(provider_id) => {
                self.payment_repo.set_provider_id(payment.id, &provider_id).await?;
                self.payment_repo
                    .find_by_id(payment.id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))
            }
            Err(e) => {
                tracing::error!(payment_id = %payment.id, "Swish payment request failed: {}", e);
                self.fulfillment
                    .apply_outcome(
                        payment.id,
                        PaymentOutcome {
                            status: PaymentStatus::Error,
                            amount_ore: None,
                            currency: None,
                            payer_alias: None,
                            error_message: Some(e.to_string()),
                        },
                    )
                    .await?;
                Err(AppError::Payment(
                    "The payment could not be started in Swish. Please try again.".to_string(),
                ))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn stage_booking(
        &self,
        conn: &mut SqliteConnection,
        config: &CheckoutConfig,
        course_instance_id: Uuid,
        participants: i32,
        customer: CustomerDetails,
        method: PaymentMethod,
        gift_card_code: Option<String>,
        message: Option<String>,
        idempotency_key: Option<String>,
    ) -> Result<Staged> {
        let now = Utc::now();

        let (instance, template) = find_instance_in(conn, course_instance_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Course date not found".to_string()))?;

        if instance.status != CourseInstanceStatus::Scheduled {
            return Err(AppError::Conflict("This course date has been cancelled".to_string()));
        }
        if instance.starts_at <= now {
            return Err(AppError::Conflict("This course date has already started".to_string()));
        }
        if participants < 1 || participants > config.max_participants_per_booking {
            return Err(AppError::Validation(format!(
                "participants: must be between 1 and {}",
                config.max_participants_per_booking
            )));
        }
        let reserved = reserved_participants_in(conn, instance.id).await?;
        if reserved + participants > instance.max_participants {
            return Err(AppError::Conflict(format!(
                "Only {} spots left on this course date",
                (instance.max_participants - reserved).max(0)
            )));
        }
        if method == PaymentMethod::Invoice && !config.invoice_enabled {
            return Err(AppError::BadRequest("Invoice payment is not offered".to_string()));
        }

        let amount_ore = template.price_ore * i64::from(participants);
        let reference = generate_reference("K");

        let gift_card_code = match method {
            PaymentMethod::GiftCard => {
                let code = gift_card_code.ok_or_else(|| {
                    AppError::Validation("gift_card_code: required when paying with a gift card".to_string())
                })?;
                let card = find_gift_card_by_code_in(conn, &code)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Gift card not found".to_string()))?;
                if !card.can_cover(amount_ore, now) {
                    return Err(AppError::Payment(
                        "The gift card is not valid or its balance is too low".to_string(),
                    ));
                }
                draw_balance_in(conn, card.id, amount_ore).await?;
                Some(card.code)
            }
            _ => None,
        };

        let booking = Booking {
            id: Uuid::new_v4(),
            course_instance_id: instance.id,
            reference: reference.clone(),
            customer_name: customer.name.trim().to_string(),
            customer_email: customer.email.trim().to_string(),
            customer_phone: non_empty(customer.phone.clone()),
            participants,
            status: match method {
                PaymentMethod::Swish => BookingStatus::Pending,
                PaymentMethod::Invoice | PaymentMethod::GiftCard => BookingStatus::Confirmed,
            },
            payment_method: method,
            gift_card_code,
            message,
            created_at: now,
            updated_at: now,
        };
        insert_booking(conn, &booking).await?;

        let payment = new_payment(reference, PaymentKind::Booking, booking.id, method, amount_ore, idempotency_key);
        insert_payment(conn, &payment).await.map_err(duplicate_checkout)?;

        match method {
            PaymentMethod::Invoice => {
                self.create_invoice(conn, &payment, &customer, config.invoice_due_days).await?;
                self.enqueue(conn, JobPayload::SendBookingConfirmation { booking_id: booking.id }).await?;
                self.enqueue(conn, JobPayload::RecountParticipants { course_instance_id: instance.id }).await?;
            }
            PaymentMethod::GiftCard => {
                self.enqueue(conn, JobPayload::SendBookingConfirmation { booking_id: booking.id }).await?;
                self.enqueue(conn, JobPayload::RecountParticipants { course_instance_id: instance.id }).await?;
            }
            PaymentMethod::Swish => {}
        }

        Ok(Staged {
            payment,
            swish_message: format!("{} {}", template.title, booking.reference),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn stage_gift_card(
        &self,
        conn: &mut SqliteConnection,
        config: &GiftCardConfig,
        amount_ore: i64,
        buyer: CustomerDetails,
        recipient_name: Option<String>,
        recipient_email: Option<String>,
        message: Option<String>,
        method: PaymentMethod,
        idempotency_key: Option<String>,
    ) -> Result<Staged> {
        match method {
            PaymentMethod::Swish => {}
            PaymentMethod::Invoice => {
                return Err(AppError::BadRequest("Gift cards must be paid with Swish".to_string()))
            }
            PaymentMethod::GiftCard => {
                return Err(AppError::BadRequest("Gift cards cannot be bought with a gift card".to_string()))
            }
        }

        if amount_ore < config.min_amount_ore || amount_ore > config.max_amount_ore {
            return Err(AppError::Validation(format!(
                "amount_ore: must be between {} and {}",
                config.min_amount_ore, config.max_amount_ore
            )));
        }
        if !recipient_email.validate_email() {
            return Err(AppError::Validation("recipient_email: is not a valid email address".to_string()));
        }

        let now = Utc::now();
        let card = GiftCard {
            id: Uuid::new_v4(),
            code: unique_gift_card_code(conn).await?,
            initial_amount_ore: amount_ore,
            balance_ore: 0,
            status: GiftCardStatus::Pending,
            buyer_name: buyer.name.trim().to_string(),
            buyer_email: buyer.email.trim().to_string(),
            recipient_name,
            recipient_email,
            message,
            pdf_path: None,
            sent_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };
        insert_gift_card(conn, &card).await?;

        let payment = new_payment(
            generate_reference("P"),
            PaymentKind::GiftCard,
            card.id,
            method,
            amount_ore,
            idempotency_key,
        );
        insert_payment(conn, &payment).await.map_err(duplicate_checkout)?;

        Ok(Staged {
            swish_message: format!("Presentkort {}", payment.reference),
            payment,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn stage_order(
        &self,
        conn: &mut SqliteConnection,
        config: &CheckoutConfig,
        product_id: Uuid,
        quantity: i32,
        customer: CustomerDetails,
        shipping_address: String,
        method: PaymentMethod,
        idempotency_key: Option<String>,
    ) -> Result<Staged> {
        match method {
            PaymentMethod::Swish => {}
            PaymentMethod::Invoice if config.invoice_enabled => {}
            PaymentMethod::Invoice => {
                return Err(AppError::BadRequest("Invoice payment is not offered".to_string()))
            }
            PaymentMethod::GiftCard => {
                return Err(AppError::BadRequest("Gift cards can only be used for course bookings".to_string()))
            }
        }
        if !(1..=MAX_QUANTITY_PER_ORDER).contains(&quantity) {
            return Err(AppError::Validation(format!(
                "quantity: must be between 1 and {}",
                MAX_QUANTITY_PER_ORDER
            )));
        }
        let shipping_address = shipping_address.trim().to_string();
        if shipping_address.len() < 5 {
            return Err(AppError::Validation("shipping_address: is required".to_string()));
        }

        let product = find_product_in(conn, product_id)
            .await?
            .filter(|p| p.published)
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
        if product.stock < quantity {
            return Err(AppError::Conflict(format!("Only {} left in stock", product.stock)));
        }

        let now = Utc::now();
        let reference = generate_reference("O");
        let order = ShopOrder {
            id: Uuid::new_v4(),
            product_id: product.id,
            reference: reference.clone(),
            quantity,
            unit_price_ore: product.price_ore,
            total_ore: product.price_ore * i64::from(quantity),
            customer_name: customer.name.trim().to_string(),
            customer_email: customer.email.trim().to_string(),
            customer_phone: non_empty(customer.phone.clone()),
            shipping_address,
            status: OrderStatus::Pending,
            payment_method: method,
            shipped_at: None,
            created_at: now,
            updated_at: now,
        };
        insert_order(conn, &order).await?;

        let payment = new_payment(reference, PaymentKind::ShopOrder, order.id, method, order.total_ore, idempotency_key);
        insert_payment(conn, &payment).await.map_err(duplicate_checkout)?;

        if method == PaymentMethod::Invoice {
            decrement_stock_in(conn, product.id, quantity).await?;
            self.create_invoice(conn, &payment, &customer, config.invoice_due_days).await?;
            self.enqueue(conn, JobPayload::SendOrderConfirmation { order_id: order.id }).await?;
        }

        Ok(Staged {
            swish_message: format!("{} {}", product.name, order.reference),
            payment,
        })
    }

    async fn create_invoice(
        &self,
        conn: &mut SqliteConnection,
        payment: &Payment,
        customer: &CustomerDetails,
        due_days: i64,
    ) -> Result<Invoice> {
        let now = Utc::now();
        let invoice = Invoice {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            invoice_number: next_invoice_number_in(conn).await?,
            customer_name: customer.name.trim().to_string(),
            customer_email: customer.email.trim().to_string(),
            due_date: (now + Duration::days(due_days)).date_naive(),
            pdf_path: None,
            sent_at: None,
            created_at: now,
        };
        insert_invoice(conn, &invoice).await?;
        self.enqueue(conn, JobPayload::GenerateInvoice { invoice_id: invoice.id }).await?;
        Ok(invoice)
    }

    async fn enqueue(&self, conn: &mut SqliteConnection, payload: JobPayload) -> Result<()> {
        enqueue_in(conn, &payload, Utc::now(), self.max_attempts).await?;
        Ok(())
    }
}

const DUPLICATE_CHECKOUT: &str = "Checkout already submitted";

fn duplicate_checkout(error: AppError) -> AppError {
    match error {
        AppError::Conflict(_) => AppError::Conflict(DUPLICATE_CHECKOUT.to_string()),
        other => other,
    }
}

fn new_payment(
    reference: String,
    kind: PaymentKind,
    subject_id: Uuid,
    method: PaymentMethod,
    amount_ore: i64,
    idempotency_key: Option<String>,
) -> Payment {
    let now = Utc::now();
    // Gift-card balance is drawn in the same transaction, so that payment is settled already.
    let (status, paid_at) = match method {
        PaymentMethod::GiftCard => (PaymentStatus::Paid, Some(now)),
        _ => (PaymentStatus::Created, None),
    };
    Payment {
        id: Uuid::new_v4(),
        reference,
        kind,
        subject_id,
        method,
        amount_ore,
        currency: CURRENCY.to_string(),
        status,
        provider_id: None,
        payer_alias: None,
        idempotency_key,
        error_message: None,
        paid_at,
        created_at: now,
        updated_at: now,
    }
}

async fn unique_gift_card_code(conn: &mut SqliteConnection) -> Result<String> {
    for _ in 0..5 {
        let code = generate_gift_card_code();
        if find_gift_card_by_code_in(conn, &code).await?.is_none() {
            return Ok(code);
        }
    }
    Err(AppError::Internal("Could not generate a unique gift card code".to_string()))
}
