mod common;

use common::{create_course, create_product, customer, run_jobs, setup, setup_without_swish, ADMIN_BCC};
use lerhuset::{
    domain::{
        BookingStatus, CheckoutRequest, GiftCardStatus, JobPayload, OrderStatus, PaymentMethod,
        PaymentOutcome, PaymentStatus,
    },
    error::AppError,
    jobs::run_cron_tick,
    payments::SwishCallback,
};

fn book(instance_id: uuid::Uuid, participants: i32, method: PaymentMethod) -> CheckoutRequest {
    CheckoutRequest::BookCourse {
        course_instance_id: instance_id,
        participants,
        customer: customer(),
        method,
        gift_card_code: None,
        message: None,
    }
}

fn callback(provider_id: &str, reference: &str, amount: serde_json::Value, status: &str) -> SwishCallback {
    SwishCallback {
        id: provider_id.to_string(),
        payee_payment_reference: Some(reference.to_string()),
        payment_reference: Some("1E2FC19E5E5E4E18916609B7F8911C12".to_string()),
        payer_alias: Some("46701234567".to_string()),
        amount: Some(amount),
        currency: Some("SEK".to_string()),
        status: status.to_string(),
        error_code: None,
        error_message: None,
    }
}

/// What Swish answers when the payment request is looked up.
fn swish_reports(app: &common::TestApp, provider_id: &str, status: PaymentStatus, amount_ore: Option<i64>) {
    app.swish.set_outcome(
        provider_id,
        PaymentOutcome {
            status,
            amount_ore,
            currency: Some("SEK".to_string()),
            payer_alias: Some("46701234567".to_string()),
            error_message: None,
        },
    );
}

async fn count_jobs(app: &common::TestApp, matches: impl Fn(&JobPayload) -> bool) -> anyhow::Result<usize> {
    Ok(app
        .ctx
        .job_repo
        .list(None, 500)
        .await?
        .iter()
        .filter(|j| matches(&j.payload))
        .count())
}

#[tokio::test]
async fn test_swish_booking_confirmed_once_by_callback() -> anyhow::Result<()> {
    let app = setup().await?;
    let instance = create_course(&app.ctx, 95_000, 8).await?;

    let outcome = app
        .ctx
        .checkout_service
        .start_checkout(book(instance.id, 2, PaymentMethod::Swish), Some("form-1".to_string()))
        .await?;
    let payment = outcome.payment;
    assert!(!outcome.replayed);
    assert_eq!(payment.status, PaymentStatus::Created);
    assert_eq!(payment.amount_ore, 190_000);
    assert!(payment.reference.starts_with('K'));

    let provider_id = payment.provider_id.clone().expect("provider id stored");
    let requests = app.swish.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].1.payer_alias.as_deref(), Some("46701234567"));
    assert_eq!(requests[0].1.reference, payment.reference);
    assert!(requests[0].1.callback_url.ends_with("/api/payments/swish/callback"));

    let booking = app.ctx.booking_repo.find_by_reference(&payment.reference).await?.expect("booking");
    assert_eq!(booking.status, BookingStatus::Pending);

    swish_reports(&app, &provider_id, PaymentStatus::Paid, Some(190_000));
    let paid = app
        .ctx
        .fulfillment_service
        .handle_swish_callback(callback(&provider_id, &payment.reference, serde_json::json!(1900), "PAID"))
        .await?;
    assert_eq!(paid.status, PaymentStatus::Paid);
    assert!(paid.paid_at.is_some());

    // Swish retries callbacks; the second delivery must change nothing.
    let again = app
        .ctx
        .fulfillment_service
        .handle_swish_callback(callback(&provider_id, &payment.reference, serde_json::json!(1900), "PAID"))
        .await?;
    assert_eq!(again.status, PaymentStatus::Paid);
    assert_eq!(
        count_jobs(&app, |p| matches!(p, JobPayload::SendBookingConfirmation { .. })).await?,
        1
    );

    let booking = app.ctx.booking_repo.find_by_id(booking.id).await?.expect("booking");
    assert_eq!(booking.status, BookingStatus::Confirmed);

    let report = run_jobs(&app.ctx).await?;
    assert_eq!(report.failed, 0);

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "maja@example.se");
    assert_eq!(sent[0].bcc.as_deref(), Some(ADMIN_BCC));
    assert!(sent[0].body.contains(&payment.reference));

    let instance = app.ctx.course_repo.find_instance(instance.id).await?.expect("instance");
    assert_eq!(instance.current_participants, 2);
    Ok(())
}

#[tokio::test]
async fn test_terminal_payment_ignores_conflicting_outcome() -> anyhow::Result<()> {
    let app = setup().await?;
    let instance = create_course(&app.ctx, 50_000, 8).await?;
    let payment = app
        .ctx
        .checkout_service
        .start_checkout(book(instance.id, 1, PaymentMethod::Swish), None)
        .await?
        .payment;
    let provider_id = payment.provider_id.clone().expect("provider id");

    swish_reports(&app, &provider_id, PaymentStatus::Declined, Some(50_000));
    let declined = app
        .ctx
        .fulfillment_service
        .handle_swish_callback(callback(&provider_id, &payment.reference, serde_json::json!(500), "CANCELLED"))
        .await?;
    assert_eq!(declined.status, PaymentStatus::Declined);

    swish_reports(&app, &provider_id, PaymentStatus::Paid, Some(50_000));
    let late = app
        .ctx
        .fulfillment_service
        .handle_swish_callback(callback(&provider_id, &payment.reference, serde_json::json!(500), "PAID"))
        .await?;
    assert_eq!(late.status, PaymentStatus::Declined);

    let booking = app.ctx.booking_repo.find_by_reference(&payment.reference).await?.expect("booking");
    assert_eq!(booking.status, BookingStatus::Cancelled);
    Ok(())
}

#[tokio::test]
async fn test_amount_mismatch_sets_error() -> anyhow::Result<()> {
    let app = setup().await?;
    let instance = create_course(&app.ctx, 50_000, 8).await?;
    let payment = app
        .ctx
        .checkout_service
        .start_checkout(book(instance.id, 1, PaymentMethod::Swish), None)
        .await?
        .payment;
    let provider_id = payment.provider_id.clone().expect("provider id");

    swish_reports(&app, &provider_id, PaymentStatus::Paid, Some(100));
    let settled = app
        .ctx
        .fulfillment_service
        .handle_swish_callback(callback(&provider_id, &payment.reference, serde_json::json!(1), "PAID"))
        .await?;
    assert_eq!(settled.status, PaymentStatus::Error);
    assert!(settled.error_message.unwrap_or_default().contains("mismatch"));

    let booking = app.ctx.booking_repo.find_by_reference(&payment.reference).await?.expect("booking");
    assert_eq!(booking.status, BookingStatus::Cancelled);
    Ok(())
}

#[tokio::test]
async fn test_paid_without_amount_or_in_other_currency_sets_error() -> anyhow::Result<()> {
    let app = setup().await?;
    let instance = create_course(&app.ctx, 50_000, 8).await?;

    for (amount_ore, currency) in [(None, Some("SEK")), (Some(50_000), Some("EUR")), (Some(50_000), None)] {
        let payment = app
            .ctx
            .checkout_service
            .start_checkout(book(instance.id, 1, PaymentMethod::Swish), None)
            .await?
            .payment;
        let provider_id = payment.provider_id.clone().expect("provider id");
        app.swish.set_outcome(
            &provider_id,
            PaymentOutcome {
                status: PaymentStatus::Paid,
                amount_ore,
                currency: currency.map(str::to_string),
                payer_alias: None,
                error_message: None,
            },
        );

        let settled = app
            .ctx
            .fulfillment_service
            .handle_swish_callback(callback(&provider_id, &payment.reference, serde_json::json!(500), "PAID"))
            .await?;
        assert_eq!(settled.status, PaymentStatus::Error, "{:?} {:?}", amount_ore, currency);

        let booking = app.ctx.booking_repo.find_by_reference(&payment.reference).await?.expect("booking");
        assert_eq!(booking.status, BookingStatus::Cancelled);
    }
    Ok(())
}

#[tokio::test]
async fn test_callback_is_confirmed_with_swish() -> anyhow::Result<()> {
    let app = setup().await?;
    let instance = create_course(&app.ctx, 50_000, 8).await?;
    let payment = app
        .ctx
        .checkout_service
        .start_checkout(book(instance.id, 1, PaymentMethod::Swish), None)
        .await?
        .payment;
    let provider_id = payment.provider_id.clone().expect("provider id");

    // An id Swish never issued is not matched by reference.
    let mut unknown = callback("DEADBEEF", &payment.reference, serde_json::json!(500), "PAID");
    unknown.amount = None;
    let result = app.ctx.fulfillment_service.handle_swish_callback(unknown).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    // The right id, but Swish still has the request as CREATED.
    let unpaid = app
        .ctx
        .fulfillment_service
        .handle_swish_callback(callback(&provider_id, &payment.reference, serde_json::json!(500), "PAID"))
        .await?;
    assert_eq!(unpaid.status, PaymentStatus::Created);
    let booking = app.ctx.booking_repo.find_by_reference(&payment.reference).await?.expect("booking");
    assert_eq!(booking.status, BookingStatus::Pending);

    // Swish reports the decline even though the body claims PAID.
    swish_reports(&app, &provider_id, PaymentStatus::Declined, Some(50_000));
    let declined = app
        .ctx
        .fulfillment_service
        .handle_swish_callback(callback(&provider_id, &payment.reference, serde_json::json!(500), "PAID"))
        .await?;
    assert_eq!(declined.status, PaymentStatus::Declined);
    Ok(())
}

#[tokio::test]
async fn test_callback_with_wrong_reference_is_rejected() -> anyhow::Result<()> {
    let app = setup().await?;
    let instance = create_course(&app.ctx, 50_000, 8).await?;
    let payment = app
        .ctx
        .checkout_service
        .start_checkout(book(instance.id, 1, PaymentMethod::Swish), None)
        .await?
        .payment;
    let provider_id = payment.provider_id.clone().expect("provider id");

    let result = app
        .ctx
        .fulfillment_service
        .handle_swish_callback(callback(&provider_id, "KWRONGREF", serde_json::json!(500), "PAID"))
        .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let stored = app.ctx.payment_repo.find_by_id(payment.id).await?.expect("payment");
    assert_eq!(stored.status, PaymentStatus::Created);
    Ok(())
}

#[tokio::test]
async fn test_idempotency_key_replays_checkout() -> anyhow::Result<()> {
    let app = setup().await?;
    let instance = create_course(&app.ctx, 50_000, 8).await?;

    let first = app
        .ctx
        .checkout_service
        .start_checkout(book(instance.id, 1, PaymentMethod::Swish), Some("double-click".to_string()))
        .await?;
    let second = app
        .ctx
        .checkout_service
        .start_checkout(book(instance.id, 1, PaymentMethod::Swish), Some("double-click".to_string()))
        .await?;

    assert!(second.replayed);
    assert_eq!(first.payment.id, second.payment.id);
    assert_eq!(app.swish.requests().len(), 1);
    assert_eq!(app.ctx.booking_repo.list_for_instance(instance.id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_capacity_counts_pending_bookings() -> anyhow::Result<()> {
    let app = setup().await?;
    let instance = create_course(&app.ctx, 50_000, 3).await?;

    app.ctx
        .checkout_service
        .start_checkout(book(instance.id, 2, PaymentMethod::Swish), None)
        .await?;

    let result = app
        .ctx
        .checkout_service
        .start_checkout(book(instance.id, 2, PaymentMethod::Invoice), None)
        .await;
    match result {
        Err(AppError::Conflict(msg)) => assert!(msg.contains("1 spots left")),
        other => panic!("expected capacity conflict, got {:?}", other.map(|o| o.payment.id)),
    }

    app.ctx
        .checkout_service
        .start_checkout(book(instance.id, 1, PaymentMethod::Invoice), None)
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_declined_booking_frees_seats() -> anyhow::Result<()> {
    let app = setup().await?;
    let instance = create_course(&app.ctx, 50_000, 2).await?;

    let payment = app
        .ctx
        .checkout_service
        .start_checkout(book(instance.id, 2, PaymentMethod::Swish), None)
        .await?
        .payment;
    let provider_id = payment.provider_id.clone().expect("provider id");
    swish_reports(&app, &provider_id, PaymentStatus::Declined, Some(100_000));
    app.ctx
        .fulfillment_service
        .handle_swish_callback(callback(&provider_id, &payment.reference, serde_json::json!(1000), "DECLINED"))
        .await?;

    let retry = app
        .ctx
        .checkout_service
        .start_checkout(book(instance.id, 2, PaymentMethod::Swish), None)
        .await?;
    assert_eq!(retry.payment.status, PaymentStatus::Created);
    Ok(())
}

#[tokio::test]
async fn test_swish_without_provider_is_unavailable() -> anyhow::Result<()> {
    let app = setup_without_swish().await?;
    let instance = create_course(&app.ctx, 50_000, 8).await?;

    let result = app
        .ctx
        .checkout_service
        .start_checkout(book(instance.id, 1, PaymentMethod::Swish), None)
        .await;
    assert!(matches!(result, Err(AppError::ServiceUnavailable(_))));
    assert!(app.ctx.booking_repo.list_for_instance(instance.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_swish_request_failure_marks_payment_error() -> anyhow::Result<()> {
    let app = setup().await?;
    let instance = create_course(&app.ctx, 50_000, 1).await?;
    app.swish.fail_next_create(true);

    let result = app
        .ctx
        .checkout_service
        .start_checkout(book(instance.id, 1, PaymentMethod::Swish), None)
        .await;
    assert!(matches!(result, Err(AppError::Payment(_))));

    let bookings = app.ctx.booking_repo.list_for_instance(instance.id).await?;
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].status, BookingStatus::Cancelled);

    // The seat is free again.
    app.ctx
        .checkout_service
        .start_checkout(book(instance.id, 1, PaymentMethod::Swish), None)
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_gift_card_purchase_and_redemption() -> anyhow::Result<()> {
    let app = setup().await?;

    let purchase = app
        .ctx
        .checkout_service
        .start_checkout(
            CheckoutRequest::BuyGiftCard {
                amount_ore: 100_000,
                buyer: customer(),
                recipient_name: Some("Sven".to_string()),
                recipient_email: Some("sven@example.se".to_string()),
                message: Some("Grattis!".to_string()),
                method: PaymentMethod::Swish,
            },
            None,
        )
        .await?
        .payment;
    assert!(purchase.reference.starts_with('P'));

    let card = app.ctx.gift_card_repo.find_by_id(purchase.subject_id).await?.expect("card");
    assert_eq!(card.status, GiftCardStatus::Pending);
    assert_eq!(card.balance_ore, 0);

    let provider_id = purchase.provider_id.clone().expect("provider id");
    swish_reports(&app, &provider_id, PaymentStatus::Paid, Some(100_000));
    app.ctx
        .fulfillment_service
        .handle_swish_callback(callback(&provider_id, &purchase.reference, serde_json::json!("1000.00"), "PAID"))
        .await?;

    let card = app.ctx.gift_card_repo.find_by_id(card.id).await?.expect("card");
    assert_eq!(card.status, GiftCardStatus::Active);
    assert_eq!(card.balance_ore, 100_000);
    assert!(card.expires_at.is_some());

    // PDF, then delivery to the recipient.
    run_jobs(&app.ctx).await?;
    let card = app.ctx.gift_card_repo.find_by_id(card.id).await?.expect("card");
    let pdf_path = card.pdf_path.clone().expect("pdf written");
    assert!(app.documents_dir.join(&pdf_path).exists());
    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "sven@example.se");
    assert!(sent[0].attachment.is_some());
    assert!(card.sent_at.is_some());

    // A second delivery job for the same card sends nothing.
    app.ctx
        .job_repo
        .enqueue(JobPayload::SendGiftCard { gift_card_id: card.id }, chrono::Utc::now())
        .await?;
    run_jobs(&app.ctx).await?;
    assert_eq!(app.mailer.sent().len(), 1);

    // Pay a 600 kr booking with the 1000 kr card.
    let instance = create_course(&app.ctx, 60_000, 8).await?;
    let booking_payment = app
        .ctx
        .checkout_service
        .start_checkout(
            CheckoutRequest::BookCourse {
                course_instance_id: instance.id,
                participants: 1,
                customer: customer(),
                method: PaymentMethod::GiftCard,
                gift_card_code: Some(card.code.to_lowercase()),
                message: None,
            },
            None,
        )
        .await?
        .payment;
    assert_eq!(booking_payment.status, PaymentStatus::Paid);
    let card_after = app.ctx.gift_card_repo.find_by_id(card.id).await?.expect("card");
    assert_eq!(card_after.balance_ore, 40_000);

    // A second 600 kr booking does not fit on the remaining balance.
    let result = app
        .ctx
        .checkout_service
        .start_checkout(
            CheckoutRequest::BookCourse {
                course_instance_id: instance.id,
                participants: 1,
                customer: customer(),
                method: PaymentMethod::GiftCard,
                gift_card_code: Some(card.code.clone()),
                message: None,
            },
            None,
        )
        .await;
    assert!(matches!(result, Err(AppError::Payment(_))));

    // Cancelling the booking puts the amount back.
    let booking = app
        .ctx
        .booking_repo
        .find_by_reference(&booking_payment.reference)
        .await?
        .expect("booking");
    app.ctx.fulfillment_service.cancel_booking(booking.id).await?;
    let restored = app.ctx.gift_card_repo.find_by_id(card.id).await?.expect("card");
    assert_eq!(restored.balance_ore, 100_000);
    assert_eq!(restored.status, GiftCardStatus::Active);
    Ok(())
}

#[tokio::test]
async fn test_gift_card_rules() -> anyhow::Result<()> {
    let app = setup().await?;

    let too_small = app
        .ctx
        .checkout_service
        .start_checkout(
            CheckoutRequest::BuyGiftCard {
                amount_ore: 100,
                buyer: customer(),
                recipient_name: None,
                recipient_email: None,
                message: None,
                method: PaymentMethod::Swish,
            },
            None,
        )
        .await;
    assert!(matches!(too_small, Err(AppError::Validation(_))));

    let by_invoice = app
        .ctx
        .checkout_service
        .start_checkout(
            CheckoutRequest::BuyGiftCard {
                amount_ore: 50_000,
                buyer: customer(),
                recipient_name: None,
                recipient_email: None,
                message: None,
                method: PaymentMethod::Invoice,
            },
            None,
        )
        .await;
    assert!(matches!(by_invoice, Err(AppError::BadRequest(_))));

    let product = create_product(&app.ctx, 30_000, 5).await?;
    let order_by_card = app
        .ctx
        .checkout_service
        .start_checkout(
            CheckoutRequest::BuyProduct {
                product_id: product.id,
                quantity: 1,
                customer: customer(),
                shipping_address: "Storgatan 1, 222 22 Lund".to_string(),
                method: PaymentMethod::GiftCard,
            },
            None,
        )
        .await;
    assert!(matches!(order_by_card, Err(AppError::BadRequest(_))));
    Ok(())
}

#[tokio::test]
async fn test_invoice_booking_generates_and_sends_invoice() -> anyhow::Result<()> {
    let app = setup().await?;
    let instance = create_course(&app.ctx, 75_000, 8).await?;

    let payment = app
        .ctx
        .checkout_service
        .start_checkout(book(instance.id, 2, PaymentMethod::Invoice), None)
        .await?
        .payment;
    assert_eq!(payment.status, PaymentStatus::Created);
    assert!(payment.provider_id.is_none());
    assert!(app.swish.requests().is_empty());

    let booking = app.ctx.booking_repo.find_by_reference(&payment.reference).await?.expect("booking");
    assert_eq!(booking.status, BookingStatus::Confirmed);

    let invoice = app
        .ctx
        .payment_repo
        .find_invoice_by_payment(payment.id)
        .await?
        .expect("invoice row");
    assert!(invoice.invoice_number >= 1001);

    let report = run_jobs(&app.ctx).await?;
    assert_eq!(report.failed, 0);

    let invoice = app.ctx.payment_repo.find_invoice(invoice.id).await?.expect("invoice");
    let pdf_path = invoice.pdf_path.clone().expect("pdf generated");
    assert!(app.documents_dir.join(&pdf_path).exists());
    assert!(invoice.sent_at.is_some());

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 2, "confirmation and invoice");
    assert!(sent.iter().any(|m| m.attachment.is_some()));
    assert!(sent.iter().all(|m| m.bcc.as_deref() == Some(ADMIN_BCC)));

    let instance = app.ctx.course_repo.find_instance(instance.id).await?.expect("instance");
    assert_eq!(instance.current_participants, 2);

    let paid = app.ctx.fulfillment_service.mark_invoice_paid(payment.id).await?;
    assert_eq!(paid.status, PaymentStatus::Paid);
    let again = app.ctx.fulfillment_service.mark_invoice_paid(payment.id).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    // Paid invoices do not send a second confirmation.
    run_jobs(&app.ctx).await?;
    assert_eq!(app.mailer.sent().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_shop_order_stock_handling() -> anyhow::Result<()> {
    let app = setup().await?;
    let product = create_product(&app.ctx, 34_900, 3).await?;

    let order = |quantity, method| CheckoutRequest::BuyProduct {
        product_id: product.id,
        quantity,
        customer: customer(),
        shipping_address: "Storgatan 1, 222 22 Lund".to_string(),
        method,
    };

    // Invoice orders take stock at checkout.
    let invoice_payment = app
        .ctx
        .checkout_service
        .start_checkout(order(2, PaymentMethod::Invoice), None)
        .await?
        .payment;
    assert!(invoice_payment.reference.starts_with('O'));
    assert_eq!(invoice_payment.amount_ore, 69_800);
    let stock = app.ctx.product_repo.find_by_id(product.id).await?.expect("product").stock;
    assert_eq!(stock, 1);

    let too_many = app
        .ctx
        .checkout_service
        .start_checkout(order(2, PaymentMethod::Swish), None)
        .await;
    assert!(matches!(too_many, Err(AppError::Conflict(_))));

    // Swish orders take stock when paid.
    let swish_payment = app
        .ctx
        .checkout_service
        .start_checkout(order(1, PaymentMethod::Swish), None)
        .await?
        .payment;
    assert_eq!(app.ctx.product_repo.find_by_id(product.id).await?.expect("product").stock, 1);

    app.ctx
        .fulfillment_service
        .apply_outcome(
            swish_payment.id,
            PaymentOutcome {
                status: PaymentStatus::Paid,
                amount_ore: Some(34_900),
                currency: Some("SEK".to_string()),
                payer_alias: None,
                error_message: None,
            },
        )
        .await?;
    assert_eq!(app.ctx.product_repo.find_by_id(product.id).await?.expect("product").stock, 0);

    let orders = app.ctx.order_repo.list(Some(OrderStatus::Paid), 10, 0).await?;
    assert_eq!(orders.len(), 1);
    let shipped = app.ctx.order_repo.mark_shipped(orders[0].id).await?;
    assert_eq!(shipped.status, OrderStatus::Shipped);
    assert!(shipped.shipped_at.is_some());
    Ok(())
}

#[tokio::test]
async fn test_refresh_status_picks_up_lost_callback() -> anyhow::Result<()> {
    let app = setup().await?;
    let instance = create_course(&app.ctx, 50_000, 8).await?;
    let payment = app
        .ctx
        .checkout_service
        .start_checkout(book(instance.id, 1, PaymentMethod::Swish), None)
        .await?
        .payment;
    let provider_id = payment.provider_id.clone().expect("provider id");

    let still_waiting = app.ctx.fulfillment_service.refresh_status(payment.id).await?;
    assert_eq!(still_waiting.status, PaymentStatus::Created);

    swish_reports(&app, &provider_id, PaymentStatus::Paid, Some(50_000));
    let refreshed = app.ctx.fulfillment_service.refresh_status(payment.id).await?;
    assert_eq!(refreshed.status, PaymentStatus::Paid);
    assert_eq!(refreshed.payer_alias.as_deref(), Some("46701234567"));
    Ok(())
}

#[tokio::test]
async fn test_cancel_unpaid_gift_card_declines_payment() -> anyhow::Result<()> {
    let app = setup().await?;
    let purchase = app
        .ctx
        .checkout_service
        .start_checkout(
            CheckoutRequest::BuyGiftCard {
                amount_ore: 50_000,
                buyer: customer(),
                recipient_name: None,
                recipient_email: None,
                message: None,
                method: PaymentMethod::Swish,
            },
            None,
        )
        .await?
        .payment;

    app.ctx.fulfillment_service.cancel_gift_card(purchase.subject_id).await?;

    let card = app.ctx.gift_card_repo.find_by_id(purchase.subject_id).await?.expect("card");
    assert_eq!(card.status, GiftCardStatus::Cancelled);
    let payment = app.ctx.payment_repo.find_by_id(purchase.id).await?.expect("payment");
    assert_eq!(payment.status, PaymentStatus::Declined);

    let again = app.ctx.fulfillment_service.cancel_gift_card(purchase.subject_id).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    // A late PAID from Swish cannot revive the card.
    let provider_id = purchase.provider_id.clone().expect("provider id");
    swish_reports(&app, &provider_id, PaymentStatus::Paid, Some(50_000));
    let late = app
        .ctx
        .fulfillment_service
        .handle_swish_callback(callback(&provider_id, &purchase.reference, serde_json::json!(500), "PAID"))
        .await?;
    assert_eq!(late.status, PaymentStatus::Declined);
    let card = app.ctx.gift_card_repo.find_by_id(card.id).await?.expect("card");
    assert_eq!(card.status, GiftCardStatus::Cancelled);
    Ok(())
}

#[tokio::test]
async fn test_issued_gift_card_expires_on_cron_tick() -> anyhow::Result<()> {
    let app = setup().await?;
    let card = app
        .ctx
        .checkout_service
        .issue_gift_card(
            80_000,
            customer(),
            Some("Sven".to_string()),
            Some("sven@example.se".to_string()),
            None,
        )
        .await?;
    assert_eq!(card.status, GiftCardStatus::Active);
    assert_eq!(card.balance_ore, 80_000);
    assert!(card.expires_at.is_some());
    assert_eq!(
        count_jobs(&app, |p| matches!(p, JobPayload::GenerateGiftCardPdf { .. })).await?,
        1
    );

    let report = run_cron_tick(app.ctx.clone()).await?;
    assert_eq!(report.expired_gift_cards, 0);
    assert_eq!(app.mailer.sent().len(), 1, "issued card is delivered");

    sqlx::query("UPDATE gift_cards SET expires_at = ? WHERE id = ?")
        .bind((chrono::Utc::now() - chrono::Duration::days(1)).naive_utc())
        .bind(card.id.to_string())
        .execute(&app.ctx.db_pool)
        .await?;

    let report = run_cron_tick(app.ctx.clone()).await?;
    assert_eq!(report.expired_gift_cards, 1);
    let expired = app.ctx.gift_card_repo.find_by_id(card.id).await?.expect("card");
    assert_eq!(expired.status, GiftCardStatus::Expired);

    let instance = create_course(&app.ctx, 50_000, 8).await?;
    let result = app
        .ctx
        .checkout_service
        .start_checkout(
            CheckoutRequest::BookCourse {
                course_instance_id: instance.id,
                participants: 1,
                customer: customer(),
                method: PaymentMethod::GiftCard,
                gift_card_code: Some(card.code.clone()),
                message: None,
            },
            None,
        )
        .await;
    assert!(matches!(result, Err(AppError::Payment(_))));
    Ok(())
}

#[tokio::test]
async fn test_failed_invoice_order_returns_stock() -> anyhow::Result<()> {
    let app = setup().await?;
    let product = create_product(&app.ctx, 25_000, 3).await?;

    let payment = app
        .ctx
        .checkout_service
        .start_checkout(
            CheckoutRequest::BuyProduct {
                product_id: product.id,
                quantity: 2,
                customer: customer(),
                shipping_address: "Storgatan 1, 222 22 Lund".to_string(),
                method: PaymentMethod::Invoice,
            },
            None,
        )
        .await?
        .payment;
    assert_eq!(app.ctx.product_repo.find_by_id(product.id).await?.expect("product").stock, 1);

    let declined = app
        .ctx
        .fulfillment_service
        .apply_outcome(
            payment.id,
            PaymentOutcome {
                status: PaymentStatus::Declined,
                amount_ore: None,
                currency: None,
                payer_alias: None,
                error_message: Some("Invoice written off".to_string()),
            },
        )
        .await?;
    assert_eq!(declined.status, PaymentStatus::Declined);

    let order = app.ctx.order_repo.find_by_id(payment.subject_id).await?.expect("order");
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(app.ctx.product_repo.find_by_id(product.id).await?.expect("product").stock, 3);
    Ok(())
}
