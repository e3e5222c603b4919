mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use common::{create_course, customer, setup, TestApp, CRON_SECRET};
use lerhuset::{
    api::create_app,
    auth::AuthService,
    domain::{
        BookingStatus, CheckoutRequest, CourseInstanceStatus, GiftCardStatus, JobPayload, JobStatus,
        PaymentMethod, PaymentOutcome, PaymentStatus,
    },
};
use tower::ServiceExt;
use uuid::Uuid;

fn app(test: &TestApp) -> Router {
    create_app(test.ctx.clone())
}

async fn body_json(response: axum::response::Response) -> anyhow::Result<serde_json::Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Session cookie and CSRF token for a fresh admin.
async fn admin_session(test: &TestApp) -> anyhow::Result<(String, String)> {
    let hash = AuthService::hash_password("lera-och-glasyr").await?;
    let admin = test.ctx.admin_repo.create("admin@lerhuset.test", "Studioadmin", &hash).await?;
    let (session, token) = test.ctx.auth_service.create_session(admin.id).await?;
    let csrf = test.ctx.csrf_service.generate_token(&session.id);
    Ok((format!("lerhuset_admin={}", token), csrf))
}

fn admin_post(path: &str, cookie: &str, csrf: Option<&str>, body: &str) -> anyhow::Result<Request<Body>> {
    let mut request = Request::post(path)
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(token) = csrf {
        request = request.header("x-csrf-token", token);
    }
    Ok(request.body(Body::from(body.to_string()))?)
}

fn location(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_health_check() -> anyhow::Result<()> {
    let test = setup().await?;
    let response = app(&test)
        .oneshot(Request::get("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await?["status"], "healthy");
    Ok(())
}

#[tokio::test]
async fn test_cron_requires_secret() -> anyhow::Result<()> {
    let test = setup().await?;

    let missing = app(&test)
        .oneshot(Request::post("/api/cron/process-jobs").body(Body::empty())?)
        .await?;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = app(&test)
        .oneshot(
            Request::post("/api/cron/process-jobs")
                .header(header::AUTHORIZATION, "Bearer nope")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    test.ctx
        .job_repo
        .enqueue(JobPayload::RecountParticipants { course_instance_id: Uuid::new_v4() }, Utc::now())
        .await?;
    let ok = app(&test)
        .oneshot(
            Request::get("/api/cron/process-jobs")
                .header(header::AUTHORIZATION, format!("Bearer {}", CRON_SECRET))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(ok.status(), StatusCode::OK);
    let report = body_json(ok).await?;
    assert_eq!(report["batch"]["processed"], 1);
    Ok(())
}

#[tokio::test]
async fn test_checkout_api_and_status() -> anyhow::Result<()> {
    let test = setup().await?;
    let instance = create_course(&test.ctx, 50_000, 8).await?;

    let body = serde_json::json!({
        "type": "book_course",
        "course_instance_id": instance.id,
        "participants": 1,
        "customer": {"name": "Maja Lind", "email": "maja@example.se", "phone": "0701234567"},
        "method": "swish",
        "gift_card_code": null,
        "message": null
    });
    let request = || -> anyhow::Result<Request<Body>> {
        Ok(Request::post("/api/checkout")
            .header(header::CONTENT_TYPE, "application/json")
            .header("idempotency-key", "api-key-1")
            .body(Body::from(body.to_string()))?)
    };

    let created = app(&test).oneshot(request()?).await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = body_json(created).await?;
    let payment_id = created["payment_id"].as_str().expect("payment id").to_string();

    let replayed = app(&test).oneshot(request()?).await?;
    assert_eq!(replayed.status(), StatusCode::OK);
    assert_eq!(body_json(replayed).await?["payment_id"], payment_id.as_str());

    let status = app(&test)
        .oneshot(Request::get(format!("/api/payments/{}/status", payment_id)).body(Body::empty())?)
        .await?;
    assert_eq!(status.status(), StatusCode::OK);
    assert_eq!(body_json(status).await?["status"], "CREATED");

    let provider_id = test.swish.last_provider_id().expect("swish request");
    test.swish.set_outcome(
        &provider_id,
        PaymentOutcome {
            status: PaymentStatus::Paid,
            amount_ore: Some(50_000),
            currency: Some("SEK".to_string()),
            payer_alias: Some("46701234567".to_string()),
            error_message: None,
        },
    );
    let callback = serde_json::json!({
        "id": provider_id,
        "payeePaymentReference": created["reference"],
        "paymentReference": "6D6CD7406ECE4542A80152D909EF9F6B",
        "payerAlias": "46701234567",
        "amount": 500,
        "currency": "SEK",
        "status": "PAID"
    });
    let response = app(&test)
        .oneshot(
            Request::post("/api/payments/swish/callback")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(callback.to_string()))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let status = app(&test)
        .oneshot(Request::get(format!("/api/payments/{}/status", payment_id)).body(Body::empty())?)
        .await?;
    assert_eq!(body_json(status).await?["status"], "PAID");
    Ok(())
}

#[tokio::test]
async fn test_forged_swish_callback_does_not_settle_payment() -> anyhow::Result<()> {
    let test = setup().await?;
    let instance = create_course(&test.ctx, 50_000, 8).await?;
    let payment = test
        .ctx
        .checkout_service
        .start_checkout(
            lerhuset::domain::CheckoutRequest::BookCourse {
                course_instance_id: instance.id,
                participants: 1,
                customer: common::customer(),
                method: lerhuset::domain::PaymentMethod::Swish,
                gift_card_code: None,
                message: None,
            },
            None,
        )
        .await?
        .payment;
    let provider_id = payment.provider_id.clone().expect("provider id");

    let post = |body: serde_json::Value| -> anyhow::Result<Request<Body>> {
        Ok(Request::post("/api/payments/swish/callback")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))?)
    };

    // Guessed id plus the reference the customer can see.
    let forged = app(&test)
        .oneshot(post(serde_json::json!({
            "id": "DEADBEEF",
            "payeePaymentReference": payment.reference,
            "status": "PAID"
        }))?)
        .await?;
    assert_eq!(forged.status(), StatusCode::NOT_FOUND);

    // Real id, but Swish has not been paid.
    let unpaid = app(&test)
        .oneshot(post(serde_json::json!({
            "id": provider_id,
            "payeePaymentReference": payment.reference,
            "status": "PAID"
        }))?)
        .await?;
    assert_eq!(unpaid.status(), StatusCode::OK);

    let stored = test.ctx.payment_repo.find_by_id(payment.id).await?.expect("payment");
    assert_eq!(stored.status, PaymentStatus::Created);
    let booking = test.ctx.booking_repo.find_by_reference(&payment.reference).await?.expect("booking");
    assert_eq!(booking.status, lerhuset::domain::BookingStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn test_checkout_validation_error_is_422() -> anyhow::Result<()> {
    let test = setup().await?;
    let instance = create_course(&test.ctx, 50_000, 8).await?;

    let body = serde_json::json!({
        "type": "book_course",
        "course_instance_id": instance.id,
        "participants": 1,
        "customer": {"name": "Maja Lind", "email": "not-an-email", "phone": null},
        "method": "invoice",
        "gift_card_code": null,
        "message": null
    });
    let response = app(&test)
        .oneshot(
            Request::post("/api/checkout")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

#[tokio::test]
async fn test_public_pages_render() -> anyhow::Result<()> {
    let test = setup().await?;
    create_course(&test.ctx, 50_000, 8).await?;

    for path in ["/", "/courses", "/gift-cards", "/shop", "/gift-cards?code=NOPE-NOPE"] {
        let response = app(&test)
            .oneshot(Request::get(path).body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK, "GET {}", path);
    }
    Ok(())
}

#[tokio::test]
async fn test_admin_requires_login() -> anyhow::Result<()> {
    let test = setup().await?;
    let response = app(&test)
        .oneshot(Request::get("/admin/bookings").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/admin/login");
    Ok(())
}

#[tokio::test]
async fn test_admin_login_sets_session_cookie() -> anyhow::Result<()> {
    let test = setup().await?;
    let hash = AuthService::hash_password("lera-och-glasyr").await?;
    test.ctx.admin_repo.create("admin@lerhuset.test", "Studioadmin", &hash).await?;

    let wrong = app(&test)
        .oneshot(
            Request::post("/admin/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("email=admin%40lerhuset.test&password=fel"))?,
        )
        .await?;
    assert_eq!(wrong.status(), StatusCode::OK);
    assert!(wrong.headers().get(header::SET_COOKIE).is_none());

    let response = app(&test)
        .oneshot(
            Request::post("/admin/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("email=Admin%40lerhuset.test&password=lera-och-glasyr"))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let cookie = response.headers()[header::SET_COOKIE].to_str()?.to_string();
    assert!(cookie.starts_with("lerhuset_admin="));
    assert!(cookie.contains("HttpOnly"));

    let session = cookie.split(';').next().unwrap_or_default().to_string();
    let dashboard = app(&test)
        .oneshot(Request::get("/admin").header(header::COOKIE, session).body(Body::empty())?)
        .await?;
    assert_eq!(dashboard.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_admin_pages_render() -> anyhow::Result<()> {
    let test = setup().await?;
    let instance = create_course(&test.ctx, 50_000, 8).await?;
    let (cookie, _) = admin_session(&test).await?;

    let paths = [
        "/admin".to_string(),
        "/admin/courses".to_string(),
        format!("/admin/courses/{}", instance.template_id),
        format!("/admin/instances/{}", instance.id),
        "/admin/bookings?status=Pending".to_string(),
        "/admin/gift-cards".to_string(),
        "/admin/products".to_string(),
        "/admin/orders".to_string(),
        "/admin/payments?status=CREATED".to_string(),
        "/admin/jobs?status=failed".to_string(),
        "/admin/settings".to_string(),
    ];
    for path in paths {
        let response = app(&test)
            .oneshot(Request::get(&path).header(header::COOKIE, &cookie).body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK, "GET {}", path);
    }
    Ok(())
}

#[tokio::test]
async fn test_admin_post_requires_csrf_token() -> anyhow::Result<()> {
    let test = setup().await?;
    let (cookie, csrf) = admin_session(&test).await?;

    let form = |body: String| -> anyhow::Result<Request<Body>> {
        Ok(Request::post("/admin/settings")
            .header(header::COOKIE, &cookie)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))?)
    };

    let rejected = app(&test)
        .oneshot(form("key=checkout.invoice_due_days&value=14".to_string())?)
        .await?;
    assert_eq!(rejected.status(), StatusCode::FORBIDDEN);

    let forged = app(&test)
        .oneshot(form("key=checkout.invoice_due_days&value=14&csrf_token=deadbeef".to_string())?)
        .await?;
    assert_eq!(forged.status(), StatusCode::FORBIDDEN);

    let accepted = app(&test)
        .oneshot(form(format!(
            "key=checkout.invoice_due_days&value=14&csrf_token={}",
            urlencoding::encode(&csrf)
        ))?)
        .await?;
    assert_eq!(accepted.status(), StatusCode::SEE_OTHER);
    let location = accepted.headers()[header::LOCATION].to_str()?;
    assert!(location.starts_with("/admin/settings?notice="));

    let config = test.ctx.settings_service.checkout_config().await?;
    assert_eq!(config.invoice_due_days, 14);
    Ok(())
}

#[tokio::test]
async fn test_admin_marks_invoice_paid() -> anyhow::Result<()> {
    let test = setup().await?;
    let (cookie, csrf) = admin_session(&test).await?;
    let instance = create_course(&test.ctx, 75_000, 8).await?;
    let payment = test
        .ctx
        .checkout_service
        .start_checkout(
            CheckoutRequest::BookCourse {
                course_instance_id: instance.id,
                participants: 1,
                customer: customer(),
                method: PaymentMethod::Invoice,
                gift_card_code: None,
                message: None,
            },
            None,
        )
        .await?
        .payment;
    let path = format!("/admin/payments/{}/mark-paid", payment.id);

    let rejected = app(&test).oneshot(admin_post(&path, &cookie, None, "")?).await?;
    assert_eq!(rejected.status(), StatusCode::FORBIDDEN);
    let unchanged = test.ctx.payment_repo.find_by_id(payment.id).await?.expect("payment");
    assert_eq!(unchanged.status, PaymentStatus::Created);

    let accepted = app(&test).oneshot(admin_post(&path, &cookie, Some(&csrf), "")?).await?;
    assert_eq!(accepted.status(), StatusCode::SEE_OTHER);
    assert!(location(&accepted).starts_with("/admin/payments?notice="));
    let paid = test.ctx.payment_repo.find_by_id(payment.id).await?.expect("payment");
    assert_eq!(paid.status, PaymentStatus::Paid);

    // A second click reports the conflict instead of failing silently.
    let again = app(&test).oneshot(admin_post(&path, &cookie, Some(&csrf), "")?).await?;
    assert_eq!(again.status(), StatusCode::SEE_OTHER);
    assert!(location(&again).starts_with("/admin/payments?error="));
    Ok(())
}

#[tokio::test]
async fn test_admin_retries_failed_job() -> anyhow::Result<()> {
    let test = setup().await?;
    let (cookie, csrf) = admin_session(&test).await?;
    let job = test
        .ctx
        .job_repo
        .enqueue(JobPayload::SendGiftCard { gift_card_id: Uuid::new_v4() }, Utc::now())
        .await?;
    let path = format!("/admin/jobs/{}/retry", job.id);

    // Pending jobs cannot be retried.
    let early = app(&test).oneshot(admin_post(&path, &cookie, Some(&csrf), "")?).await?;
    assert!(location(&early).starts_with("/admin/jobs?error="));

    sqlx::query("UPDATE background_jobs SET status = 'failed', attempts = 5 WHERE id = ?")
        .bind(job.id.to_string())
        .execute(&test.ctx.db_pool)
        .await?;

    let rejected = app(&test).oneshot(admin_post(&path, &cookie, None, "")?).await?;
    assert_eq!(rejected.status(), StatusCode::FORBIDDEN);

    let accepted = app(&test).oneshot(admin_post(&path, &cookie, Some(&csrf), "")?).await?;
    assert_eq!(accepted.status(), StatusCode::SEE_OTHER);
    assert!(location(&accepted).starts_with("/admin/jobs?notice="));
    let retried = test.ctx.job_repo.find_by_id(job.id).await?.expect("job");
    assert_eq!(retried.status, JobStatus::Pending);
    assert_eq!(retried.attempts, 0);
    Ok(())
}

#[tokio::test]
async fn test_admin_issues_gift_card() -> anyhow::Result<()> {
    let test = setup().await?;
    let (cookie, csrf) = admin_session(&test).await?;
    let body = format!(
        "amount_kr=800&buyer_name=Maja+Lind&buyer_email=maja%40example.se&recipient_name=Sven&recipient_email=sven%40example.se&csrf_token={}",
        urlencoding::encode(&csrf)
    );

    let response = app(&test).oneshot(admin_post("/admin/gift-cards", &cookie, None, &body)?).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/admin/gift-cards?notice="));

    let cards = test.ctx.gift_card_repo.list(None, 10, 0).await?;
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].status, GiftCardStatus::Active);
    assert_eq!(cards[0].balance_ore, 80_000);
    assert_eq!(cards[0].recipient_email.as_deref(), Some("sven@example.se"));

    let invalid = format!(
        "amount_kr=mycket&buyer_name=Maja&buyer_email=maja%40example.se&csrf_token={}",
        urlencoding::encode(&csrf)
    );
    let response = app(&test).oneshot(admin_post("/admin/gift-cards", &cookie, None, &invalid)?).await?;
    assert!(location(&response).starts_with("/admin/gift-cards?error="));
    assert_eq!(test.ctx.gift_card_repo.list(None, 10, 0).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_admin_cancels_course_date() -> anyhow::Result<()> {
    let test = setup().await?;
    let (cookie, csrf) = admin_session(&test).await?;
    let instance = create_course(&test.ctx, 60_000, 8).await?;
    let card = test
        .ctx
        .checkout_service
        .issue_gift_card(100_000, customer(), None, None, None)
        .await?;

    let book = |method: PaymentMethod, code: Option<String>| CheckoutRequest::BookCourse {
        course_instance_id: instance.id,
        participants: 1,
        customer: customer(),
        method,
        gift_card_code: code,
        message: None,
    };
    let by_card = test
        .ctx
        .checkout_service
        .start_checkout(book(PaymentMethod::GiftCard, Some(card.code.clone())), None)
        .await?
        .payment;
    assert_eq!(by_card.status, PaymentStatus::Paid);
    let drawn = test.ctx.gift_card_repo.find_by_id(card.id).await?.expect("card");
    assert_eq!(drawn.balance_ore, 40_000);
    let by_invoice = test
        .ctx
        .checkout_service
        .start_checkout(book(PaymentMethod::Invoice, None), None)
        .await?
        .payment;

    let path = format!("/admin/instances/{}/cancel", instance.id);
    let response = app(&test).oneshot(admin_post(&path, &cookie, Some(&csrf), "")?).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with(&format!("/admin/instances/{}?notice=", instance.id)));

    let cancelled = test.ctx.course_repo.find_instance(instance.id).await?.expect("instance");
    assert_eq!(cancelled.status, CourseInstanceStatus::Cancelled);
    assert_eq!(cancelled.current_participants, 0);
    for booking in test.ctx.booking_repo.list_for_instance(instance.id).await? {
        assert_eq!(booking.status, BookingStatus::Cancelled);
    }

    let restored = test.ctx.gift_card_repo.find_by_id(card.id).await?.expect("card");
    assert_eq!(restored.balance_ore, 100_000);
    let invoice_payment = test.ctx.payment_repo.find_by_id(by_invoice.id).await?.expect("payment");
    assert_eq!(invoice_payment.status, PaymentStatus::Declined);
    Ok(())
}
