pub mod checkout_service;
pub mod fulfillment_service;
pub mod settings_service;

use std::sync::Arc;
use sqlx::SqlitePool;
use crate::repository::*;
use crate::auth::{AuthService, CsrfService};
use crate::config::Settings;
use crate::documents::DocumentStore;
use crate::email::Mailer;
use crate::payments::PaymentProvider;
use checkout_service::CheckoutService;
use fulfillment_service::FulfillmentService;
use settings_service::SettingsService;

/// Everything a request handler or background job needs, built once at startup.
pub struct ServiceContext {
    pub admin_repo: Arc<dyn AdminRepository>,
    pub course_repo: Arc<dyn CourseRepository>,
    pub booking_repo: Arc<dyn BookingRepository>,
    pub gift_card_repo: Arc<dyn GiftCardRepository>,
    pub product_repo: Arc<dyn ProductRepository>,
    pub order_repo: Arc<dyn OrderRepository>,
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub job_repo: Arc<dyn JobRepository>,
    pub auth_service: Arc<AuthService>,
    pub csrf_service: Arc<CsrfService>,
    pub settings_service: Arc<SettingsService>,
    pub checkout_service: Arc<CheckoutService>,
    pub fulfillment_service: Arc<FulfillmentService>,
    pub mailer: Arc<dyn Mailer>,
    pub documents: Arc<DocumentStore>,
    pub app_config: Arc<Settings>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(
        db_pool: SqlitePool,
        app_config: Settings,
        provider: Option<Arc<dyn PaymentProvider>>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let max_attempts = app_config.jobs.max_attempts;

        let admin_repo = Arc::new(SqliteAdminRepository::new(db_pool.clone()));
        let course_repo = Arc::new(SqliteCourseRepository::new(db_pool.clone()));
        let booking_repo = Arc::new(SqliteBookingRepository::new(db_pool.clone()));
        let gift_card_repo: Arc<dyn GiftCardRepository> =
            Arc::new(SqliteGiftCardRepository::new(db_pool.clone()));
        let product_repo = Arc::new(SqliteProductRepository::new(db_pool.clone()));
        let order_repo = Arc::new(SqliteOrderRepository::new(db_pool.clone()));
        let payment_repo: Arc<dyn PaymentRepository> =
            Arc::new(SqlitePaymentRepository::new(db_pool.clone()));
        let job_repo = Arc::new(SqliteJobRepository::new(db_pool.clone(), max_attempts));

        let auth_service = Arc::new(AuthService::new(
            db_pool.clone(),
            app_config.auth.session_duration_hours,
        ));
        let csrf_service = Arc::new(CsrfService::new(&app_config.auth.csrf_secret));
        let settings_service = Arc::new(SettingsService::new(db_pool.clone()));

        let fulfillment_service = Arc::new(FulfillmentService::new(
            db_pool.clone(),
            payment_repo.clone(),
            provider.clone(),
            settings_service.clone(),
            max_attempts,
        ));
        let checkout_service = Arc::new(CheckoutService::new(
            db_pool.clone(),
            payment_repo.clone(),
            gift_card_repo.clone(),
            provider,
            settings_service.clone(),
            fulfillment_service.clone(),
            app_config.swish_callback_url(),
            max_attempts,
        ));

        let documents = Arc::new(DocumentStore::new(&app_config.storage.documents_dir));

        Self {
            admin_repo,
            course_repo,
            booking_repo,
            gift_card_repo,
            product_repo,
            order_repo,
            payment_repo,
            job_repo,
            auth_service,
            csrf_service,
            settings_service,
            checkout_service,
            fulfillment_service,
            mailer,
            documents,
            app_config: Arc::new(app_config),
            db_pool,
        }
    }
}
