use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;
use crate::domain::*;
use crate::error::{AppError, Result};

pub mod admin_repository;
pub mod booking_repository;
pub mod course_repository;
pub mod gift_card_repository;
pub mod job_repository;
pub mod order_repository;
pub mod payment_repository;
pub mod product_repository;

pub use admin_repository::SqliteAdminRepository;
pub use booking_repository::SqliteBookingRepository;
pub use course_repository::SqliteCourseRepository;
pub use gift_card_repository::SqliteGiftCardRepository;
pub use job_repository::SqliteJobRepository;
pub use order_repository::SqliteOrderRepository;
pub use payment_repository::SqlitePaymentRepository;
pub use product_repository::SqliteProductRepository;

#[async_trait]
pub trait AdminRepository: Send + Sync {
    async fn create(&self, email: &str, full_name: &str, password_hash: &str) -> Result<AdminUser>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<AdminUser>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<AdminUser>>;
    async fn get_password_hash(&self, email: &str) -> Result<Option<String>>;
    async fn record_login(&self, id: Uuid) -> Result<()>;
    async fn count(&self) -> Result<i64>;
}

#[async_trait]
pub trait CourseRepository: Send + Sync {
    async fn create_template(&self, request: CreateCourseTemplateRequest) -> Result<CourseTemplate>;
    async fn find_template(&self, id: Uuid) -> Result<Option<CourseTemplate>>;
    async fn find_template_by_slug(&self, slug: &str) -> Result<Option<CourseTemplate>>;
    async fn list_templates(&self, active_only: bool) -> Result<Vec<CourseTemplate>>;
    async fn update_template(&self, id: Uuid, update: UpdateCourseTemplateRequest) -> Result<CourseTemplate>;
    async fn delete_template(&self, id: Uuid) -> Result<()>;
    async fn create_instance(&self, request: CreateCourseInstanceRequest) -> Result<CourseInstance>;
    async fn find_instance(&self, id: Uuid) -> Result<Option<CourseInstance>>;
    async fn list_instances_for_template(&self, template_id: Uuid, upcoming_only: bool) -> Result<Vec<CourseInstance>>;
    async fn list_upcoming_instances(&self, limit: i64) -> Result<Vec<CourseInstance>>;
    async fn set_instance_status(&self, id: Uuid, status: CourseInstanceStatus) -> Result<CourseInstance>;
    /// Recomputes `current_participants` from confirmed bookings and returns it.
    async fn recount_participants(&self, id: Uuid) -> Result<i32>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>>;
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>>;
    async fn list(&self, status: Option<BookingStatus>, limit: i64, offset: i64) -> Result<Vec<Booking>>;
    async fn list_for_instance(&self, course_instance_id: Uuid) -> Result<Vec<Booking>>;
    async fn update_status(&self, id: Uuid, status: BookingStatus) -> Result<Booking>;
}

#[async_trait]
pub trait GiftCardRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<GiftCard>>;
    async fn find_by_code(&self, code: &str) -> Result<Option<GiftCard>>;
    async fn list(&self, status: Option<GiftCardStatus>, limit: i64, offset: i64) -> Result<Vec<GiftCard>>;
    async fn update_status(&self, id: Uuid, status: GiftCardStatus) -> Result<GiftCard>;
    async fn set_pdf_path(&self, id: Uuid, pdf_path: &str) -> Result<()>;
    async fn mark_sent(&self, id: Uuid) -> Result<()>;
    /// Marks active cards past `expires_at` as expired. Returns how many changed.
    async fn expire_overdue(&self) -> Result<u64>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn create(&self, request: CreateProductRequest) -> Result<Product>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Product>>;
    async fn list(&self, published_only: bool) -> Result<Vec<Product>>;
    async fn update(&self, id: Uuid, update: UpdateProductRequest) -> Result<Product>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ShopOrder>>;
    async fn list(&self, status: Option<OrderStatus>, limit: i64, offset: i64) -> Result<Vec<ShopOrder>>;
    async fn mark_shipped(&self, id: Uuid) -> Result<ShopOrder>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn find_by_provider_id(&self, provider_id: &str) -> Result<Option<Payment>>;
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>>;
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>>;
    async fn find_by_subject(&self, kind: PaymentKind, subject_id: Uuid) -> Result<Vec<Payment>>;
    async fn list(&self, status: Option<PaymentStatus>, limit: i64, offset: i64) -> Result<Vec<Payment>>;
    /// Swish payments still `CREATED` that were created before `cutoff`.
    async fn list_stale_created(&self, method: PaymentMethod, cutoff: DateTime<Utc>) -> Result<Vec<Payment>>;
    async fn set_provider_id(&self, id: Uuid, provider_id: &str) -> Result<()>;
    async fn sum_paid_since(&self, since: DateTime<Utc>) -> Result<i64>;
    async fn find_invoice(&self, id: Uuid) -> Result<Option<Invoice>>;
    async fn find_invoice_by_payment(&self, payment_id: Uuid) -> Result<Option<Invoice>>;
    async fn set_invoice_pdf(&self, id: Uuid, pdf_path: &str) -> Result<()>;
    async fn mark_invoice_sent(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn enqueue(&self, payload: JobPayload, run_at: DateTime<Utc>) -> Result<BackgroundJob>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<BackgroundJob>>;
    /// Moves the oldest due pending job to `processing` and returns it.
    async fn claim_next(&self) -> Result<Option<BackgroundJob>>;
    async fn mark_completed(&self, id: Uuid) -> Result<()>;
    /// Back to `pending` at `retry_at`, or `failed` when `retry_at` is `None`.
    async fn mark_failed(&self, id: Uuid, error: &str, retry_at: Option<DateTime<Utc>>) -> Result<()>;
    async fn recover_stale(&self, locked_before: DateTime<Utc>) -> Result<u64>;
    async fn retry(&self, id: Uuid) -> Result<BackgroundJob>;
    async fn list(&self, status: Option<JobStatus>, limit: i64) -> Result<Vec<BackgroundJob>>;
    async fn count_by_status(&self, status: JobStatus) -> Result<i64>;
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| AppError::Database(e.to_string()))
}

pub(crate) fn to_utc(value: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(value, Utc)
}
