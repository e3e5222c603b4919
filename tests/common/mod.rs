#![allow(dead_code)]

use std::{path::PathBuf, sync::Arc};

use chrono::{Duration, Utc};
use lerhuset::{
    config::Settings,
    domain::{
        CourseInstance, CreateCourseInstanceRequest, CreateCourseTemplateRequest,
        CreateProductRequest, CustomerDetails, Product,
    },
    email::RecordingMailer,
    jobs::JobRunner,
    payments::{FakeSwish, PaymentProvider},
    service::ServiceContext,
};
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

pub const CRON_SECRET: &str = "test-cron-secret";
pub const ADMIN_BCC: &str = "studio@lerhuset.test";

pub struct TestApp {
    pub ctx: Arc<ServiceContext>,
    pub swish: Arc<FakeSwish>,
    pub mailer: Arc<RecordingMailer>,
    pub documents_dir: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.documents_dir);
    }
}

pub async fn setup() -> anyhow::Result<TestApp> {
    build(true).await
}

pub async fn setup_without_swish() -> anyhow::Result<TestApp> {
    build(false).await
}

async fn build(with_swish: bool) -> anyhow::Result<TestApp> {
    // One connection that never recycles: every new `:memory:` connection
    // would otherwise open an empty database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let documents_dir = std::env::temp_dir().join(format!("lerhuset-test-{}", Uuid::new_v4()));

    let mut settings = Settings::default();
    settings.storage.documents_dir = documents_dir.to_string_lossy().into_owned();
    settings.jobs.cron_secret = CRON_SECRET.to_string();
    settings.jobs.max_attempts = 3;
    settings.email.admin_address = Some(ADMIN_BCC.to_string());

    let swish = Arc::new(FakeSwish::new());
    let mailer = Arc::new(RecordingMailer::new());
    let provider: Option<Arc<dyn PaymentProvider>> = with_swish.then(|| swish.clone() as Arc<dyn PaymentProvider>);

    let ctx = Arc::new(ServiceContext::new(pool, settings, provider, mailer.clone()));

    Ok(TestApp {
        ctx,
        swish,
        mailer,
        documents_dir,
    })
}

pub fn customer() -> CustomerDetails {
    CustomerDetails {
        name: "Maja Lind".to_string(),
        email: "maja@example.se".to_string(),
        phone: Some("070-123 45 67".to_string()),
    }
}

/// A scheduled course a week from now.
pub async fn create_course(ctx: &ServiceContext, price_ore: i64, max_participants: i32) -> anyhow::Result<CourseInstance> {
    let template = ctx
        .course_repo
        .create_template(CreateCourseTemplateRequest {
            title: format!("Drejning {}", &Uuid::new_v4().simple().to_string()[..6]),
            slug: None,
            description: "Nybörjarkurs".to_string(),
            price_ore,
            duration_minutes: 180,
            default_max_participants: max_participants,
            image_url: None,
        })
        .await?;

    let instance = ctx
        .course_repo
        .create_instance(CreateCourseInstanceRequest {
            template_id: template.id,
            starts_at: Utc::now() + Duration::days(7),
            ends_at: None,
            max_participants: None,
            notes: None,
        })
        .await?;
    Ok(instance)
}

pub async fn create_product(ctx: &ServiceContext, price_ore: i64, stock: i32) -> anyhow::Result<Product> {
    let product = ctx
        .product_repo
        .create(CreateProductRequest {
            name: format!("Mugg {}", &Uuid::new_v4().simple().to_string()[..6]),
            slug: None,
            description: "Stengods".to_string(),
            price_ore,
            stock,
            image_url: None,
            published: true,
        })
        .await?;
    Ok(product)
}

pub async fn run_jobs(ctx: &Arc<ServiceContext>) -> anyhow::Result<lerhuset::domain::BatchReport> {
    Ok(JobRunner::new(ctx.clone()).process_batch(50).await?)
}
