use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lerhuset::{
    api,
    auth::AuthService,
    config::Settings,
    email::{LogMailer, Mailer, SmtpMailer},
    jobs,
    payments::{PaymentProvider, SwishClient},
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lerhuset=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!("Starting Lerhuset on {}:{}", settings.server.host, settings.server.port);

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    sqlx::migrate!("./migrations").run(&db_pool).await?;

    let provider: Option<Arc<dyn PaymentProvider>> = if settings.swish.enabled {
        tracing::info!(api_url = %settings.swish.api_url, "Swish payments enabled");
        Some(Arc::new(SwishClient::new(&settings.swish)?))
    } else {
        tracing::info!("Swish payments disabled");
        None
    };

    let mailer: Arc<dyn Mailer> = if settings.email.enabled {
        tracing::info!(host = %settings.email.smtp_host, "SMTP email enabled");
        Arc::new(SmtpMailer::new(&settings.email)?)
    } else {
        tracing::info!("SMTP disabled, outgoing email is only logged");
        Arc::new(LogMailer)
    };

    let poll_interval = settings.jobs.poll_interval_secs;
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);
    let service_context = Arc::new(ServiceContext::new(db_pool, settings, provider, mailer));

    bootstrap_admin(&service_context).await?;

    if poll_interval > 0 {
        jobs::spawn_poller(service_context.clone(), poll_interval);
    }

    let app = api::create_app(service_context);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Creates the first admin from LERHUSET_ADMIN_EMAIL / LERHUSET_ADMIN_PASSWORD
/// when the admin table is empty.
async fn bootstrap_admin(ctx: &ServiceContext) -> anyhow::Result<()> {
    if ctx.admin_repo.count().await? > 0 {
        return Ok(());
    }

    let (Ok(email), Ok(password)) = (
        std::env::var("LERHUSET_ADMIN_EMAIL"),
        std::env::var("LERHUSET_ADMIN_PASSWORD"),
    ) else {
        tracing::warn!("No admin accounts exist; set LERHUSET_ADMIN_EMAIL and LERHUSET_ADMIN_PASSWORD or run the seed binary");
        return Ok(());
    };

    let hash = AuthService::hash_password(&password).await?;
    let admin = ctx.admin_repo.create(&email, "Administratör", &hash).await?;
    tracing::info!(admin_id = %admin.id, email = %admin.email, "Created initial admin account");
    Ok(())
}
