use std::sync::Arc;

use chrono::{Duration, Timelike, Utc};
use clap::Parser;
use fake::{
    faker::{internet::en::SafeEmail, name::en::Name},
    Fake,
};
use lerhuset::{
    auth::AuthService,
    config::Settings,
    domain::{
        CheckoutRequest, CreateCourseInstanceRequest, CreateCourseTemplateRequest,
        CreateProductRequest, CustomerDetails, PaymentMethod,
    },
    email::LogMailer,
    service::ServiceContext,
};
use sqlx::sqlite::SqlitePoolOptions;

#[derive(Debug, Parser)]
#[command(about = "Fill a Lerhuset database with sample courses, products and bookings")]
struct Args {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://lerhuset.db?mode=rwc")]
    database_url: String,

    #[arg(long, default_value = "admin@lerhuset.local")]
    admin_email: String,

    #[arg(long, default_value = "admin123")]
    admin_password: String,

    /// Number of invoice bookings with generated customers.
    #[arg(long, default_value_t = 0)]
    fake_bookings: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    println!("🌱 Starting database seeding...");

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&args.database_url)
        .await?;

    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    let mut settings = Settings::default();
    settings.database.url = args.database_url.clone();
    let ctx = ServiceContext::new(db_pool, settings, None, Arc::new(LogMailer));

    println!("🔑 Creating admin...");
    if ctx.admin_repo.find_by_email(&args.admin_email).await?.is_none() {
        let hash = AuthService::hash_password(&args.admin_password).await?;
        ctx.admin_repo.create(&args.admin_email, "Studioadmin", &hash).await?;
        println!("  ✅ Created admin ({} / {})", args.admin_email, args.admin_password);
    } else {
        println!("  ⏭️  Admin {} already exists", args.admin_email);
    }

    println!("🏺 Creating courses...");
    let courses = [
        ("Drejning för nybörjare", "Fyra timmar vid drejskivan. Vi går igenom centrering, uppdragning och formning, och du gör två till tre egna skålar.", 95_000, 240, 8),
        ("Handbyggnad", "Bygg med kavel- och ringteknik. Passar alla åldrar från tolv år.", 65_000, 180, 10),
        ("Glaseringskväll", "Glasera det du drejat. Biskvitbränt gods ingår.", 45_000, 150, 12),
    ];

    let mut instances = Vec::new();
    let base = Utc::now()
        .with_hour(16)
        .and_then(|t| t.with_minute(0))
        .unwrap_or_else(Utc::now);

    for (index, (title, description, price_ore, duration, max)) in courses.into_iter().enumerate() {
        let template = ctx
            .course_repo
            .create_template(CreateCourseTemplateRequest {
                title: title.to_string(),
                slug: None,
                description: description.to_string(),
                price_ore,
                duration_minutes: duration,
                default_max_participants: max,
                image_url: None,
            })
            .await?;

        for week in 1..=3i64 {
            let instance = ctx
                .course_repo
                .create_instance(CreateCourseInstanceRequest {
                    template_id: template.id,
                    starts_at: base + Duration::days(week * 7 + index as i64),
                    ends_at: None,
                    max_participants: None,
                    notes: None,
                })
                .await?;
            instances.push(instance);
        }
    }
    println!("  ✅ Created {} courses with {} dates", courses.len(), instances.len());

    println!("🛍️  Creating products...");
    let products = [
        ("Kaffemugg, järnröd", "Drejad stengodsmugg, 3 dl. Tål diskmaskin.", 34_900, 12),
        ("Frukostskål", "Skål i ljus askglasyr, ca 15 cm.", 42_000, 8),
        ("Serveringsfat", "Stort handbyggt fat med ojämn kant.", 89_000, 2),
    ];
    for (name, description, price_ore, stock) in products {
        ctx.product_repo
            .create(CreateProductRequest {
                name: name.to_string(),
                slug: None,
                description: description.to_string(),
                price_ore,
                stock,
                image_url: None,
                published: true,
            })
            .await?;
    }
    println!("  ✅ Created {} products", products.len());

    if args.fake_bookings > 0 {
        println!("📅 Creating {} invoice bookings...", args.fake_bookings);
        let mut created = 0;
        for n in 0..args.fake_bookings {
            let instance = &instances[n % instances.len()];
            let request = CheckoutRequest::BookCourse {
                course_instance_id: instance.id,
                participants: 1 + (n % 2) as i32,
                customer: CustomerDetails {
                    name: Name().fake(),
                    email: SafeEmail().fake(),
                    phone: None,
                },
                method: PaymentMethod::Invoice,
                gift_card_code: None,
                message: None,
            };
            match ctx.checkout_service.start_checkout(request, None).await {
                Ok(_) => created += 1,
                Err(e) => println!("  ⚠️  Skipped booking: {}", e),
            }
        }
        println!("  ✅ Created {} bookings (invoices are generated when jobs run)", created);
    }

    println!("\n✨ Database seeding complete!");
    println!("\n📝 Admin login: {} / {}", args.admin_email, args.admin_password);

    Ok(())
}
