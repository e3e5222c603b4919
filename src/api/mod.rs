pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};
use std::sync::Arc;

use crate::{service::ServiceContext, web};
use state::AppState;

/// The whole HTTP surface: JSON API, public pages and the admin.
pub fn create_app(service_context: Arc<ServiceContext>) -> Router {
    let app_state = AppState::new(service_context);

    Router::new()
        .route("/health", get(handlers::root::health_check))
        .nest("/api", api_routes(app_state.clone()))
        .merge(web::create_web_routes(app_state.clone()))
        .with_state(app_state)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/checkout", post(handlers::checkout::create_checkout))
        .route("/payments/:id/status", get(handlers::checkout::payment_status))
        .route("/payments/swish/callback", post(handlers::checkout::swish_callback))
        .route("/courses", get(handlers::public::list_courses))
        .route("/products", get(handlers::public::list_products))
        .route("/gift-cards/:code", get(handlers::public::gift_card_balance))
        .nest("/cron", cron_routes(state))
        .layer(CorsLayer::permissive())
}

fn cron_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/process-jobs",
            get(handlers::cron::process_jobs).post(handlers::cron::process_jobs),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::cron::require_cron_secret,
        ))
}
