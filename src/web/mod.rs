pub mod admin;
pub mod public;
pub mod templates;

use axum::{
    Router,
    middleware,
    routing::{get, post},
};
use crate::api::state::AppState;

pub fn create_web_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Public site
        .route("/", get(public::home_page))
        .route("/courses", get(public::courses_page))
        .route("/courses/:slug", get(public::course_page))
        .route("/gift-cards", get(public::gift_cards_page))
        .route("/shop", get(public::shop_page))
        .route("/shop/:slug", get(public::product_page))
        .route("/checkout/booking", post(public::checkout_booking))
        .route("/checkout/gift-card", post(public::checkout_gift_card))
        .route("/checkout/product", post(public::checkout_product))
        .route("/checkout/:payment_id", get(public::checkout_status_page))

        // Admin login is the only admin page reachable without a session
        .route("/admin/login", get(templates::auth::login_page))
        .route("/admin/login", post(templates::auth::login_handler))
        .nest("/admin", admin_routes(state))
}

fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(admin::dashboard::dashboard_page))
        .route("/logout", post(templates::auth::logout_handler))
        // Courses
        .route("/courses", get(admin::courses::courses_page))
        .route("/courses", post(admin::courses::create_template))
        .route("/courses/:id", get(admin::courses::template_page))
        .route("/courses/:id/update", post(admin::courses::update_template))
        .route("/courses/:id/delete", post(admin::courses::delete_template))
        .route("/courses/:id/instances", post(admin::courses::create_instance))
        .route("/instances/:id", get(admin::courses::instance_page))
        .route("/instances/:id/cancel", post(admin::courses::cancel_instance))
        // Bookings
        .route("/bookings", get(admin::bookings::bookings_page))
        .route("/bookings/:id/cancel", post(admin::bookings::cancel_booking))
        // Gift cards
        .route("/gift-cards", get(admin::gift_cards::gift_cards_page))
        .route("/gift-cards", post(admin::gift_cards::issue_gift_card))
        .route("/gift-cards/:id/cancel", post(admin::gift_cards::cancel_gift_card))
        // Shop
        .route("/products", get(admin::products::products_page))
        .route("/products", post(admin::products::create_product))
        .route("/products/:id", get(admin::products::product_page))
        .route("/products/:id/update", post(admin::products::update_product))
        .route("/products/:id/delete", post(admin::products::delete_product))
        .route("/orders", get(admin::orders::orders_page))
        .route("/orders/:id/ship", post(admin::orders::mark_shipped))
        // Payments and jobs
        .route("/payments", get(admin::payments::payments_page))
        .route("/payments/:id/mark-paid", post(admin::payments::mark_invoice_paid))
        .route("/jobs", get(admin::jobs::jobs_page))
        .route("/jobs/:id/retry", post(admin::jobs::retry_job))
        // Settings
        .route("/settings", get(admin::settings::settings_page))
        .route("/settings", post(admin::settings::update_setting))

        // CSRF protection for state-changing requests (runs after auth)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::api::middleware::auth::require_csrf,
        ))
        // Require an admin session for everything here (runs first)
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::api::middleware::auth::require_admin,
        ))
}
