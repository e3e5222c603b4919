use askama::Template;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use crate::{
    api::state::AppState,
    auth::{AuthService, SESSION_COOKIE},
    web::templates::HtmlTemplate,
};

#[derive(Template)]
#[template(path = "admin/login.html")]
pub struct LoginTemplate {
    pub studio_name: String,
    pub email: String,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub error: Option<String>,
}

// GET /admin/login
pub async fn login_page(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> impl IntoResponse {
    HtmlTemplate(LoginTemplate {
        studio_name: state.settings().studio.name.clone(),
        email: String::new(),
        error: query.error,
    })
}

// POST /admin/login
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let ctx = &state.service_context;
    let email = form.email.trim().to_lowercase();

    let failed = |message: &str| {
        HtmlTemplate(LoginTemplate {
            studio_name: state.settings().studio.name.clone(),
            email: email.clone(),
            error: Some(message.to_string()),
        })
        .into_response()
    };

    let hash = match ctx.admin_repo.get_password_hash(&email).await {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!("Admin lookup failed: {}", e);
            return failed("Något gick fel, försök igen.");
        }
    };

    let valid = match hash {
        Some(hash) => AuthService::verify_password(&form.password, &hash).await.unwrap_or(false),
        None => false,
    };
    if !valid {
        tracing::warn!(email = %email, "Failed admin login");
        return failed("Fel e-post eller lösenord.");
    }

    let admin = match ctx.admin_repo.find_by_email(&email).await {
        Ok(Some(admin)) => admin,
        _ => return failed("Fel e-post eller lösenord."),
    };

    let token = match ctx.auth_service.create_session(admin.id).await {
        Ok((_, token)) => token,
        Err(e) => {
            tracing::error!("Failed to create session: {}", e);
            return failed("Något gick fel, försök igen.");
        }
    };
    if let Err(e) = ctx.admin_repo.record_login(admin.id).await {
        tracing::warn!("Failed to record login time: {}", e);
    }

    tracing::info!(admin_id = %admin.id, "Admin logged in");
    let cookie = ctx
        .auth_service
        .session_cookie(&token, state.settings().auth.cookie_secure);
    (jar.add(cookie), Redirect::to("/admin")).into_response()
}

// POST /admin/logout
pub async fn logout_handler(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Err(e) = state.service_context.auth_service.invalidate_session(cookie.value()).await {
            tracing::warn!("Failed to delete session: {}", e);
        }
    }
    (jar.add(AuthService::logout_cookie()), Redirect::to("/admin/login")).into_response()
}
