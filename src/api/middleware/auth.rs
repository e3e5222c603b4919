use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use crate::{
    api::state::AppState,
    auth::{CSRF_FIELD, SESSION_COOKIE},
    domain::AdminUser,
    error::AppError,
};

/// Largest admin form body read while checking the CSRF field.
const MAX_FORM_BYTES: usize = 1024 * 1024;

pub const CSRF_HEADER: &str = "x-csrf-token";

#[derive(Clone)]
pub struct CurrentAdmin {
    pub admin: AdminUser,
    pub session_id: String,
}

async fn resolve_admin(state: &AppState, jar: &CookieJar) -> Option<CurrentAdmin> {
    let token = jar.get(SESSION_COOKIE)?.value().to_string();
    let ctx = &state.service_context;

    let session = match ctx.auth_service.validate_session(&token).await {
        Ok(Some(session)) => session,
        Ok(None) => return None,
        Err(e) => {
            tracing::error!("Session lookup failed: {}", e);
            return None;
        }
    };

    match ctx.admin_repo.find_by_id(session.admin_id).await {
        Ok(Some(admin)) => Some(CurrentAdmin {
            admin,
            session_id: session.id,
        }),
        Ok(None) => None,
        Err(e) => {
            tracing::error!("Admin lookup failed: {}", e);
            None
        }
    }
}

/// Admin pages: redirects to the login page instead of returning 401.
pub async fn require_admin(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(current) = resolve_admin(&state, &jar).await else {
        return Redirect::to("/admin/login").into_response();
    };
    request.extensions_mut().insert(current);
    next.run(request).await
}

#[derive(Deserialize)]
struct CsrfForm {
    #[serde(rename = "csrf_token")]
    token: Option<String>,
}

/// Rejects state-changing admin requests without a token bound to the
/// current session. The token comes from the `x-csrf-token` header or
/// the `csrf_token` form field. Must run after `require_admin`.
pub async fn require_csrf(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if matches!(*request.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return Ok(next.run(request).await);
    }

    let session_id = request
        .extensions()
        .get::<CurrentAdmin>()
        .map(|c| c.session_id.clone())
        .ok_or(AppError::Unauthorized)?;

    let header_token = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_FORM_BYTES)
        .await
        .map_err(|_| AppError::BadRequest("Request body too large".to_string()))?;

    let token = match header_token {
        Some(token) => Some(token),
        None => serde_urlencoded::from_bytes::<CsrfForm>(&bytes)
            .ok()
            .and_then(|form| form.token),
    };

    let valid = token
        .map(|t| state.service_context.csrf_service.validate_token(&session_id, &t))
        .unwrap_or(false);
    if !valid {
        tracing::warn!(path = %parts.uri.path(), "Rejected admin request with missing or invalid {}", CSRF_FIELD);
        return Err(AppError::Forbidden);
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
