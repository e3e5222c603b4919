use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::{api::state::AppState, error::AppError};

/// Requires `Authorization: Bearer <jobs.cron_secret>`.
pub async fn require_cron_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state.settings().jobs.cron_secret.as_bytes();
    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("");

    if expected.is_empty() || !bool::from(provided.as_bytes().ct_eq(expected)) {
        tracing::warn!("Cron request with invalid credentials");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
