pub mod auth;

use askama::Template;
use axum::{
    response::{Html, IntoResponse, Redirect, Response},
    http::StatusCode,
};
use serde::Deserialize;

use crate::api::middleware::auth::CurrentAdmin;
use crate::api::state::AppState;

/// Chrome shared by every admin page.
#[derive(Debug, Clone)]
pub struct AdminPage {
    pub admin_name: String,
    pub csrf_token: String,
    pub active: &'static str,
    pub notice: Option<String>,
    pub error: Option<String>,
}

impl AdminPage {
    pub fn new(state: &AppState, current: &CurrentAdmin, active: &'static str, flash: Flash) -> Self {
        Self {
            admin_name: current.admin.full_name.clone(),
            csrf_token: state
                .service_context
                .csrf_service
                .generate_token(&current.session_id),
            active,
            notice: flash.notice,
            error: flash.error,
        }
    }
}

/// One-shot message carried across a POST/redirect/GET.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Flash {
    pub notice: Option<String>,
    pub error: Option<String>,
}

/// Redirects back to an admin page with a notice or an error banner.
pub fn redirect_flash(path: &str, outcome: std::result::Result<String, String>) -> Response {
    let (key, message) = match outcome {
        Ok(message) => ("notice", message),
        Err(message) => ("error", message),
    };
    let separator = if path.contains('?') { '&' } else { '?' };
    Redirect::to(&format!(
        "{}{}{}={}",
        path,
        separator,
        key,
        urlencoding::encode(&message)
    ))
    .into_response()
}

// Make askama templates work with axum
pub struct HtmlTemplate<T>(pub T);

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: Template,
{
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => {
                tracing::error!("Failed to render template: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to render page",
                ).into_response()
            }
        }
    }
}
