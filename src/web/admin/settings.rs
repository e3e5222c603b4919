use askama::Template;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Extension, Form,
};
use serde::Deserialize;

use crate::{
    api::{middleware::auth::CurrentAdmin, state::AppState},
    domain::{format_local, SettingType, UpdateSettingRequest},
    error::Result,
    web::{
        admin::action_error,
        templates::{redirect_flash, AdminPage, Flash, HtmlTemplate},
    },
};

pub struct SettingRow {
    pub key: String,
    pub value: String,
    pub description: String,
    pub boolean: bool,
    pub checked: bool,
    pub updated: String,
}

pub struct CategoryView {
    pub name: String,
    pub settings: Vec<SettingRow>,
}

#[derive(Template)]
#[template(path = "admin/settings.html")]
pub struct SettingsTemplate {
    pub page: AdminPage,
    pub categories: Vec<CategoryView>,
}

#[derive(Debug, Deserialize)]
pub struct SettingForm {
    pub key: String,
    #[serde(default)]
    pub value: String,
    pub reason: Option<String>,
}

// GET /admin/settings
pub async fn settings_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Query(flash): Query<Flash>,
) -> Result<impl IntoResponse> {
    let categories = state
        .service_context
        .settings_service
        .get_all_settings()
        .await?
        .into_iter()
        .map(|category| CategoryView {
            name: category.name,
            settings: category
                .settings
                .into_iter()
                .map(|s| SettingRow {
                    boolean: matches!(s.value_type, SettingType::Boolean),
                    checked: s.value == "true",
                    updated: format_local(s.updated_at),
                    description: s.description.unwrap_or_default(),
                    key: s.key,
                    value: s.value,
                })
                .collect(),
        })
        .collect();

    Ok(HtmlTemplate(SettingsTemplate {
        page: AdminPage::new(&state, &current, "settings", flash),
        categories,
    }))
}

// POST /admin/settings
pub async fn update_setting(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
    Form(form): Form<SettingForm>,
) -> Response {
    let request = UpdateSettingRequest {
        value: form.value,
        reason: crate::domain::non_empty(form.reason),
    };
    match state
        .service_context
        .settings_service
        .update_setting(&form.key, request, current.admin.id)
        .await
    {
        Ok(setting) => redirect_flash(
            "/admin/settings",
            Ok(format!("Saved {} = {}", setting.key, setting.value)),
        ),
        Err(e) => redirect_flash("/admin/settings", Err(action_error("Update setting", e))),
    }
}
