use std::sync::Arc;
use crate::{config::Settings, service::ServiceContext};

#[derive(Clone)]
pub struct AppState {
    pub service_context: Arc<ServiceContext>,
}

impl AppState {
    pub fn new(service_context: Arc<ServiceContext>) -> Self {
        Self { service_context }
    }

    pub fn settings(&self) -> &Settings {
        &self.service_context.app_config
    }
}
