use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub swish: SwishConfig,
    #[serde(default)]
    pub email: EmailConfig,
    pub jobs: JobsConfig,
    pub storage: StorageConfig,
    pub studio: StudioConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub session_duration_hours: i64,
    #[serde(default)]
    pub cookie_secure: bool,
    pub csrf_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SwishConfig {
    #[serde(default)]
    pub enabled: bool,
    pub api_url: String,
    pub payee_alias: String,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
    pub ca_path: Option<String>,
    pub payment_timeout_minutes: i64,
}

impl Default for SwishConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://mss.cpc.getswish.net/swish-cpcapi".to_string(),
            payee_alias: "1231181189".to_string(),
            cert_path: None,
            key_path: None,
            ca_path: None,
            payment_timeout_minutes: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_address: String,
    /// Receives a copy of every order and booking confirmation.
    pub admin_address: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            from_address: "Lerhuset <noreply@lerhuset.local>".to_string(),
            admin_address: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct JobsConfig {
    pub cron_secret: String,
    pub batch_size: i64,
    pub max_attempts: i64,
    pub stale_after_minutes: i64,
    /// Zero disables the in-process poller; the cron endpoint still works.
    pub poll_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub documents_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StudioConfig {
    pub name: String,
    pub org_number: String,
    pub bankgiro: String,
    pub address: String,
    pub email: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.base_url", "http://localhost:8080")?
            .set_default("database.url", "sqlite://lerhuset.db?mode=rwc")?
            .set_default("database.max_connections", 10)?
            .set_default("auth.session_duration_hours", 12)?
            .set_default("auth.cookie_secure", false)?
            .set_default("auth.csrf_secret", "change-me-in-production")?
            .set_default("swish.enabled", false)?
            .set_default("swish.api_url", "https://mss.cpc.getswish.net/swish-cpcapi")?
            .set_default("swish.payee_alias", "1231181189")?
            .set_default("swish.payment_timeout_minutes", 30)?
            .set_default("email.enabled", false)?
            .set_default("email.smtp_host", "localhost")?
            .set_default("email.smtp_port", 587)?
            .set_default("email.from_address", "Lerhuset <noreply@lerhuset.local>")?
            .set_default("jobs.cron_secret", "change-me-in-production")?
            .set_default("jobs.batch_size", 20)?
            .set_default("jobs.max_attempts", 5)?
            .set_default("jobs.stale_after_minutes", 15)?
            .set_default("jobs.poll_interval_secs", 0)?
            .set_default("storage.documents_dir", "data/documents")?
            .set_default("studio.name", "Lerhuset Keramikstudio")?
            .set_default("studio.org_number", "000000-0000")?
            .set_default("studio.bankgiro", "000-0000")?
            .set_default("studio.address", "")?
            .set_default("studio.email", "hej@lerhuset.local")?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with LERHUSET__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("LERHUSET").separator("__"))

            .build()?;

        config.try_deserialize()
    }

    /// URL Swish posts payment outcomes to.
    pub fn swish_callback_url(&self) -> String {
        format!(
            "{}/api/payments/swish/callback",
            self.server.base_url.trim_end_matches('/')
        )
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://lerhuset.db?mode=rwc".to_string(),
                max_connections: 10,
            },
            auth: AuthConfig {
                session_duration_hours: 12,
                cookie_secure: false,
                csrf_secret: "change-me-in-production".to_string(),
            },
            swish: SwishConfig::default(),
            email: EmailConfig::default(),
            jobs: JobsConfig {
                cron_secret: "change-me-in-production".to_string(),
                batch_size: 20,
                max_attempts: 5,
                stale_after_minutes: 15,
                poll_interval_secs: 0,
            },
            storage: StorageConfig {
                documents_dir: "data/documents".to_string(),
            },
            studio: StudioConfig {
                name: "Lerhuset Keramikstudio".to_string(),
                org_number: "000000-0000".to_string(),
                bankgiro: "000-0000".to_string(),
                address: String::new(),
                email: "hej@lerhuset.local".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_url_strips_trailing_slash() {
        let mut settings = Settings::default();
        settings.server.base_url = "https://lerhuset.se/".to_string();
        assert_eq!(
            settings.swish_callback_url(),
            "https://lerhuset.se/api/payments/swish/callback"
        );
    }
}
