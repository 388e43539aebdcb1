use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_EVENT_BUFFER: usize = 256;
const DEFAULT_INVOICE_DUE_DAYS: i64 = 14;

/// Application configuration, layered from defaults, an optional
/// `config/{environment}.toml` file, and `APP_`-prefixed environment
/// variables (highest precedence).
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL (`sqlite://...` or `postgres://...`).
    #[validate(length(min = 1, message = "database_url must not be empty"))]
    pub database_url: String,

    /// Server bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment name.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level filter (overridable via RUST_LOG).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit structured JSON logs instead of human-readable output.
    #[serde(default)]
    pub log_json: bool,

    /// Create missing tables on startup.
    #[serde(default)]
    pub auto_migrate: bool,

    // Database pool tuning
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    /// Capacity of the in-process domain event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer_size: usize,

    /// Days until a freshly generated invoice falls due.
    #[serde(default = "default_invoice_due_days")]
    #[validate(range(min = 1, max = 365))]
    pub invoice_due_days: i64,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}
fn default_invoice_due_days() -> i64 {
    DEFAULT_INVOICE_DUE_DAYS
}

impl AppConfig {
    /// Minimal constructor used by tests and tooling.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: default_host(),
            port: default_port(),
            environment: "test".to_string(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: 1,
            db_min_connections: 1,
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            event_buffer_size: default_event_buffer(),
            invoice_due_days: default_invoice_due_days(),
        }
    }
}

/// Loads configuration for the current environment.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder()
        .set_default("environment", environment.clone())?
        .set_default("host", DEFAULT_HOST)?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?;

    let env_file = Path::new(CONFIG_DIR).join(format!("{}.toml", environment));
    if env_file.exists() {
        builder = builder.add_source(File::from(env_file));
    }

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    info!(
        environment = %app_config.environment,
        host = %app_config.host,
        port = app_config.port,
        "configuration loaded"
    );

    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_produces_valid_config() {
        let cfg = AppConfig::new("sqlite::memory:");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.invoice_due_days, DEFAULT_INVOICE_DUE_DAYS);
        assert!(cfg.auto_migrate);
    }

    #[test]
    fn empty_database_url_fails_validation() {
        let cfg = AppConfig::new("");
        assert!(cfg.validate().is_err());
    }
}
