use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_KHALTI_BASE_URL: &str = "https://khalti.com";
const DEFAULT_ESEWA_BASE_URL: &str = "https://uat.esewa.com.np";
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 15;

/// Payment gateway settings. Credentials are optional here and checked when
/// the adapters are built, so a missing key names the exact variable to set.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PaymentsConfig {
    #[serde(default = "default_khalti_base_url")]
    #[validate(url)]
    pub khalti_base_url: String,

    #[serde(default)]
    pub khalti_secret_key: Option<String>,

    #[serde(default = "default_esewa_base_url")]
    #[validate(url)]
    pub esewa_base_url: String,

    #[serde(default)]
    pub esewa_merchant_code: Option<String>,

    /// Upper bound on a single gateway round trip
    #[serde(default = "default_gateway_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub gateway_timeout_secs: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            khalti_base_url: default_khalti_base_url(),
            khalti_secret_key: None,
            esewa_base_url: default_esewa_base_url(),
            esewa_merchant_code: None,
            gateway_timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

impl PaymentsConfig {
    pub fn gateway_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn require_khalti_secret(&self) -> Result<&str, AppConfigError> {
        non_blank(self.khalti_secret_key.as_deref())
            .ok_or(AppConfigError::MissingSetting("APP__PAYMENTS__KHALTI_SECRET_KEY"))
    }

    pub fn require_esewa_merchant_code(&self) -> Result<&str, AppConfigError> {
        non_blank(self.esewa_merchant_code.as_deref())
            .ok_or(AppConfigError::MissingSetting("APP__PAYMENTS__ESEWA_MERCHANT_CODE"))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// HS256 signing secret for bearer tokens
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_jwt_issuer")]
    pub jwt_issuer: String,

    /// Token lifetime in seconds (5min - 24h)
    #[serde(default = "default_jwt_expiration_secs")]
    #[validate(range(min = 300, max = 86400))]
    pub jwt_expiration_secs: u64,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    #[serde(default)]
    #[validate]
    pub payments: PaymentsConfig,
}

impl AppConfig {
    /// Builds a configuration with defaults for everything but the essentials.
    pub fn new(database_url: String, jwt_secret: String, environment: String) -> Self {
        Self {
            database_url,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            jwt_secret,
            jwt_issuer: default_jwt_issuer(),
            jwt_expiration_secs: default_jwt_expiration_secs(),
            cors_allowed_origins: None,
            payments: PaymentsConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Parsed list of allowed CORS origins, empty when unset.
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Missing required setting: set {0}")]
    MissingSetting(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_jwt_issuer() -> String {
    "bookstore-api".to_string()
}
fn default_jwt_expiration_secs() -> u64 {
    3600
}
fn default_khalti_base_url() -> String {
    DEFAULT_KHALTI_BASE_URL.to_string()
}
fn default_esewa_base_url() -> String {
    DEFAULT_ESEWA_BASE_URL.to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    let lower = trimmed.to_ascii_lowercase();
    let weak_fragments = ["changeme", "your-secret-key", "default-secret"];
    if weak_fragments.iter().any(|pattern| lower.contains(pattern)) {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("bookstore_api={},tower_http=debug", level);
    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(default_directive));

    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = with_defaults(Config::builder(), &run_env)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    from_config(config)
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    run_env: &str,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    builder
        .set_default("database_url", "sqlite://bookstore.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("auto_migrate", true)
}

/// Deserializes and validates an already-layered configuration.
pub fn from_config(config: Config) -> Result<AppConfig, AppConfigError> {
    // jwt_secret has no default; fail with a message that names the variable
    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET to a random string of at least 32 characters.");
        return Err(AppConfigError::MissingSetting("APP__JWT_SECRET"));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use config::FileFormat;

    const SECRET: &str = "k7Qe2vX9pL4mN8rT1wY6zB3cD5fG0hJq";

    fn layered(toml: &str) -> Result<AppConfig, AppConfigError> {
        let config = with_defaults(Config::builder(), "test")
            .unwrap()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();
        from_config(config)
    }

    #[test]
    fn defaults_fill_everything_but_the_secret() {
        let cfg = layered(&format!("jwt_secret = \"{}\"", SECRET)).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.environment, "test");
        assert_eq!(cfg.payments.khalti_base_url, "https://khalti.com");
        assert_eq!(cfg.payments.gateway_timeout_secs, 15);
        assert!(cfg.payments.khalti_secret_key.is_none());
    }

    #[test]
    fn missing_secret_names_the_variable() {
        let err = layered("port = 9000").unwrap_err();
        assert_matches!(err, AppConfigError::MissingSetting("APP__JWT_SECRET"));
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = layered("jwt_secret = \"short\"").unwrap_err();
        assert_matches!(err, AppConfigError::Validation(_));
    }

    #[test]
    fn gateway_timeout_is_bounded() {
        let toml = format!(
            "jwt_secret = \"{}\"\n[payments]\ngateway_timeout_secs = 600",
            SECRET
        );
        assert_matches!(layered(&toml), Err(AppConfigError::Validation(_)));
    }

    #[test]
    fn payment_credentials_fail_fast_when_blank() {
        let mut payments = PaymentsConfig::default();
        payments.khalti_secret_key = Some("   ".into());
        assert_matches!(
            payments.require_khalti_secret(),
            Err(AppConfigError::MissingSetting("APP__PAYMENTS__KHALTI_SECRET_KEY"))
        );
        assert_matches!(
            payments.require_esewa_merchant_code(),
            Err(AppConfigError::MissingSetting("APP__PAYMENTS__ESEWA_MERCHANT_CODE"))
        );

        payments.esewa_merchant_code = Some("EPAYTEST".into());
        assert_eq!(payments.require_esewa_merchant_code().unwrap(), "EPAYTEST");
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let mut cfg = AppConfig::new("sqlite::memory:".into(), SECRET.into(), "test".into());
        cfg.cors_allowed_origins = Some("https://a.example, ,https://b.example".into());
        assert_eq!(
            cfg.cors_origins(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
