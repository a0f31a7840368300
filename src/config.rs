//! Process configuration, loaded once from the environment at startup.

use ::config::{Config, Environment};
use serde::Deserialize;

use crate::access::AdminAllowList;

const MIN_COOKIE_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("COOKIE_SECRET must be at least {MIN_COOKIE_SECRET_LEN} bytes")]
    CookieSecretTooShort,

    #[error("PUBLIC_BASE_URL is not a valid absolute URL: {0}")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    /// `production` switches cookies to `Secure`.
    pub app_env: String,
    pub public_base_url: String,

    pub stripe_webhook_secret: String,
    pub stripe_secret_key: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_api_base: String,
    pub webhook_tolerance_secs: i64,

    pub resend_api_key: Option<String>,
    pub email_from: String,

    /// Comma separated list of staff emails.
    pub admin_emails: String,
    pub cookie_secret: String,

    pub gemini_api_key: Option<String>,
    pub gemini_model: String,

    pub sentry_dsn: Option<String>,
}

impl AppConfig {
    /// Reads unprefixed environment variables (`DATABASE_URL`, `STRIPE_WEBHOOK_SECRET`, ...)
    /// on top of the defaults below and validates the result.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("database_url", "pwb.db")?
            .set_default("database_max_connections", 8i64)?
            .set_default("port", 3000i64)?
            .set_default("app_env", "development")?
            .set_default("public_base_url", "http://localhost:3000")?
            .set_default("stripe_webhook_secret", "")?
            .set_default("stripe_api_base", "https://api.stripe.com")?
            .set_default("webhook_tolerance_secs", 300i64)?
            .set_default("email_from", "PostWithoutBan <onboarding@resend.dev>")?
            .set_default("admin_emails", "")?
            .set_default("cookie_secret", "")?
            .set_default("gemini_model", "gemini-2.0-flash")?
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stripe_webhook_secret.trim().is_empty() {
            return Err(ConfigError::Missing("STRIPE_WEBHOOK_SECRET"));
        }
        if self.cookie_secret.is_empty() {
            return Err(ConfigError::Missing("COOKIE_SECRET"));
        }
        if self.cookie_secret.len() < MIN_COOKIE_SECRET_LEN {
            return Err(ConfigError::CookieSecretTooShort);
        }
        reqwest::Url::parse(&self.public_base_url)
            .map_err(|e| ConfigError::InvalidBaseUrl(format!("{}: {e}", self.public_base_url)))?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn admin_allow_list(&self) -> AdminAllowList {
        AdminAllowList::parse(&self.admin_emails)
    }

    /// Returns the value only when it is present and not blank.
    pub fn non_empty(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            database_url: "test.db".into(),
            database_max_connections: 2,
            port: 3000,
            app_env: "development".into(),
            public_base_url: "http://localhost:3000".into(),
            stripe_webhook_secret: "whsec_test".into(),
            stripe_secret_key: None,
            stripe_price_id: None,
            stripe_api_base: "https://api.stripe.com".into(),
            webhook_tolerance_secs: 300,
            resend_api_key: None,
            email_from: "test@example.com".into(),
            admin_emails: "Staff@Example.com, ops@example.com".into(),
            cookie_secret: "x".repeat(64),
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".into(),
            sentry_dsn: None,
        }
    }

    #[test]
    fn accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn rejects_missing_webhook_secret() {
        let mut config = valid_config();
        config.stripe_webhook_secret = "  ".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("STRIPE_WEBHOOK_SECRET"))
        ));
    }

    #[test]
    fn rejects_short_cookie_secret() {
        let mut config = valid_config();
        config.cookie_secret = "short".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CookieSecretTooShort)
        ));
    }

    #[test]
    fn rejects_relative_base_url() {
        let mut config = valid_config();
        config.public_base_url = "/access".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn production_flag_and_allow_list() {
        let mut config = valid_config();
        assert!(!config.is_production());
        config.app_env = "Production".into();
        assert!(config.is_production());
        assert!(config.admin_allow_list().contains("staff@example.com"));
    }

    #[test]
    fn blank_optional_values_are_treated_as_absent() {
        assert_eq!(AppConfig::non_empty(&Some("  ".into())), None);
        assert_eq!(AppConfig::non_empty(&Some("key".into())), Some("key"));
        assert_eq!(AppConfig::non_empty(&None), None);
    }
}
