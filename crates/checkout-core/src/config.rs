//! Notification Pipeline Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

/// EmailJS REST endpoint
pub const DEFAULT_EMAIL_ENDPOINT: &str = "https://api.emailjs.com/api/v1.0/email/send";

/// Template for the post-signup welcome email
pub const DEFAULT_WELCOME_TEMPLATE: &str = "template_welcome_user";

/// Settings for the outcome dispatcher and its channels
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Email service identifier
    pub email_service_id: Option<String>,

    /// Email service public key
    pub email_api_key: Option<String>,

    /// Template used for payment confirmations
    pub email_template_id: Option<String>,

    /// Template used for welcome emails
    #[serde(default = "default_welcome_template_id")]
    pub welcome_template_id: String,

    /// Email send endpoint
    #[serde(default = "default_email_endpoint")]
    pub email_endpoint: String,

    /// Backend payment-confirmation endpoint
    pub backend_endpoint: Option<String>,

    /// Attempt budget for a successful payment
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Attempt budget for a cancelled checkout
    #[serde(default = "default_cancel_max_attempts")]
    pub cancel_max_attempts: u32,

    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_per_attempt_timeout_ms")]
    pub per_attempt_timeout_ms: u64,

    /// First backoff gap in milliseconds, doubled after each failure
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Delay before a settled session closes itself
    #[serde(default = "default_close_delay_ms")]
    pub close_delay_ms: u64,
}

fn default_email_endpoint() -> String {
    DEFAULT_EMAIL_ENDPOINT.into()
}

fn default_welcome_template_id() -> String {
    DEFAULT_WELCOME_TEMPLATE.into()
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_cancel_max_attempts() -> u32 {
    2
}

const fn default_per_attempt_timeout_ms() -> u64 {
    20_000
}

const fn default_base_delay_ms() -> u64 {
    2_000
}

const fn default_close_delay_ms() -> u64 {
    3_000
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            email_service_id: None,
            email_api_key: None,
            email_template_id: None,
            welcome_template_id: default_welcome_template_id(),
            email_endpoint: default_email_endpoint(),
            backend_endpoint: None,
            max_attempts: default_max_attempts(),
            cancel_max_attempts: default_cancel_max_attempts(),
            per_attempt_timeout_ms: default_per_attempt_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
            close_delay_ms: default_close_delay_ms(),
        }
    }
}

impl NotifyConfig {
    /// Read settings from the environment, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            email_service_id: env_opt("EMAILJS_SERVICE_ID"),
            email_api_key: env_opt("EMAILJS_PUBLIC_KEY"),
            email_template_id: env_opt("EMAILJS_TEMPLATE_ID"),
            welcome_template_id: env_opt("EMAILJS_WELCOME_TEMPLATE_ID")
                .unwrap_or(defaults.welcome_template_id),
            email_endpoint: env_opt("EMAILJS_ENDPOINT").unwrap_or(defaults.email_endpoint),
            backend_endpoint: env_opt("BACKEND_ENDPOINT"),
            max_attempts: env_parse("NOTIFY_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
            cancel_max_attempts: env_parse("NOTIFY_CANCEL_MAX_ATTEMPTS")?
                .unwrap_or(defaults.cancel_max_attempts),
            per_attempt_timeout_ms: env_parse("NOTIFY_ATTEMPT_TIMEOUT_MS")?
                .unwrap_or(defaults.per_attempt_timeout_ms),
            base_delay_ms: env_parse("NOTIFY_BASE_DELAY_MS")?.unwrap_or(defaults.base_delay_ms),
            close_delay_ms: env_parse("CLOSE_DELAY_MS")?.unwrap_or(defaults.close_delay_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject budgets that would never attempt delivery
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 || self.cancel_max_attempts == 0 {
            return Err(CheckoutError::Config("attempt budgets must be positive".into()));
        }
        if self.per_attempt_timeout_ms == 0 {
            return Err(CheckoutError::Config("per-attempt timeout must be positive".into()));
        }
        Ok(())
    }

    /// Whether all email settings are present
    pub const fn email_configured(&self) -> bool {
        self.email_service_id.is_some()
            && self.email_api_key.is_some()
            && self.email_template_id.is_some()
    }

    pub const fn per_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.per_attempt_timeout_ms)
    }

    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub const fn close_delay(&self) -> Duration {
        Duration::from_millis(self.close_delay_ms)
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    env_opt(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| CheckoutError::Config(format!("{name} is not a valid number: {raw}")))
        })
        .transpose()
}
