//! Application State

use std::sync::Arc;
use std::time::Duration;

use checkout_core::{MerchantConfig, NotifyConfig, Strictness};
use checkout_notify::{EmailSender, OutcomeDispatcher, RetryingChannel};

use crate::session::MemorySessionStore;

/// Link-handling settings
#[derive(Clone, Debug)]
pub struct EntrySettings {
    /// Which link fields are mandatory
    pub strictness: Strictness,

    /// Bounce visitors that arrive without a `Referer`
    pub require_referrer: bool,

    /// Where bounced visitors are sent
    pub fallback_url: String,

    /// How long an opened session may wait for a callback
    pub session_ttl: Duration,
}

/// Idle limit for sessions that never settle
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

impl Default for EntrySettings {
    fn default() -> Self {
        Self {
            strictness: Strictness::Lenient,
            require_referrer: false,
            fallback_url: "/".into(),
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }
}

impl EntrySettings {
    pub fn from_env() -> Self {
        let flag = |name: &str| {
            std::env::var(name)
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };

        Self {
            strictness: if flag("ENTRY_STRICT") {
                Strictness::Strict
            } else {
                Strictness::Lenient
            },
            require_referrer: flag("REQUIRE_REFERRER"),
            fallback_url: std::env::var("FALLBACK_URL").unwrap_or_else(|_| "/".into()),
            session_ttl: std::env::var("SESSION_TTL_SECS")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .filter(|secs| *secs > 0)
                .map_or(DEFAULT_SESSION_TTL, Duration::from_secs),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Open checkout sessions
    pub sessions: Arc<MemorySessionStore>,

    /// Notification pipeline settings
    pub notify: Arc<NotifyConfig>,

    /// Widget settings
    pub merchant: Arc<MerchantConfig>,

    /// Link-handling settings
    pub entry: Arc<EntrySettings>,

    /// Email channel (a stand-in when not configured)
    pub email: Arc<dyn EmailSender>,

    /// Backend channel
    pub backend: RetryingChannel,
}

impl AppState {
    /// Fresh dispatcher for a new session, sharing the channels
    pub fn dispatcher(&self) -> OutcomeDispatcher {
        OutcomeDispatcher::new(self.notify.clone(), self.email.clone(), self.backend.clone())
    }
}
