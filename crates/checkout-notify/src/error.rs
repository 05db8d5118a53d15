//! Channel Error Types

use std::time::Duration;

use thiserror::Error;

/// Failure of a single request attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No response within the per-attempt timeout
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Response outside the success range
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection, DNS or TLS failure
    #[error("network error: {0}")]
    Network(String),

    /// Accepted status but the body was not JSON
    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

impl TransportError {
    /// HTTP status observed for this attempt, if any
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Failure of a whole retrying delivery
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Every attempt in the budget failed
    #[error("delivery failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: TransportError },

    /// Attempt budget of zero
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),

    /// No endpoint configured for this channel
    #[error("delivery endpoint not configured")]
    NotConfigured,
}

/// Email channel failure. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    /// Service id, key or template missing
    #[error("email service not configured")]
    NotConfigured,

    /// Service answered outside the success range
    #[error("email rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Request could not be sent
    #[error("email network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for EmailError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
