//! Session Status
//!
//! Presentation state of a checkout session, written once by the dispatcher.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique checkout session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derived presentation state of a session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Waiting for the checkout widget
    #[default]
    Processing,

    /// Payment captured, notifications in flight
    Succeeded,

    /// Payment captured and the backend accepted the record
    Completed,

    /// Payment captured but the backend could not be notified
    PartialFailure,

    /// Checkout dismissed
    Cancelled,

    /// Fault outside the channel contracts
    UnexpectedError,
}

impl SessionStatus {
    /// Whether the status is final and the session may close
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartialFailure | Self::Cancelled | Self::UnexpectedError
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Completed => "completed",
            Self::PartialFailure => "partial_failure",
            Self::Cancelled => "cancelled",
            Self::UnexpectedError => "unexpected_error",
        }
    }

    /// Plain-language message for the page
    pub fn user_message(self, order_id: &str) -> String {
        match self {
            Self::Processing => "Redirecting to Payment...".into(),
            Self::Succeeded => "Payment successful. Finalizing your order...".into(),
            Self::Completed => "Payment successful! Your order is confirmed.".into(),
            Self::PartialFailure => format!(
                "Payment successful, but we could not confirm your order automatically. \
                 Please contact support with Order ID: {order_id}"
            ),
            Self::Cancelled => "Payment was cancelled.".into(),
            Self::UnexpectedError => format!(
                "Something went wrong. Please keep your Order ID for support: {order_id}"
            ),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
