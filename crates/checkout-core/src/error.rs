//! Error Types

use thiserror::Error;

/// Result type alias for checkout operations
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Checkout session errors
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Required link parameters missing, malformed, or token undecodable
    #[error("Invalid payment link: {0}")]
    InvalidLink(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl CheckoutError {
    /// Short machine-readable code for API responses
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidLink(_) => "INVALID_LINK",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to a user-friendly message
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidLink(_) => "Invalid Payment Link",
            Self::Config(_) => "Service configuration error.",
            _ => "An unexpected error occurred.",
        }
    }
}

impl From<anyhow::Error> for CheckoutError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
