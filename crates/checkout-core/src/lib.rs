//! # checkout-core
//!
//! Data model for a hosted-checkout redirector: the link a customer opens,
//! the widget configuration built from it, the single terminal outcome the
//! widget reports, and the status the page shows while that outcome is
//! delivered to the email service and the backend.
//!
//! ## Session lifecycle
//!
//! ```text
//! link ──▶ EntryParams ──▶ CheckoutOptions ──▶ widget
//!                                               │
//!                        ┌──────────────────────┘
//!                        ▼
//!                 PaymentOutcome ──▶ dispatcher ──▶ SessionStatus ──▶ close
//! ```

pub mod checkout;
pub mod config;
pub mod entry;
pub mod error;
pub mod outcome;
pub mod status;

pub use checkout::{CheckoutOptions, MerchantConfig};
pub use config::NotifyConfig;
pub use entry::{EntryDecoder, EntryParams, InlineQuery, OpaqueToken, Strictness, parse_entry};
pub use error::{CheckoutError, Result};
pub use outcome::{
    BackendPayment, CANCELLED_PAYMENT_ID, Channel, EmailFields, NotificationResult,
    PaymentOutcome,
};
pub use status::{SessionId, SessionStatus};
