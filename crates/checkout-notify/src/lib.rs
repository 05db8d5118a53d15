//! # checkout-notify
//!
//! Post-payment notification pipeline.
//!
//! - [`RetryingChannel`] delivers a JSON record with a per-attempt timeout
//!   and exponential backoff, over any [`Transport`] (reqwest by default).
//! - [`EmailSender`] sends the confirmation email; [`EmailJsClient`] talks
//!   to the EmailJS REST API.
//! - [`OutcomeDispatcher`] runs both for a checkout outcome and derives the
//!   session status.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_notify::{EmailJsClient, HttpTransport, OutcomeDispatcher, RetryingChannel};
//!
//! let config = Arc::new(NotifyConfig::from_env()?);
//! let email = Arc::new(EmailJsClient::from_config(&config).unwrap());
//! let backend = RetryingChannel::new(Arc::new(HttpTransport::new()));
//!
//! let dispatcher = OutcomeDispatcher::new(config, email, backend);
//! let status = dispatcher.dispatch(outcome).await;
//! ```

pub mod dispatcher;
pub mod email;
pub mod error;
pub mod mock;
pub mod retry;
pub mod transport;

pub use dispatcher::{DispatchReport, OutcomeDispatcher};
pub use email::{EmailJsClient, EmailSender, UnconfiguredEmail};
pub use error::{DeliveryError, EmailError, TransportError};
pub use retry::{DeliveryAttempt, RetryPolicy, RetryingChannel};
pub use transport::{Delivered, HttpTransport, Transport};
