//! Payment Outcomes
//!
//! The terminal result of a checkout and the records derived from it for
//! each notification channel.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entry::EntryParams;

/// `payment_id` sent to the backend when the checkout was dismissed
pub const CANCELLED_PAYMENT_ID: &str = "PAYMENT_FAILED";

/// Terminal result of a checkout attempt. One per session, never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// Widget reported a captured payment
    Succeeded {
        payment_id: String,
        order_id: String,
        /// Minor currency units
        amount: u64,
        course_id: String,
        phone: String,
        email: String,
        /// Display-only fields for the confirmation email
        #[serde(default)]
        course: Option<String>,
        #[serde(default)]
        price: Option<String>,
    },

    /// Widget was dismissed without paying
    Cancelled {
        order_id: String,
        amount: u64,
        course_id: String,
        phone: String,
    },
}

impl PaymentOutcome {
    /// Outcome for a widget success callback on this link
    pub fn succeeded(params: &EntryParams, payment_id: impl Into<String>) -> Self {
        Self::Succeeded {
            payment_id: payment_id.into(),
            order_id: params.order_id.clone(),
            amount: params.amount,
            course_id: params.course_id.clone().unwrap_or_default(),
            phone: params.phone.clone().unwrap_or_default(),
            email: params.email.clone().unwrap_or_default(),
            course: params.course.clone(),
            price: params.price.clone(),
        }
    }

    /// Outcome for a widget dismiss callback on this link
    pub fn cancelled(params: &EntryParams) -> Self {
        Self::Cancelled {
            order_id: params.order_id.clone(),
            amount: params.amount,
            course_id: params.course_id.clone().unwrap_or_default(),
            phone: params.phone.clone().unwrap_or_default(),
        }
    }

    pub fn order_id(&self) -> &str {
        match self {
            Self::Succeeded { order_id, .. } | Self::Cancelled { order_id, .. } => order_id,
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Record posted to the backend payment endpoint
    pub fn backend_payment(&self) -> BackendPayment {
        match self {
            Self::Succeeded {
                payment_id,
                order_id,
                amount,
                course_id,
                phone,
                ..
            } => BackendPayment {
                phone: phone.clone(),
                order_id: order_id.clone(),
                payment_id: payment_id.clone(),
                amount: *amount,
                course_id: course_id.clone(),
            },
            Self::Cancelled {
                order_id,
                amount,
                course_id,
                phone,
            } => BackendPayment {
                phone: phone.clone(),
                order_id: order_id.clone(),
                payment_id: CANCELLED_PAYMENT_ID.to_string(),
                amount: *amount,
                course_id: course_id.clone(),
            },
        }
    }

    /// Confirmation email fields. Only a successful payment is mailed.
    pub fn email_fields(&self) -> Option<EmailFields> {
        let Self::Succeeded {
            payment_id,
            order_id,
            amount,
            course_id,
            phone,
            email,
            course,
            price,
        } = self
        else {
            return None;
        };

        let mut fields = EmailFields::new();
        fields.insert("to_email", email);
        fields.insert("phone", phone);
        fields.insert("order_id", order_id);
        fields.insert("course", course.as_deref().unwrap_or(course_id));
        fields.insert("course_id", course_id);
        fields.insert(
            "price",
            price.clone().unwrap_or_else(|| amount.to_string()),
        );
        fields.insert("payment_id", payment_id);
        Some(fields)
    }
}

/// JSON body accepted by the backend payment endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendPayment {
    pub phone: String,
    pub order_id: String,
    pub payment_id: String,
    pub amount: u64,
    pub course_id: String,
}

/// Flat template parameters for the email service
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailFields(BTreeMap<String, String>);

impl EmailFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Welcome email parameters; `None` unless both email and name are given
    pub fn welcome(email: Option<&str>, name: Option<&str>, phone: Option<&str>) -> Option<Self> {
        fn present(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|v| !v.is_empty())
        }
        let email = present(email)?;
        let name = present(name)?;

        let mut fields = Self::new();
        fields.insert("to_email", email);
        fields.insert("name", name);
        fields.insert("phone", present(phone).unwrap_or_default());
        Some(fields)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Delivery path for an outcome notification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Backend,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Backend => write!(f, "backend"),
        }
    }
}

/// Settled result of one channel for one outcome
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationResult {
    pub channel: Channel,
    pub succeeded: bool,
    pub error_detail: Option<String>,
}

impl NotificationResult {
    pub const fn ok(channel: Channel) -> Self {
        Self {
            channel,
            succeeded: true,
            error_detail: None,
        }
    }

    pub fn failed(channel: Channel, detail: impl Into<String>) -> Self {
        Self {
            channel,
            succeeded: false,
            error_detail: Some(detail.into()),
        }
    }
}
