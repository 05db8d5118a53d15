//! Checkout Widget Options
//!
//! The configuration record handed to the hosted checkout widget, and the
//! chat link a successful session redirects to.

use url::Url;
use serde::{Deserialize, Serialize};

use crate::entry::EntryParams;
use crate::error::{CheckoutError, Result};

/// Merchant-level widget settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantConfig {
    /// Name shown in the widget header
    pub name: String,

    /// ISO 4217 currency code
    pub currency: String,

    /// Widget accent color
    pub theme_color: String,

    /// Chat number to redirect to after a successful payment
    pub whatsapp_number: Option<String>,
}

impl Default for MerchantConfig {
    fn default() -> Self {
        Self {
            name: "Checkout".into(),
            currency: "INR".into(),
            theme_color: "#4a90e2".into(),
            whatsapp_number: None,
        }
    }
}

impl MerchantConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            name: std::env::var("MERCHANT_NAME").unwrap_or(defaults.name),
            currency: std::env::var("CHECKOUT_CURRENCY").unwrap_or(defaults.currency),
            theme_color: std::env::var("CHECKOUT_THEME_COLOR").unwrap_or(defaults.theme_color),
            whatsapp_number: std::env::var("WHATSAPP_NUMBER")
                .ok()
                .filter(|n| !n.trim().is_empty()),
        }
    }

    /// Build the widget configuration for a link
    pub fn checkout_options(&self, params: &EntryParams) -> CheckoutOptions {
        let course = params.course.as_deref().unwrap_or("your order");
        CheckoutOptions {
            key: params.key.clone(),
            amount: params.amount,
            currency: self.currency.clone(),
            name: self.name.clone(),
            description: format!("Payment for {course}"),
            order_id: params.order_id.clone(),
            prefill: Prefill {
                contact: params.phone.clone(),
                email: params.email.clone(),
            },
            theme: Theme {
                color: self.theme_color.clone(),
            },
        }
    }

    /// Chat link opened after a successful payment, if a number is configured
    pub fn success_redirect(&self, params: &EntryParams) -> Result<Option<String>> {
        let Some(number) = self.whatsapp_number.as_deref() else {
            return Ok(None);
        };

        let course = params.course.as_deref().unwrap_or("my course");
        let message = format!(
            "Hi! I've successfully completed payment for {course}. Order ID: {}",
            params.order_id
        );

        let mut url = Url::parse("https://wa.me/")
            .and_then(|base| base.join(number.trim_start_matches('+')))
            .map_err(|e| CheckoutError::Config(format!("invalid chat number {number}: {e}")))?;
        url.query_pairs_mut().append_pair("text", &message);

        Ok(Some(url.into()))
    }
}

/// Widget configuration record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutOptions {
    pub key: String,
    pub amount: u64,
    pub currency: String,
    pub name: String,
    pub description: String,
    pub order_id: String,
    pub prefill: Prefill,
    pub theme: Theme,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefill {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub color: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> EntryParams {
        EntryParams {
            order_id: "order_1".into(),
            amount: 5000,
            key: "rzp_test_abc".into(),
            phone: Some("+15550001".into()),
            course: Some("Rust 101".into()),
            course_id: Some("C1".into()),
            price: Some("50".into()),
            email: None,
        }
    }

    #[test]
    fn test_checkout_options() {
        let options = MerchantConfig::default().checkout_options(&params());
        assert_eq!(options.description, "Payment for Rust 101");
        assert_eq!(options.currency, "INR");
        assert_eq!(options.prefill.contact.as_deref(), Some("+15550001"));

        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["theme"]["color"], "#4a90e2");
        assert!(json["prefill"].get("email").is_none());
    }

    #[test]
    fn test_no_redirect_without_number() {
        let redirect = MerchantConfig::default().success_redirect(&params()).unwrap();
        assert!(redirect.is_none());
    }

    #[test]
    fn test_redirect_is_encoded() {
        let merchant = MerchantConfig {
            whatsapp_number: Some("+15556319362".into()),
            ..Default::default()
        };
        let url = merchant.success_redirect(&params()).unwrap().unwrap();
        assert!(url.starts_with("https://wa.me/15556319362?text="));
        assert!(!url.contains(' '));
        assert!(url.contains("order_1"));
    }
}
