//! Email Channel
//!
//! Sends the payment confirmation through the EmailJS REST API. A single
//! attempt; the dispatcher treats failures as best-effort.

use async_trait::async_trait;
use checkout_core::{EmailFields, NotifyConfig};
use serde::Serialize;

use crate::error::EmailError;

/// Template-based email sender
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, template_id: &str, fields: &EmailFields) -> Result<(), EmailError>;
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    template_params: &'a EmailFields,
}

/// EmailJS REST client
#[derive(Clone)]
pub struct EmailJsClient {
    endpoint: String,
    service_id: String,
    public_key: String,
    http_client: reqwest::Client,
}

impl EmailJsClient {
    pub fn new(
        endpoint: impl Into<String>,
        service_id: impl Into<String>,
        public_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            service_id: service_id.into(),
            public_key: public_key.into(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Build from config; `None` unless service id, key and template are all set
    pub fn from_config(config: &NotifyConfig) -> Option<Self> {
        if !config.email_configured() {
            return None;
        }
        let service_id = config.email_service_id.as_ref()?;
        let public_key = config.email_api_key.as_ref()?;
        Some(Self::new(&config.email_endpoint, service_id, public_key))
    }
}

#[async_trait]
impl EmailSender for EmailJsClient {
    async fn send(&self, template_id: &str, fields: &EmailFields) -> Result<(), EmailError> {
        let request = SendRequest {
            service_id: &self.service_id,
            template_id,
            user_id: &self.public_key,
            template_params: fields,
        };

        let resp = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(EmailError::Rejected { status, body });
        }

        tracing::info!(template_id, "Email sent");
        Ok(())
    }
}

/// Stand-in used when no email service is configured
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredEmail;

#[async_trait]
impl EmailSender for UnconfiguredEmail {
    async fn send(&self, _template_id: &str, _fields: &EmailFields) -> Result<(), EmailError> {
        Err(EmailError::NotConfigured)
    }
}
