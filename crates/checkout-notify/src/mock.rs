//! Mock Channels
//!
//! Scripted transport and recording email sender for tests and local runs.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use checkout_core::EmailFields;
use serde_json::Value;
use tokio::time::Instant;

use crate::email::EmailSender;
use crate::error::{EmailError, TransportError};
use crate::transport::{Delivered, Transport};

/// Scripted response for one attempt
#[derive(Clone, Debug)]
pub enum Scripted {
    /// 200 with this body
    Accept(Value),
    /// Error status
    Status(u16),
    /// 200 with a non-JSON body
    InvalidBody,
    /// Connection failure
    Network,
    /// Never answers
    Hang,
}

/// A request seen by the scripted transport
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub endpoint: String,
    pub body: Value,
    pub at: Instant,
}

/// Transport that replays a script, then repeats a fallback response
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Scripted,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Scripted>, fallback: Scripted) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Same response for every attempt
    pub fn always(response: Scripted) -> Self {
        Self::new(Vec::new(), response)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_json(&self, endpoint: &str, body: &Value) -> Result<Delivered, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                endpoint: endpoint.to_string(),
                body: body.clone(),
                at: Instant::now(),
            });

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match next {
            Scripted::Accept(body) => Ok(Delivered { status: 200, body }),
            Scripted::Status(status) => Err(TransportError::Status {
                status,
                body: "scripted failure".into(),
            }),
            Scripted::InvalidBody => Err(TransportError::InvalidBody("scripted".into())),
            Scripted::Network => Err(TransportError::Network("connection refused".into())),
            Scripted::Hang => std::future::pending().await,
        }
    }
}

/// Email sender that records what it was asked to send
#[derive(Default)]
pub struct MockEmailSender {
    fail: bool,
    latency: Duration,
    sent: Mutex<Vec<(String, EmailFields)>>,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender whose every send is rejected
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Simulate network latency before answering
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn sent(&self) -> Vec<(String, EmailFields)> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send(&self, template_id: &str, fields: &EmailFields) -> Result<(), EmailError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((template_id.to_string(), fields.clone()));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.fail {
            Err(EmailError::Rejected {
                status: 400,
                body: "scripted failure".into(),
            })
        } else {
            Ok(())
        }
    }
}
