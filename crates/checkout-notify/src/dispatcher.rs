//! Outcome Dispatcher
//!
//! Turns the single terminal checkout outcome into notifications and a
//! session status.
//!
//! ```text
//! Succeeded ─┬─▶ email (1 try) ───────────┐
//!            └─▶ backend (retrying, n=3) ─┴─▶ join ─▶ Completed | PartialFailure
//!
//! Cancelled ───▶ backend (retrying, n=2) ──────────▶ Cancelled
//! ```
//!
//! The backend result decides the status; the email is best-effort. Both
//! channels are awaited to settlement, neither cancels the other, and a
//! panic inside one channel only fails that channel.
//!
//! Delivery runs on its own task. Callers wait for the settled report, so
//! a caller that goes away does not abandon a half-sent notification and a
//! later caller never starts a second one.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use checkout_core::{
    Channel, CheckoutError, EmailFields, NotificationResult, NotifyConfig, PaymentOutcome,
    SessionStatus,
};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use crate::email::EmailSender;
use crate::error::DeliveryError;
use crate::retry::{RetryPolicy, RetryingChannel};

/// Settled status plus what each channel did
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub order_id: String,
    pub status: SessionStatus,
    pub results: Vec<NotificationResult>,
}

impl DispatchReport {
    /// Result for one channel, if it was attempted
    pub fn result(&self, channel: Channel) -> Option<&NotificationResult> {
        self.results.iter().find(|r| r.channel == channel)
    }

    const fn unexpected(order_id: String) -> Self {
        Self {
            order_id,
            status: SessionStatus::UnexpectedError,
            results: Vec::new(),
        }
    }
}

/// Per-session dispatcher. Only the first outcome handed to it has effects.
pub struct OutcomeDispatcher {
    pipeline: Arc<Pipeline>,
    started: AtomicBool,
}

/// Channels and published state, shared with the delivery task
struct Pipeline {
    config: Arc<NotifyConfig>,
    email: Arc<dyn EmailSender>,
    backend: RetryingChannel,
    status: watch::Sender<SessionStatus>,
    settled: watch::Sender<Option<DispatchReport>>,
}

impl OutcomeDispatcher {
    pub fn new(
        config: Arc<NotifyConfig>,
        email: Arc<dyn EmailSender>,
        backend: RetryingChannel,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                config,
                email,
                backend,
                status: watch::Sender::new(SessionStatus::Processing),
                settled: watch::Sender::new(None),
            }),
            started: AtomicBool::new(false),
        }
    }

    /// Current session status
    pub fn status(&self) -> SessionStatus {
        *self.pipeline.status.borrow()
    }

    /// Observe status transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.pipeline.status.subscribe()
    }

    /// How long a settled session stays open
    pub fn close_delay(&self) -> Duration {
        self.pipeline.config.close_delay()
    }

    /// Whether an outcome has already been accepted
    pub fn is_dispatched(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Settled report of the first dispatch, if it has finished
    pub fn report(&self) -> Option<DispatchReport> {
        self.pipeline.settled.borrow().clone()
    }

    /// Deliver the outcome and return the terminal status
    pub async fn dispatch(&self, outcome: PaymentOutcome) -> SessionStatus {
        self.dispatch_report(outcome).await.status
    }

    /// Like [`dispatch`](Self::dispatch), with per-channel results.
    ///
    /// A repeated call performs no side effects and returns the first
    /// call's report, waiting for it if it is still in flight.
    pub async fn dispatch_report(&self, outcome: PaymentOutcome) -> DispatchReport {
        let order_id = outcome.order_id().to_string();
        let mut settled = self.pipeline.settled.subscribe();

        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!(order_id = %order_id, "Ignoring duplicate checkout outcome");
        } else {
            let pipeline = self.pipeline.clone();
            tokio::spawn(async move { pipeline.run(outcome).await });
        }

        match settled.wait_for(Option::is_some).await {
            Ok(report) => (*report)
                .clone()
                .unwrap_or_else(|| DispatchReport::unexpected(order_id)),
            Err(_) => DispatchReport::unexpected(order_id),
        }
    }
}

fn panic_detail(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

impl Pipeline {
    async fn run(&self, outcome: PaymentOutcome) {
        let order_id = outcome.order_id().to_string();
        if outcome.is_success() {
            self.status.send_replace(SessionStatus::Succeeded);
        }

        let report = match AssertUnwindSafe(self.notify(&outcome)).catch_unwind().await {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => {
                tracing::error!(order_id = %order_id, error = %err, "Outcome dispatch failed");
                DispatchReport::unexpected(order_id)
            }
            Err(panic) => {
                let detail = panic_detail(&*panic);
                tracing::error!(order_id = %order_id, panic = %detail, "Outcome dispatch panicked");
                DispatchReport::unexpected(order_id)
            }
        };

        self.status.send_replace(report.status);
        tracing::info!(
            order_id = %report.order_id,
            status = %report.status,
            "Checkout session settled"
        );
        self.settled.send_replace(Some(report));
    }

    async fn notify(&self, outcome: &PaymentOutcome) -> Result<DispatchReport, CheckoutError> {
        let order_id = outcome.order_id().to_string();
        let payload = serde_json::to_value(outcome.backend_payment())?;

        match outcome {
            PaymentOutcome::Succeeded { .. } => {
                let fields = outcome
                    .email_fields()
                    .ok_or_else(|| CheckoutError::Other("no email fields for payment".into()))?;
                let policy = RetryPolicy::from_config(&self.config);

                // Both futures exist before either is polled
                let email = self.send_email(&fields);
                let backend = self.send_backend(&payload, &policy);
                let (email, backend) = futures::join!(email, backend);

                if !email.succeeded {
                    tracing::warn!(
                        order_id = %order_id,
                        error = ?email.error_detail,
                        "Confirmation email failed"
                    );
                }

                let status = if backend.succeeded {
                    SessionStatus::Completed
                } else {
                    tracing::error!(
                        order_id = %order_id,
                        error = ?backend.error_detail,
                        "Backend not notified of captured payment"
                    );
                    SessionStatus::PartialFailure
                };

                Ok(DispatchReport {
                    order_id,
                    status,
                    results: vec![email, backend],
                })
            }

            PaymentOutcome::Cancelled { .. } => {
                let policy = RetryPolicy::from_config(&self.config)
                    .with_max_attempts(self.config.cancel_max_attempts);
                let backend = self.send_backend(&payload, &policy).await;

                if !backend.succeeded {
                    tracing::warn!(
                        order_id = %order_id,
                        error = ?backend.error_detail,
                        "Cancellation not recorded by backend"
                    );
                }

                Ok(DispatchReport {
                    order_id,
                    status: SessionStatus::Cancelled,
                    results: vec![backend],
                })
            }
        }
    }

    async fn send_email(&self, fields: &EmailFields) -> NotificationResult {
        let Some(template_id) = self.config.email_template_id.as_deref() else {
            return NotificationResult::failed(Channel::Email, "email template not configured");
        };

        match AssertUnwindSafe(self.email.send(template_id, fields))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => NotificationResult::ok(Channel::Email),
            Ok(Err(err)) => NotificationResult::failed(Channel::Email, err.to_string()),
            Err(panic) => {
                let detail = panic_detail(&*panic);
                tracing::error!(channel = %Channel::Email, panic = %detail, "Channel panicked");
                NotificationResult::failed(Channel::Email, format!("email sender panicked: {detail}"))
            }
        }
    }

    async fn send_backend(&self, payload: &Value, policy: &RetryPolicy) -> NotificationResult {
        let Some(endpoint) = self.config.backend_endpoint.as_deref() else {
            return NotificationResult::failed(
                Channel::Backend,
                DeliveryError::NotConfigured.to_string(),
            );
        };

        match AssertUnwindSafe(self.backend.send(endpoint, payload, policy))
            .catch_unwind()
            .await
        {
            Ok(Ok(_)) => NotificationResult::ok(Channel::Backend),
            Ok(Err(err)) => NotificationResult::failed(Channel::Backend, err.to_string()),
            Err(panic) => {
                let detail = panic_detail(&*panic);
                tracing::error!(channel = %Channel::Backend, panic = %detail, "Channel panicked");
                NotificationResult::failed(
                    Channel::Backend,
                    format!("backend transport panicked: {detail}"),
                )
            }
        }
    }
}
