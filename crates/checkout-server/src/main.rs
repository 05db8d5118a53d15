//! checkout-relay HTTP Server
//!
//! Hosts checkout sessions opened from payment links and runs the
//! post-payment notification pipeline when the widget reports back.

mod handlers;
mod session;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkout_core::{MerchantConfig, NotifyConfig};
use checkout_notify::{EmailJsClient, EmailSender, HttpTransport, RetryingChannel, UnconfiguredEmail};

use crate::handlers::{
    health_check, open_session, payment_dismissed, payment_success, send_welcome,
    session_status,
};
use crate::session::MemorySessionStore;
use crate::state::{AppState, EntrySettings};

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        // Payment link entry
        .route("/pay", get(open_session))
        .route("/welcome", get(send_welcome))
        // Widget callbacks
        .route("/api/session/{id}", get(session_status))
        .route("/api/session/{id}/success", post(payment_success))
        .route("/api/session/{id}/dismiss", post(payment_dismissed))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let notify = Arc::new(NotifyConfig::from_env()?);
    let merchant = Arc::new(MerchantConfig::from_env());
    let entry = Arc::new(EntrySettings::from_env());

    let email: Arc<dyn EmailSender> = match EmailJsClient::from_config(&notify) {
        Some(client) => {
            tracing::info!("✓ EmailJS configured");
            Arc::new(client)
        }
        None => {
            tracing::warn!("⚠ EmailJS not configured - confirmation emails disabled");
            tracing::warn!(
                "  Set EMAILJS_SERVICE_ID, EMAILJS_PUBLIC_KEY and EMAILJS_TEMPLATE_ID in .env"
            );
            Arc::new(UnconfiguredEmail)
        }
    };

    match notify.backend_endpoint.as_deref() {
        Some(endpoint) => tracing::info!("✓ Backend endpoint: {}", endpoint),
        None => {
            tracing::warn!("⚠ Backend endpoint not configured - orders will not be recorded");
            tracing::warn!("  Set BACKEND_ENDPOINT in .env");
        }
    }

    tracing::info!(
        max_attempts = notify.max_attempts,
        cancel_max_attempts = notify.cancel_max_attempts,
        per_attempt_timeout_ms = notify.per_attempt_timeout_ms,
        base_delay_ms = notify.base_delay_ms,
        "Delivery policy"
    );
    tracing::info!(session_ttl_secs = entry.session_ttl.as_secs(), "Session idle limit");

    let state = AppState {
        sessions: Arc::new(MemorySessionStore::new()),
        notify,
        merchant,
        entry,
        email,
        backend: RetryingChannel::new(Arc::new(HttpTransport::new())),
    };

    let app = router(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 checkout-relay running on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                    - Health check");
    tracing::info!("  GET  /pay                       - Open a payment link");
    tracing::info!("  GET  /welcome                   - Send the welcome email");
    tracing::info!("  GET  /api/session/{{id}}          - Session status");
    tracing::info!("  POST /api/session/{{id}}/success  - Widget success callback");
    tracing::info!("  POST /api/session/{{id}}/dismiss  - Widget dismiss callback");

    axum::serve(listener, app).await?;

    Ok(())
}
