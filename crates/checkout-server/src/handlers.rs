//! HTTP Handlers

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};

use checkout_core::{
    CheckoutError, CheckoutOptions, EmailFields, PaymentOutcome, SessionId, SessionStatus,
    parse_entry,
};

use crate::session::{CheckoutSession, SessionStore};
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub email_configured: bool,
    pub backend_configured: bool,
    pub open_sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenSessionResponse {
    pub session_id: String,
    pub checkout: CheckoutOptions,
}

/// Widget success callback
#[derive(Debug, Deserialize)]
pub struct SuccessCallback {
    pub razorpay_payment_id: String,
    /// Passed through by the widget; not verified here
    #[serde(default)]
    pub razorpay_signature: Option<String>,
}

/// What the page renders
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub order_id: String,
    pub status: SessionStatus,
    pub message: String,
    /// Present once the status is terminal
    pub close_after_ms: Option<u64>,
    pub redirect_url: Option<String>,
}

/// Page text after a welcome link, whether or not an email went out
pub const WELCOME_MESSAGE: &str = "Welcome Email Sent. You may close this tab.";

#[derive(Debug, Serialize, Deserialize)]
pub struct WelcomeResponse {
    pub sent: bool,
    pub message: String,
}

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn internal(err: &CheckoutError) -> ApiError {
    tracing::error!(error = %err, "Session store error");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, err.user_message(), err.code())
}

fn find_session(state: &AppState, id: &str) -> Result<Arc<CheckoutSession>, ApiError> {
    state
        .sessions
        .get(&SessionId::from_string(id))
        .map_err(|e| internal(&e))?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Session not found or closed", "SESSION_NOT_FOUND"))
}

fn view(state: &AppState, session: &CheckoutSession) -> SessionView {
    let status = session.dispatcher.status();

    let redirect_url = if matches!(status, SessionStatus::Completed | SessionStatus::PartialFailure) {
        state
            .merchant
            .success_redirect(&session.params)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Could not build success redirect");
                None
            })
    } else {
        None
    };

    SessionView {
        session_id: session.id.to_string(),
        order_id: session.params.order_id.clone(),
        status,
        message: status.user_message(&session.params.order_id),
        close_after_ms: status
            .is_terminal()
            .then(|| u64::try_from(session.dispatcher.close_delay().as_millis()).unwrap_or(u64::MAX)),
        redirect_url,
    }
}

/// Remove the session once its close delay has passed
fn schedule_close(state: &AppState, session: &CheckoutSession) {
    let sessions = state.sessions.clone();
    let id = session.id.clone();
    let delay = session.dispatcher.close_delay();

    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match sessions.remove(&id) {
            Ok(true) => tracing::info!(session_id = %id, "Session closed"),
            Ok(false) => {}
            Err(e) => tracing::warn!(session_id = %id, error = %e, "Failed to close session"),
        }
    });
}

/// Remove a session that is still waiting for its callback after the idle limit
fn schedule_expiry(state: &AppState, session: &CheckoutSession) {
    let sessions = state.sessions.clone();
    let id = session.id.clone();
    let dispatcher = session.dispatcher.clone();
    let ttl = state.entry.session_ttl;

    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;

        if dispatcher.is_dispatched() {
            // A delivery in flight settles before its session goes
            let mut status = dispatcher.subscribe();
            let _ = status.wait_for(|s| s.is_terminal()).await;
        }

        match sessions.remove(&id) {
            Ok(true) => tracing::info!(session_id = %id, "Session expired"),
            Ok(false) => {}
            Err(e) => tracing::warn!(session_id = %id, error = %e, "Failed to expire session"),
        }
    });
}

/// Run the pipeline detached from the request so a dropped connection
/// cannot cut it short or skip the close
async fn settle(
    state: &AppState,
    session: &Arc<CheckoutSession>,
    outcome: PaymentOutcome,
) -> SessionView {
    let first = !session.dispatcher.is_dispatched();
    let task_state = state.clone();
    let task_session = session.clone();

    let status = tokio::spawn(async move {
        let status = task_session.dispatcher.dispatch(outcome).await;
        if first && status.is_terminal() {
            schedule_close(&task_state, &task_session);
        }
        status
    })
    .await
    .unwrap_or_else(|e| {
        tracing::error!(error = %e, "Dispatch task failed");
        SessionStatus::UnexpectedError
    });

    let mut view = view(state, session);
    // The task result wins if the dispatcher itself could not record it
    view.status = status;
    view.message = status.user_message(&session.params.order_id);
    view
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        email_configured: state.notify.email_configured(),
        backend_configured: state.notify.backend_endpoint.is_some(),
        open_sessions: state.sessions.len().unwrap_or(0),
    })
}

/// Open a session from a payment link
pub async fn open_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    if state.entry.require_referrer && !headers.contains_key(header::REFERER) {
        tracing::info!("Direct access without referrer, redirecting");
        return Ok(Redirect::to(&state.entry.fallback_url).into_response());
    }

    let params = parse_entry(&query, state.entry.strictness)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.user_message(), e.code()))?;

    let session = Arc::new(CheckoutSession {
        id: SessionId::new(),
        checkout: state.merchant.checkout_options(&params),
        params,
        dispatcher: Arc::new(state.dispatcher()),
    });
    state.sessions.save(session.clone()).map_err(|e| internal(&e))?;
    schedule_expiry(&state, &session);

    tracing::info!(
        session_id = %session.id,
        order_id = %session.params.order_id,
        amount = session.params.amount,
        "Checkout session opened"
    );

    Ok(Json(OpenSessionResponse {
        session_id: session.id.to_string(),
        checkout: session.checkout.clone(),
    })
    .into_response())
}

/// Widget success callback
pub async fn payment_success(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SuccessCallback>,
) -> Result<Json<SessionView>, ApiError> {
    let session = find_session(&state, &id)?;

    if payload.razorpay_payment_id.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Missing payment id",
            "MISSING_PAYMENT_ID",
        ));
    }

    tracing::info!(
        session_id = %session.id,
        order_id = %session.params.order_id,
        payment_id = %payload.razorpay_payment_id,
        signed = payload.razorpay_signature.is_some(),
        "Payment succeeded"
    );

    let outcome = PaymentOutcome::succeeded(&session.params, payload.razorpay_payment_id);
    Ok(Json(settle(&state, &session, outcome).await))
}

/// Widget dismiss callback
pub async fn payment_dismissed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = find_session(&state, &id)?;

    tracing::info!(
        session_id = %session.id,
        order_id = %session.params.order_id,
        "Checkout dismissed"
    );

    let outcome = PaymentOutcome::cancelled(&session.params);
    Ok(Json(settle(&state, &session, outcome).await))
}

/// Welcome email for a new signup; sent only with both email and name
pub async fn send_welcome(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<WelcomeResponse> {
    let param = |name: &str| query.get(name).map(String::as_str);

    let sent = match EmailFields::welcome(param("email"), param("name"), param("phone")) {
        Some(fields) => match state.email.send(&state.notify.welcome_template_id, &fields).await {
            Ok(()) => {
                tracing::info!("Welcome email sent");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Welcome email failed");
                false
            }
        },
        None => {
            tracing::debug!("Welcome link without email and name");
            false
        }
    };

    Json(WelcomeResponse {
        sent,
        message: WELCOME_MESSAGE.into(),
    })
}

/// Current session status
pub async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = find_session(&state, &id)?;
    Ok(Json(view(&state, &session)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{Router, body::Body, http::Request};
    use checkout_core::{MerchantConfig, NotifyConfig, Strictness};
    use checkout_notify::{
        RetryingChannel,
        mock::{MockEmailSender, Scripted, ScriptedTransport},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::session::MemorySessionStore;
    use crate::state::EntrySettings;

    struct Harness {
        state: AppState,
        email: Arc<MockEmailSender>,
        transport: Arc<ScriptedTransport>,
    }

    fn harness(backend: Scripted, entry: EntrySettings) -> Harness {
        let email = Arc::new(MockEmailSender::new());
        let transport = Arc::new(ScriptedTransport::always(backend));
        let state = AppState {
            sessions: Arc::new(MemorySessionStore::new()),
            notify: Arc::new(NotifyConfig {
                email_template_id: Some("template_payment".into()),
                backend_endpoint: Some("http://backend/api/payment".into()),
                close_delay_ms: 1_000,
                ..Default::default()
            }),
            merchant: Arc::new(MerchantConfig {
                whatsapp_number: Some("15550000000".into()),
                ..Default::default()
            }),
            entry: Arc::new(entry),
            email: email.clone(),
            backend: RetryingChannel::new(transport.clone()),
        };
        Harness {
            state,
            email,
            transport,
        }
    }

    fn app(h: &Harness) -> Router {
        crate::router(h.state.clone())
    }

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, Response) {
        let resp = app.oneshot(req).await.unwrap();
        (resp.status(), resp)
    }

    async fn json<T: serde::de::DeserializeOwned>(resp: Response) -> T {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn open(h: &Harness) -> String {
        let (status, resp) = call(
            app(h),
            get("/pay?order_id=O1&amount=5000&key=rzp_test&phone=%2B1555&course=Rust%20101&course_id=C1&email=a%40b.com"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body: OpenSessionResponse = json(resp).await;
        assert_eq!(body.checkout.description, "Payment for Rust 101");
        assert_eq!(body.checkout.amount, 5000);
        body.session_id
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(Scripted::Accept(serde_json::Value::Null), EntrySettings::default());
        let (status, resp) = call(app(&h), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        let body: serde_json::Value = json(resp).await;
        assert_eq!(body["backend_configured"], true);
        assert_eq!(body["email_configured"], false);
    }

    #[tokio::test]
    async fn test_invalid_link_never_dispatches() {
        let h = harness(Scripted::Accept(serde_json::Value::Null), EntrySettings::default());

        let (status, resp) = call(app(&h), get("/pay?amount=5000&key=k")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: ErrorResponse = json(resp).await;
        assert_eq!(body.code, "INVALID_LINK");
        assert_eq!(body.error, "Invalid Payment Link");

        assert_eq!(h.state.sessions.len().unwrap(), 0);
        assert_eq!(h.transport.call_count(), 0);
        assert!(h.email.sent().is_empty());
    }

    #[tokio::test]
    async fn test_strict_links() {
        let entry = EntrySettings {
            strictness: Strictness::Strict,
            ..Default::default()
        };
        let h = harness(Scripted::Accept(serde_json::Value::Null), entry);
        let (status, _) = call(app(&h), get("/pay?order_id=O1&amount=5000&key=k")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_success_flow_and_duplicate_callback() {
        let h = harness(
            Scripted::Accept(serde_json::json!({ "success": true })),
            EntrySettings::default(),
        );
        let id = open(&h).await;

        let uri = format!("/api/session/{id}/success");
        let (status, resp) = call(app(&h), post(&uri, r#"{"razorpay_payment_id":"pay_1"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        let view: SessionView = json(resp).await;
        assert_eq!(view.status, SessionStatus::Completed);
        assert_eq!(view.close_after_ms, Some(1_000));
        assert!(view.redirect_url.unwrap().starts_with("https://wa.me/15550000000?text="));

        let body = &h.transport.calls()[0].body;
        assert_eq!(body["payment_id"], "pay_1");
        assert_eq!(body["amount"], 5000);
        assert_eq!(h.email.sent().len(), 1);

        // Second success callback for the same session
        let (status, resp) = call(app(&h), post(&uri, r#"{"razorpay_payment_id":"pay_2"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        let view: SessionView = json(resp).await;
        assert_eq!(view.status, SessionStatus::Completed);
        assert_eq!(h.transport.call_count(), 1);
        assert_eq!(h.email.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_down_is_partial_failure() {
        let h = harness(Scripted::Status(503), EntrySettings::default());
        let id = open(&h).await;

        let (_, resp) = call(
            app(&h),
            post(&format!("/api/session/{id}/success"), r#"{"razorpay_payment_id":"pay_1"}"#),
        )
        .await;
        let view: SessionView = json(resp).await;

        assert_eq!(view.status, SessionStatus::PartialFailure);
        assert!(view.message.contains("O1"));
        assert_eq!(h.transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_and_self_close() {
        let h = harness(Scripted::Network, EntrySettings::default());
        let id = open(&h).await;

        let (status, resp) = call(app(&h), post(&format!("/api/session/{id}/dismiss"), "")).await;
        assert_eq!(status, StatusCode::OK);
        let view: SessionView = json(resp).await;
        assert_eq!(view.status, SessionStatus::Cancelled);
        assert!(view.redirect_url.is_none());
        assert_eq!(h.transport.call_count(), 2);
        assert_eq!(h.transport.calls()[0].body["payment_id"], "PAYMENT_FAILED");

        let (status, _) = call(app(&h), get(&format!("/api/session/{id}"))).await;
        assert_eq!(status, StatusCode::OK);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        tokio::task::yield_now().await;

        let (status, _) = call(app(&h), get(&format!("/api/session/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_before_callback() {
        let h = harness(Scripted::Accept(serde_json::Value::Null), EntrySettings::default());
        let id = open(&h).await;

        let (_, resp) = call(app(&h), get(&format!("/api/session/{id}"))).await;
        let view: SessionView = json(resp).await;
        assert_eq!(view.status, SessionStatus::Processing);
        assert!(view.close_after_ms.is_none());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let h = harness(Scripted::Accept(serde_json::Value::Null), EntrySettings::default());
        let (status, _) = call(app(&h), post("/api/session/nope/dismiss", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_referrer_guard() {
        let entry = EntrySettings {
            require_referrer: true,
            fallback_url: "https://example.com".into(),
            ..Default::default()
        };
        let h = harness(Scripted::Accept(serde_json::Value::Null), entry);

        let (status, resp) = call(app(&h), get("/pay?order_id=O1&amount=1&key=k")).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "https://example.com");

        let req = Request::builder()
            .uri("/pay?order_id=O1&amount=1&key=k")
            .header(header::REFERER, "https://shop.example.com/")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(app(&h), req).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsettled_session_expires() {
        let entry = EntrySettings {
            session_ttl: Duration::from_secs(60),
            ..Default::default()
        };
        let h = harness(Scripted::Accept(serde_json::Value::Null), entry);
        let id = open(&h).await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        let (status, _) = call(app(&h), get(&format!("/api/session/{id}"))).await;
        assert_eq!(status, StatusCode::OK);

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;

        let (status, _) = call(app(&h), get(&format!("/api/session/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(h.state.sessions.len().unwrap(), 0);
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_welcome_email() {
        let h = harness(Scripted::Accept(serde_json::Value::Null), EntrySettings::default());

        let (status, resp) = call(
            app(&h),
            get("/welcome?email=a%40b.com&name=Asha&phone=%2B1555"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body: WelcomeResponse = json(resp).await;
        assert!(body.sent);
        assert_eq!(body.message, WELCOME_MESSAGE);

        let sent = h.email.sent();
        assert_eq!(sent.len(), 1);
        let (template, fields) = &sent[0];
        assert_eq!(template, "template_welcome_user");
        assert_eq!(fields.get("to_email"), Some("a@b.com"));
        assert_eq!(fields.get("name"), Some("Asha"));
        assert_eq!(fields.get("phone"), Some("+1555"));
    }

    #[tokio::test]
    async fn test_welcome_needs_email_and_name() {
        let h = harness(Scripted::Accept(serde_json::Value::Null), EntrySettings::default());

        let (status, resp) = call(app(&h), get("/welcome?email=a%40b.com&phone=%2B1555")).await;
        assert_eq!(status, StatusCode::OK);
        let body: WelcomeResponse = json(resp).await;
        assert!(!body.sent);
        assert!(h.email.sent().is_empty());
    }
}
