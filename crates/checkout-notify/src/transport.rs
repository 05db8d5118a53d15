//! Request Transport
//!
//! One JSON POST, no retries. The retrying channel drives a `Transport`
//! so the HTTP client can be swapped out in tests.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

/// Accepted response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivered {
    pub status: u16,
    pub body: Value,
}

/// Single-shot JSON request sender
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `endpoint`. Only a 2xx with a JSON body is `Ok`.
    async fn post_json(&self, endpoint: &str, body: &Value) -> Result<Delivered, TransportError>;
}

/// reqwest-backed transport
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxies, TLS roots, ...)
    pub const fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, endpoint: &str, body: &Value) -> Result<Delivered, TransportError> {
        let resp = self.http_client.post(endpoint).json(body).send().await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let body = serde_json::from_str(&text).map_err(|e| TransportError::InvalidBody(e.to_string()))?;

        Ok(Delivered {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{Json, Router, http::StatusCode, routing::post};

    use super::*;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_accepts_json_response() {
        let app = Router::new().route(
            "/api/payment",
            post(|Json(body): Json<Value>| async move {
                Json(serde_json::json!({ "ok": true, "order_id": body["order_id"] }))
            }),
        );
        let base = serve(app).await;

        let delivered = HttpTransport::new()
            .post_json(
                &format!("{base}/api/payment"),
                &serde_json::json!({ "order_id": "O1" }),
            )
            .await
            .unwrap();

        assert_eq!(delivered.status, 200);
        assert_eq!(delivered.body["order_id"], "O1");
    }

    #[tokio::test]
    async fn test_error_status_and_bad_body() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new()
            .route(
                "/down",
                post(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }
                }),
            )
            .route("/text", post(|| async { "not json" }));
        let base = serve(app).await;
        let transport = HttpTransport::new();

        let err = transport
            .post_json(&format!("{base}/down"), &Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), Some(503));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let err = transport
            .post_json(&format!("{base}/text"), &Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidBody(_)));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = HttpTransport::new()
            .post_json(&format!("http://{addr}/api/payment"), &Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
    }
}
