//! HTTP server for payment notifications, health checks and metrics.
//!
//! Routes:
//! - `POST /ipn`     NOWPayments IPN
//! - `GET /health`   liveness check
//! - `GET /metrics`  Prometheus text format
//!
//! The router is built separately from the listener so the bot can merge it
//! with the Telegram webhook router when running in webhook mode.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::core::metrics;
use crate::core::{AppError, MessageSink};
use crate::payment::signature::SIGNATURE_HEADER;
use crate::payment::{IpnOutcome, PaymentService};

/// Shared state for the web server.
#[derive(Clone)]
struct WebState {
    payments: Arc<PaymentService>,
    notifier: Option<Arc<dyn MessageSink>>,
}

/// Build the router without binding a port
pub fn router(payments: Arc<PaymentService>, notifier: Option<Arc<dyn MessageSink>>) -> Router {
    Router::new()
        .route("/ipn", post(ipn_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(WebState { payments, notifier })
}

/// Serve `app` on 0.0.0.0:`port` until the process stops
pub async fn start_web_server(port: u16, app: Router) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    log::info!("Starting web server on http://{}", addr);
    log::info!("  /ipn      - Payment notifications");
    log::info!("  /health   - Health check");
    log::info!("  /metrics  - Prometheus metrics");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Map an IPN result to the HTTP reply.
///
/// Rejections are acknowledged with 200 so the provider stops retrying;
/// storage failures answer 503 so it tries again later.
fn ipn_response(result: &Result<IpnOutcome, AppError>) -> (StatusCode, serde_json::Value) {
    match result {
        Ok(IpnOutcome::Applied { invoice_id, days, .. }) => (
            StatusCode::OK,
            json!({"status": "ok", "invoice_id": invoice_id, "days": days}),
        ),
        Ok(IpnOutcome::Ignored { status }) => (
            StatusCode::OK,
            json!({"status": "ignored", "payment_status": status}),
        ),
        Err(AppError::Storage(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"status": "error", "reason": "storage unavailable"}),
        ),
        Err(err) => (StatusCode::OK, json!({"status": "rejected", "reason": err.to_string()})),
    }
}

async fn ipn_handler(State(state): State<WebState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let result = state.payments.handle_ipn(&body, signature).await;

    if let Err(err) = &result {
        if err.is_domain_rejection() {
            log::warn!("IPN rejected: {}", err);
        } else {
            log::error!("IPN processing failed: {}", err);
        }
    }

    if let (Ok(IpnOutcome::Applied { account, days, .. }), Some(notifier)) = (&result, &state.notifier) {
        let expires = account
            .expires_at
            .map(|e| e.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_default();
        let text = format!(
            "✅ Payment received! Premium is active for {} days (until {}).",
            days, expires
        );
        if let Err(e) = notifier.deliver(account.delivery_chat(), &text).await {
            log::warn!("Could not notify account {} about payment: {}", account.id, e);
        }
    }

    let (status, body) = ipn_response(&result);
    (status, Json(body)).into_response()
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "grab",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics_handler() -> Response {
    match metrics::render() {
        Ok(text) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            log::error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StorageError;

    #[test]
    fn test_rejections_are_acknowledged() {
        let (status, body) = ipn_response(&Err(AppError::InvalidSignature));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "rejected");

        let (status, _) = ipn_response(&Err(AppError::Storage(StorageError::Corrupt("x".into()))));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = ipn_response(&Ok(IpnOutcome::Ignored { status: "waiting".into() }));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ignored");
    }
}
