//! Provider webhook endpoint.
//!
//! Signature validation happens here, before any event reaches the
//! reconciler. Validated events are placed on the reconciliation stream one
//! by one; the status consumer applies them through the pipeline's ordered
//! status merge.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use courier_common::error::AppError;

use crate::state::AppState;

/// Meta's signature header; Twilio uses its own.
const META_SIGNATURE_HEADER: &str = "x-hub-signature-256";
const TWILIO_SIGNATURE_HEADER: &str = "x-twilio-signature";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(receive_webhook))
        .route("/webhook", get(verify_webhook))
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET /webhook: Meta subscription verification handshake.
async fn verify_webhook(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let expected = state.config.webhook_verify_token.as_deref();
    match (query.mode.as_deref(), query.verify_token.as_deref(), expected) {
        (Some("subscribe"), Some(token), Some(expected)) if token == expected => {
            (StatusCode::OK, query.challenge.unwrap_or_default()).into_response()
        }
        _ => {
            tracing::warn!("Rejected webhook verification request");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "invalid verification request"})),
            )
                .into_response()
        }
    }
}

/// POST /webhook: Ingest provider delivery-status callbacks.
async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let signature = headers
        .get(META_SIGNATURE_HEADER)
        .or_else(|| headers.get(TWILIO_SIGNATURE_HEADER))
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !state.gateway.validate_callback(signature, "/webhook", &body) {
        tracing::warn!("Rejected webhook with invalid signature");
        return Err(AppError::Validation("invalid webhook signature".to_string()));
    }

    let events = state.gateway.parse_status_events(&body)?;
    if events.is_empty() {
        // Non-status notifications (inbound messages etc.) are acknowledged
        // and ignored.
        return Ok(StatusCode::OK);
    }

    for event in &events {
        let payload = serde_json::to_vec(event)
            .map_err(|e| AppError::Enqueue(format!("event encode failed: {e}")))?;
        state.status_queue.enqueue(&payload).await?;
    }

    tracing::debug!(events = events.len(), "Webhook events queued for reconciliation");
    Ok(StatusCode::OK)
}
