//! Message submission and read routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::Message;
use courier_pipeline::{MessageFilter, SubmitRequest};

use crate::state::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/messages", post(submit_message))
        .route("/api/messages", get(list_messages))
        .route("/api/messages/{id}", get(get_message))
}

/// POST /api/messages: Submit a templated message for delivery.
///
/// Returns 202: the record is queued, delivery completes asynchronously.
async fn submit_message(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let message = state.pipeline.submit(request).await?;
    Ok((StatusCode::ACCEPTED, Json(message)))
}

/// GET /api/messages/:id: Fetch a single message record.
async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, AppError> {
    let message = state.pipeline.get_message(id).await?;
    Ok(Json(message))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    order_id: Option<String>,
    customer_id: Option<String>,
    recipient: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// GET /api/messages: List message records, newest first.
async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Message>>, AppError> {
    let filter = MessageFilter {
        order_id: query.order_id,
        customer_id: query.customer_id,
        recipient: query.recipient,
        limit: query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        offset: query.offset.unwrap_or(0).max(0),
    };
    let messages = state.pipeline.list_messages(&filter).await?;
    Ok(Json(messages))
}
