//! Route-level tests against the assembled router with stubbed
//! collaborators. Storage and delivery semantics are covered by the
//! pipeline crate; these tests pin down status codes, extraction, and the
//! webhook signature gate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use courier_api::routes::create_router;
use courier_api::state::AppState;
use courier_common::config::{AppConfig, ProviderKind};
use courier_common::error::AppError;
use courier_common::types::{Message, MessageStatus, StatusEvent};
use courier_gateway::ProviderClient;
use courier_pipeline::{MessageFilter, MessagePipeline, MessageRepository, NewMessage};
use courier_queue::DeliveryQueue;

const GOOD_SIGNATURE: &str = "sha256=good";

#[derive(Default)]
struct StubRepo {
    messages: Mutex<HashMap<Uuid, Message>>,
}

#[async_trait]
impl MessageRepository for StubRepo {
    async fn create(&self, new: NewMessage) -> Result<Message, AppError> {
        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4(),
            recipient: new.recipient,
            template_id: new.template_id,
            parameters: new.parameters,
            order_id: new.order_id,
            customer_id: new.customer_id,
            status: MessageStatus::Queued,
            error_message: None,
            external_id: None,
            created_at: now,
            updated_at: now,
        };
        self.messages
            .lock()
            .await
            .insert(message.id, message.clone());
        Ok(message)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Message, AppError> {
        self.messages
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("message {id}")))
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Message, AppError> {
        Err(AppError::NotFound(format!(
            "message with external id {external_id}"
        )))
    }

    async fn list(&self, _filter: &MessageFilter) -> Result<Vec<Message>, AppError> {
        Ok(self.messages.lock().await.values().cloned().collect())
    }

    async fn update_status(
        &self,
        _id: Uuid,
        _status: MessageStatus,
        _error_message: Option<&str>,
        _external_id: Option<&str>,
    ) -> Result<bool, AppError> {
        Ok(true)
    }
}

/// Accepts exactly one signature and reports a fixed set of status events.
struct StubGateway {
    events: Vec<StatusEvent>,
}

#[async_trait]
impl ProviderClient for StubGateway {
    async fn send_template(
        &self,
        _to: &str,
        _template_id: &str,
        _parameters: &serde_json::Value,
    ) -> Result<String, AppError> {
        Ok("wamid.STUB".to_string())
    }

    fn validate_callback(&self, signature: &str, _url: &str, _body: &[u8]) -> bool {
        signature == GOOD_SIGNATURE
    }

    fn parse_status_events(&self, _body: &[u8]) -> Result<Vec<StatusEvent>, AppError> {
        Ok(self.events.clone())
    }
}

#[derive(Default)]
struct StubQueue {
    payloads: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl DeliveryQueue for StubQueue {
    async fn enqueue(&self, payload: &[u8]) -> Result<(), AppError> {
        self.payloads.lock().await.push(payload.to_vec());
        Ok(())
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/unused".to_string(),
        redis_url: "redis://localhost:6379".to_string(),
        delivery_stream: "courier:delivery".to_string(),
        status_stream: "courier:status".to_string(),
        consumer_group: "courier".to_string(),
        dead_letter_stream: "courier:dead-letter".to_string(),
        max_delivery_attempts: 3,
        retry_backoff_ms: 500,
        provider: ProviderKind::Meta,
        twilio_account_sid: None,
        twilio_auth_token: None,
        twilio_from_number: None,
        meta_phone_number_id: None,
        meta_access_token: None,
        meta_app_secret: None,
        webhook_verify_token: Some("verify-me".to_string()),
        http_port: 3000,
        db_max_connections: 1,
    }
}

fn app(events: Vec<StatusEvent>) -> (Router, Arc<StubQueue>) {
    let gateway = Arc::new(StubGateway { events });
    let delivery_queue = Arc::new(StubQueue::default());
    let status_queue = Arc::new(StubQueue::default());
    let pipeline = Arc::new(MessagePipeline::new(
        Arc::new(StubRepo::default()),
        gateway.clone(),
        delivery_queue,
    ));
    let state = AppState::new(pipeline, gateway, status_queue.clone(), test_config());
    (create_router(state), status_queue)
}

fn delivered_event() -> StatusEvent {
    StatusEvent {
        external_id: "wamid.A".to_string(),
        status: "delivered".to_string(),
        error_code: None,
        error_message: None,
        recipient: None,
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = app(vec![]);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "up");
}

#[tokio::test]
async fn test_submit_message_returns_accepted() {
    let (app, _) = app(vec![]);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/messages")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "recipient": "+15551234567",
                        "template_id": "order_confirmation",
                        "parameters": {"order_id": "ORD-1"}
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let message: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(message["status"], "queued");
    assert_eq!(message["recipient"], "+15551234567");
}

#[tokio::test]
async fn test_submit_invalid_recipient_is_bad_request() {
    let (app, _) = app(vec![]);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/messages")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "recipient": "nope",
                        "template_id": "order_confirmation",
                        "parameters": {"order_id": "ORD-1"}
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_unknown_message_is_not_found() {
    let (app, _) = app(vec![]);
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/messages/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_verification_handshake() {
    let (app, _) = app(vec![]);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"42");
}

#[tokio::test]
async fn test_webhook_verification_rejects_wrong_token() {
    let (app, _) = app(vec![]);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let (app, status_queue) = app(vec![delivered_event()]);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("x-hub-signature-256", "sha256=forged")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(status_queue.payloads.lock().await.is_empty());
}

#[tokio::test]
async fn test_webhook_queues_validated_events() {
    let (app, status_queue) = app(vec![delivered_event()]);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("x-hub-signature-256", GOOD_SIGNATURE)
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let payloads = status_queue.payloads.lock().await;
    assert_eq!(payloads.len(), 1);
    let event: StatusEvent = serde_json::from_slice(&payloads[0]).unwrap();
    assert_eq!(event.external_id, "wamid.A");
    assert_eq!(event.status, "delivered");
}

#[tokio::test]
async fn test_webhook_acknowledges_non_status_notifications() {
    let (app, status_queue) = app(vec![]);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("x-hub-signature-256", GOOD_SIGNATURE)
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(status_queue.payloads.lock().await.is_empty());
}
