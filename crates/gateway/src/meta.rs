//! Meta WhatsApp Cloud API client.
//!
//! Sends template messages through the Graph API and parses Cloud API
//! webhook bodies (`entry[].changes[].value.statuses[]`) into provider
//! status events. Callbacks are authenticated with the `X-Hub-Signature-256`
//! header: `sha256=` followed by the hex HMAC-SHA256 of the raw body keyed
//! by the app secret.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

use courier_common::error::AppError;
use courier_common::types::StatusEvent;

use crate::ProviderClient;
use crate::address::digits_only;
use crate::template;

const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v21.0";
const SIGNATURE_PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

pub struct MetaClient {
    phone_number_id: String,
    access_token: String,
    app_secret: String,
    http: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
    #[serde(default)]
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
    #[serde(default)]
    entry: Vec<WebhookEntry>,
}

#[derive(Debug, Deserialize)]
struct WebhookEntry {
    #[serde(default)]
    changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
struct WebhookChange {
    value: WebhookValue,
}

#[derive(Debug, Deserialize)]
struct WebhookValue {
    #[serde(default)]
    statuses: Vec<WebhookStatus>,
}

#[derive(Debug, Deserialize)]
struct WebhookStatus {
    id: String,
    status: String,
    #[serde(default)]
    recipient_id: Option<String>,
    #[serde(default)]
    errors: Vec<WebhookError>,
}

#[derive(Debug, Deserialize)]
struct WebhookError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    title: Option<String>,
}

impl MetaClient {
    pub fn new(
        phone_number_id: impl Into<String>,
        access_token: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        Self {
            phone_number_id: phone_number_id.into(),
            access_token: access_token.into(),
            app_secret: app_secret.into(),
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API base (test servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn expected_signature(&self, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.app_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(body);
        format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl ProviderClient for MetaClient {
    async fn send_template(
        &self,
        to: &str,
        template_id: &str,
        parameters: &serde_json::Value,
    ) -> Result<String, AppError> {
        // Render first so malformed parameters fail before the network call.
        template::render(template_id, parameters)?;

        let components = json!([{
            "type": "body",
            "parameters": template::parameter_values(parameters)
                .into_iter()
                .map(|text| json!({"type": "text", "text": text}))
                .collect::<Vec<_>>(),
        }]);

        let payload = json!({
            "messaging_product": "whatsapp",
            "to": digits_only(to),
            "type": "template",
            "template": {
                "name": template_id,
                "language": { "code": "en" },
                "components": components,
            },
        });

        let endpoint = format!("{}/{}/messages", self.api_base, self.phone_number_id);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("meta request failed: {e}")))?;

        let status = response.status();
        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("meta response decode failed: {e}")))?;

        if let Some(error) = parsed.error {
            return Err(AppError::Gateway(format!(
                "meta API error: {}{}",
                error.message,
                error.code.map(|c| format!(" (code {c})")).unwrap_or_default()
            )));
        }

        match parsed.messages.into_iter().next() {
            Some(sent) => {
                tracing::debug!(id = %sent.id, "Meta accepted message");
                Ok(sent.id)
            }
            None => Err(AppError::Gateway(format!(
                "meta API returned no message id (HTTP {status})"
            ))),
        }
    }

    fn validate_callback(&self, signature: &str, _url: &str, body: &[u8]) -> bool {
        if !signature.starts_with(SIGNATURE_PREFIX) {
            return false;
        }
        signature == self.expected_signature(body)
    }

    fn parse_status_events(&self, body: &[u8]) -> Result<Vec<StatusEvent>, AppError> {
        let webhook: WebhookBody = serde_json::from_slice(body)
            .map_err(|e| AppError::Decode(format!("meta webhook: {e}")))?;

        let events = webhook
            .entry
            .into_iter()
            .flat_map(|entry| entry.changes)
            .flat_map(|change| change.value.statuses)
            .map(|status| {
                let first_error = status.errors.into_iter().next();
                StatusEvent {
                    external_id: status.id,
                    status: status.status,
                    error_code: first_error
                        .as_ref()
                        .and_then(|e| e.code.map(|c| c.to_string())),
                    error_message: first_error.and_then(|e| e.title),
                    recipient: status.recipient_id,
                }
            })
            .collect();

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MetaClient {
        MetaClient::new("1234567890", "token", "app-secret")
    }

    #[test]
    fn test_validate_callback_accepts_correct_signature() {
        let c = client();
        let body = br#"{"object":"whatsapp_business_account"}"#;
        let signature = c.expected_signature(body);
        assert!(c.validate_callback(&signature, "/webhook", body));
    }

    #[test]
    fn test_validate_callback_rejects_tampered_body() {
        let c = client();
        let signature = c.expected_signature(b"original");
        assert!(!c.validate_callback(&signature, "/webhook", b"tampered"));
    }

    #[test]
    fn test_validate_callback_rejects_missing_prefix() {
        let c = client();
        assert!(!c.validate_callback("deadbeef", "/webhook", b"{}"));
    }

    #[test]
    fn test_parse_webhook_statuses() {
        let body = serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "0",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "statuses": [
                            { "id": "wamid.A", "status": "delivered", "recipient_id": "15551234567" },
                            {
                                "id": "wamid.B",
                                "status": "failed",
                                "errors": [{ "code": 131026, "title": "Message undeliverable" }]
                            }
                        ]
                    }
                }]
            }]
        });
        let events = client()
            .parse_status_events(body.to_string().as_bytes())
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].external_id, "wamid.A");
        assert_eq!(events[0].status, "delivered");
        assert_eq!(events[1].error_code.as_deref(), Some("131026"));
        assert_eq!(
            events[1].error_message.as_deref(),
            Some("Message undeliverable")
        );
    }

    #[test]
    fn test_parse_webhook_without_statuses() {
        let body = serde_json::json!({ "entry": [] });
        let events = client()
            .parse_status_events(body.to_string().as_bytes())
            .unwrap();
        assert!(events.is_empty());
    }
}
