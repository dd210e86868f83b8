//! Twilio messaging client.
//!
//! Sends rendered template bodies through the Twilio Messages API and parses
//! Twilio status callbacks into provider status events. The message SID
//! returned by the API is the external id used for reconciliation.

use async_trait::async_trait;
use serde::Deserialize;

use courier_common::error::AppError;
use courier_common::types::StatusEvent;

use crate::ProviderClient;
use crate::address::with_whatsapp_prefix;
use crate::template;

const DEFAULT_API_BASE: &str = "https://api.twilio.com/2010-04-01";

pub struct TwilioClient {
    account_sid: String,
    auth_token: String,
    from_number: String,
    http: reqwest::Client,
    api_base: String,
}

/// Successful response from the Messages endpoint.
#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
    #[allow(dead_code)]
    status: Option<String>,
}

/// Error response from the Messages endpoint.
#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    message: Option<String>,
    code: Option<i64>,
}

/// Status callback payload as Twilio posts it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusCallback {
    message_sid: String,
    message_status: String,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    to: Option<String>,
}

impl TwilioClient {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
    ) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
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
}

#[async_trait]
impl ProviderClient for TwilioClient {
    async fn send_template(
        &self,
        to: &str,
        template_id: &str,
        parameters: &serde_json::Value,
    ) -> Result<String, AppError> {
        let body = template::render(template_id, parameters)?;
        let endpoint = format!(
            "{}/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        );

        let form = [
            ("To", with_whatsapp_prefix(to)),
            ("From", self.from_number.clone()),
            ("Body", body),
        ];

        let response = self
            .http
            .post(&endpoint)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("twilio request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error: TwilioErrorBody = response
                .json()
                .await
                .unwrap_or(TwilioErrorBody {
                    message: None,
                    code: None,
                });
            let detail = error
                .message
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(AppError::Gateway(format!(
                "twilio API error: {detail}{}",
                error
                    .code
                    .map(|c| format!(" (code {c})"))
                    .unwrap_or_default()
            )));
        }

        let accepted: MessageResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("twilio response decode failed: {e}")))?;

        tracing::debug!(sid = %accepted.sid, "Twilio accepted message");
        Ok(accepted.sid)
    }

    fn validate_callback(&self, signature: &str, url: &str, _body: &[u8]) -> bool {
        // TODO: verify X-Twilio-Signature (HMAC-SHA1 over the URL plus the
        // sorted form parameters) once the sha1 dependency is approved.
        if signature.is_empty() {
            tracing::warn!(url, "Rejected Twilio callback without signature header");
            return false;
        }
        true
    }

    fn parse_status_events(&self, body: &[u8]) -> Result<Vec<StatusEvent>, AppError> {
        let callback: StatusCallback = serde_json::from_slice(body)
            .map_err(|e| AppError::Decode(format!("twilio callback: {e}")))?;

        Ok(vec![StatusEvent {
            external_id: callback.message_sid,
            status: callback.message_status,
            error_code: callback.error_code,
            error_message: callback.error_message,
            recipient: callback.to,
        }])
    }
}
