use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical message status vocabulary.
///
/// `Queued` through `Read` form a strictly increasing progression; `Failed`
/// is a terminal absorbing state that sits outside the numeric ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Processing,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Position in the delivery progression, `None` for the terminal
    /// `Failed` state which does not participate in the ordering.
    pub fn rank(self) -> Option<u8> {
        match self {
            MessageStatus::Queued => Some(0),
            MessageStatus::Processing => Some(1),
            MessageStatus::Sent => Some(2),
            MessageStatus::Delivered => Some(3),
            MessageStatus::Read => Some(4),
            MessageStatus::Failed => None,
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Queued => write!(f, "queued"),
            MessageStatus::Processing => write!(f, "processing"),
            MessageStatus::Sent => write!(f, "sent"),
            MessageStatus::Delivered => write!(f, "delivered"),
            MessageStatus::Read => write!(f, "read"),
            MessageStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(MessageStatus::Queued),
            "processing" => Ok(MessageStatus::Processing),
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            "failed" => Ok(MessageStatus::Failed),
            other => Err(format!("unknown message status '{other}'")),
        }
    }
}

/// A templated notification message as persisted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    /// Destination address, normalized to the provider's convention.
    pub recipient: String,
    pub template_id: String,
    /// String-keyed map of string | number | bool template parameters.
    pub parameters: serde_json::Value,
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
    pub status: MessageStatus,
    pub error_message: Option<String>,
    /// Provider-assigned identifier, set once the provider accepts the send.
    /// Join key for webhook reconciliation; assigned at most once.
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Denormalized delivery job carried on the queue between submission and the
/// consumer. A snapshot only; the pipeline reloads the authoritative record
/// before sending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub message_id: Uuid,
    pub recipient: String,
    pub template_id: String,
    pub parameters: serde_json::Value,
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
}

impl QueueJob {
    pub fn from_message(msg: &Message) -> Self {
        Self {
            message_id: msg.id,
            recipient: msg.recipient.clone(),
            template_id: msg.template_id.clone(),
            parameters: msg.parameters.clone(),
            order_id: msg.order_id.clone(),
            customer_id: msg.customer_id.clone(),
        }
    }
}

/// One provider delivery-status event, as carried on the reconciliation
/// stream. `status` is the raw provider token; mapping to the canonical
/// vocabulary happens in the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub external_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}
