//! Delivery gateway: the messaging-provider boundary.
//!
//! The pipeline sees one capability interface, [`ProviderClient`]; all
//! provider-specific vocabulary (endpoints, auth, template formats, webhook
//! payload shapes, signature schemes) lives behind it. Two implementations
//! are provided and selected at startup: [`TwilioClient`] and [`MetaClient`].

pub mod address;
pub mod meta;
pub mod template;
pub mod twilio;

use async_trait::async_trait;

use courier_common::error::AppError;
use courier_common::types::StatusEvent;

pub use meta::MetaClient;
pub use twilio::TwilioClient;

/// Capability interface for a messaging provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Send a templated message. Returns the provider-assigned external id
    /// on acceptance.
    async fn send_template(
        &self,
        to: &str,
        template_id: &str,
        parameters: &serde_json::Value,
    ) -> Result<String, AppError>;

    /// Check the authenticity of a webhook callback before its events are
    /// ingested.
    fn validate_callback(&self, signature: &str, url: &str, body: &[u8]) -> bool;

    /// Translate a raw webhook body into provider status events.
    fn parse_status_events(&self, body: &[u8]) -> Result<Vec<StatusEvent>, AppError>;
}
