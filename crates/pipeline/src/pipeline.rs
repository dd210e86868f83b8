//! Pipeline orchestrator: submission, queued delivery, and the single
//! authoritative status merge point.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{Message, MessageStatus, QueueJob};
use courier_gateway::ProviderClient;
use courier_gateway::address::normalize_recipient;
use courier_queue::DeliveryQueue;

use crate::repository::{MessageFilter, MessageRepository, NewMessage};
use crate::status;

/// A submission as accepted from the transport layer.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub recipient: String,
    pub template_id: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
}

/// Key for a status update: records are addressed by internal id on the
/// send path and by provider external id on the reconciliation path.
#[derive(Debug, Clone, Copy)]
pub enum MessageRef<'a> {
    Id(Uuid),
    ExternalId(&'a str),
}

/// Result of a status merge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    Applied,
    /// Rejected by the ordering rule: a duplicate or late update, not an
    /// error.
    Ignored,
}

pub struct MessagePipeline {
    repo: Arc<dyn MessageRepository>,
    gateway: Arc<dyn ProviderClient>,
    queue: Arc<dyn DeliveryQueue>,
}

impl MessagePipeline {
    pub fn new(
        repo: Arc<dyn MessageRepository>,
        gateway: Arc<dyn ProviderClient>,
        queue: Arc<dyn DeliveryQueue>,
    ) -> Self {
        Self {
            repo,
            gateway,
            queue,
        }
    }

    /// Accept a submission: persist a `queued` record and hand a delivery
    /// job to the queue. Returns without waiting for delivery.
    ///
    /// If the enqueue fails the record is marked `failed` (it stays behind
    /// as an auditable failed submission) and the enqueue error is returned.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Message, AppError> {
        let recipient = normalize_recipient(&request.recipient)?;

        let message = self
            .repo
            .create(NewMessage {
                recipient,
                template_id: request.template_id,
                parameters: request.parameters,
                order_id: request.order_id,
                customer_id: request.customer_id,
            })
            .await?;

        let job = QueueJob::from_message(&message);
        let payload = serde_json::to_vec(&job)
            .map_err(|e| AppError::Enqueue(format!("job encode failed: {e}")))?;

        if let Err(enqueue_err) = self.queue.enqueue(&payload).await {
            tracing::error!(
                message_id = %message.id,
                error = %enqueue_err,
                "Enqueue failed, marking submission as failed"
            );
            if let Err(update_err) = self
                .repo
                .update_status(
                    message.id,
                    MessageStatus::Failed,
                    Some(&format!("failed to queue message: {enqueue_err}")),
                    None,
                )
                .await
            {
                tracing::error!(
                    message_id = %message.id,
                    error = %update_err,
                    "Failed to record enqueue failure"
                );
            }
            return Err(enqueue_err);
        }

        tracing::info!(
            message_id = %message.id,
            template_id = %message.template_id,
            "Message queued for delivery"
        );
        Ok(message)
    }

    /// Queue-consumer handler: drive one delivery job through the gateway.
    ///
    /// The queue payload is only a snapshot; the authoritative record is
    /// reloaded before sending so the gateway never acts on stale fields. A
    /// transition to `processing` that the ordering rule rejects means the
    /// job is a stale redelivery and is skipped.
    pub async fn process_queued_job(&self, payload: &[u8]) -> Result<(), AppError> {
        let job: QueueJob = serde_json::from_slice(payload)
            .map_err(|e| AppError::Decode(format!("delivery job: {e}")))?;

        let message = self.repo.get_by_id(job.message_id).await?;

        let claimed = self
            .repo
            .update_status(message.id, MessageStatus::Processing, None, None)
            .await?;
        if !claimed {
            tracing::warn!(
                message_id = %message.id,
                status = %message.status,
                "Skipping stale delivery job"
            );
            return Ok(());
        }

        match self
            .gateway
            .send_template(&message.recipient, &message.template_id, &message.parameters)
            .await
        {
            Ok(external_id) => {
                self.repo
                    .update_status(message.id, MessageStatus::Sent, None, Some(&external_id))
                    .await?;
                tracing::info!(
                    message_id = %message.id,
                    external_id = %external_id,
                    "Message sent"
                );
                Ok(())
            }
            Err(send_err) => {
                // The send has already happened or failed; there is nothing
                // to roll back. Record the failure, then surface the error.
                if let Err(update_err) = self
                    .repo
                    .update_status(
                        message.id,
                        MessageStatus::Failed,
                        Some(&send_err.to_string()),
                        None,
                    )
                    .await
                {
                    tracing::error!(
                        message_id = %message.id,
                        error = %update_err,
                        "Failed to record gateway failure"
                    );
                }
                Err(send_err)
            }
        }
    }

    /// The canonical status transition. All status writes from both the
    /// send path and the reconciliation path merge through here.
    pub async fn apply_status(
        &self,
        key: MessageRef<'_>,
        status: MessageStatus,
        error_message: Option<&str>,
        external_id: Option<&str>,
    ) -> Result<StatusOutcome, AppError> {
        let message = match key {
            MessageRef::Id(id) => self.repo.get_by_id(id).await?,
            MessageRef::ExternalId(ext) => self.repo.get_by_external_id(ext).await?,
        };

        // Pre-check to avoid pointless writes; the repository re-applies the
        // same rule atomically inside the UPDATE.
        if !status::admits(message.status, status) {
            tracing::debug!(
                message_id = %message.id,
                current = %message.status,
                target = %status,
                "Status update ignored by ordering rule"
            );
            return Ok(StatusOutcome::Ignored);
        }

        let applied = self
            .repo
            .update_status(message.id, status, error_message, external_id)
            .await?;

        if applied {
            tracing::info!(
                message_id = %message.id,
                from = %message.status,
                to = %status,
                "Status updated"
            );
            Ok(StatusOutcome::Applied)
        } else {
            Ok(StatusOutcome::Ignored)
        }
    }

    pub async fn get_message(&self, id: Uuid) -> Result<Message, AppError> {
        self.repo.get_by_id(id).await
    }

    pub async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>, AppError> {
        self.repo.list(filter).await
    }
}
