//! Webhook status reconciliation.
//!
//! Provider callbacks report delivery progress keyed by external id, in
//! their own vocabulary, possibly duplicated and out of order. The
//! reconciler maps each event to the canonical vocabulary and pushes it
//! through the pipeline's status merge; events it cannot place are dropped
//! with a warning, never failing the rest of the batch.

use std::sync::Arc;

use courier_common::error::AppError;
use courier_common::types::{MessageStatus, StatusEvent};

use crate::pipeline::{MessagePipeline, MessageRef, StatusOutcome};

/// Map a provider status token to the canonical vocabulary.
///
/// `None` means the token carries no state the pipeline tracks (for
/// example `queued` or `sending` echoes) and the event is dropped.
pub fn map_provider_status(token: &str) -> Option<MessageStatus> {
    match token {
        "sent" => Some(MessageStatus::Sent),
        "delivered" => Some(MessageStatus::Delivered),
        "read" => Some(MessageStatus::Read),
        "failed" => Some(MessageStatus::Failed),
        "undelivered" => Some(MessageStatus::Failed),
        _ => None,
    }
}

/// Outcome counts for an ingested batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub applied: usize,
    /// Rejected by the ordering rule (duplicates, late events).
    pub ignored: usize,
    /// Unmappable token or unknown external id.
    pub dropped: usize,
}

pub struct StatusReconciler {
    pipeline: Arc<MessagePipeline>,
}

impl StatusReconciler {
    pub fn new(pipeline: Arc<MessagePipeline>) -> Self {
        Self { pipeline }
    }

    /// Apply a batch of provider events. Per-event problems are logged and
    /// counted; they never abort the siblings.
    pub async fn ingest(&self, events: &[StatusEvent]) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for event in events {
            let Some(status) = map_provider_status(&event.status) else {
                tracing::debug!(
                    external_id = %event.external_id,
                    token = %event.status,
                    "Dropping event with untracked status token"
                );
                summary.dropped += 1;
                continue;
            };

            match self.ingest_one(event, status).await {
                Ok(StatusOutcome::Applied) => summary.applied += 1,
                Ok(StatusOutcome::Ignored) => summary.ignored += 1,
                Err(AppError::NotFound(_)) => {
                    // The record may simply not exist yet; callbacks are
                    // best-effort.
                    tracing::warn!(
                        external_id = %event.external_id,
                        status = %event.status,
                        "Dropping status event for unknown external id"
                    );
                    summary.dropped += 1;
                }
                Err(e) => {
                    tracing::error!(
                        external_id = %event.external_id,
                        status = %event.status,
                        error = %e,
                        "Failed to apply status event"
                    );
                    summary.dropped += 1;
                }
            }
        }

        if summary.applied + summary.ignored + summary.dropped > 0 {
            tracing::info!(
                applied = summary.applied,
                ignored = summary.ignored,
                dropped = summary.dropped,
                "Reconciled status events"
            );
        }
        summary
    }

    async fn ingest_one(
        &self,
        event: &StatusEvent,
        status: MessageStatus,
    ) -> Result<StatusOutcome, AppError> {
        let error_message = match status {
            MessageStatus::Failed => Some(describe_failure(event)),
            _ => None,
        };

        self.pipeline
            .apply_status(
                MessageRef::ExternalId(&event.external_id),
                status,
                error_message.as_deref(),
                Some(&event.external_id),
            )
            .await
    }
}

fn describe_failure(event: &StatusEvent) -> String {
    match (&event.error_code, &event.error_message) {
        (Some(code), Some(message)) => format!("{message} (code {code})"),
        (None, Some(message)) => message.clone(),
        (Some(code), None) => format!("provider error code {code}"),
        (None, None) => format!("provider reported status '{}'", event.status),
    }
}
