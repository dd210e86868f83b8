//! Message lifecycle pipeline.
//!
//! Owns the status state machine, the repository contract, the pipeline
//! orchestrator (submission, queued delivery, status merge), and the webhook
//! status reconciler. Transport handlers, the provider API, and SQL
//! mechanics are reached through the seams defined here and in the
//! gateway/queue crates.

pub mod pipeline;
pub mod reconciler;
pub mod repository;
pub mod status;

pub use pipeline::{MessagePipeline, MessageRef, StatusOutcome, SubmitRequest};
pub use reconciler::{ReconcileSummary, StatusReconciler};
pub use repository::{MessageFilter, MessageRepository, NewMessage, PgMessageRepository};
