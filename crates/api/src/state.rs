//! Shared application state for the Axum API server.

use std::sync::Arc;

use courier_common::config::AppConfig;
use courier_gateway::ProviderClient;
use courier_pipeline::MessagePipeline;
use courier_queue::DeliveryQueue;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<MessagePipeline>,
    pub gateway: Arc<dyn ProviderClient>,
    /// Producer side of the reconciliation stream; webhook events are queued
    /// here and applied by the status consumer.
    pub status_queue: Arc<dyn DeliveryQueue>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        pipeline: Arc<MessagePipeline>,
        gateway: Arc<dyn ProviderClient>,
        status_queue: Arc<dyn DeliveryQueue>,
        config: AppConfig,
    ) -> Self {
        Self {
            pipeline,
            gateway,
            status_queue,
            config,
        }
    }
}
