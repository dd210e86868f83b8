use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use courier_common::error::AppError;

/// Producer half of the delivery queue.
///
/// An `Ok` return means the broker has durably accepted the payload; an
/// error means delivery is not guaranteed and the caller must treat the
/// submission as failed.
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn enqueue(&self, payload: &[u8]) -> Result<(), AppError>;
}

/// `DeliveryQueue` backed by a Redis stream.
#[derive(Clone)]
pub struct RedisQueue {
    redis: ConnectionManager,
    stream: String,
}

impl RedisQueue {
    pub fn new(redis: ConnectionManager, stream: impl Into<String>) -> Self {
        Self {
            redis,
            stream: stream.into(),
        }
    }
}

#[async_trait]
impl DeliveryQueue for RedisQueue {
    async fn enqueue(&self, payload: &[u8]) -> Result<(), AppError> {
        let mut conn = self.redis.clone();

        // XADD returns the generated entry id once the append is acknowledged.
        let entry_id: String = conn
            .xadd(&self.stream, "*", &[("payload", payload)])
            .await
            .map_err(|e| AppError::Enqueue(e.to_string()))?;

        tracing::debug!(stream = %self.stream, entry_id = %entry_id, "Payload enqueued");
        Ok(())
    }
}
