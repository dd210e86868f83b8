use std::future::Future;

use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tokio_util::sync::CancellationToken;

use courier_common::error::AppError;

use crate::retry::RetryPolicy;

/// How long a single blocking read waits before the loop re-checks for
/// cancellation.
const BLOCK_MS: usize = 5_000;

/// Batch size per read. Entries within a batch are still handled one at a
/// time, in stream order.
const READ_COUNT: usize = 10;

/// Consumer half of the delivery queue.
///
/// Reads entries through a consumer group and acknowledges them only after
/// the handler (including its retry budget) has finished, so a crash mid-job
/// leaves the entry pending and it is re-read on the next start. Jobs whose
/// retries are exhausted are appended to the dead-letter stream and then
/// acknowledged.
pub struct QueueConsumer {
    redis: ConnectionManager,
    stream: String,
    group: String,
    consumer_name: String,
    dead_letter_stream: String,
    retry: RetryPolicy,
}

impl QueueConsumer {
    pub fn new(
        redis: ConnectionManager,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer_name: impl Into<String>,
        dead_letter_stream: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            redis,
            stream: stream.into(),
            group: group.into(),
            consumer_name: consumer_name.into(),
            dead_letter_stream: dead_letter_stream.into(),
            retry,
        }
    }

    /// Run the consume loop until `token` is cancelled.
    ///
    /// Entries left pending for this consumer (delivered but never
    /// acknowledged before a previous shutdown) are drained first, then the
    /// loop blocks on new entries. Handler outcomes never stop the loop.
    pub async fn run<F, Fut>(&self, token: CancellationToken, handler: F) -> Result<(), AppError>
    where
        F: Fn(Vec<u8>) -> Fut,
        Fut: Future<Output = Result<(), AppError>>,
    {
        self.ensure_group().await?;

        tracing::info!(
            stream = %self.stream,
            group = %self.group,
            consumer = %self.consumer_name,
            "Queue consumer started"
        );

        // Redeliver our own unacknowledged entries before reading new ones.
        let mut cursor = "0".to_string();

        loop {
            let reply = tokio::select! {
                _ = token.cancelled() => break,
                res = self.read_batch(&cursor) => res,
            };

            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!(stream = %self.stream, error = %e, "Stream read failed");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    continue;
                }
            };

            let entries: Vec<_> = reply
                .keys
                .into_iter()
                .flat_map(|key| key.ids)
                .collect();

            if entries.is_empty() {
                // Pending backlog drained; switch to new entries.
                cursor = ">".to_string();
                continue;
            }

            for entry in entries {
                let Some(payload) = entry.get::<Vec<u8>>("payload") else {
                    tracing::warn!(
                        stream = %self.stream,
                        entry_id = %entry.id,
                        "Stream entry without payload field, acknowledging and skipping"
                    );
                    self.ack(&entry.id).await;
                    continue;
                };

                self.handle_with_retries(&handler, &payload).await;
                self.ack(&entry.id).await;

                if cursor != ">" {
                    // Track progress through the pending backlog.
                    cursor = entry.id.clone();
                }
            }
        }

        tracing::info!(stream = %self.stream, "Queue consumer stopped");
        Ok(())
    }

    /// Invoke the handler, retrying per the policy; exhausted jobs go to the
    /// dead-letter stream.
    async fn handle_with_retries<F, Fut>(&self, handler: &F, payload: &[u8])
    where
        F: Fn(Vec<u8>) -> Fut,
        Fut: Future<Output = Result<(), AppError>>,
    {
        let mut attempt = 1u32;
        loop {
            match handler(payload.to_vec()).await {
                Ok(()) => return,
                Err(e) => match self.retry.backoff_after(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            stream = %self.stream,
                            attempt,
                            error = %e,
                            backoff_ms = delay.as_millis() as u64,
                            "Job handler failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        tracing::error!(
                            stream = %self.stream,
                            attempts = attempt,
                            error = %e,
                            "Job handler exhausted retries, dead-lettering"
                        );
                        self.dead_letter(payload, &e.to_string()).await;
                        return;
                    }
                },
            }
        }
    }

    /// Create the consumer group if it does not exist yet.
    async fn ensure_group(&self) -> Result<(), AppError> {
        let mut conn = self.redis.clone();
        let created: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream)
            .arg(&self.group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(()) => Ok(()),
            // BUSYGROUP: the group already exists.
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(AppError::Redis(e)),
        }
    }

    async fn read_batch(&self, cursor: &str) -> Result<StreamReadReply, redis::RedisError> {
        let mut conn = self.redis.clone();
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer_name)
            .count(READ_COUNT)
            .block(BLOCK_MS);

        conn.xread_options(&[&self.stream], &[cursor], &options)
            .await
    }

    async fn ack(&self, entry_id: &str) {
        let mut conn = self.redis.clone();
        let acked: Result<u64, redis::RedisError> =
            conn.xack(&self.stream, &self.group, &[entry_id]).await;
        if let Err(e) = acked {
            tracing::error!(
                stream = %self.stream,
                entry_id,
                error = %e,
                "Failed to acknowledge stream entry"
            );
        }
    }

    async fn dead_letter(&self, payload: &[u8], error: &str) {
        let mut conn = self.redis.clone();
        let appended: Result<String, redis::RedisError> = conn
            .xadd(
                &self.dead_letter_stream,
                "*",
                &[
                    ("payload", payload),
                    ("error", error.as_bytes()),
                    ("source", self.stream.as_bytes()),
                ],
            )
            .await;
        if let Err(e) = appended {
            tracing::error!(
                stream = %self.dead_letter_stream,
                error = %e,
                "Failed to append to dead-letter stream"
            );
        }
    }
}
