//! Repository contract for message records and its Postgres implementation.
//!
//! The pipeline consumes storage through this narrow interface only. The
//! status update is *guarded*: the transition rule from [`crate::status`] is
//! baked into the row UPDATE's WHERE clause, so two writers racing on the
//! same record cannot interleave a regression between a read and a write.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{Message, MessageStatus};

/// Fields for a record about to be persisted. The id and timestamps are
/// assigned by the repository.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub recipient: String,
    pub template_id: String,
    pub parameters: serde_json::Value,
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
}

/// Listing filters; `None` means no constraint.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
    pub recipient: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persist a new record with status `queued` and return it.
    async fn create(&self, new: NewMessage) -> Result<Message, AppError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Message, AppError>;

    async fn get_by_external_id(&self, external_id: &str) -> Result<Message, AppError>;

    async fn list(&self, filter: &MessageFilter) -> Result<Vec<Message>, AppError>;

    /// Guarded status update. Applies the transition only if the ordering
    /// rule admits it; returns whether a row was updated.
    ///
    /// `error_message = None` leaves the stored value unchanged. An
    /// `external_id` is only ever assigned once; later values are ignored.
    async fn update_status(
        &self,
        id: Uuid,
        status: MessageStatus,
        error_message: Option<&str>,
        external_id: Option<&str>,
    ) -> Result<bool, AppError>;
}

/// Postgres-backed repository.
#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, new: NewMessage) -> Result<Message, AppError> {
        let id = Uuid::new_v4();

        let message: Message = sqlx::query_as(
            r#"
            INSERT INTO messages (
                id, recipient, template_id, parameters,
                order_id, customer_id, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'queued', NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&new.recipient)
        .bind(&new.template_id)
        .bind(&new.parameters)
        .bind(&new.order_id)
        .bind(&new.customer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Message, AppError> {
        sqlx::query_as("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("message {id}")))
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Message, AppError> {
        sqlx::query_as("SELECT * FROM messages WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("message with external id {external_id}")))
    }

    async fn list(&self, filter: &MessageFilter) -> Result<Vec<Message>, AppError> {
        let messages: Vec<Message> = sqlx::query_as(
            r#"
            SELECT * FROM messages
            WHERE ($1::text IS NULL OR order_id = $1)
              AND ($2::text IS NULL OR customer_id = $2)
              AND ($3::text IS NULL OR recipient = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(&filter.order_id)
        .bind(&filter.customer_id)
        .bind(&filter.recipient)
        .bind(filter.limit.max(1))
        .bind(filter.offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: MessageStatus,
        error_message: Option<&str>,
        external_id: Option<&str>,
    ) -> Result<bool, AppError> {
        // Mirrors `status::admits`: failed is sticky, failed is reachable
        // from any non-terminal state, everything else must strictly advance
        // the ordering. `array_position` yields NULL for 'failed', making
        // the comparison false without a special case.
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = $2,
                error_message = CASE WHEN $3::text IS NULL THEN error_message ELSE $3 END,
                external_id = COALESCE(external_id, $4::text),
                updated_at = NOW()
            WHERE id = $1
              AND status <> 'failed'
              AND (
                  $2::text = 'failed'
                  OR array_position(
                         ARRAY['queued','processing','sent','delivered','read'], $2::text
                     )
                   > array_position(
                         ARRAY['queued','processing','sent','delivered','read'], status
                     )
              )
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(error_message)
        .bind(external_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
