//! # PGMQ Queue Client
//!
//! PostgreSQL message queue backend using the pgmq-rs crate.
//!
//! PGMQ has no separate receipt handle: the message id doubles as the handle,
//! `read_ct` is the receive count and `enqueued_at` the sent timestamp. A
//! visibility extension for a message that no longer exists returns no row and
//! is reported as an invalid receipt handle.

use std::time::Duration;

use async_trait::async_trait;
use ::pgmq::{types::Message, PGMQueue};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::config::{ConfigurationError, IngestConfig};
use crate::constants::attributes;
use crate::messaging::client::QueueClient;
use crate::messaging::errors::{QueueError, QueueResult};
use crate::messaging::types::{MessageId, QueueMessage, ReceiptHandle};

/// pgmq-rs based queue client bound to one queue
#[derive(Debug, Clone)]
pub struct PgmqQueueClient {
    pgmq: PGMQueue,
    pool: PgPool,
    queue_name: String,
    visibility_timeout: Duration,
}

impl PgmqQueueClient {
    /// Create a client using a connection string
    pub async fn connect(
        database_url: &str,
        queue_name: impl Into<String>,
        visibility_timeout: Duration,
    ) -> QueueResult<Self> {
        info!("Connecting to pgmq");
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| QueueError::database_connection(e.to_string()))?;
        Ok(Self::new_with_pool(pool, queue_name, visibility_timeout).await)
    }

    /// Create a client using an existing connection pool
    pub async fn new_with_pool(
        pool: PgPool,
        queue_name: impl Into<String>,
        visibility_timeout: Duration,
    ) -> Self {
        let pgmq = PGMQueue::new_with_pool(pool.clone()).await;
        Self {
            pgmq,
            pool,
            queue_name: queue_name.into(),
            visibility_timeout,
        }
    }

    /// Connect using `database.url` and the queue settings, creating the
    /// queue if needed
    pub async fn from_config(config: &IngestConfig) -> crate::error::Result<Self> {
        let url = config.database.url.as_deref().ok_or_else(|| {
            ConfigurationError::missing_required_field("database.url", "pgmq queue backend")
        })?;

        let client =
            Self::connect(url, config.queue.name.clone(), config.queue.visibility_timeout()).await?;
        client.ensure_queue().await?;
        Ok(client)
    }

    /// Create the queue if it doesn't exist
    pub async fn ensure_queue(&self) -> QueueResult<()> {
        self.pgmq
            .create(&self.queue_name)
            .await
            .map_err(|e| QueueError::queue_operation(&self.queue_name, "create", e.to_string()))?;
        info!(queue = %self.queue_name, "Queue initialized");
        Ok(())
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn message_id(&self, message: &QueueMessage) -> QueueResult<i64> {
        message
            .receipt_handle
            .as_i64()
            .ok_or_else(|| QueueError::invalid_receipt_handle(message.receipt_handle.as_str()))
    }

    fn to_queue_message(message: Message<serde_json::Value>) -> QueueMessage {
        // Notifications are usually enqueued as JSON documents; a JSON string
        // payload is taken verbatim as the body.
        let body = match message.message {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };

        QueueMessage::new(
            MessageId::from(message.msg_id),
            body,
            ReceiptHandle::from(message.msg_id),
        )
        .with_attribute(
            attributes::APPROXIMATE_RECEIVE_COUNT,
            message.read_ct.to_string(),
        )
        .with_attribute(
            attributes::SENT_TIMESTAMP,
            message.enqueued_at.timestamp_millis().to_string(),
        )
    }
}

#[async_trait]
impl QueueClient for PgmqQueueClient {
    async fn receive(&self, max_messages: usize) -> QueueResult<Vec<QueueMessage>> {
        let vt = self.visibility_timeout.as_secs() as i32;
        let limit = max_messages as i32;

        let messages = self
            .pgmq
            .read_batch::<serde_json::Value>(&self.queue_name, Some(vt), limit)
            .await
            .map_err(|e| QueueError::queue_operation(&self.queue_name, "read", e.to_string()))?
            .unwrap_or_default();

        debug!(
            queue = %self.queue_name,
            count = messages.len(),
            "Read messages from queue"
        );

        Ok(messages.into_iter().map(Self::to_queue_message).collect())
    }

    async fn delete(&self, message: &QueueMessage) -> QueueResult<()> {
        let message_id = self.message_id(message)?;

        let deleted: bool = sqlx::query_scalar("SELECT pgmq.delete($1::text, $2::bigint)")
            .bind(&self.queue_name)
            .bind(message_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QueueError::queue_operation(&self.queue_name, "delete", e.to_string()))?;

        if !deleted {
            return Err(QueueError::invalid_receipt_handle(
                message.receipt_handle.as_str(),
            ));
        }

        debug!(queue = %self.queue_name, message_id, "Message deleted");
        Ok(())
    }

    async fn extend_visibility(
        &self,
        message: &QueueMessage,
        timeout: Duration,
    ) -> QueueResult<()> {
        let message_id = self.message_id(message)?;
        let vt_seconds = timeout.as_secs() as i32;

        let row = sqlx::query("SELECT msg_id FROM pgmq.set_vt($1::text, $2::bigint, $3::integer)")
            .bind(&self.queue_name)
            .bind(message_id)
            .bind(vt_seconds)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                QueueError::queue_operation(&self.queue_name, "extend_visibility", e.to_string())
            })?;

        match row {
            Some(row) => {
                let msg_id: i64 = row.get("msg_id");
                debug!(queue = %self.queue_name, msg_id, vt_seconds, "Visibility extended");
                Ok(())
            }
            None => Err(QueueError::invalid_receipt_handle(
                message.receipt_handle.as_str(),
            )),
        }
    }

    fn provider_name(&self) -> &'static str {
        "pgmq"
    }
}
