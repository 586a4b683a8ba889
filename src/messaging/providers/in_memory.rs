//! # In-Memory Queue Client
//!
//! Single-queue in-memory implementation for testing and development.
//!
//! ## Features
//!
//! - **Leases**: Received messages are invisible until their visibility timeout lapses
//! - **Receipt Handles**: Every receive issues a fresh handle; stale handles are rejected
//! - **Attributes**: Receive count and sent timestamp are reported like a hosted queue
//! - **Thread-Safe**: Uses `tokio::sync::RwLock` for concurrent access

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use crate::constants::attributes;
use crate::messaging::client::QueueClient;
use crate::messaging::errors::{QueueError, QueueResult};
use crate::messaging::types::{MessageId, QueueMessage, ReceiptHandle};

/// In-memory message with lease tracking
#[derive(Debug, Clone)]
struct InMemoryQueuedMessage {
    id: u64,
    body: String,
    sent_at: DateTime<Utc>,
    /// When the current lease expires (None = visible now)
    visible_at: Option<Instant>,
    /// Handle of the current lease
    receipt_handle: Option<String>,
    receive_count: u32,
}

impl InMemoryQueuedMessage {
    fn is_visible(&self, now: Instant) -> bool {
        self.visible_at.map(|vt| vt <= now).unwrap_or(true)
    }

    fn holds_lease(&self, handle: &ReceiptHandle, now: Instant) -> bool {
        !self.is_visible(now) && self.receipt_handle.as_deref() == Some(handle.as_str())
    }
}

/// In-memory queue client for tests and local runs
///
/// # Example
///
/// ```rust
/// use s3_event_ingest::messaging::providers::InMemoryQueueClient;
/// use s3_event_ingest::messaging::QueueClient;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = InMemoryQueueClient::new("notifications", Duration::from_secs(30));
/// queue.send(r#"{"Records":[]}"#).await;
///
/// let messages = queue.receive(10).await?;
/// assert_eq!(messages[0].receive_count(), 1);
/// queue.delete(&messages[0]).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryQueueClient {
    queue_name: String,
    visibility_timeout: Duration,
    messages: RwLock<VecDeque<InMemoryQueuedMessage>>,
    next_id: AtomicU64,
    total_received: AtomicU64,
    total_deleted: AtomicU64,
    total_extended: AtomicU64,
}

impl InMemoryQueueClient {
    pub fn new(queue_name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            queue_name: queue_name.into(),
            visibility_timeout,
            messages: RwLock::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            total_received: AtomicU64::new(0),
            total_deleted: AtomicU64::new(0),
            total_extended: AtomicU64::new(0),
        }
    }

    /// Enqueue a message body, stamped with the current time
    pub async fn send(&self, body: impl Into<String>) -> MessageId {
        self.send_at(body, Utc::now()).await
    }

    /// Enqueue a message body with an explicit sent timestamp
    pub async fn send_at(&self, body: impl Into<String>, sent_at: DateTime<Utc>) -> MessageId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut messages = self.messages.write().await;
        messages.push_back(InMemoryQueuedMessage {
            id,
            body: body.into(),
            sent_at,
            visible_at: None,
            receipt_handle: None,
            receive_count: 0,
        });
        MessageId::from(id as i64)
    }

    /// Number of messages not yet deleted (visible and leased)
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }

    /// Number of messages currently leased
    pub async fn in_flight_len(&self) -> usize {
        let now = Instant::now();
        self.messages
            .read()
            .await
            .iter()
            .filter(|m| !m.is_visible(now))
            .count()
    }

    pub fn received_count(&self) -> u64 {
        self.total_received.load(Ordering::Relaxed)
    }

    pub fn deleted_count(&self) -> u64 {
        self.total_deleted.load(Ordering::Relaxed)
    }

    pub fn extension_count(&self) -> u64 {
        self.total_extended.load(Ordering::Relaxed)
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

#[async_trait]
impl QueueClient for InMemoryQueueClient {
    async fn receive(&self, max_messages: usize) -> QueueResult<Vec<QueueMessage>> {
        let now = Instant::now();
        let visible_until = now + self.visibility_timeout;
        let mut messages = self.messages.write().await;
        let mut received = Vec::new();

        for msg in messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }
            if !msg.is_visible(now) {
                continue;
            }

            let handle = Uuid::new_v4().to_string();
            msg.visible_at = Some(visible_until);
            msg.receipt_handle = Some(handle.clone());
            msg.receive_count += 1;
            self.total_received.fetch_add(1, Ordering::Relaxed);

            received.push(
                QueueMessage::new(MessageId::from(msg.id as i64), msg.body.clone(), handle.as_str())
                    .with_attribute(
                        attributes::APPROXIMATE_RECEIVE_COUNT,
                        msg.receive_count.to_string(),
                    )
                    .with_attribute(
                        attributes::SENT_TIMESTAMP,
                        msg.sent_at.timestamp_millis().to_string(),
                    ),
            );
        }

        Ok(received)
    }

    async fn delete(&self, message: &QueueMessage) -> QueueResult<()> {
        let now = Instant::now();
        let mut messages = self.messages.write().await;

        let pos = messages
            .iter()
            .position(|m| m.holds_lease(&message.receipt_handle, now))
            .ok_or_else(|| QueueError::invalid_receipt_handle(message.receipt_handle.as_str()))?;

        messages.remove(pos);
        self.total_deleted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn extend_visibility(
        &self,
        message: &QueueMessage,
        timeout: Duration,
    ) -> QueueResult<()> {
        let now = Instant::now();
        let mut messages = self.messages.write().await;

        let msg = messages
            .iter_mut()
            .find(|m| m.holds_lease(&message.receipt_handle, now))
            .ok_or_else(|| QueueError::invalid_receipt_handle(message.receipt_handle.as_str()))?;

        msg.visible_at = Some(now + timeout);
        self.total_extended.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
