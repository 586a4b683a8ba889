//! # Queue Client Trait
//!
//! The three queue primitives the ingestion core depends on. Implementations
//! must be safe to share across concurrently processed messages.

use std::time::Duration;

use async_trait::async_trait;

use super::errors::QueueResult;
use super::types::QueueMessage;

/// Receive / delete / extend-visibility over leased queue messages
///
/// # Example Implementation
///
/// ```ignore
/// #[async_trait]
/// impl QueueClient for MyQueue {
///     async fn receive(&self, max_messages: usize) -> QueueResult<Vec<QueueMessage>> {
///         self.backend.read_batch(&self.queue, self.visibility_timeout, max_messages).await
///     }
///     // ... delete, extend_visibility
/// }
/// ```
#[async_trait]
pub trait QueueClient: Send + Sync + 'static {
    /// Lease up to `max_messages` messages. May long-poll; returns an empty
    /// vector when nothing is available.
    async fn receive(&self, max_messages: usize) -> QueueResult<Vec<QueueMessage>>;

    /// Delete a leased message so it is never redelivered
    async fn delete(&self, message: &QueueMessage) -> QueueResult<()>;

    /// Extend the lease of a message to `timeout` from now
    ///
    /// Returns [`QueueError::InvalidReceiptHandle`](super::QueueError::InvalidReceiptHandle)
    /// when the lease no longer exists.
    async fn extend_visibility(&self, message: &QueueMessage, timeout: Duration)
        -> QueueResult<()>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}
