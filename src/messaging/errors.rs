//! # Messaging Error Types
//!
//! Errors returned by queue client implementations.

use thiserror::Error;

/// Queue client errors
#[derive(Error, Debug)]
pub enum QueueError {
    /// The receipt handle no longer identifies a live lease (message deleted,
    /// lease expired and re-issued, or handle malformed)
    #[error("Receipt handle is no longer valid: {receipt_handle}")]
    InvalidReceiptHandle { receipt_handle: String },

    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },
}

impl QueueError {
    pub fn invalid_receipt_handle(receipt_handle: impl Into<String>) -> Self {
        Self::InvalidReceiptHandle {
            receipt_handle: receipt_handle.into(),
        }
    }

    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn database_connection(message: impl Into<String>) -> Self {
        Self::DatabaseConnection {
            message: message.into(),
        }
    }

    /// Whether retrying the operation with the same handle is pointless
    pub fn is_invalid_receipt_handle(&self) -> bool {
        matches!(self, Self::InvalidReceiptHandle { .. })
    }
}

/// Result type alias for queue operations
pub type QueueResult<T> = Result<T, QueueError>;
