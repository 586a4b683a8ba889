//! # Error Types
//!
//! Failure classification for queue message processing.
//!
//! Every failure that reaches the disposition step is a [`ProcessingError`]: a
//! classification tag (retryable, non-retryable, cancelled) carrying the
//! underlying [`FailureCause`]. Classification is assigned where the failure is
//! created and can only be escalated towards non-retryable.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::messaging::QueueError;

/// Failure to turn a queue message body into object notifications
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decode queue message body as an object notification: {message}")]
    InvalidJson { message: String },

    #[error("the message is an invalid object notification: missing Records field")]
    MissingRecords,

    #[error("url unescape failed for '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("notification script failed: {0}")]
    Script(anyhow::Error),

    #[error("notification decoding was cancelled")]
    Cancelled,
}

impl DecodeError {
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::InvalidJson {
            message: message.into(),
        }
    }

    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::invalid_json(err.to_string())
    }
}

/// One object that could not be retrieved or parsed
#[derive(Debug, Error)]
#[error(
    "failed processing object notification for object key {key:?} in bucket {bucket:?} \
     (object record {index} of {total} in queue message): {error}"
)]
pub struct ObjectProcessingError {
    pub key: String,
    pub bucket: String,
    /// 1-based position of the record within its message
    pub index: usize,
    pub total: usize,
    pub error: anyhow::Error,
}

/// All per-object failures of a single message
#[derive(Debug)]
pub struct ObjectErrors(pub Vec<ObjectProcessingError>);

impl ObjectErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectProcessingError> {
        self.0.iter()
    }
}

impl fmt::Display for ObjectErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ObjectErrors {}

/// The underlying reason a message could not be processed
#[derive(Debug, Error)]
pub enum FailureCause {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Objects(#[from] ObjectErrors),

    #[error(
        "queue message receive count <{receive_count}> exceeds threshold {max_receive_count}: {source}"
    )]
    PoisonPill {
        receive_count: i64,
        max_receive_count: i64,
        source: Box<FailureCause>,
    },
}

/// Classified processing failure
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Reprocessing may succeed; the message is left on the queue
    #[error("retryable error: {0}")]
    Retryable(FailureCause),

    /// Reprocessing cannot succeed; the message is deleted
    #[error("non-retryable error: {0}")]
    NonRetryable(FailureCause),

    /// Processing was interrupted by shutdown
    #[error("processing was cancelled before the message could be resolved")]
    Cancelled,
}

impl ProcessingError {
    pub fn retryable(cause: impl Into<FailureCause>) -> Self {
        Self::Retryable(cause.into())
    }

    pub fn non_retryable(cause: impl Into<FailureCause>) -> Self {
        Self::NonRetryable(cause.into())
    }

    /// Classify a decode failure: cancellation propagates, everything else is permanent
    pub fn from_decode(err: DecodeError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::NonRetryable(err.into())
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    pub fn is_non_retryable(&self) -> bool {
        matches!(self, Self::NonRetryable(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            Self::Retryable(cause) | Self::NonRetryable(cause) => Some(cause),
            Self::Cancelled => None,
        }
    }

    /// Mark the failure as permanent. Already non-retryable errors are unchanged.
    pub fn escalate(self) -> Self {
        match self {
            Self::Retryable(cause) => Self::NonRetryable(cause),
            other => other,
        }
    }

    /// Force a non-retryable disposition because the message has been received
    /// too many times, keeping the original cause for diagnostics.
    ///
    /// Cancellation is not a processing failure and is returned unchanged.
    pub fn into_poison_pill(self, receive_count: i64, max_receive_count: i64) -> Self {
        match self {
            Self::Retryable(cause) | Self::NonRetryable(cause) => {
                Self::NonRetryable(FailureCause::PoisonPill {
                    receive_count,
                    max_receive_count,
                    source: Box::new(cause),
                })
            }
            Self::Cancelled => Self::Cancelled,
        }
    }
}

/// Crate-level error for setup and runtime failures outside message disposition
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Pipeline error: {message}")]
    Pipeline { message: String },
}

impl IngestError {
    pub fn pipeline(message: impl Into<String>) -> Self {
        Self::Pipeline {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
