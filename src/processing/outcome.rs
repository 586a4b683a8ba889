//! # Processing Outcome and Disposition
//!
//! [`ProcessingOutcome`] is the result of processing one queue message. It is
//! resolved exactly once, by value, after the caller has confirmed that every
//! record emitted for the message was acknowledged downstream:
//!
//! - [`ProcessingOutcome::complete`] decides whether the message is deleted
//!   or left for redelivery and runs finalizers after a successful delete
//! - [`ProcessingOutcome::abandon`] stops the keepalive and leaves the queue
//!   untouched, for shutdown or a failed downstream publish
//!
//! Dropping an outcome without resolving it cancels its keepalive.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::ProcessingError;
use crate::messaging::{QueueClient, QueueMessage};
use crate::metrics::MetricsSink;
use crate::processing::handler::Finalizer;
use crate::processing::keepalive::VisibilityKeepalive;

/// What happened to a message when its outcome was completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed without error and deleted; finalizers ran
    Deleted,
    /// Processed without error but the delete failed; it will be redelivered
    DeleteFailed,
    /// Failed with a non-retryable error and was deleted
    Dropped,
    /// Failed with a non-retryable error and could not be deleted
    DropFailed,
    /// Failed with a retryable error (or was cancelled) and left on the queue
    Returned,
}

impl Disposition {
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted | Self::Dropped)
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Deleted => "deleted",
            Self::DeleteFailed => "delete_failed",
            Self::Dropped => "dropped",
            Self::DropFailed => "drop_failed",
            Self::Returned => "returned",
        };
        f.write_str(s)
    }
}

/// Bucket and key of a notification carried by the message, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

/// Queue side of disposition, shared by all outcomes of one processor
pub(crate) struct DispositionContext {
    pub(crate) queue: Arc<dyn QueueClient>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    /// 0 disables the poison-pill guard
    pub(crate) max_receive_count: i64,
}

/// Result of processing one queue message
#[must_use = "an outcome must be completed or abandoned"]
pub struct ProcessingOutcome {
    message: QueueMessage,
    receive_count: i64,
    event_count: u64,
    objects: Vec<ObjectRef>,
    error: Option<ProcessingError>,
    finalizers: Vec<Finalizer>,
    keepalive: VisibilityKeepalive,
    context: Arc<DispositionContext>,
}

impl fmt::Debug for ProcessingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingOutcome")
            .field("message_id", &self.message.id)
            .field("receive_count", &self.receive_count)
            .field("event_count", &self.event_count)
            .field("objects", &self.objects)
            .field("error", &self.error)
            .field("finalizers", &self.finalizers.len())
            .finish()
    }
}

impl ProcessingOutcome {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        message: QueueMessage,
        receive_count: i64,
        event_count: u64,
        objects: Vec<ObjectRef>,
        error: Option<ProcessingError>,
        finalizers: Vec<Finalizer>,
        keepalive: VisibilityKeepalive,
        context: Arc<DispositionContext>,
    ) -> Self {
        Self {
            message,
            receive_count,
            event_count,
            objects,
            error,
            finalizers,
            keepalive,
            context,
        }
    }

    pub fn message(&self) -> &QueueMessage {
        &self.message
    }

    pub fn receive_count(&self) -> i64 {
        self.receive_count
    }

    /// Number of records emitted while processing the message
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    pub fn objects(&self) -> &[ObjectRef] {
        &self.objects
    }

    pub fn error(&self) -> Option<&ProcessingError> {
        self.error.as_ref()
    }

    pub fn finalizer_count(&self) -> usize {
        self.finalizers.len()
    }

    /// Resolve the message once its events are acknowledged downstream
    pub async fn complete(self) -> Disposition {
        let Self {
            message,
            receive_count,
            objects,
            error,
            finalizers,
            keepalive,
            context,
            ..
        } = self;

        // Stop lease renewal before touching the queue
        keepalive.stop().await;

        let objects = ObjectList(&objects);

        let Some(err) = error else {
            return match context.queue.delete(&message).await {
                Ok(()) => {
                    context.metrics.message_deleted();
                    debug!(
                        message_id = %message.id,
                        receive_count,
                        objects = %objects,
                        "Deleted queue message"
                    );
                    run_finalizers(&message, finalizers).await;
                    Disposition::Deleted
                }
                Err(e) => {
                    warn!(
                        message_id = %message.id,
                        receive_count,
                        objects = %objects,
                        error = %e,
                        "Failed deleting processed queue message, it will be reprocessed"
                    );
                    Disposition::DeleteFailed
                }
            };
        };

        let err = if context.max_receive_count > 0 && receive_count >= context.max_receive_count {
            err.into_poison_pill(receive_count, context.max_receive_count)
        } else {
            err
        };

        if err.is_non_retryable() {
            return match context.queue.delete(&message).await {
                Ok(()) => {
                    context.metrics.message_deleted();
                    warn!(
                        message_id = %message.id,
                        receive_count,
                        objects = %objects,
                        error = %err,
                        "Deleted queue message after non-retryable error"
                    );
                    Disposition::Dropped
                }
                Err(delete_err) => {
                    error!(
                        message_id = %message.id,
                        receive_count,
                        objects = %objects,
                        error = %err,
                        delete_error = %delete_err,
                        "Failed deleting queue message after non-retryable error, \
                         manual cleanup is required"
                    );
                    Disposition::DropFailed
                }
            };
        }

        context.metrics.message_returned();
        warn!(
            message_id = %message.id,
            receive_count,
            objects = %objects,
            error = %err,
            "Leaving queue message for redelivery after processing error"
        );
        Disposition::Returned
    }

    /// Stop the keepalive without deleting the message. The lease lapses and
    /// the message is redelivered.
    pub async fn abandon(self) {
        let Self {
            message,
            receive_count,
            objects,
            keepalive,
            ..
        } = self;

        keepalive.stop().await;
        info!(
            message_id = %message.id,
            receive_count,
            objects = %ObjectList(&objects),
            "Abandoned queue message, it will be redelivered after its visibility timeout"
        );
    }
}

async fn run_finalizers(message: &QueueMessage, finalizers: Vec<Finalizer>) {
    let total = finalizers.len();
    for (i, finalizer) in finalizers.into_iter().enumerate() {
        let bucket = finalizer.bucket().to_string();
        let key = finalizer.key().to_string();

        if let Err(e) = finalizer.run().await {
            error!(
                message_id = %message.id,
                bucket = %bucket,
                key = %key,
                error = %e,
                "Failed finalizing object {} of {} in queue message, manual cleanup is required",
                i + 1,
                total
            );
        }
    }
}

struct ObjectList<'a>(&'a [ObjectRef]);

impl fmt::Display for ObjectList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, object) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "s3://{}/{}", object.bucket, object.key)?;
        }
        Ok(())
    }
}
