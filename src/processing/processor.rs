//! # Message Processor
//!
//! Drives one queue message from receipt to a [`ProcessingOutcome`]:
//!
//! 1. start the visibility keepalive
//! 2. record queue lag on first receipt
//! 3. decode the body into object notifications
//! 4. run a handler per notification, collecting errors without stopping
//! 5. hand back the outcome for the caller to complete after acknowledgment

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::config::QueueConfig;
use crate::constants::defaults;
use crate::error::{ObjectErrors, ObjectProcessingError, ProcessingError};
use crate::messaging::{QueueClient, QueueMessage};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::notification::{NotificationDecoder, NotificationScript};
use crate::processing::handler::{Emit, Finalizer, ObjectHandlerFactory, Record};
use crate::processing::keepalive::VisibilityKeepalive;
use crate::processing::outcome::{DispositionContext, ObjectRef, ProcessingOutcome};

/// Lifecycle settings for processed messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub visibility_timeout: Duration,
    /// Receive count at which failures become non-retryable. 0 disables.
    pub max_receive_count: i64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(defaults::VISIBILITY_TIMEOUT_SECONDS),
            max_receive_count: defaults::MAX_RECEIVE_COUNT,
        }
    }
}

impl From<&QueueConfig> for ProcessorConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            visibility_timeout: config.visibility_timeout(),
            max_receive_count: config.max_receive_count,
        }
    }
}

pub struct MessageProcessor {
    factory: Arc<dyn ObjectHandlerFactory>,
    decoder: NotificationDecoder,
    config: ProcessorConfig,
    context: Arc<DispositionContext>,
}

impl std::fmt::Debug for MessageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageProcessor")
            .field("provider", &self.context.queue.provider_name())
            .field("decoder", &self.decoder)
            .field("config", &self.config)
            .finish()
    }
}

impl MessageProcessor {
    pub fn new(
        queue: Arc<dyn QueueClient>,
        factory: Arc<dyn ObjectHandlerFactory>,
        config: ProcessorConfig,
    ) -> Self {
        let context = Arc::new(DispositionContext {
            queue,
            metrics: Arc::new(NoopMetrics),
            max_receive_count: config.max_receive_count,
        });

        Self {
            factory,
            decoder: NotificationDecoder::new(),
            config,
            context,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.context = Arc::new(DispositionContext {
            queue: Arc::clone(&self.context.queue),
            metrics,
            max_receive_count: self.context.max_receive_count,
        });
        self
    }

    /// Parse message bodies with a custom script instead of the built-in
    /// notification formats
    pub fn with_script(mut self, script: Arc<dyn NotificationScript>) -> Self {
        self.decoder = NotificationDecoder::with_script(script);
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.context.metrics
    }

    /// Process one received message, passing every derived record to `emit`
    ///
    /// The returned outcome owns the message's keepalive; the caller must
    /// [`complete`](ProcessingOutcome::complete) it once the emitted records
    /// are acknowledged, or [`abandon`](ProcessingOutcome::abandon) it.
    pub async fn process_message(
        &self,
        cancel: &CancellationToken,
        message: QueueMessage,
        emit: Emit<'_>,
    ) -> ProcessingOutcome {
        let span = info_span!(
            "queue_message",
            message_id = %message.id,
            receipt_time = %Utc::now().to_rfc3339(),
        );

        self.process_in_span(cancel, message, emit)
            .instrument(span)
            .await
    }

    async fn process_in_span(
        &self,
        cancel: &CancellationToken,
        message: QueueMessage,
        emit: Emit<'_>,
    ) -> ProcessingOutcome {
        let keepalive = VisibilityKeepalive::start(
            Arc::clone(&self.context.queue),
            message.clone(),
            self.config.visibility_timeout,
            Arc::clone(&self.context.metrics),
            cancel,
        );

        let receive_count = message.receive_count();

        // Later receipts would measure retry delay rather than queue lag
        if receive_count == 1 {
            if let Some(sent) = message.sent_timestamp() {
                if let Ok(lag) = (Utc::now() - sent).to_std() {
                    self.context.metrics.queue_lag(lag);
                }
            }
        }

        let notifications = match self.decoder.decode(&message.body).await {
            Ok(notifications) => notifications,
            Err(e) => {
                let err = ProcessingError::from_decode(e);
                debug!(receive_count, error = %err, "Failed decoding queue message");
                return self.outcome(
                    message,
                    receive_count,
                    0,
                    Vec::new(),
                    Some(err),
                    Vec::new(),
                    keepalive,
                );
            }
        };

        self.context
            .metrics
            .objects_created(notifications.len() as u64);

        let objects: Vec<ObjectRef> = notifications
            .iter()
            .map(|n| ObjectRef {
                bucket: n.bucket().to_string(),
                key: n.key().to_string(),
            })
            .collect();

        let total = notifications.len();
        let mut event_count: u64 = 0;
        let mut finalizers = Vec::new();
        let mut errors = Vec::new();
        let mut cancelled = false;

        for (i, notification) in notifications.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let Some(mut handler) = self.factory.create(cancel, notification) else {
                debug!(
                    bucket = %notification.bucket(),
                    key = %notification.key(),
                    "Skipping filtered object"
                );
                continue;
            };

            let mut counting = |record: Record| {
                event_count += 1;
                emit(record);
            };

            match handler.process(&mut counting).await {
                Ok(()) => {
                    self.context.metrics.object_processed();
                    finalizers.push(Finalizer::new(notification, handler));
                }
                Err(e) => {
                    warn!(
                        receive_count,
                        bucket = %notification.bucket(),
                        key = %notification.key(),
                        error = %e,
                        "Failed processing object"
                    );
                    errors.push(ObjectProcessingError {
                        key: notification.key().to_string(),
                        bucket: notification.bucket().to_string(),
                        index: i + 1,
                        total,
                        error: e,
                    });
                }
            }
        }

        let error = if cancelled {
            Some(ProcessingError::Cancelled)
        } else if errors.is_empty() {
            None
        } else {
            Some(ProcessingError::retryable(ObjectErrors(errors)))
        };

        debug!(
            receive_count,
            events = event_count,
            objects = total,
            failed = error.is_some(),
            "Processed queue message"
        );

        self.outcome(message, receive_count, event_count, objects, error, finalizers, keepalive)
    }

    #[allow(clippy::too_many_arguments)]
    fn outcome(
        &self,
        message: QueueMessage,
        receive_count: i64,
        event_count: u64,
        objects: Vec<ObjectRef>,
        error: Option<ProcessingError>,
        finalizers: Vec<Finalizer>,
        keepalive: VisibilityKeepalive,
    ) -> ProcessingOutcome {
        ProcessingOutcome::new(
            message,
            receive_count,
            event_count,
            objects,
            error,
            finalizers,
            keepalive,
            Arc::clone(&self.context),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::attributes;
    use crate::messaging::providers::InMemoryQueueClient;
    use crate::metrics::InputMetrics;
    use crate::notification::ObjectNotification;
    use crate::processing::handler::ObjectHandler;
    use crate::processing::outcome::Disposition;
    use async_trait::async_trait;

    struct LinesHandler {
        lines: usize,
    }

    #[async_trait]
    impl ObjectHandler for LinesHandler {
        async fn process(&mut self, emit: Emit<'_>) -> anyhow::Result<()> {
            for i in 0..self.lines {
                emit(Record::new(serde_json::json!({ "line": i })));
            }
            Ok(())
        }

        async fn finalize(self: Box<Self>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct LinesFactory;

    impl ObjectHandlerFactory for LinesFactory {
        fn create(
            &self,
            _cancel: &CancellationToken,
            notification: &ObjectNotification,
        ) -> Option<Box<dyn ObjectHandler>> {
            if notification.key().ends_with(".skip") {
                return None;
            }
            Some(Box::new(LinesHandler { lines: 2 }))
        }
    }

    fn body(keys: &[&str]) -> String {
        let records: Vec<_> = keys
            .iter()
            .map(|k| {
                serde_json::json!({
                    "eventSource": "aws:s3",
                    "eventName": "ObjectCreated:Put",
                    "s3": {"bucket": {"name": "b"}, "object": {"key": k}}
                })
            })
            .collect();
        serde_json::json!({ "Records": records }).to_string()
    }

    #[tokio::test]
    async fn test_counts_events_and_records_finalizers() {
        let queue = Arc::new(InMemoryQueueClient::new("q", Duration::from_secs(30)));
        queue.send(body(&["a.log", "b.skip", "c.log"])).await;
        let message = queue.receive(1).await.unwrap().remove(0);

        let metrics = Arc::new(InputMetrics::new());
        let processor = MessageProcessor::new(
            queue.clone(),
            Arc::new(LinesFactory),
            ProcessorConfig::default(),
        )
        .with_metrics(metrics.clone());

        let mut records = Vec::new();
        let outcome = processor
            .process_message(&CancellationToken::new(), message, &mut |r| records.push(r))
            .await;

        assert_eq!(outcome.event_count(), 4);
        assert_eq!(records.len(), 4);
        assert_eq!(outcome.finalizer_count(), 2);
        assert_eq!(outcome.objects().len(), 3);
        assert!(outcome.error().is_none());
        assert_eq!(outcome.receive_count(), 1);

        assert_eq!(outcome.complete().await, Disposition::Deleted);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.objects_created, 3);
        assert_eq!(snapshot.objects_processed, 2);
        assert_eq!(snapshot.messages_deleted, 1);
        assert_eq!(snapshot.queue_lag_samples, 1);
    }

    #[tokio::test]
    async fn test_lag_is_only_recorded_on_first_receipt() {
        let queue = Arc::new(InMemoryQueueClient::new("q", Duration::from_secs(30)));
        let metrics = Arc::new(InputMetrics::new());
        let processor = MessageProcessor::new(
            queue.clone(),
            Arc::new(LinesFactory),
            ProcessorConfig::default(),
        )
        .with_metrics(metrics.clone());

        let message = QueueMessage::new("m-1", body(&[]), "h-1")
            .with_attribute(attributes::APPROXIMATE_RECEIVE_COUNT, "2")
            .with_attribute(attributes::SENT_TIMESTAMP, "1700000000000");

        let outcome = processor
            .process_message(&CancellationToken::new(), message, &mut |_| {})
            .await;
        outcome.abandon().await;

        assert_eq!(metrics.snapshot().queue_lag_samples, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_handlers_run() {
        let queue = Arc::new(InMemoryQueueClient::new("q", Duration::from_secs(30)));
        queue.send(body(&["a.log"])).await;
        let message = queue.receive(1).await.unwrap().remove(0);
        let processor = MessageProcessor::new(
            queue.clone(),
            Arc::new(LinesFactory),
            ProcessorConfig::default(),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = processor.process_message(&cancel, message, &mut |_| {}).await;
        assert!(outcome.error().is_some_and(|e| e.is_cancelled()));
        assert_eq!(outcome.event_count(), 0);

        outcome.abandon().await;
        assert_eq!(queue.len().await, 1);
    }
}
