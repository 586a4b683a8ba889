//! # Queue Reader
//!
//! Worker pool that keeps up to `number_of_workers` queue messages in flight.
//!
//! Each received message runs in its own task: process, publish the derived
//! records, and complete the outcome once the pipeline has acknowledged them.
//! If publishing fails or shutdown arrives first, the outcome is abandoned and
//! the message is redelivered after its lease lapses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::constants::defaults;
use crate::error::{IngestError, Result};
use crate::messaging::{QueueClient, QueueMessage};
use crate::processing::{MessageProcessor, Record};

/// Downstream destination for records
#[async_trait]
pub trait EventPipeline: Send + Sync + 'static {
    /// Publish records, resolving only after every one of them has been
    /// acknowledged by the downstream
    async fn publish(&self, records: Vec<Record>) -> anyhow::Result<()>;
}

/// Polling and concurrency settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    pub number_of_workers: usize,
    pub max_messages_per_receive: usize,
    pub poll_interval: Duration,
    pub receive_error_backoff: Duration,
    pub max_receive_error_backoff: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for ReaderConfig {
    fn from(config: &IngestConfig) -> Self {
        Self {
            number_of_workers: config.workers.number_of_workers,
            max_messages_per_receive: config.queue.max_messages_per_receive,
            poll_interval: config.queue.poll_interval(),
            receive_error_backoff: config.queue.receive_error_backoff(),
            max_receive_error_backoff: Duration::from_millis(
                defaults::MAX_RECEIVE_ERROR_BACKOFF_MS,
            ),
        }
    }
}

/// Receives messages and dispatches them to the processor
pub struct QueueReader {
    queue: Arc<dyn QueueClient>,
    processor: Arc<MessageProcessor>,
    pipeline: Arc<dyn EventPipeline>,
    config: ReaderConfig,
}

impl std::fmt::Debug for QueueReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueReader")
            .field("provider", &self.queue.provider_name())
            .field("config", &self.config)
            .finish()
    }
}

impl QueueReader {
    pub fn new(
        queue: Arc<dyn QueueClient>,
        processor: Arc<MessageProcessor>,
        pipeline: Arc<dyn EventPipeline>,
        config: ReaderConfig,
    ) -> Self {
        Self {
            queue,
            processor,
            pipeline,
            config,
        }
    }

    /// Build a reader from validated configuration
    pub fn from_config(
        config: &IngestConfig,
        queue: Arc<dyn QueueClient>,
        processor: Arc<MessageProcessor>,
        pipeline: Arc<dyn EventPipeline>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(queue, processor, pipeline, ReaderConfig::from(config)))
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Receive and process messages until `cancel` fires, then wait for the
    /// in-flight messages to finish or be abandoned
    pub async fn run(&self, cancel: CancellationToken) {
        let workers = self.config.number_of_workers.max(1);
        let max_per_receive = self.config.max_messages_per_receive.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        let mut backoff = self.config.receive_error_backoff;

        info!(
            provider = self.queue.provider_name(),
            number_of_workers = workers,
            "Starting queue reader"
        );

        loop {
            while let Some(joined) = tasks.try_join_next() {
                log_task_result(joined);
            }

            let first = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let mut permits = vec![first];
            while permits.len() < max_per_receive {
                match Arc::clone(&semaphore).try_acquire_owned() {
                    Ok(permit) => permits.push(permit),
                    Err(_) => break,
                }
            }

            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = self.queue.receive(permits.len()) => received,
            };

            let messages = match received {
                Ok(messages) => {
                    backoff = self.config.receive_error_backoff;
                    messages
                }
                Err(e) => {
                    error!(
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Failed receiving queue messages"
                    );
                    drop(permits);
                    if sleep_or_cancelled(&cancel, backoff).await {
                        break;
                    }
                    backoff = (backoff * 2).min(self.config.max_receive_error_backoff);
                    continue;
                }
            };

            if messages.is_empty() {
                drop(permits);
                if sleep_or_cancelled(&cancel, self.config.poll_interval).await {
                    break;
                }
                continue;
            }

            debug!(count = messages.len(), "Received queue messages");
            self.processor.metrics().messages_received(messages.len() as u64);

            for message in messages {
                // A provider may return more than requested; those run unbounded
                let permit = permits.pop();
                tasks.spawn(handle_message(
                    Arc::clone(&self.processor),
                    Arc::clone(&self.pipeline),
                    cancel.clone(),
                    message,
                    permit,
                ));
            }
        }

        info!(
            in_flight = tasks.len(),
            "Queue reader stopping, waiting for in-flight messages"
        );
        while let Some(joined) = tasks.join_next().await {
            log_task_result(joined);
        }
        info!("Queue reader stopped");
    }
}

async fn handle_message(
    processor: Arc<MessageProcessor>,
    pipeline: Arc<dyn EventPipeline>,
    cancel: CancellationToken,
    message: QueueMessage,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let metrics = Arc::clone(processor.metrics());
    metrics.messages_inflight(1);

    let message_id = message.id.clone();
    let mut records = Vec::new();
    let outcome = processor
        .process_message(&cancel, message, &mut |record| records.push(record))
        .await;

    if cancel.is_cancelled() {
        outcome.abandon().await;
        metrics.messages_inflight(-1);
        return;
    }

    let acknowledged = if records.is_empty() {
        Some(Ok(()))
    } else {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            published = pipeline.publish(records) => Some(published),
        }
    };

    match acknowledged {
        Some(Ok(())) => {
            metrics.object_acked(outcome.finalizer_count() as u64);
            let disposition = outcome.complete().await;
            debug!(
                message_id = %message_id,
                disposition = %disposition,
                "Queue message resolved"
            );
        }
        Some(Err(e)) => {
            let err = IngestError::pipeline(e.to_string());
            warn!(message_id = %message_id, error = %err, "Records were not acknowledged");
            outcome.abandon().await;
        }
        None => outcome.abandon().await,
    }

    metrics.messages_inflight(-1);
}

/// Returns true when cancelled before the delay elapsed
async fn sleep_or_cancelled(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

fn log_task_result(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Queue message task failed");
    }
}
