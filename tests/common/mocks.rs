//! Mock queue, handler factory and pipeline sharing one operation journal

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use s3_event_ingest::messaging::providers::InMemoryQueueClient;
use s3_event_ingest::messaging::{QueueClient, QueueError, QueueMessage, QueueResult};
use s3_event_ingest::notification::ObjectNotification;
use s3_event_ingest::processing::{Emit, ObjectHandler, ObjectHandlerFactory, Record};
use s3_event_ingest::reader::EventPipeline;
use tokio_util::sync::CancellationToken;

/// Ordered log of side effects across mocks
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

/// In-memory queue that journals deletes and can be told to fail
pub struct FlakyQueue {
    pub inner: InMemoryQueueClient,
    journal: Journal,
    fail_deletes: AtomicBool,
    failing_receives: AtomicUsize,
}

impl FlakyQueue {
    pub fn new(visibility_timeout: Duration, journal: Journal) -> Self {
        Self {
            inner: InMemoryQueueClient::new("test_queue", visibility_timeout),
            journal,
            fail_deletes: AtomicBool::new(false),
            failing_receives: AtomicUsize::new(0),
        }
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make the next `n` receive calls fail
    pub fn fail_next_receives(&self, n: usize) {
        self.failing_receives.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl QueueClient for FlakyQueue {
    async fn receive(&self, max_messages: usize) -> QueueResult<Vec<QueueMessage>> {
        let remaining = self.failing_receives.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_receives.store(remaining - 1, Ordering::SeqCst);
            self.journal.push("receive_error");
            return Err(QueueError::queue_operation("test_queue", "receive", "throttled"));
        }
        self.inner.receive(max_messages).await
    }

    async fn delete(&self, message: &QueueMessage) -> QueueResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            self.journal.push(format!("delete_failed:{}", message.id));
            return Err(QueueError::queue_operation("test_queue", "delete", "access denied"));
        }
        self.inner.delete(message).await?;
        self.journal.push(format!("delete:{}", message.id));
        Ok(())
    }

    async fn extend_visibility(
        &self,
        message: &QueueMessage,
        timeout: Duration,
    ) -> QueueResult<()> {
        self.inner.extend_visibility(message, timeout).await?;
        self.journal.push(format!("extend:{}", message.id));
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "flaky_in_memory"
    }
}

/// Handler behavior is chosen by key:
/// - containing `skip`: filtered out by the factory
/// - containing `fail`: processing fails after emitting one record
/// - containing `badfinal`: finalize fails
/// - otherwise: emits `lines_per_object` records
pub struct RecordingFactory {
    journal: Journal,
    lines_per_object: usize,
    created: AtomicUsize,
}

impl RecordingFactory {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            lines_per_object: 2,
            created: AtomicUsize::new(0),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ObjectHandlerFactory for RecordingFactory {
    fn create(
        &self,
        _cancel: &CancellationToken,
        notification: &ObjectNotification,
    ) -> Option<Box<dyn ObjectHandler>> {
        let key = notification.key().to_string();
        if key.contains("skip") {
            return None;
        }

        self.created.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(RecordingHandler {
            key,
            lines: self.lines_per_object,
            journal: self.journal.clone(),
        }))
    }
}

struct RecordingHandler {
    key: String,
    lines: usize,
    journal: Journal,
}

#[async_trait]
impl ObjectHandler for RecordingHandler {
    async fn process(&mut self, emit: Emit<'_>) -> anyhow::Result<()> {
        self.journal.push(format!("process:{}", self.key));

        if self.key.contains("fail") {
            emit(Record::new(serde_json::json!({ "key": self.key, "line": 0 })));
            anyhow::bail!("corrupt object {}", self.key);
        }

        for line in 0..self.lines {
            emit(Record::new(serde_json::json!({ "key": self.key, "line": line })));
        }
        Ok(())
    }

    async fn finalize(self: Box<Self>) -> anyhow::Result<()> {
        self.journal.push(format!("finalize:{}", self.key));
        if self.key.contains("badfinal") {
            anyhow::bail!("could not tag object {}", self.key);
        }
        Ok(())
    }
}

/// Pipeline that records published batches
#[derive(Default)]
pub struct RecordingPipeline {
    journal: Journal,
    published: Mutex<Vec<Record>>,
    fail: AtomicBool,
    ack_delay: Option<Duration>,
}

impl RecordingPipeline {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    /// Acknowledge only after `delay`
    pub fn with_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = Some(delay);
        self
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<Record> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl EventPipeline for RecordingPipeline {
    async fn publish(&self, records: Vec<Record>) -> anyhow::Result<()> {
        if let Some(delay) = self.ack_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("output closed");
        }
        self.journal.push(format!("ack:{}", records.len()));
        self.published.lock().extend(records);
        Ok(())
    }
}
