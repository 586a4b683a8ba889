//! # Visibility Keepalive
//!
//! Renews the lease of one in-flight message every half visibility timeout,
//! extending it by the full timeout each time. The task ends when its token
//! is cancelled or when the queue reports the receipt handle as no longer
//! valid. Other extension failures are logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::messaging::{QueueClient, QueueMessage};
use crate::metrics::MetricsSink;

/// Handle to a running keepalive task
#[derive(Debug)]
pub struct VisibilityKeepalive {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl VisibilityKeepalive {
    /// Spawn the keepalive for `message`. Cancelling `parent` (shutdown) also
    /// stops it.
    pub fn start(
        queue: Arc<dyn QueueClient>,
        message: QueueMessage,
        visibility_timeout: Duration,
        metrics: Arc<dyn MetricsSink>,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let period = (visibility_timeout / 2).max(Duration::from_millis(1));
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => {}
                }

                metrics.visibility_extended();

                // Not raced against cancellation: a stop waits for an
                // in-flight extension instead of letting it land after a delete
                match queue.extend_visibility(&message, visibility_timeout).await {
                    Ok(()) => {
                        debug!(
                            message_id = %message.id,
                            visibility_timeout_seconds = visibility_timeout.as_secs(),
                            "Extended message visibility"
                        );
                    }
                    Err(e) if e.is_invalid_receipt_handle() => {
                        warn!(
                            message_id = %message.id,
                            error = %e,
                            "Receipt handle is no longer valid, stopping visibility keepalive"
                        );
                        return;
                    }
                    Err(e) => {
                        error!(
                            message_id = %message.id,
                            error = %e,
                            "Failed to extend message visibility"
                        );
                    }
                }
            }
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Cancel the task and wait for it to exit. No extension call is issued
    /// after this returns.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Visibility keepalive task failed");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }
}

impl Drop for VisibilityKeepalive {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::providers::InMemoryQueueClient;
    use crate::metrics::InputMetrics;

    #[tokio::test(start_paused = true)]
    async fn test_extends_every_half_timeout_until_stopped() {
        let vt = Duration::from_secs(30);
        let queue = Arc::new(InMemoryQueueClient::new("q", vt));
        queue.send("{}").await;
        let message = queue.receive(1).await.unwrap().remove(0);
        let metrics = Arc::new(InputMetrics::new());

        let keepalive = VisibilityKeepalive::start(
            queue.clone(),
            message,
            vt,
            metrics.clone(),
            &CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_secs(46)).await;
        assert_eq!(queue.extension_count(), 3);
        // Past the original lease, still leased
        assert_eq!(queue.in_flight_len().await, 1);

        keepalive.stop().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(queue.extension_count(), 3);
        assert_eq!(metrics.snapshot().visibility_extensions, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exits_on_invalid_receipt_handle() {
        let vt = Duration::from_secs(10);
        let queue = Arc::new(InMemoryQueueClient::new("q", vt));
        queue.send("{}").await;
        let message = queue.receive(1).await.unwrap().remove(0);
        queue.delete(&message).await.unwrap();
        let metrics = Arc::new(InputMetrics::new());

        let keepalive = VisibilityKeepalive::start(
            queue.clone(),
            message,
            vt,
            metrics.clone(),
            &CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(keepalive.is_finished());
        assert_eq!(queue.extension_count(), 0);
        // The attempt is counted even though the queue rejected it
        assert_eq!(metrics.snapshot().visibility_extensions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_task() {
        let vt = Duration::from_secs(10);
        let queue = Arc::new(InMemoryQueueClient::new("q", vt));
        queue.send("{}").await;
        let message = queue.receive(1).await.unwrap().remove(0);
        let shutdown = CancellationToken::new();

        let keepalive = VisibilityKeepalive::start(
            queue.clone(),
            message,
            vt,
            Arc::new(InputMetrics::new()),
            &shutdown,
        );

        shutdown.cancel();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(keepalive.is_finished());
        assert_eq!(queue.extension_count(), 0);
    }
}
