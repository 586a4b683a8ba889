//! # Input Metrics
//!
//! Counters and histograms describing the queue input. Every method on
//! [`MetricsSink`] defaults to a no-op, so a sink only implements what it
//! exports.
//!
//! - [`NoopMetrics`] - discards everything
//! - [`InputMetrics`] - in-process atomic counters with a serializable snapshot
//! - [`OtelMetrics`] - OpenTelemetry instruments
//!
//! Sinks are shared by every in-flight message and must tolerate concurrent
//! increments.

pub mod otel;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use otel::OtelMetrics;

/// Receiver of input metrics
pub trait MetricsSink: Send + Sync + 'static {
    fn messages_received(&self, _count: u64) {}
    fn message_deleted(&self) {}
    fn message_returned(&self) {}
    fn visibility_extended(&self) {}
    fn objects_created(&self, _count: u64) {}
    fn objects_listed(&self, _count: u64) {}
    fn object_processed(&self) {}
    fn object_acked(&self, _count: u64) {}
    fn bytes_processed(&self, _bytes: u64) {}
    /// Time between the message being sent and first received
    fn queue_lag(&self, _lag: Duration) {}
    fn messages_inflight(&self, _delta: i64) {}
}

/// Sink that records nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

/// In-process counters
#[derive(Debug, Default)]
pub struct InputMetrics {
    messages_received: AtomicU64,
    messages_deleted: AtomicU64,
    messages_returned: AtomicU64,
    visibility_extensions: AtomicU64,
    objects_created: AtomicU64,
    objects_listed: AtomicU64,
    objects_processed: AtomicU64,
    objects_acked: AtomicU64,
    bytes_processed: AtomicU64,
    messages_inflight: AtomicI64,
    queue_lag_samples: AtomicU64,
    queue_lag_total_ms: AtomicU64,
    queue_lag_last_ms: AtomicU64,
}

/// Point-in-time copy of [`InputMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMetricsSnapshot {
    pub messages_received: u64,
    pub messages_deleted: u64,
    pub messages_returned: u64,
    pub visibility_extensions: u64,
    pub objects_created: u64,
    pub objects_listed: u64,
    pub objects_processed: u64,
    pub objects_acked: u64,
    pub bytes_processed: u64,
    pub messages_inflight: i64,
    pub queue_lag_samples: u64,
    pub queue_lag_total_ms: u64,
    pub queue_lag_last_ms: u64,
}

impl InputMetricsSnapshot {
    pub fn average_queue_lag_ms(&self) -> Option<u64> {
        self.queue_lag_total_ms.checked_div(self.queue_lag_samples)
    }
}

impl InputMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> InputMetricsSnapshot {
        InputMetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_deleted: self.messages_deleted.load(Ordering::Relaxed),
            messages_returned: self.messages_returned.load(Ordering::Relaxed),
            visibility_extensions: self.visibility_extensions.load(Ordering::Relaxed),
            objects_created: self.objects_created.load(Ordering::Relaxed),
            objects_listed: self.objects_listed.load(Ordering::Relaxed),
            objects_processed: self.objects_processed.load(Ordering::Relaxed),
            objects_acked: self.objects_acked.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            messages_inflight: self.messages_inflight.load(Ordering::Relaxed),
            queue_lag_samples: self.queue_lag_samples.load(Ordering::Relaxed),
            queue_lag_total_ms: self.queue_lag_total_ms.load(Ordering::Relaxed),
            queue_lag_last_ms: self.queue_lag_last_ms.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for InputMetrics {
    fn messages_received(&self, count: u64) {
        self.messages_received.fetch_add(count, Ordering::Relaxed);
    }

    fn message_deleted(&self) {
        self.messages_deleted.fetch_add(1, Ordering::Relaxed);
    }

    fn message_returned(&self) {
        self.messages_returned.fetch_add(1, Ordering::Relaxed);
    }

    fn visibility_extended(&self) {
        self.visibility_extensions.fetch_add(1, Ordering::Relaxed);
    }

    fn objects_created(&self, count: u64) {
        self.objects_created.fetch_add(count, Ordering::Relaxed);
    }

    fn objects_listed(&self, count: u64) {
        self.objects_listed.fetch_add(count, Ordering::Relaxed);
    }

    fn object_processed(&self) {
        self.objects_processed.fetch_add(1, Ordering::Relaxed);
    }

    fn object_acked(&self, count: u64) {
        self.objects_acked.fetch_add(count, Ordering::Relaxed);
    }

    fn bytes_processed(&self, bytes: u64) {
        self.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
    }

    fn queue_lag(&self, lag: Duration) {
        let ms = lag.as_millis() as u64;
        self.queue_lag_samples.fetch_add(1, Ordering::Relaxed);
        self.queue_lag_total_ms.fetch_add(ms, Ordering::Relaxed);
        self.queue_lag_last_ms.store(ms, Ordering::Relaxed);
    }

    fn messages_inflight(&self, delta: i64) {
        self.messages_inflight.fetch_add(delta, Ordering::Relaxed);
    }
}
