//! # OpenTelemetry Input Metrics
//!
//! [`MetricsSink`] backed by OpenTelemetry instruments. Exporter and meter
//! provider setup belong to the host process; this only creates instruments
//! on whatever provider is installed.
//!
//! Every data point carries a `queue` attribute.

use std::time::Duration;

use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
use opentelemetry::KeyValue;

use super::MetricsSink;

/// Instrumentation scope name
pub const METER_NAME: &str = "s3-event-ingest";

#[derive(Debug, Clone)]
pub struct OtelMetrics {
    attributes: Vec<KeyValue>,
    messages_received: Counter<u64>,
    messages_deleted: Counter<u64>,
    messages_returned: Counter<u64>,
    visibility_extensions: Counter<u64>,
    objects_created: Counter<u64>,
    objects_listed: Counter<u64>,
    objects_processed: Counter<u64>,
    objects_acked: Counter<u64>,
    bytes_processed: Counter<u64>,
    messages_inflight: UpDownCounter<i64>,
    queue_lag: Histogram<f64>,
}

impl OtelMetrics {
    /// Create instruments on the globally installed meter provider
    pub fn global(queue_name: impl Into<String>) -> Self {
        let meter = opentelemetry::global::meter(METER_NAME);
        Self::new(&meter, queue_name)
    }

    pub fn new(meter: &Meter, queue_name: impl Into<String>) -> Self {
        Self {
            attributes: vec![KeyValue::new("queue", queue_name.into())],
            messages_received: meter
                .u64_counter("ingest.sqs.messages.received.total")
                .with_description("Total number of queue messages received")
                .build(),
            messages_deleted: meter
                .u64_counter("ingest.sqs.messages.deleted.total")
                .with_description("Total number of queue messages deleted")
                .build(),
            messages_returned: meter
                .u64_counter("ingest.sqs.messages.returned.total")
                .with_description("Total number of queue messages left for redelivery")
                .build(),
            visibility_extensions: meter
                .u64_counter("ingest.sqs.visibility_timeout.extensions.total")
                .with_description("Total number of message lease extensions")
                .build(),
            objects_created: meter
                .u64_counter("ingest.s3.objects.created.total")
                .with_description("Total number of object-created notifications decoded")
                .build(),
            objects_listed: meter
                .u64_counter("ingest.s3.objects.listed.total")
                .with_description("Total number of objects listed")
                .build(),
            objects_processed: meter
                .u64_counter("ingest.s3.objects.processed.total")
                .with_description("Total number of objects processed")
                .build(),
            objects_acked: meter
                .u64_counter("ingest.s3.objects.acked.total")
                .with_description("Total number of objects whose events were acknowledged")
                .build(),
            bytes_processed: meter
                .u64_counter("ingest.s3.bytes.processed.total")
                .with_description("Total number of object bytes processed")
                .with_unit("By")
                .build(),
            messages_inflight: meter
                .i64_up_down_counter("ingest.sqs.messages.inflight")
                .with_description("Number of queue messages currently in flight")
                .build(),
            queue_lag: meter
                .f64_histogram("ingest.sqs.lag")
                .with_description("Time between a message being sent and first received")
                .with_unit("ms")
                .build(),
        }
    }
}

impl MetricsSink for OtelMetrics {
    fn messages_received(&self, count: u64) {
        self.messages_received.add(count, &self.attributes);
    }

    fn message_deleted(&self) {
        self.messages_deleted.add(1, &self.attributes);
    }

    fn message_returned(&self) {
        self.messages_returned.add(1, &self.attributes);
    }

    fn visibility_extended(&self) {
        self.visibility_extensions.add(1, &self.attributes);
    }

    fn objects_created(&self, count: u64) {
        self.objects_created.add(count, &self.attributes);
    }

    fn objects_listed(&self, count: u64) {
        self.objects_listed.add(count, &self.attributes);
    }

    fn object_processed(&self) {
        self.objects_processed.add(1, &self.attributes);
    }

    fn object_acked(&self, count: u64) {
        self.objects_acked.add(count, &self.attributes);
    }

    fn bytes_processed(&self, bytes: u64) {
        self.bytes_processed.add(bytes, &self.attributes);
    }

    fn queue_lag(&self, lag: Duration) {
        self.queue_lag
            .record(lag.as_secs_f64() * 1000.0, &self.attributes);
    }

    fn messages_inflight(&self, delta: i64) {
        self.messages_inflight.add(delta, &self.attributes);
    }
}
