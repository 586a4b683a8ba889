//! # Ingestion Constants
//!
//! Attribute names, notification filters and operational defaults shared by the
//! queue client adapters, the notification decoder and the message processor.

/// Well-known queue message attribute names
pub mod attributes {
    /// How many times the message has been received (string-encoded integer)
    pub const APPROXIMATE_RECEIVE_COUNT: &str = "ApproximateReceiveCount";
    /// When the message was first sent to the queue (epoch milliseconds)
    pub const SENT_TIMESTAMP: &str = "SentTimestamp";
}

/// Notification record filters
pub mod notifications {
    /// Only records from this event source are processed
    pub const OBJECT_STORAGE_EVENT_SOURCE: &str = "aws:s3";
    /// Only records whose event name starts with this prefix are processed
    pub const OBJECT_CREATED_PREFIX: &str = "ObjectCreated:";
}

/// Operational defaults
pub mod defaults {
    pub const QUEUE_NAME: &str = "s3_notifications";
    pub const VISIBILITY_TIMEOUT_SECONDS: u64 = 300;
    pub const MAX_RECEIVE_COUNT: i64 = 5;
    pub const MAX_MESSAGES_PER_RECEIVE: usize = 10;
    pub const POLL_INTERVAL_MS: u64 = 1000;
    pub const RECEIVE_ERROR_BACKOFF_MS: u64 = 1000;
    pub const MAX_RECEIVE_ERROR_BACKOFF_MS: u64 = 30_000;
    pub const NUMBER_OF_WORKERS: usize = 5;

    /// Bounds accepted for the visibility timeout
    pub const MIN_VISIBILITY_TIMEOUT_SECONDS: u64 = 2;
    pub const MAX_VISIBILITY_TIMEOUT_SECONDS: u64 = 43_200;
}

/// Receive count reported when the attribute is missing or not numeric
pub const UNKNOWN_RECEIVE_COUNT: i64 = -1;
