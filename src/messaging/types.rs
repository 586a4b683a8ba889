//! # Queue Message Types
//!
//! Provider-agnostic representation of a leased queue message.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};

use crate::constants::{attributes, UNKNOWN_RECEIVE_COUNT};

/// Unique identifier for a queued message
///
/// The format is provider-specific:
/// - PGMQ: i64 message ID as string
/// - InMemory: sequence number as string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Opaque handle identifying one lease of a message
///
/// A new handle is issued on every receive; operations using a handle from an
/// earlier lease are rejected by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(pub String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Try to parse the receipt handle as an i64 (for PGMQ compatibility)
    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ReceiptHandle {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ReceiptHandle {
    fn from(handle: &str) -> Self {
        Self(handle.to_string())
    }
}

/// One leased notification message
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: MessageId,
    pub body: String,
    pub receipt_handle: ReceiptHandle,
    /// Provider attributes; always contains the receive count and sent timestamp
    /// when the provider knows them
    pub attributes: HashMap<String, String>,
}

impl QueueMessage {
    pub fn new(
        id: impl Into<MessageId>,
        body: impl Into<String>,
        receipt_handle: impl Into<ReceiptHandle>,
    ) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            receipt_handle: receipt_handle.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Number of times this message has been received, or -1 when the
    /// attribute is missing or not numeric
    pub fn receive_count(&self) -> i64 {
        self.attributes
            .get(attributes::APPROXIMATE_RECEIVE_COUNT)
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(UNKNOWN_RECEIVE_COUNT)
    }

    /// When the message was first sent to the queue
    pub fn sent_timestamp(&self) -> Option<DateTime<Utc>> {
        self.attributes
            .get(attributes::SENT_TIMESTAMP)
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
    }
}
