//! # Object Notification Decoding
//!
//! Turns a queue message body into the object-created notifications it carries.
//!
//! Three body shapes are understood:
//!
//! - a raw notification document `{"Records": [...]}`
//! - a pub/sub envelope `{"TopicArn": "...", "Message": "<notification document>"}`,
//!   unwrapped exactly one level
//! - anything a configured [`NotificationScript`] knows how to parse, in which case
//!   the script takes precedence over format detection
//!
//! Records that are not object-created events from the object storage source
//! are dropped. The first time that happens a single warning is logged per
//! decoder; it is a configuration smell, not an error.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::notifications;
use crate::error::DecodeError;

/// Bucket that emitted the notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketEntity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arn: String,
}

/// Object the notification refers to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntity {
    /// Object key. URL-unescaped after decoding.
    #[serde(default)]
    pub key: String,
    #[serde(rename = "lastModified", default)]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntity {
    #[serde(default)]
    pub bucket: BucketEntity,
    #[serde(default)]
    pub object: ObjectEntity,
}

/// One object change notification record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectNotification {
    #[serde(rename = "awsRegion", default)]
    pub region: String,
    #[serde(default)]
    pub provider: String,
    #[serde(rename = "eventName", default)]
    pub event_name: String,
    #[serde(rename = "eventSource", default)]
    pub event_source: String,
    #[serde(default)]
    pub s3: StorageEntity,
}

impl ObjectNotification {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            event_name: format!("{}Put", notifications::OBJECT_CREATED_PREFIX),
            event_source: notifications::OBJECT_STORAGE_EVENT_SOURCE.to_string(),
            s3: StorageEntity {
                bucket: BucketEntity {
                    name: bucket.into(),
                    ..Default::default()
                },
                object: ObjectEntity {
                    key: key.into(),
                    last_modified: None,
                },
            },
            ..Default::default()
        }
    }

    pub fn bucket(&self) -> &str {
        &self.s3.bucket.name
    }

    pub fn key(&self) -> &str {
        &self.s3.object.key
    }

    pub fn is_object_created(&self) -> bool {
        self.event_source == notifications::OBJECT_STORAGE_EVENT_SOURCE
            && self.event_name.starts_with(notifications::OBJECT_CREATED_PREFIX)
    }
}

/// Top-level notification document. When delivered through a pub/sub topic
/// the records are replaced by `TopicArn` and a string-encoded `Message`.
#[derive(Debug, Deserialize)]
struct NotificationDocument {
    #[serde(rename = "TopicArn", default)]
    topic_arn: String,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Records", default)]
    records: Option<Vec<ObjectNotification>>,
}

/// Failure reported by a [`NotificationScript`]
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The caller cancelled the run (shutdown); not a property of the message
    #[error("notification script run was cancelled")]
    Cancelled,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// User-supplied parser for message bodies that are not standard notifications
///
/// The script's output is used as-is: no event filtering or key unescaping is
/// applied on top of it.
#[async_trait]
pub trait NotificationScript: Send + Sync + 'static {
    async fn run(&self, body: &str) -> Result<Vec<ObjectNotification>, ScriptError>;
}

/// Decodes queue message bodies into object notifications
pub struct NotificationDecoder {
    script: Option<Arc<dyn NotificationScript>>,
    warned_unsupported: Mutex<bool>,
}

impl std::fmt::Debug for NotificationDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDecoder")
            .field("script", &self.script.is_some())
            .finish()
    }
}

impl Default for NotificationDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationDecoder {
    pub fn new() -> Self {
        Self {
            script: None,
            warned_unsupported: Mutex::new(false),
        }
    }

    pub fn with_script(script: Arc<dyn NotificationScript>) -> Self {
        Self {
            script: Some(script),
            warned_unsupported: Mutex::new(false),
        }
    }

    pub fn has_script(&self) -> bool {
        self.script.is_some()
    }

    /// Decode a message body into the object-created notifications it carries
    pub async fn decode(&self, body: &str) -> Result<Vec<ObjectNotification>, DecodeError> {
        if let Some(script) = &self.script {
            return script.run(body).await.map_err(|e| match e {
                ScriptError::Cancelled => DecodeError::Cancelled,
                ScriptError::Failed(err) => DecodeError::Script(err),
            });
        }

        self.decode_document(body)
    }

    fn decode_document(&self, body: &str) -> Result<Vec<ObjectNotification>, DecodeError> {
        let mut document: NotificationDocument = serde_json::from_str(body).map_err(|e| {
            debug!(body = %body, "Invalid queue message body");
            DecodeError::from(e)
        })?;

        if !document.topic_arn.is_empty() {
            document = serde_json::from_str(&document.message).map_err(|e| {
                debug!(body = %body, "Invalid queue message body");
                DecodeError::from(e)
            })?;
        }

        let Some(records) = document.records else {
            debug!(body = %body, "Invalid queue message body: missing Records field");
            return Err(DecodeError::MissingRecords);
        };

        self.retain_object_created(records)
    }

    fn retain_object_created(
        &self,
        records: Vec<ObjectNotification>,
    ) -> Result<Vec<ObjectNotification>, DecodeError> {
        let mut out = Vec::with_capacity(records.len());

        for mut record in records {
            if !record.is_object_created() {
                self.warn_unsupported_once(&record.event_name);
                continue;
            }

            record.s3.object.key = query_unescape(&record.s3.object.key)?;
            out.push(record);
        }

        Ok(out)
    }

    fn warn_unsupported_once(&self, event_name: &str) {
        let mut warned = self.warned_unsupported.lock();
        if *warned {
            return;
        }
        *warned = true;

        warn!(
            event_name = %event_name,
            "Received object notification for an unsupported event type, but only \
             'ObjectCreated:*' types are handled. It is recommended that you update the \
             bucket notification configuration to only include ObjectCreated event types \
             to save resources."
        );
    }
}

/// Form-style unescape of an object key: `+` is a space, `%XX` is a byte
pub fn query_unescape(key: &str) -> Result<String, DecodeError> {
    if let Some(position) = malformed_escape(key) {
        return Err(DecodeError::invalid_key(
            key,
            format!("invalid escape at byte {position}"),
        ));
    }

    let spaced: Cow<'_, str> = if key.contains('+') {
        Cow::Owned(key.replace('+', " "))
    } else {
        Cow::Borrowed(key)
    };

    percent_decode_str(&spaced)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|e| DecodeError::invalid_key(key, e.to_string()))
}

/// Position of the first `%` not followed by two hex digits
fn malformed_escape(key: &str) -> Option<usize> {
    let bytes = key.as_bytes();
    bytes.iter().enumerate().find_map(|(i, &b)| {
        let valid = b != b'%'
            || matches!(
                bytes.get(i + 1..i + 3),
                Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit()
            );
        (!valid).then_some(i)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_RECORD: &str = r#"{"Records":[{"eventSource":"aws:s3","eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"b"},"object":{"key":"a%3Db.json"}}}]}"#;

    #[tokio::test]
    async fn test_decode_raw_document_unescapes_key() {
        let decoder = NotificationDecoder::new();
        let notifications = decoder.decode(SINGLE_RECORD).await.unwrap();

        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].bucket(), "b");
        assert_eq!(notifications[0].key(), "a=b.json");
    }

    #[tokio::test]
    async fn test_decode_drops_unsupported_records_with_single_warning() {
        let body = r#"{"Records":[
            {"eventSource":"aws:s3","eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"b"},"object":{"key":"keep.json"}}},
            {"eventSource":"aws:sqs","eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"b"},"object":{"key":"drop1"}}},
            {"eventSource":"aws:s3","eventName":"ObjectRemoved:Delete","s3":{"bucket":{"name":"b"},"object":{"key":"drop2"}}}
        ]}"#;

        let decoder = NotificationDecoder::new();
        let notifications = decoder.decode(body).await.unwrap();

        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].key(), "keep.json");
        assert!(*decoder.warned_unsupported.lock());
    }

    #[tokio::test]
    async fn test_decode_envelope_matches_inner_document() {
        let envelope = serde_json::json!({
            "TopicArn": "arn:x",
            "Message": SINGLE_RECORD,
        })
        .to_string();

        let decoder = NotificationDecoder::new();
        let wrapped = decoder.decode(&envelope).await.unwrap();
        let direct = decoder.decode(SINGLE_RECORD).await.unwrap();
        assert_eq!(wrapped, direct);
    }

    #[tokio::test]
    async fn test_decode_envelope_is_unwrapped_only_once() {
        let inner =
            serde_json::json!({"TopicArn": "arn:inner", "Message": SINGLE_RECORD}).to_string();
        let outer = serde_json::json!({"TopicArn": "arn:outer", "Message": inner}).to_string();

        let err = NotificationDecoder::new().decode(&outer).await.unwrap_err();
        assert!(matches!(err, DecodeError::MissingRecords));
    }

    #[tokio::test]
    async fn test_decode_failures() {
        let decoder = NotificationDecoder::new();

        let err = decoder.decode("{not json").await.unwrap_err();
        assert!(matches!(err, DecodeError::InvalidJson { .. }));

        let err = decoder.decode(r#"{"foo":"bar"}"#).await.unwrap_err();
        assert!(matches!(err, DecodeError::MissingRecords));

        let err = decoder
            .decode(r#"{"TopicArn":"arn:x","Message":"not json"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidJson { .. }));
    }

    #[tokio::test]
    async fn test_empty_records_is_not_an_error() {
        let notifications = NotificationDecoder::new()
            .decode(r#"{"Records":[]}"#)
            .await
            .unwrap();
        assert!(notifications.is_empty());
    }

    #[test]
    fn test_query_unescape() {
        assert_eq!(query_unescape("a%3Db.json").unwrap(), "a=b.json");
        assert_eq!(query_unescape("my+file%2Bv2.log").unwrap(), "my file+v2.log");
        assert_eq!(query_unescape("plain/key.gz").unwrap(), "plain/key.gz");
        assert!(query_unescape("bad%FF%FE").is_err());
    }

    #[test]
    fn test_query_unescape_rejects_malformed_escapes() {
        for key in ["a%ZZ", "a%", "a%4", "%G1/b", "50%+off"] {
            let err = query_unescape(key).unwrap_err();
            assert!(
                matches!(&err, DecodeError::InvalidKey { key: k, .. } if k == key),
                "{key} should be rejected, got {err:?}"
            );
        }
        assert_eq!(query_unescape("100%25").unwrap(), "100%");
    }

    struct FixedScript(Result<Vec<ObjectNotification>, fn() -> ScriptError>);

    #[async_trait]
    impl NotificationScript for FixedScript {
        async fn run(&self, _body: &str) -> Result<Vec<ObjectNotification>, ScriptError> {
            match &self.0 {
                Ok(notifications) => Ok(notifications.clone()),
                Err(make_err) => Err(make_err()),
            }
        }
    }

    #[tokio::test]
    async fn test_script_takes_precedence() {
        let script = FixedScript(Ok(vec![ObjectNotification::new("bkt", "raw%20key")]));
        let decoder = NotificationDecoder::with_script(Arc::new(script));

        // Not a notification document, but the script handles it verbatim
        let notifications = decoder.decode("custom-format").await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].key(), "raw%20key");
    }

    #[tokio::test]
    async fn test_script_errors_are_mapped() {
        let cancelled = NotificationDecoder::with_script(Arc::new(FixedScript(Err(|| {
            ScriptError::Cancelled
        }))));
        assert!(cancelled.decode("x").await.unwrap_err().is_cancelled());

        let failed = NotificationDecoder::with_script(Arc::new(FixedScript(Err(|| {
            ScriptError::Failed(anyhow::anyhow!("syntax error"))
        }))));
        assert!(matches!(
            failed.decode("x").await.unwrap_err(),
            DecodeError::Script(_)
        ));
    }
}
