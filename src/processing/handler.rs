//! # Object Handler Contracts
//!
//! A factory turns one [`ObjectNotification`] into an [`ObjectHandler`] that
//! retrieves and parses the object, emitting [`Record`]s as it goes. After the
//! owning queue message has been deleted the handler's finalize step runs
//! through a [`Finalizer`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cache::LazyCache;
use crate::notification::ObjectNotification;

/// One structured record derived from an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub fields: serde_json::Value,
}

impl Record {
    pub fn new(fields: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            fields,
        }
    }
}

/// Callback receiving every record a handler produces
pub type Emit<'a> = &'a mut (dyn FnMut(Record) + Send);

/// Processes one object
#[async_trait]
pub trait ObjectHandler: Send {
    /// Retrieve and parse the object, emitting its records
    async fn process(&mut self, emit: Emit<'_>) -> anyhow::Result<()>;

    /// Side effect to run once the object's events are durable and the queue
    /// message is deleted (e.g. tagging or removing the object)
    async fn finalize(self: Box<Self>) -> anyhow::Result<()>;
}

/// Creates handlers for notifications
pub trait ObjectHandlerFactory: Send + Sync + 'static {
    /// Returns `None` when the object is filtered out and should be skipped
    fn create(
        &self,
        cancel: &CancellationToken,
        notification: &ObjectNotification,
    ) -> Option<Box<dyn ObjectHandler>>;
}

/// Deferred finalize step of a successfully processed object
pub struct Finalizer {
    bucket: String,
    key: String,
    handler: Box<dyn ObjectHandler>,
}

impl fmt::Debug for Finalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finalizer")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .finish()
    }
}

impl Finalizer {
    pub fn new(notification: &ObjectNotification, handler: Box<dyn ObjectHandler>) -> Self {
        Self {
            bucket: notification.bucket().to_string(),
            key: notification.key().to_string(),
            handler,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn run(self) -> anyhow::Result<()> {
        self.handler.finalize().await
    }
}

type FactoryBuilder = dyn Fn(&str) -> Box<dyn ObjectHandlerFactory> + Send + Sync;

/// Routes notifications to a per-bucket factory, building each bucket's
/// factory on first use and sharing it afterwards
pub struct BucketRoutedFactory {
    build: Box<FactoryBuilder>,
    factories: LazyCache<String, Box<dyn ObjectHandlerFactory>>,
}

impl fmt::Debug for BucketRoutedFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketRoutedFactory")
            .field("buckets", &self.factories.len())
            .finish()
    }
}

impl BucketRoutedFactory {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&str) -> Box<dyn ObjectHandlerFactory> + Send + Sync + 'static,
    {
        Self {
            build: Box::new(build),
            factories: LazyCache::new(),
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.factories.len()
    }

    fn factory_for(&self, bucket: &str) -> Arc<Box<dyn ObjectHandlerFactory>> {
        self.factories
            .get_or_insert_with(&bucket.to_string(), |bucket| (self.build)(bucket))
    }
}

impl ObjectHandlerFactory for BucketRoutedFactory {
    fn create(
        &self,
        cancel: &CancellationToken,
        notification: &ObjectNotification,
    ) -> Option<Box<dyn ObjectHandler>> {
        self.factory_for(notification.bucket())
            .create(cancel, notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoHandler {
        key: String,
    }

    #[async_trait]
    impl ObjectHandler for EchoHandler {
        async fn process(&mut self, emit: Emit<'_>) -> anyhow::Result<()> {
            emit(Record::new(serde_json::json!({ "key": self.key })));
            Ok(())
        }

        async fn finalize(self: Box<Self>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct PrefixFactory {
        prefix: String,
    }

    impl ObjectHandlerFactory for PrefixFactory {
        fn create(
            &self,
            _cancel: &CancellationToken,
            notification: &ObjectNotification,
        ) -> Option<Box<dyn ObjectHandler>> {
            notification.key().starts_with(&self.prefix).then(|| {
                Box::new(EchoHandler {
                    key: notification.key().to_string(),
                }) as Box<dyn ObjectHandler>
            })
        }
    }

    #[tokio::test]
    async fn test_bucket_routed_factory_builds_once_per_bucket() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let factory = BucketRoutedFactory::new(move |bucket| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(PrefixFactory {
                prefix: format!("{bucket}/"),
            })
        });
        let cancel = CancellationToken::new();

        let a1 = ObjectNotification::new("a", "a/1.json");
        let a2 = ObjectNotification::new("a", "other/2.json");
        let b1 = ObjectNotification::new("b", "b/1.json");

        assert!(factory.create(&cancel, &a1).is_some());
        assert!(factory.create(&cancel, &a2).is_none());
        let mut handler = factory.create(&cancel, &b1).unwrap();

        let mut records = Vec::new();
        handler.process(&mut |r| records.push(r)).await.unwrap();
        assert_eq!(records[0].fields["key"], "b/1.json");

        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(factory.bucket_count(), 2);
    }

    #[tokio::test]
    async fn test_finalizer_keeps_object_identity() {
        let notification = ObjectNotification::new("bkt", "logs/x.gz");
        let finalizer = Finalizer::new(
            &notification,
            Box::new(EchoHandler {
                key: "logs/x.gz".into(),
            }),
        );
        assert_eq!(finalizer.bucket(), "bkt");
        assert_eq!(finalizer.key(), "logs/x.gz");
        finalizer.run().await.unwrap();
    }
}
