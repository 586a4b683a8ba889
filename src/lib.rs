#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # S3 Event Ingest
//!
//! Queue-message lifecycle core for ingesting object-storage change
//! notifications with at-least-once delivery.
//!
//! ## Overview
//!
//! Object-created notifications arrive on a message queue. For each message the
//! crate keeps the message leased while it is being worked on, decodes the
//! notifications it carries, runs a handler per object and emits the derived
//! records. Only after the downstream pipeline has acknowledged every record is
//! the message resolved: deleted on success or on a permanent failure, left for
//! redelivery on a retryable one. Per-object finalizers run strictly after a
//! successful delete.
//!
//! ## Module Organization
//!
//! - [`messaging`] - queue client trait, message types and providers (in-memory, pgmq)
//! - [`notification`] - notification body decoding
//! - [`processing`] - keepalive, message processor and disposition
//! - [`reader`] - worker pool driving receive, process, publish and complete
//! - [`metrics`] - metrics sinks
//! - [`cache`] - read-mostly lazily computed map
//! - [`config`] - configuration loading and validation
//! - [`error`] - failure classification
//! - [`logging`] - structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use s3_event_ingest::config::ConfigManager;
//! use s3_event_ingest::messaging::providers::InMemoryQueueClient;
//! use s3_event_ingest::processing::{MessageProcessor, ObjectHandlerFactory, ProcessorConfig};
//! use s3_event_ingest::reader::{EventPipeline, QueueReader};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(
//! #     factory: Arc<dyn ObjectHandlerFactory>,
//! #     pipeline: Arc<dyn EventPipeline>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_from_file("config/ingest.toml")?;
//! let config = manager.config();
//!
//! let queue = Arc::new(InMemoryQueueClient::new(
//!     config.queue.name.clone(),
//!     config.queue.visibility_timeout(),
//! ));
//! let processor = Arc::new(MessageProcessor::new(
//!     queue.clone(),
//!     factory,
//!     ProcessorConfig::from(&config.queue),
//! ));
//!
//! let reader = QueueReader::from_config(config, queue, processor, pipeline)?;
//! reader.run(CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod metrics;
pub mod notification;
pub mod processing;
pub mod reader;

pub use config::{ConfigManager, ConfigurationError, IngestConfig};
pub use error::{
    DecodeError, FailureCause, IngestError, ObjectErrors, ObjectProcessingError, ProcessingError,
    Result,
};
pub use messaging::{QueueClient, QueueError, QueueMessage};
pub use metrics::{InputMetrics, MetricsSink, NoopMetrics};
pub use notification::{NotificationDecoder, NotificationScript, ObjectNotification};
pub use processing::{
    Disposition, MessageProcessor, ObjectHandler, ObjectHandlerFactory, ProcessingOutcome,
    ProcessorConfig, Record,
};
pub use reader::{EventPipeline, QueueReader};
