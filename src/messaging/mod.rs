//! # Messaging Module
//!
//! Queue access for notification ingestion.
//!
//! ## Module Structure
//!
//! - `client` - the `QueueClient` trait (receive / delete / extend visibility)
//! - `types` - `QueueMessage`, `MessageId`, `ReceiptHandle`
//! - `errors` - queue error types
//! - `providers` - in-memory and PGMQ implementations

pub mod client;
pub mod errors;
pub mod providers;
pub mod types;

pub use client::QueueClient;
pub use errors::{QueueError, QueueResult};
pub use types::{MessageId, QueueMessage, ReceiptHandle};
