//! # Queue Client Providers
//!
//! - [`InMemoryQueueClient`] - lease-simulating queue for tests and local runs
//! - [`PgmqQueueClient`] - PostgreSQL message queue (requires the `postgres` feature)

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod pgmq;

pub use in_memory::InMemoryQueueClient;
#[cfg(feature = "postgres")]
pub use self::pgmq::PgmqQueueClient;
