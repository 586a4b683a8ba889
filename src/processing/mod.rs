//! # Message Processing
//!
//! Per-message lifecycle: keepalive, decode, object handling and disposition.

pub mod handler;
pub mod keepalive;
pub mod outcome;
pub mod processor;

pub use handler::{
    BucketRoutedFactory, Emit, Finalizer, ObjectHandler, ObjectHandlerFactory, Record,
};
pub use keepalive::VisibilityKeepalive;
pub use outcome::{Disposition, ObjectRef, ProcessingOutcome};
pub use processor::{MessageProcessor, ProcessorConfig};
