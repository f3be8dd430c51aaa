//! Message-oriented access to the job queue: receive with visibility-
//! timeout leasing, delete (ack), visibility extension, depth, and send
//! (used by the submitter). A real SQS-compatible backend and an
//! in-memory test double share one trait.

pub mod client;
pub mod error;
pub mod message;
pub mod sqs;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::QueueClient;
pub use error::QueueError;
pub use message::{Message, QueueDepth};
pub use sqs::SqsQueueClient;
