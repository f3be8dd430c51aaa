use async_trait::async_trait;

use crate::error::QueueError;
use crate::message::{Message, QueueDepth};

/// Message-oriented access to a FIFO-with-redrive queue. Implemented by a
/// real managed-queue backend and, for tests, an in-memory double with
/// identical visibility-timeout and receive-count semantics.
#[async_trait]
pub trait QueueClient: Send + Sync {
	async fn receive(&self, max_messages: u32, long_poll_seconds: u32, visibility_timeout_seconds: u32) -> Result<Vec<Message>, QueueError>;

	async fn delete(&self, handle: &str) -> Result<(), QueueError>;

	async fn extend_visibility(&self, handle: &str, additional_seconds: u32) -> Result<(), QueueError>;

	async fn depth(&self) -> Result<QueueDepth, QueueError>;

	/// Enqueue a new job message body. The dispatcher never calls this; the
	/// submitter does — the same trait backs both sides of the queue.
	async fn send(&self, body: Vec<u8>) -> Result<(), QueueError>;
}
