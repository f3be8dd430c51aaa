use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::client::QueueClient;
use crate::error::QueueError;
use crate::message::{Message, QueueDepth};

struct StoredMessage {
	body: Vec<u8>,
	receive_count: u32,
	first_received_at: Option<DateTime<Utc>>,
}

struct InFlightMessage {
	body: Vec<u8>,
	receive_count: u32,
	first_received_at: DateTime<Utc>,
	visible_until: DateTime<Utc>,
}

struct Inner {
	available: VecDeque<StoredMessage>,
	in_flight: HashMap<String, InFlightMessage>,
	dead_letters: Vec<Vec<u8>>,
}

/// An in-process queue with the same visibility-timeout and redrive
/// semantics as the real backend, so end-to-end scenarios run as ordinary
/// `#[tokio::test]`s.
pub struct InMemoryQueueClient {
	inner: Mutex<Inner>,
	max_receive_count: u32,
}

impl InMemoryQueueClient {
	#[must_use]
	pub fn new(max_receive_count: u32) -> Self {
		Self { inner: Mutex::new(Inner { available: VecDeque::new(), in_flight: HashMap::new(), dead_letters: Vec::new() }), max_receive_count }
	}

	/// Messages the queue itself moved to the dead-letter queue after
	/// `max_receive_count` deliveries.
	pub async fn dead_letters(&self) -> Vec<Vec<u8>> {
		self.inner.lock().await.dead_letters.clone()
	}

	fn sweep_expired(inner: &mut Inner, max_receive_count: u32) {
		let now = Utc::now();
		let expired: Vec<String> = inner.in_flight.iter().filter(|(_, m)| m.visible_until <= now).map(|(h, _)| h.clone()).collect();

		for handle in expired {
			let Some(message) = inner.in_flight.remove(&handle) else { continue };
			if message.receive_count >= max_receive_count {
				inner.dead_letters.push(message.body);
			} else {
				inner.available.push_back(StoredMessage { body: message.body, receive_count: message.receive_count, first_received_at: Some(message.first_received_at) });
			}
		}
	}
}

#[async_trait]
impl QueueClient for InMemoryQueueClient {
	async fn receive(&self, max_messages: u32, long_poll_seconds: u32, visibility_timeout_seconds: u32) -> Result<Vec<Message>, QueueError> {
		let deadline = Instant::now() + Duration::from_secs(u64::from(long_poll_seconds));

		loop {
			{
				let mut inner = self.inner.lock().await;
				Self::sweep_expired(&mut inner, self.max_receive_count);

				if !inner.available.is_empty() {
					let take = max_messages.min(inner.available.len() as u32);
					let mut out = Vec::with_capacity(take as usize);
					for _ in 0..take {
						let stored = inner.available.pop_front().expect("checked non-empty above");
						let handle = Uuid::new_v4().to_string();
						let receive_count = stored.receive_count + 1;
						let first_received_at = stored.first_received_at.unwrap_or_else(Utc::now);
						let visible_until = Utc::now() + chrono::Duration::seconds(i64::from(visibility_timeout_seconds));

						inner.in_flight.insert(handle.clone(), InFlightMessage { body: stored.body.clone(), receive_count, first_received_at, visible_until });
						out.push(Message { body: stored.body, handle, receive_count, first_received_at });
					}
					return Ok(out);
				}
			}

			if Instant::now() >= deadline {
				return Ok(Vec::new());
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	}

	async fn delete(&self, handle: &str) -> Result<(), QueueError> {
		self.inner.lock().await.in_flight.remove(handle);
		Ok(())
	}

	async fn extend_visibility(&self, handle: &str, additional_seconds: u32) -> Result<(), QueueError> {
		let mut inner = self.inner.lock().await;
		match inner.in_flight.get_mut(handle) {
			Some(message) => {
				message.visible_until = Utc::now() + chrono::Duration::seconds(i64::from(additional_seconds));
				Ok(())
			}
			None => Err(QueueError::Expired(format!("no in-flight message for handle {handle}"))),
		}
	}

	async fn depth(&self) -> Result<QueueDepth, QueueError> {
		let inner = self.inner.lock().await;
		Ok(QueueDepth { visible: inner.available.len() as u64, in_flight: inner.in_flight.len() as u64 })
	}

	async fn send(&self, body: Vec<u8>) -> Result<(), QueueError> {
		self.inner.lock().await.available.push_back(StoredMessage { body, receive_count: 0, first_received_at: None });
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn send_then_receive_round_trips_the_body() {
		let queue = InMemoryQueueClient::new(3);
		queue.send(b"hello".to_vec()).await.unwrap();
		let messages = queue.receive(1, 0, 30).await.unwrap();
		assert_eq!(messages.len(), 1);
		assert_eq!(messages[0].body, b"hello");
		assert_eq!(messages[0].receive_count, 1);
	}

	#[tokio::test]
	async fn delete_removes_the_in_flight_message() {
		let queue = InMemoryQueueClient::new(3);
		queue.send(b"job".to_vec()).await.unwrap();
		let messages = queue.receive(1, 0, 30).await.unwrap();
		queue.delete(&messages[0].handle).await.unwrap();

		let depth = queue.depth().await.unwrap();
		assert_eq!(depth.visible, 0);
		assert_eq!(depth.in_flight, 0);
	}

	#[tokio::test]
	async fn deleting_an_unknown_handle_is_not_an_error() {
		let queue = InMemoryQueueClient::new(3);
		queue.delete("never-issued").await.unwrap();
	}

	#[tokio::test]
	async fn expired_visibility_redelivers_with_incremented_receive_count() {
		let queue = InMemoryQueueClient::new(3);
		queue.send(b"job".to_vec()).await.unwrap();
		let first = queue.receive(1, 0, 0).await.unwrap();
		assert_eq!(first[0].receive_count, 1);

		// visibility_timeout_seconds=0 means it's immediately eligible for redelivery
		tokio::time::sleep(Duration::from_millis(5)).await;
		let second = queue.receive(1, 0, 30).await.unwrap();
		assert_eq!(second.len(), 1);
		assert_eq!(second[0].receive_count, 2);
		assert_eq!(second[0].first_received_at, first[0].first_received_at);
	}

	#[tokio::test]
	async fn extend_visibility_on_unknown_handle_is_expired() {
		let queue = InMemoryQueueClient::new(3);
		let err = queue.extend_visibility("bogus", 30).await.unwrap_err();
		assert!(matches!(err, QueueError::Expired(_)));
	}

	#[tokio::test]
	async fn message_moves_to_dlq_after_max_receive_count() {
		let queue = InMemoryQueueClient::new(2);
		queue.send(b"poison".to_vec()).await.unwrap();

		queue.receive(1, 0, 0).await.unwrap();
		tokio::time::sleep(Duration::from_millis(5)).await;
		queue.receive(1, 0, 0).await.unwrap();
		tokio::time::sleep(Duration::from_millis(5)).await;

		// third receive attempt should sweep this straight to the DLQ instead of redelivering
		let third = queue.receive(1, 0, 30).await.unwrap();
		assert!(third.is_empty());
		assert_eq!(queue.dead_letters().await, vec![b"poison".to_vec()]);
	}

	#[tokio::test]
	async fn receive_long_polls_until_a_message_arrives() {
		let queue = std::sync::Arc::new(InMemoryQueueClient::new(3));
		let producer = std::sync::Arc::clone(&queue);
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(30)).await;
			producer.send(b"late".to_vec()).await.unwrap();
		});

		let messages = queue.receive(1, 1, 30).await.unwrap();
		assert_eq!(messages.len(), 1);
		assert_eq!(messages[0].body, b"late");
	}
}
