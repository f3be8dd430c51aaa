use async_trait::async_trait;
use aws_sdk_sqs::types::{MessageSystemAttributeName, QueueAttributeName};
use chrono::{DateTime, Utc};
use tracing::{instrument, warn};

use crate::client::QueueClient;
use crate::error::QueueError;
use crate::message::{Message, QueueDepth};

/// Real queue backend, talking to an SQS-compatible queue. Redrive (moving
/// a message to a dead-letter queue after N receives) is configured on the
/// queue itself; this client only surfaces `receive_count` so the
/// dispatcher can log it.
pub struct SqsQueueClient {
	client: aws_sdk_sqs::Client,
	queue_url: String,
}

impl SqsQueueClient {
	#[must_use]
	pub fn new(client: aws_sdk_sqs::Client, queue_url: String) -> Self {
		Self { client, queue_url }
	}

	pub async fn from_env(queue_url: String) -> Self {
		let config = aws_config::load_from_env().await;
		Self::new(aws_sdk_sqs::Client::new(&config), queue_url)
	}
}

#[async_trait]
impl QueueClient for SqsQueueClient {
	#[instrument(skip(self))]
	async fn receive(&self, max_messages: u32, long_poll_seconds: u32, visibility_timeout_seconds: u32) -> Result<Vec<Message>, QueueError> {
		let response = self
			.client
			.receive_message()
			.queue_url(&self.queue_url)
			.max_number_of_messages(max_messages.min(10) as i32)
			.wait_time_seconds(long_poll_seconds.min(20) as i32)
			.visibility_timeout(visibility_timeout_seconds as i32)
			.message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
			.message_system_attribute_names(MessageSystemAttributeName::ApproximateFirstReceiveTimestamp)
			.send()
			.await
			.map_err(|e| QueueError::Transient(format!("receive_message: {e}")))?;

		let messages = response
			.messages
			.unwrap_or_default()
			.into_iter()
			.filter_map(|m| {
				let handle = m.receipt_handle?;
				let body = m.body.unwrap_or_default().into_bytes();
				let attrs = m.attributes.unwrap_or_default();
				let receive_count = attrs
					.get(&MessageSystemAttributeName::ApproximateReceiveCount)
					.and_then(|v| v.parse::<u32>().ok())
					.unwrap_or(1);
				let first_received_at = attrs
					.get(&MessageSystemAttributeName::ApproximateFirstReceiveTimestamp)
					.and_then(|v| v.parse::<i64>().ok())
					.and_then(|millis| DateTime::from_timestamp_millis(millis))
					.unwrap_or_else(Utc::now);
				Some(Message { body, handle, receive_count, first_received_at })
			})
			.collect();

		Ok(messages)
	}

	#[instrument(skip(self))]
	async fn delete(&self, handle: &str) -> Result<(), QueueError> {
		match self.client.delete_message().queue_url(&self.queue_url).receipt_handle(handle).send().await {
			Ok(_) => Ok(()),
			Err(e) => {
				warn!(error = %e, "delete_message failed, treating as idempotent no-op");
				Ok(())
			}
		}
	}

	#[instrument(skip(self))]
	async fn extend_visibility(&self, handle: &str, additional_seconds: u32) -> Result<(), QueueError> {
		self.client
			.change_message_visibility()
			.queue_url(&self.queue_url)
			.receipt_handle(handle)
			.visibility_timeout(additional_seconds as i32)
			.send()
			.await
			.map(|_| ())
			.map_err(|e| QueueError::Expired(format!("change_message_visibility: {e}")))
	}

	#[instrument(skip(self))]
	async fn depth(&self) -> Result<QueueDepth, QueueError> {
		let response = self
			.client
			.get_queue_attributes()
			.queue_url(&self.queue_url)
			.attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
			.attribute_names(QueueAttributeName::ApproximateNumberOfMessagesNotVisible)
			.send()
			.await
			.map_err(|e| QueueError::Transient(format!("get_queue_attributes: {e}")))?;

		let attrs = response.attributes.unwrap_or_default();
		let visible = attrs.get(&QueueAttributeName::ApproximateNumberOfMessages).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
		let in_flight = attrs.get(&QueueAttributeName::ApproximateNumberOfMessagesNotVisible).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);

		Ok(QueueDepth { visible, in_flight })
	}

	#[instrument(skip(self, body))]
	async fn send(&self, body: Vec<u8>) -> Result<(), QueueError> {
		let message_body = String::from_utf8(body).map_err(|e| QueueError::Transient(format!("message body is not utf-8: {e}")))?;
		self.client
			.send_message()
			.queue_url(&self.queue_url)
			.message_body(message_body)
			.send()
			.await
			.map(|_| ())
			.map_err(|e| QueueError::Transient(format!("send_message: {e}")))
	}
}
