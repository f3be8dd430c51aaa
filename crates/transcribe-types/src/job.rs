use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single unit of audio-to-transcript work, as it appears in the queue
/// message body. Unknown fields are ignored on deserialize and have no
/// effect on re-serialization of the fields this worker knows about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
	pub job_id: String,
	pub s3_input_path: String,
	pub s3_output_path: String,
	pub estimated_duration_seconds: u64,
	/// Reserved for future use; the worker never reads this, only preserves
	/// it on retry (the queue redrive machinery owns `retry_count`, not us).
	pub priority: i64,
	pub retry_count: u32,
	pub submitted_at: DateTime<Utc>,
}

impl Job {
	/// Parse a queue message body as a `Job`. A parse failure is always a
	/// poison message (`WorkerError::BadInput`) — see `transcribe-types::error`.
	///
	/// # Errors
	/// Returns an error if `body` is not valid UTF-8 JSON or is missing a
	/// required field.
	pub fn from_message_body(body: &[u8]) -> serde_json::Result<Self> {
		serde_json::from_slice(body)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_documented_wire_shape() {
		let body = br#"{"job_id":"j1","s3_input_path":"s3://aud/a.mp3","s3_output_path":"s3://aud/t.json",
			"estimated_duration_seconds":60,"priority":1,"retry_count":0,"submitted_at":"2025-01-01T00:00:00Z"}"#;
		let job = Job::from_message_body(body).expect("valid job");
		assert_eq!(job.job_id, "j1");
		assert_eq!(job.priority, 1);
		assert_eq!(job.retry_count, 0);
	}

	#[test]
	fn ignores_unknown_fields() {
		let body = br#"{"job_id":"j1","s3_input_path":"s3://a/a","s3_output_path":"s3://a/b",
			"estimated_duration_seconds":1,"priority":0,"retry_count":0,"submitted_at":"2025-01-01T00:00:00Z",
			"future_field":"ignored"}"#;
		assert!(Job::from_message_body(body).is_ok());
	}

	#[test]
	fn rejects_malformed_body() {
		assert!(Job::from_message_body(b"not-json").is_err());
	}
}
