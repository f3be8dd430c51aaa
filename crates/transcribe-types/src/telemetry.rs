use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
	QueuedReceived,
	Downloading,
	ModelLoading,
	Transcribing,
	Uploading,
	Complete,
	Failed,
}

impl Phase {
	#[must_use]
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Complete | Self::Failed)
	}
}

/// Per-job status, overwritten at `progress/<job_id>` on every update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressRecord {
	pub job_id: String,
	pub worker_id: String,
	pub phase: Phase,
	pub percent_complete: f32,
	pub message: String,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
	Loading,
	Idle,
	Processing,
	ShuttingDown,
}

/// Per-worker liveness record, overwritten at `workers/<worker_id>/heartbeat`
/// every `heartbeat_interval_seconds`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatRecord {
	pub worker_id: String,
	pub status: WorkerStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub current_job_id: Option<String>,
	pub idle_seconds: u64,
	pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_complete_and_failed_are_terminal() {
		assert!(Phase::Complete.is_terminal());
		assert!(Phase::Failed.is_terminal());
		assert!(!Phase::Transcribing.is_terminal());
		assert!(!Phase::QueuedReceived.is_terminal());
	}

	#[test]
	fn phase_serializes_snake_case() {
		assert_eq!(serde_json::to_string(&Phase::ModelLoading).unwrap(), "\"model_loading\"");
		assert_eq!(serde_json::to_string(&Phase::QueuedReceived).unwrap(), "\"queued_received\"");
	}
}
