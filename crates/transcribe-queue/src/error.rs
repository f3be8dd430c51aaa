use transcribe_types::WorkerError;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
	#[error("visibility lease expired: {0}")]
	Expired(String),
	#[error("transient queue error: {0}")]
	Transient(String),
}

impl From<QueueError> for WorkerError {
	fn from(err: QueueError) -> Self {
		match err {
			QueueError::Expired(msg) => Self::Expired(msg),
			QueueError::Transient(msg) => Self::Transient(msg),
		}
	}
}
