use transcribe_types::WorkerError;

use crate::uri::UriError;

/// Outcome of a single object-store operation. This is finer-grained than
/// `WorkerError`: the dispatcher decides what a `NotFound` or
/// `AccessDenied` on a particular operation means for the job as a whole.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("object not found: {0}")]
	NotFound(String),
	#[error("access denied: {0}")]
	AccessDenied(String),
	#[error("transient object-store error: {0}")]
	Transient(String),
	#[error("local io error: {0}")]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Uri(#[from] UriError),
}

impl From<object_store::Error> for StoreError {
	fn from(err: object_store::Error) -> Self {
		match &err {
			object_store::Error::NotFound { .. } => Self::NotFound(err.to_string()),
			object_store::Error::Unauthenticated { .. } | object_store::Error::PermissionDenied { .. } => Self::AccessDenied(err.to_string()),
			_ => Self::Transient(err.to_string()),
		}
	}
}

/// The worker's job-processing loop only cares about the taxonomy in
/// `transcribe_types::WorkerError`; a missing or forbidden object can't be
/// recovered by retrying, so both collapse to `BadInput`.
impl From<StoreError> for WorkerError {
	fn from(err: StoreError) -> Self {
		match err {
			StoreError::NotFound(msg) => Self::BadInput(format!("object not found: {msg}")),
			StoreError::AccessDenied(msg) => Self::BadInput(format!("access denied: {msg}")),
			StoreError::Transient(msg) => Self::Transient(msg),
			StoreError::Io(e) => Self::Transient(format!("local io error: {e}")),
			StoreError::Uri(e) => Self::BadInput(e.to_string()),
		}
	}
}
