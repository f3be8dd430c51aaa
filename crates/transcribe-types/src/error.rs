use thiserror::Error;

/// Error taxonomy shared by every seam in the transcription worker.
///
/// Each kind carries a distinct retry/ack policy (see `ErrorKind::policy`);
/// component crates wrap their own errors into one of these variants rather
/// than inventing a parallel taxonomy per seam.
#[derive(Error, Debug)]
pub enum WorkerError {
	/// Message or audio is structurally invalid. Never retried.
	#[error("bad input: {0}")]
	BadInput(String),

	/// The transcription engine reported an internal, deterministic failure.
	#[error("engine error: {0}")]
	EngineError(String),

	/// Out of memory or device unavailable. The worker that hit this should
	/// assume it is wedged and shut itself down.
	#[error("resource exhausted: {0}")]
	ResourceExhausted(String),

	/// Network blip, throttling, or a 5xx from the cloud provider. Safe to
	/// retry with backoff.
	#[error("transient error: {0}")]
	Transient(String),

	/// The visibility lease lapsed before the job completed.
	#[error("lease expired: {0}")]
	Expired(String),

	/// Configuration missing, authentication broken, or a dependency
	/// unreachable at startup. Not recoverable within this process.
	#[error("fatal: {0}")]
	Fatal(String),
}

/// The ack/retry disposition attached to each `ErrorKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
	/// Delete the message; redelivery can never succeed.
	Poison,
	/// Do not delete; let the queue's redrive mechanism retry elsewhere.
	Abandon,
	/// Retry locally with bounded exponential backoff before deciding.
	RetryLocally,
	/// Exit the process with a non-zero code.
	ExitProcess,
}

impl WorkerError {
	#[must_use]
	pub fn policy(&self) -> RetryPolicy {
		match self {
			Self::BadInput(_) | Self::EngineError(_) => RetryPolicy::Poison,
			Self::ResourceExhausted(_) | Self::Expired(_) => RetryPolicy::Abandon,
			Self::Transient(_) => RetryPolicy::RetryLocally,
			Self::Fatal(_) => RetryPolicy::ExitProcess,
		}
	}

	#[must_use]
	pub fn kind_name(&self) -> &'static str {
		match self {
			Self::BadInput(_) => "BadInput",
			Self::EngineError(_) => "EngineError",
			Self::ResourceExhausted(_) => "ResourceExhausted",
			Self::Transient(_) => "Transient",
			Self::Expired(_) => "Expired",
			Self::Fatal(_) => "Fatal",
		}
	}

	#[must_use]
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transient(_))
	}
}

pub type WorkerResult<T> = Result<T, WorkerError>;
