use transcribe_types::WorkerError;

/// Failures a transcription adapter can raise. Narrower than `WorkerError`
/// so each adapter variant doesn't need to know the dispatcher's retry
/// policy — only `EngineError::into::<WorkerError>()` does.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
	#[error("corrupt or unsupported audio: {0}")]
	BadInput(String),
	#[error("transcription engine crashed: {0}")]
	Engine(String),
	#[error("out of memory or device unavailable: {0}")]
	ResourceExhausted(String),
	#[error("transcription engine misconfigured: {0}")]
	Fatal(String),
}

impl From<EngineError> for WorkerError {
	fn from(err: EngineError) -> Self {
		match err {
			EngineError::BadInput(msg) => Self::BadInput(msg),
			EngineError::Engine(msg) => Self::EngineError(msg),
			EngineError::ResourceExhausted(msg) => Self::ResourceExhausted(msg),
			EngineError::Fatal(msg) => Self::Fatal(msg),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bad_input_and_engine_map_to_matching_worker_error_kinds() {
		assert!(matches!(WorkerError::from(EngineError::BadInput("x".into())), WorkerError::BadInput(_)));
		assert!(matches!(WorkerError::from(EngineError::Engine("x".into())), WorkerError::EngineError(_)));
		assert!(matches!(WorkerError::from(EngineError::ResourceExhausted("x".into())), WorkerError::ResourceExhausted(_)));
		assert!(matches!(WorkerError::from(EngineError::Fatal("x".into())), WorkerError::Fatal(_)));
	}
}
