use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use transcribe_types::{Device, Phase, Segment, Transcription};

use crate::adapter::{ProgressCallback, TranscriptionAdapter};
use crate::device::DevicePreference;
use crate::error::EngineError;

/// What a `DeterministicAdapter::transcribe` call should do, configured up
/// front so dispatcher tests can exercise every branch of the
/// job-processing algorithm without a real model.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
	Success { segments: Vec<(f64, f64, &'static str)>, processing_delay: Duration },
	BadInput,
	EngineError,
	ResourceExhausted,
}

/// A fixed, timer-free transcription adapter used by the end-to-end tests
/// in `apps/worker`. It never touches a real model; it sleeps for the
/// configured delay (so visibility-extension and progress-coalescing
/// timing can be exercised) and then returns whatever outcome the test
/// scripted.
pub struct DeterministicAdapter {
	model_name: String,
	outcome: ScriptedOutcome,
}

impl DeterministicAdapter {
	#[must_use]
	pub fn new(model_name: impl Into<String>, outcome: ScriptedOutcome) -> Self {
		Self { model_name: model_name.into(), outcome }
	}
}

#[async_trait]
impl TranscriptionAdapter for DeterministicAdapter {
	async fn initialize(&mut self, _device_preference: DevicePreference) -> Result<(), EngineError> {
		Ok(())
	}

	async fn load_model(&mut self) -> Result<(), EngineError> {
		Ok(())
	}

	async fn transcribe(&self, _local_path: &Path, on_progress: ProgressCallback) -> Result<Transcription, EngineError> {
		on_progress(Phase::ModelLoading, 100.0, "model ready".to_string());

		match &self.outcome {
			ScriptedOutcome::Success { segments, processing_delay } => {
				if !processing_delay.is_zero() {
					tokio::time::sleep(*processing_delay).await;
				}
				on_progress(Phase::Transcribing, 100.0, "done".to_string());
				let segments = segments.iter().map(|(start, end, text)| Segment { start: *start, end: *end, text: (*text).to_string() }).collect();
				Ok(Transcription::from_segments(segments, Some("en".to_string())))
			}
			ScriptedOutcome::BadInput => Err(EngineError::BadInput("scripted bad input".to_string())),
			ScriptedOutcome::EngineError => Err(EngineError::Engine("scripted engine crash".to_string())),
			ScriptedOutcome::ResourceExhausted => Err(EngineError::ResourceExhausted("scripted oom".to_string())),
		}
	}

	fn model_name(&self) -> &str {
		&self.model_name
	}

	fn device(&self) -> Device {
		Device::Cpu
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{Arc, Mutex};

	#[tokio::test]
	async fn success_outcome_preserves_segment_order() {
		let adapter = DeterministicAdapter::new("det-v1", ScriptedOutcome::Success { segments: vec![(0.0, 1.0, "hello"), (1.0, 2.0, "world")], processing_delay: Duration::ZERO });
		let events: Arc<Mutex<Vec<Phase>>> = Arc::new(Mutex::new(Vec::new()));
		let events_clone = Arc::clone(&events);
		let cb: ProgressCallback = Arc::new(move |phase, _pct, _msg| events_clone.lock().unwrap().push(phase));

		let transcription = adapter.transcribe(Path::new("/tmp/unused"), cb).await.unwrap();
		assert_eq!(transcription.text, "hello world");
		assert_eq!(events.lock().unwrap().as_slice(), &[Phase::ModelLoading, Phase::Transcribing]);
	}

	#[tokio::test]
	async fn bad_input_outcome_fails_without_calling_transcribing_progress() {
		let adapter = DeterministicAdapter::new("det-v1", ScriptedOutcome::BadInput);
		let cb: ProgressCallback = Arc::new(|_, _, _| {});
		let err = adapter.transcribe(Path::new("/tmp/unused"), cb).await.unwrap_err();
		assert!(matches!(err, EngineError::BadInput(_)));
	}
}
