use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use transcribe_types::{Phase, Transcription};

use crate::device::DevicePreference;
use crate::error::EngineError;

/// Invoked at model-load completion and at regular intervals during
/// transcription with `(phase, percent_complete, message)`. Cheap to call;
/// implementations forward straight to the progress/heartbeat reporter's
/// channel (`transcribe-telemetry::reporter`).
pub type ProgressCallback = Arc<dyn Fn(Phase, f32, String) + Send + Sync>;

/// Turns a local audio file into a transcript, reporting progress as it
/// goes. The dispatcher is polymorphic over this trait: a GPU-optimized
/// variant, a CPU fallback, and a deterministic test double all implement
/// it identically from the dispatcher's point of view.
#[async_trait]
pub trait TranscriptionAdapter: Send + Sync {
	/// Record the requested device preference and resolve it against what's
	/// actually available. Called once at startup, before `load_model`.
	async fn initialize(&mut self, device_preference: DevicePreference) -> Result<(), EngineError>;

	/// Load the model into memory. No queue activity happens until this
	/// returns; a failure here is always `LOADING -> TERMINAL_FAIL`.
	async fn load_model(&mut self) -> Result<(), EngineError>;

	/// Transcribe the audio at `local_path`, invoking `on_progress` at
	/// model-load completion and at regular intervals during transcription.
	async fn transcribe(&self, local_path: &Path, on_progress: ProgressCallback) -> Result<Transcription, EngineError>;

	/// The opaque model identifier carried into the transcript artifact's
	/// `model` field (e.g. `"large-v3"`).
	fn model_name(&self) -> &str;

	/// The device this adapter ended up running on, after `initialize`.
	fn device(&self) -> transcribe_types::Device;
}
