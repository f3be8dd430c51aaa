use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use transcribe_types::{Device, Phase, Segment, Transcription};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::adapter::{ProgressCallback, TranscriptionAdapter};
use crate::audio_decode::decode_wav_mono;
use crate::device::{select_device, DeviceConfig, DevicePreference};
use crate::error::EngineError;

/// Real transcription engine binding: `whisper-rs` over a GPU or CPU
/// context, selected at `initialize` time per the device-selection policy
/// below. The blocking FFI call happens inside `spawn_blocking` so it
/// never stalls the dispatcher's cooperative executor, mirroring the
/// codebase's existing treatment of Whisper as unstoppable blocking work.
pub struct WhisperAdapter {
	model_path: PathBuf,
	model_name: String,
	threads: i32,
	gpu_batch_size: usize,
	device_config: Option<DeviceConfig>,
	ctx: Option<Arc<WhisperContext>>,
}

impl WhisperAdapter {
	/// `model` is the opaque identifier from `--model` (e.g. `"large-v3"`);
	/// it's resolved against `models_dir` as `ggml-<model>.bin`, the naming
	/// convention the standalone `simple_wav`/`whisper_benchmark` reference
	/// tools use. Where that model actually comes from (baked into the
	/// image, downloaded at startup) is out of scope per the purpose and
	/// scope non-goals around model runtime choice.
	#[must_use]
	pub fn new(model: String, models_dir: &Path, threads: i32, gpu_batch_size: usize) -> Self {
		let model_path = models_dir.join(format!("ggml-{model}.bin"));
		Self { model_path, model_name: model, threads, gpu_batch_size, device_config: None, ctx: None }
	}
}

#[async_trait]
impl TranscriptionAdapter for WhisperAdapter {
	#[instrument(skip(self))]
	async fn initialize(&mut self, device_preference: DevicePreference) -> Result<(), EngineError> {
		let config = select_device(device_preference, self.gpu_batch_size);
		info!(device = config.device.as_str(), half_precision = config.half_precision, "selected transcription device");
		self.device_config = Some(config);
		Ok(())
	}

	#[instrument(skip(self))]
	async fn load_model(&mut self) -> Result<(), EngineError> {
		let model_path = self.model_path.clone();
		let start = Instant::now();

		let ctx = tokio::task::spawn_blocking(move || WhisperContext::new_with_params(&model_path, WhisperContextParameters::default()))
			.await
			.map_err(|e| EngineError::Fatal(format!("model load task panicked: {e}")))?
			.map_err(|e| EngineError::Fatal(format!("failed to load whisper model: {e}")))?;

		info!(load_time_ms = start.elapsed().as_millis(), "whisper model loaded");
		self.ctx = Some(Arc::new(ctx));
		Ok(())
	}

	#[instrument(skip(self, on_progress))]
	async fn transcribe(&self, local_path: &Path, on_progress: ProgressCallback) -> Result<Transcription, EngineError> {
		let ctx = self.ctx.clone().ok_or_else(|| EngineError::Fatal("transcribe called before load_model".to_string()))?;
		let threads = self.threads;
		let path: PathBuf = local_path.to_path_buf();

		on_progress(Phase::ModelLoading, 100.0, "model ready".to_string());

		let samples = tokio::task::spawn_blocking(move || decode_wav_mono(&path)).await.map_err(|e| EngineError::Engine(format!("decode task panicked: {e}")))??;

		let audio_duration_secs = samples.len() as f64 / 16_000.0;
		let progress_cb = on_progress.clone();
		let segments = tokio::task::spawn_blocking(move || run_whisper(&ctx, threads, &samples, &progress_cb))
			.await
			.map_err(|e| EngineError::Engine(format!("transcription task panicked: {e}")))??;

		on_progress(Phase::Transcribing, 100.0, format!("transcribed {audio_duration_secs:.1}s of audio"));
		Ok(Transcription::from_segments(segments, None))
	}

	fn model_name(&self) -> &str {
		&self.model_name
	}

	fn device(&self) -> Device {
		self.device_config.map_or(Device::Cpu, |c| c.device)
	}
}

fn run_whisper(ctx: &WhisperContext, threads: i32, audio: &[f32], on_progress: &ProgressCallback) -> Result<Vec<Segment>, EngineError> {
	let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
	params.set_translate(false);
	params.set_print_special(false);
	params.set_print_progress(false);
	params.set_print_realtime(false);
	params.set_print_timestamps(false);
	params.set_n_threads(threads);

	let mut state = ctx.create_state().map_err(|e| EngineError::Engine(format!("failed to create whisper state: {e}")))?;

	state.full(params, audio).map_err(|e| classify_whisper_error(&e.to_string()))?;

	let num_segments = state.full_n_segments();
	if num_segments == 0 {
		warn!("no segments extracted; audio may be silence");
		return Ok(Vec::new());
	}

	on_progress(Phase::Transcribing, 50.0, format!("extracting {num_segments} segment(s)"));

	let mut segments = Vec::with_capacity(num_segments as usize);
	for i in 0..num_segments {
		let Some(segment) = state.get_segment(i) else { continue };
		let Ok(text) = segment.to_str() else { continue };
		let trimmed = text.trim();
		if trimmed.is_empty() {
			continue;
		}
		// whisper-rs reports timestamps in centiseconds.
		let start = segment.start_timestamp() as f64 / 100.0;
		let end = segment.end_timestamp() as f64 / 100.0;
		segments.push(Segment { start, end, text: trimmed.to_string() });
	}

	Ok(segments)
}

/// `whisper-rs` surfaces both engine crashes and OOM as opaque error
/// strings; classify by substring since there's no structured variant to
/// match on (matches the GPU allocator's own error text).
fn classify_whisper_error(message: &str) -> EngineError {
	let lower = message.to_lowercase();
	if lower.contains("out of memory") || lower.contains("oom") || lower.contains("cuda_error_out_of_memory") {
		EngineError::ResourceExhausted(message.to_string())
	} else {
		EngineError::Engine(message.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classifies_oom_strings_as_resource_exhausted() {
		assert!(matches!(classify_whisper_error("CUDA error: out of memory"), EngineError::ResourceExhausted(_)));
		assert!(matches!(classify_whisper_error("something else entirely"), EngineError::Engine(_)));
	}
}
