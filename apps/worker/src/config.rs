use clap::Parser;
use transcribe_types::WorkerError;

/// Worker configuration: one source of truth (CLI flags with environment
/// fallback), validated eagerly before any queue or object-store call.
#[derive(Parser, Debug, Clone)]
#[command(name = "transcribe-worker")]
#[command(about = "Audio-transcription job dispatcher", long_about = None)]
pub struct Config {
	/// Queue endpoint.
	#[arg(long, env = "QUEUE_URL")]
	pub queue_url: String,

	/// Metrics/telemetry bucket for progress and heartbeats.
	#[arg(long, env = "S3_BUCKET")]
	pub s3_bucket: String,

	/// Cloud region.
	#[arg(long, env = "AWS_REGION")]
	pub region: String,

	/// Opaque model identifier passed to the adapter.
	#[arg(long, env = "TRANSCRIBE_MODEL", default_value = "large-v3")]
	pub model: String,

	/// Directory containing `ggml-<model>.bin` files.
	#[arg(long, env = "WHISPER_MODELS_DIR", default_value = "./models")]
	pub models_dir: std::path::PathBuf,

	/// Shutdown threshold, in minutes, after continuous queue emptiness.
	#[arg(long = "idle-timeout", env = "IDLE_TIMEOUT_MINUTES", default_value = "5")]
	pub idle_timeout_minutes: u64,

	/// Force CPU device, skipping the GPU probe.
	#[arg(long, env = "TRANSCRIBE_CPU_ONLY", default_value = "false")]
	pub cpu_only: bool,

	/// Number of whisper inference threads.
	#[arg(long, env = "WHISPER_THREADS", default_value = "4")]
	pub whisper_threads: i32,

	/// GPU batch size, used only when a GPU is selected.
	#[arg(long, env = "GPU_BATCH_SIZE", default_value = "8")]
	pub gpu_batch_size: usize,

	/// In-flight lease duration.
	#[arg(long, env = "VISIBILITY_TIMEOUT_SECONDS", default_value = "1800")]
	pub visibility_timeout_seconds: u32,

	/// Receive long-poll window.
	#[arg(long, env = "LONG_POLL_SECONDS", default_value = "20")]
	pub long_poll_seconds: u32,

	#[arg(long, env = "HEARTBEAT_INTERVAL_SECONDS", default_value = "30")]
	pub heartbeat_interval_seconds: u64,

	#[arg(long, env = "PROGRESS_INTERVAL_SECONDS", default_value = "10")]
	pub progress_interval_seconds: u64,

	#[arg(long, env = "MAX_TRANSIENT_RETRIES", default_value = "5")]
	pub max_transient_retries: u32,

	/// Scratch space for downloaded audio.
	#[arg(long, env = "TEMP_DIR")]
	pub temp_dir: Option<std::path::PathBuf>,

	/// Service name carried into OpenTelemetry resource attributes.
	#[arg(long, env = "OTEL_SERVICE_NAME", default_value = "transcribe-worker")]
	pub service_name: String,
}

impl Config {
	/// Eagerly validate every knob before any queue/object-store call is
	/// attempted. Invalid configuration is always `Fatal`.
	pub fn validate(&self) -> Result<(), WorkerError> {
		if self.queue_url.trim().is_empty() {
			return Err(WorkerError::Fatal("QUEUE_URL must not be empty".to_string()));
		}
		if self.s3_bucket.trim().is_empty() {
			return Err(WorkerError::Fatal("S3_BUCKET must not be empty".to_string()));
		}
		if self.region.trim().is_empty() {
			return Err(WorkerError::Fatal("AWS_REGION must not be empty".to_string()));
		}
		if self.model.trim().is_empty() {
			return Err(WorkerError::Fatal("TRANSCRIBE_MODEL must not be empty".to_string()));
		}
		if self.idle_timeout_minutes == 0 {
			return Err(WorkerError::Fatal("idle-timeout must be at least 1 minute".to_string()));
		}
		if self.whisper_threads < 1 {
			return Err(WorkerError::Fatal("WHISPER_THREADS must be at least 1".to_string()));
		}
		if self.visibility_timeout_seconds == 0 {
			return Err(WorkerError::Fatal("VISIBILITY_TIMEOUT_SECONDS must be greater than 0".to_string()));
		}
		if self.max_transient_retries == 0 {
			return Err(WorkerError::Fatal("MAX_TRANSIENT_RETRIES must be at least 1".to_string()));
		}
		Ok(())
	}

	#[must_use]
	pub fn idle_timeout_seconds(&self) -> u64 {
		self.idle_timeout_minutes * 60
	}

	/// The visibility-extension loop renews at a third of the lease, so a
	/// single missed tick never lets the lease lapse.
	#[must_use]
	pub fn visibility_extension_interval(&self) -> std::time::Duration {
		std::time::Duration::from_secs(u64::from(self.visibility_timeout_seconds) / 3)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base() -> Config {
		Config {
			queue_url: "https://queue.example/q".to_string(),
			s3_bucket: "metrics".to_string(),
			region: "us-east-1".to_string(),
			model: "large-v3".to_string(),
			models_dir: "./models".into(),
			idle_timeout_minutes: 5,
			cpu_only: false,
			whisper_threads: 4,
			gpu_batch_size: 8,
			visibility_timeout_seconds: 1800,
			long_poll_seconds: 20,
			heartbeat_interval_seconds: 30,
			progress_interval_seconds: 10,
			max_transient_retries: 5,
			temp_dir: None,
			service_name: "transcribe-worker".to_string(),
		}
	}

	#[test]
	fn valid_config_passes() {
		assert!(base().validate().is_ok());
	}

	#[test]
	fn empty_queue_url_is_fatal() {
		let config = Config { queue_url: String::new(), ..base() };
		assert!(matches!(config.validate(), Err(WorkerError::Fatal(_))));
	}

	#[test]
	fn zero_idle_timeout_is_fatal() {
		let config = Config { idle_timeout_minutes: 0, ..base() };
		assert!(matches!(config.validate(), Err(WorkerError::Fatal(_))));
	}

	#[test]
	fn visibility_extension_interval_is_a_third_of_the_lease() {
		let config = base();
		assert_eq!(config.visibility_extension_interval(), std::time::Duration::from_secs(600));
	}
}
