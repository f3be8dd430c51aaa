mod backoff;
mod config;
mod dispatcher;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use transcribe_engine::{select_device, DevicePreference, WhisperAdapter};
use transcribe_queue::SqsQueueClient;
use transcribe_store::{ObjectStoreClient, S3StoreFactory};
use transcribe_telemetry::{init_observability_with_fallback, spawn_reporter};

use config::Config;
use dispatcher::WorkerContext;

const SHUTDOWN_GRACE_PERIOD_MS: u64 = 200;

#[tokio::main]
async fn main() -> Result<()> {
	dotenvy::dotenv().ok();

	let config = Config::parse();
	if let Err(e) = config.validate() {
		eprintln!("invalid configuration: {e}");
		std::process::exit(1);
	}

	let (_meter_provider, metrics) = init_observability_with_fallback(&config.service_name).await;

	let worker_id = transcribe_types::worker_id::generate();
	info!(worker_id = %worker_id, model = %config.model, region = %config.region, "🎯 starting transcription worker");

	let temp_dir = config.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
	if let Err(e) = std::fs::create_dir_all(&temp_dir) {
		error!(error = %e, path = %temp_dir.display(), "failed to create temp directory");
		std::process::exit(1);
	}

	let store_factory = Arc::new(S3StoreFactory::new(config.region.clone()));
	let store = Arc::new(ObjectStoreClient::new(store_factory, temp_dir));
	let queue = Arc::new(SqsQueueClient::from_env(config.queue_url.clone()).await);

	let device_preference = if config.cpu_only { DevicePreference::ForceCpu } else { DevicePreference::Auto };
	let selected = select_device(device_preference, config.gpu_batch_size);
	info!(device = selected.device.as_str(), half_precision = selected.half_precision, "device selected");

	let mut adapter = WhisperAdapter::new(config.model.clone(), &config.models_dir, config.whisper_threads, config.gpu_batch_size);
	if let Err(e) = adapter.initialize(device_preference).await {
		error!(error = %e, "LOADING -> TERMINAL_FAIL: adapter initialization failed");
		std::process::exit(1);
	}
	if let Err(e) = adapter.load_model().await {
		error!(error = %e, "LOADING -> TERMINAL_FAIL: model load failed");
		std::process::exit(1);
	}
	info!("✅ model loaded, transitioning LOADING -> IDLE");
	let adapter: Arc<dyn transcribe_engine::TranscriptionAdapter> = Arc::new(adapter);

	let cancellation_token = CancellationToken::new();
	let (reporter, reporter_task) = spawn_reporter(
		Arc::clone(&store),
		config.s3_bucket.clone(),
		worker_id.clone(),
		std::time::Duration::from_secs(config.progress_interval_seconds),
		std::time::Duration::from_secs(config.heartbeat_interval_seconds),
		metrics.clone(),
		cancellation_token.clone(),
	);

	let ctx = Arc::new(WorkerContext::new(
		store,
		queue,
		adapter,
		reporter,
		metrics,
		worker_id,
		config.visibility_timeout_seconds,
		config.long_poll_seconds,
		config.idle_timeout_seconds(),
		config.max_transient_retries,
		config.visibility_extension_interval(),
		cancellation_token.clone(),
	));

	let visibility_timeout = std::time::Duration::from_secs(u64::from(config.visibility_timeout_seconds));
	let exit_code = run_with_shutdown(ctx, cancellation_token, visibility_timeout).await;
	let _ = reporter_task.await;
	std::process::exit(exit_code);
}

/// Mirrors the codebase's existing `run_with_shutdown`/`wait_for_shutdown_signal`
/// idiom, generalized so a signal doesn't simply drop the dispatcher: it
/// cancels the shared token, then waits up to the visibility-timeout window
/// for the current job to finish or be abandoned before forcing exit.
async fn run_with_shutdown(ctx: Arc<WorkerContext>, cancellation_token: CancellationToken, visibility_timeout: std::time::Duration) -> i32 {
	let mut dispatcher_task = tokio::spawn(dispatcher::run(ctx));

	let exit_code = tokio::select! {
		result = &mut dispatcher_task => result.unwrap_or(2),
		() = wait_for_shutdown_signal() => {
			info!("🛑 shutdown signal received (SIGTERM/SIGINT)");
			cancellation_token.cancel();

			match tokio::time::timeout(visibility_timeout, &mut dispatcher_task).await {
				Ok(Ok(exit_code)) => {
					info!("✅ dispatcher finished gracefully after cancellation");
					exit_code
				}
				Ok(Err(_)) => 2,
				Err(_) => {
					tokio::time::sleep(std::time::Duration::from_millis(SHUTDOWN_GRACE_PERIOD_MS)).await;
					warn!("⚠️ dispatcher did not finish within the visibility-timeout window, forcing exit");
					0
				}
			}
		}
	};

	// The dispatcher can also return on its own (idle timeout, or a deliberate
	// ResourceExhausted self-shutdown) without anyone cancelling the shared
	// token. Cancel it here unconditionally — it's idempotent — so the
	// reporter task always observes cancellation, flushes its final
	// heartbeat, and lets the caller's `reporter_task.await` return.
	cancellation_token.cancel();
	exit_code
}

async fn wait_for_shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler").recv().await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
