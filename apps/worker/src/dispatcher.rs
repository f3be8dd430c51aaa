use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use transcribe_engine::{ProgressCallback, TranscriptionAdapter};
use transcribe_queue::{Message, QueueClient};
use transcribe_store::ObjectStoreClient;
use transcribe_telemetry::{HeartbeatLogger, ReporterHandle, WorkerMetrics};
use transcribe_types::{Job, Phase, ProgressRecord, RetryPolicy, TranscriptArtifact, WorkerError, WorkerStatus};

use crate::backoff::Backoff;

/// Everything the job-processing algorithm needs, passed explicitly rather
/// than reached for as a module-level global.
pub struct WorkerContext {
	pub store: Arc<ObjectStoreClient>,
	pub queue: Arc<dyn QueueClient>,
	pub adapter: Arc<dyn TranscriptionAdapter>,
	pub reporter: ReporterHandle,
	pub metrics: WorkerMetrics,
	pub worker_id: String,
	pub visibility_timeout_seconds: u32,
	pub long_poll_seconds: u32,
	pub idle_timeout_seconds: u64,
	pub max_transient_retries: u32,
	pub visibility_extension_interval: Duration,
	pub cancellation_token: CancellationToken,
	jobs_completed: AtomicU64,
	jobs_failed: AtomicU64,
}

impl WorkerContext {
	#[must_use]
	pub fn new(
		store: Arc<ObjectStoreClient>,
		queue: Arc<dyn QueueClient>,
		adapter: Arc<dyn TranscriptionAdapter>,
		reporter: ReporterHandle,
		metrics: WorkerMetrics,
		worker_id: String,
		visibility_timeout_seconds: u32,
		long_poll_seconds: u32,
		idle_timeout_seconds: u64,
		max_transient_retries: u32,
		visibility_extension_interval: Duration,
		cancellation_token: CancellationToken,
	) -> Self {
		Self {
			store,
			queue,
			adapter,
			reporter,
			metrics,
			worker_id,
			visibility_timeout_seconds,
			long_poll_seconds,
			idle_timeout_seconds,
			max_transient_retries,
			visibility_extension_interval,
			cancellation_token,
			jobs_completed: AtomicU64::new(0),
			jobs_failed: AtomicU64::new(0),
		}
	}
}

/// Removes the downloaded audio file on every exit path from `run_job`,
/// regardless of success or failure.
struct TempFileGuard(std::path::PathBuf);

impl Drop for TempFileGuard {
	fn drop(&mut self) {
		if let Err(e) = std::fs::remove_file(&self.0) {
			if e.kind() != std::io::ErrorKind::NotFound {
				warn!(path = %self.0.display(), error = %e, "failed to remove temp audio file");
			}
		}
	}
}

/// Main dispatcher loop: `LOADING` has already happened by the time this
/// is called. Implements `IDLE/RECEIVING -> PROCESSING -> IDLE` plus idle-
/// timeout detection. Returns the process exit code: `0` for graceful
/// shutdown (idle timeout, signal, or a deliberate resource-exhaustion
/// self-shutdown), `2` for an unrecoverable runtime error.
pub async fn run(ctx: Arc<WorkerContext>) -> i32 {
	ctx.reporter.set_status(WorkerStatus::Idle);
	let mut last_job_finished_at = Instant::now();
	let mut heartbeat_logger = HeartbeatLogger::new(60);

	loop {
		if ctx.cancellation_token.is_cancelled() {
			info!("cancellation observed, leaving receive loop");
			break;
		}

		let idle_seconds = last_job_finished_at.elapsed().as_secs();
		ctx.reporter.set_idle_seconds(idle_seconds);
		heartbeat_logger.maybe_log(ctx.jobs_completed.load(Ordering::Relaxed), ctx.jobs_failed.load(Ordering::Relaxed), idle_seconds);

		if idle_seconds >= ctx.idle_timeout_seconds {
			info!(idle_seconds, "idle timeout reached, shutting down");
			break;
		}

		let received = tokio::select! {
			() = ctx.cancellation_token.cancelled() => {
				info!("cancellation observed during receive, leaving receive loop");
				break;
			}
			result = ctx.queue.receive(1, ctx.long_poll_seconds, ctx.visibility_timeout_seconds) => result,
		};

		let messages = match received {
			Ok(messages) => messages,
			Err(e) => {
				warn!(error = %e, "queue receive failed, backing off before retrying");
				tokio::time::sleep(Duration::from_secs(1)).await;
				continue;
			}
		};

		if messages.is_empty() {
			continue;
		}

		ctx.reporter.set_status(WorkerStatus::Processing);
		for message in messages {
			if let Some(exit_code) = process_message(&ctx, message).await {
				return exit_code;
			}
		}
		last_job_finished_at = Instant::now();
		ctx.reporter.set_idle_seconds(0);
		ctx.reporter.set_status(WorkerStatus::Idle);
	};

	ctx.reporter.set_status(WorkerStatus::ShuttingDown);
	0
}

/// Handle one received message end to end. Returns `Some(exit_code)` only
/// for the `Fatal` branch, which ends the process; every other branch
/// reports, acks or abandons, and returns control to the receive loop.
async fn process_message(ctx: &Arc<WorkerContext>, message: Message) -> Option<i32> {
	ctx.metrics.jobs_received.add(1, &[]);

	let job = match Job::from_message_body(&message.body) {
		Ok(job) => job,
		Err(e) => {
			let synthetic_id = uuid::Uuid::new_v4().to_string();
			warn!(job_id = %synthetic_id, error = %e, "poison message: body does not parse as a job");
			report_progress(ctx, &synthetic_id, Phase::Failed, 0.0, format!("BadInput: {e}"));
			ctx.metrics.jobs_poisoned.add(1, &[]);
			ctx.metrics.jobs_failed.add(1, &[]);
			ctx.jobs_failed.fetch_add(1, Ordering::Relaxed);
			if let Err(e) = ctx.queue.delete(&message.handle).await {
				warn!(error = %e, "failed to delete poison message");
			}
			return None;
		}
	};

	ctx.reporter.set_current_job(Some(job.job_id.clone()));
	info!(job_id = %job.job_id, s3_input_path = %job.s3_input_path, "job received");

	let extension_token = CancellationToken::new();
	let extension_task = spawn_visibility_extension(Arc::clone(ctx), message.handle.clone(), extension_token.clone());

	let outcome = run_job(ctx, &job).await;

	// Stop extending before acking/abandoning: extending an already-deleted
	// handle surfaces as `Expired` and would be logged as a spurious error.
	extension_token.cancel();
	let _ = extension_task.await;

	let exit_code = match outcome {
		Ok(artifact) => {
			report_progress(ctx, &job.job_id, Phase::Complete, 100.0, "transcription complete".to_string());
			if let Err(e) = ctx.queue.delete(&message.handle).await {
				warn!(job_id = %job.job_id, error = %e, "failed to delete completed message, it may be redelivered");
			}
			ctx.metrics.jobs_completed.add(1, &[]);
			ctx.jobs_completed.fetch_add(1, Ordering::Relaxed);
			info!(job_id = %job.job_id, device = artifact.device.as_str(), processing_time_seconds = artifact.processing_time_seconds, "job complete");
			None
		}
		Err(err) => handle_job_error(ctx, &job, &message, err).await,
	};

	ctx.reporter.set_current_job(None);
	exit_code
}

/// The job-processing algorithm: download, transcribe, upload. Temp-file
/// cleanup happens via `TempFileGuard` on every return path, success or
/// failure.
async fn run_job(ctx: &Arc<WorkerContext>, job: &Job) -> Result<TranscriptArtifact, WorkerError> {
	let started = Instant::now();

	report_progress(ctx, &job.job_id, Phase::Downloading, 0.0, "downloading audio".to_string());
	let download_started = Instant::now();
	let local_path = retry_transient(ctx, "download", || {
		let store = Arc::clone(&ctx.store);
		let uri = job.s3_input_path.clone();
		async move { store.download(&uri).await.map_err(WorkerError::from) }
	})
	.await?;
	ctx.metrics.download_latency.record(download_started.elapsed().as_secs_f64() * 1000.0, &[]);
	let _cleanup = TempFileGuard(local_path.clone());

	report_progress(ctx, &job.job_id, Phase::Transcribing, 0.0, "transcribing".to_string());
	let on_progress = make_progress_callback(ctx, &job.job_id);

	let transcribe_started = Instant::now();
	let transcription = ctx.adapter.transcribe(&local_path, on_progress).await.map_err(WorkerError::from)?;
	ctx.metrics.transcription_latency.record(transcribe_started.elapsed().as_secs_f64() * 1000.0, &[]);

	let artifact = TranscriptArtifact {
		job_id: job.job_id.clone(),
		s3_input_path: job.s3_input_path.clone(),
		s3_output_path: job.s3_output_path.clone(),
		processed_at: Utc::now(),
		worker_id: ctx.worker_id.clone(),
		transcript: transcription,
		processing_time_seconds: started.elapsed().as_secs_f64(),
		device: ctx.adapter.device(),
		model: ctx.adapter.model_name().to_string(),
	};

	report_progress(ctx, &job.job_id, Phase::Uploading, 0.0, "uploading transcript".to_string());
	let upload_started = Instant::now();
	retry_transient(ctx, "upload", || {
		let store = Arc::clone(&ctx.store);
		let uri = job.s3_output_path.clone();
		let artifact = artifact.clone();
		async move { store.put_json(&uri, &artifact).await.map_err(WorkerError::from) }
	})
	.await?;
	ctx.metrics.upload_latency.record(upload_started.elapsed().as_secs_f64() * 1000.0, &[]);

	Ok(artifact)
}

fn make_progress_callback(ctx: &Arc<WorkerContext>, job_id: &str) -> ProgressCallback {
	let reporter = ctx.reporter.clone();
	let job_id = job_id.to_string();
	let worker_id = ctx.worker_id.clone();
	Arc::new(move |phase, percent_complete, message| {
		reporter.report_progress(ProgressRecord { job_id: job_id.clone(), worker_id: worker_id.clone(), phase, percent_complete, message, updated_at: Utc::now() });
	})
}

fn report_progress(ctx: &Arc<WorkerContext>, job_id: &str, phase: Phase, percent_complete: f32, message: String) {
	ctx.reporter.report_progress(ProgressRecord { job_id: job_id.to_string(), worker_id: ctx.worker_id.clone(), phase, percent_complete, message, updated_at: Utc::now() });
}

/// Retry a `Transient`-classified operation with bounded exponential
/// backoff. Any other error kind is returned immediately.
async fn retry_transient<F, Fut, T>(ctx: &Arc<WorkerContext>, op_name: &'static str, mut f: F) -> Result<T, WorkerError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, WorkerError>>,
{
	let backoff = Backoff::new(ctx.max_transient_retries);
	let mut attempt = 1;
	loop {
		match f().await {
			Ok(value) => return Ok(value),
			Err(WorkerError::Transient(msg)) if attempt < backoff.max_attempts() => {
				warn!(op = op_name, attempt, error = %msg, "transient error, retrying with backoff");
				backoff.wait(attempt).await;
				attempt += 1;
			}
			Err(e) => return Err(e),
		}
	}
}

/// Visibility-extension loop: renews the lease every third of the
/// visibility-timeout window while the job is in-flight, cancelled by the
/// caller before the message is deleted.
fn spawn_visibility_extension(ctx: Arc<WorkerContext>, handle: String, token: CancellationToken) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		loop {
			tokio::select! {
				() = token.cancelled() => return,
				() = tokio::time::sleep(ctx.visibility_extension_interval) => {}
			}
			match ctx.queue.extend_visibility(&handle, ctx.visibility_timeout_seconds).await {
				Ok(()) => ctx.metrics.visibility_extensions.add(1, &[]),
				Err(e) => {
					ctx.metrics.visibility_extension_failures.add(1, &[]);
					warn!(error = %e, "visibility extension failed");
				}
			}
		}
	})
}

/// Dispatch on `WorkerError::policy()`. Returns `Some(exit_code)` only to
/// end the process (`Fatal`); every other policy reports and returns to
/// the receive loop.
async fn handle_job_error(ctx: &Arc<WorkerContext>, job: &Job, message: &Message, err: WorkerError) -> Option<i32> {
	let kind = err.kind_name();
	report_progress(ctx, &job.job_id, Phase::Failed, 0.0, format!("{kind}: {err}"));
	ctx.metrics.jobs_failed.add(1, &[]);
	ctx.jobs_failed.fetch_add(1, Ordering::Relaxed);

	match err.policy() {
		RetryPolicy::Poison => {
			error!(job_id = %job.job_id, kind, "poison job, deleting message");
			if let Err(e) = ctx.queue.delete(&message.handle).await {
				warn!(job_id = %job.job_id, error = %e, "failed to delete poison message");
			}
			ctx.metrics.jobs_poisoned.add(1, &[]);
			None
		}
		RetryPolicy::Abandon => {
			error!(job_id = %job.job_id, kind, "abandoning job, leaving it for redrive");
			ctx.metrics.jobs_abandoned.add(1, &[]);
			if matches!(err, WorkerError::ResourceExhausted(_)) {
				warn!(job_id = %job.job_id, "resource exhausted, shutting this worker down");
				ctx.cancellation_token.cancel();
			}
			None
		}
		RetryPolicy::RetryLocally => {
			// retry_transient already exhausted the backoff budget; a
			// Transient error reaching here means give up like any other abandon.
			error!(job_id = %job.job_id, kind, "transient retries exhausted, abandoning job");
			ctx.metrics.jobs_abandoned.add(1, &[]);
			None
		}
		RetryPolicy::ExitProcess => {
			error!(job_id = %job.job_id, kind, "fatal error mid-job, exiting process");
			Some(2)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::time::Duration;

	use opentelemetry::global;
	use tempfile::tempdir;

	use transcribe_engine::{DeterministicAdapter, ScriptedOutcome};
	use transcribe_queue::testing::InMemoryQueueClient;
	use transcribe_store::testing::InMemoryStoreFactory;
	use transcribe_telemetry::spawn_reporter;

	fn sample_job(job_id: &str) -> Job {
		Job {
			job_id: job_id.to_string(),
			s3_input_path: "s3://aud/a.mp3".to_string(),
			s3_output_path: "s3://aud/t.json".to_string(),
			estimated_duration_seconds: 5,
			priority: 1,
			retry_count: 0,
			submitted_at: Utc::now(),
		}
	}

	fn test_ctx(queue: Arc<dyn QueueClient>, adapter: Arc<dyn TranscriptionAdapter>, idle_timeout_seconds: u64) -> (Arc<WorkerContext>, Arc<ObjectStoreClient>) {
		let store = Arc::new(ObjectStoreClient::new(Arc::new(InMemoryStoreFactory::default()), tempdir().unwrap().into_path()));
		let metrics = WorkerMetrics::new(&global::meter("transcribe-worker-test"));
		let cancellation_token = CancellationToken::new();
		let (reporter, _reporter_task) =
			spawn_reporter(Arc::clone(&store), "metrics".to_string(), "w-test".to_string(), Duration::from_millis(50), Duration::from_millis(50), metrics.clone(), cancellation_token.clone());

		let ctx = Arc::new(WorkerContext::new(
			Arc::clone(&store),
			queue,
			adapter,
			reporter,
			metrics,
			"w-test".to_string(),
			30,
			1,
			idle_timeout_seconds,
			5,
			Duration::from_secs(10),
			cancellation_token,
		));
		(ctx, store)
	}

	/// A well-formed job is downloaded, transcribed, uploaded, and acked,
	/// and the worker exits cleanly on subsequent idleness.
	#[tokio::test]
	async fn s1_happy_path_completes_and_acks() {
		let queue = Arc::new(InMemoryQueueClient::new(3));
		queue.send(serde_json::to_vec(&sample_job("j1")).unwrap()).await.unwrap();

		let adapter: Arc<dyn TranscriptionAdapter> =
			Arc::new(DeterministicAdapter::new("det-v1", ScriptedOutcome::Success { segments: vec![(0.0, 1.0, "hello")], processing_delay: Duration::ZERO }));
		let (ctx, store) = test_ctx(Arc::clone(&queue) as Arc<dyn QueueClient>, adapter, 1);

		let src_dir = tempdir().unwrap();
		let src = src_dir.path().join("a.mp3");
		tokio::fs::write(&src, b"fake audio bytes").await.unwrap();
		store.upload(&src, "s3://aud/a.mp3", "audio/mpeg").await.unwrap();

		let exit_code = tokio::time::timeout(Duration::from_secs(5), run(ctx)).await.expect("worker should exit once idle");
		assert_eq!(exit_code, 0);

		assert!(store.exists("s3://aud/t.json").await.unwrap());
		let depth = queue.depth().await.unwrap();
		assert_eq!(depth.visible, 0);
		assert_eq!(depth.in_flight, 0);
	}

	/// Malformed bodies are deleted after one receive and never redelivered.
	#[tokio::test]
	async fn s2_poison_message_is_deleted_without_redelivery() {
		let queue = Arc::new(InMemoryQueueClient::new(3));
		queue.send(b"not-json".to_vec()).await.unwrap();

		let adapter: Arc<dyn TranscriptionAdapter> = Arc::new(DeterministicAdapter::new("det-v1", ScriptedOutcome::Success { segments: vec![], processing_delay: Duration::ZERO }));
		let (ctx, _store) = test_ctx(Arc::clone(&queue) as Arc<dyn QueueClient>, adapter, 1);

		let exit_code = tokio::time::timeout(Duration::from_secs(5), run(ctx)).await.expect("worker should exit once idle");
		assert_eq!(exit_code, 0);

		let depth = queue.depth().await.unwrap();
		assert_eq!(depth.visible, 0);
		assert_eq!(depth.in_flight, 0);
	}

	/// An empty queue leads to a clean exit once idle_seconds reaches the
	/// configured idle timeout.
	#[tokio::test]
	async fn s5_idle_shutdown_exits_with_code_zero() {
		let queue: Arc<dyn QueueClient> = Arc::new(InMemoryQueueClient::new(3));
		let adapter: Arc<dyn TranscriptionAdapter> = Arc::new(DeterministicAdapter::new("det-v1", ScriptedOutcome::Success { segments: vec![], processing_delay: Duration::ZERO }));
		let (ctx, _store) = test_ctx(queue, adapter, 1);

		let exit_code = tokio::time::timeout(Duration::from_secs(10), run(ctx)).await.expect("worker should exit due to idle timeout");
		assert_eq!(exit_code, 0);
	}

	/// A job whose adapter raises ResourceExhausted is left unacked for
	/// redrive and the worker cancels itself rather than keep polling.
	#[tokio::test]
	async fn resource_exhausted_abandons_the_message_and_self_shuts_down() {
		let queue = Arc::new(InMemoryQueueClient::new(3));
		queue.send(serde_json::to_vec(&sample_job("j-oom")).unwrap()).await.unwrap();

		let adapter: Arc<dyn TranscriptionAdapter> = Arc::new(DeterministicAdapter::new("det-v1", ScriptedOutcome::ResourceExhausted));
		let (ctx, _store) = test_ctx(Arc::clone(&queue) as Arc<dyn QueueClient>, adapter, 60);

		let exit_code = tokio::time::timeout(Duration::from_secs(5), run(ctx)).await.expect("worker should self-cancel after resource exhaustion");
		assert_eq!(exit_code, 0);

		// not deleted, still redeliverable after its visibility window lapses
		assert_eq!(queue.dead_letters().await.len(), 0);
	}

	/// retry_transient retries a Transient-classified operation with backoff
	/// and succeeds once the underlying call stops failing, observing no
	/// more than the configured attempt budget.
	#[tokio::test]
	async fn retry_transient_recovers_after_bounded_attempts() {
		let queue: Arc<dyn QueueClient> = Arc::new(InMemoryQueueClient::new(3));
		let adapter: Arc<dyn TranscriptionAdapter> = Arc::new(DeterministicAdapter::new("det-v1", ScriptedOutcome::Success { segments: vec![], processing_delay: Duration::ZERO }));
		let (ctx, _store) = test_ctx(queue, adapter, 60);

		let attempts = Arc::new(AtomicU32::new(0));
		let attempts_clone = Arc::clone(&attempts);
		let result = retry_transient(&ctx, "test-op", move || {
			let attempts = Arc::clone(&attempts_clone);
			async move {
				let count = attempts.fetch_add(1, Ordering::SeqCst) + 1;
				if count < 3 {
					Err(WorkerError::Transient(format!("attempt {count} failed")))
				} else {
					Ok(count)
				}
			}
		})
		.await;

		assert_eq!(result.unwrap(), 3);
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
	}

	/// After exhausting max_transient_retries attempts, the last error is
	/// surfaced so the caller can abandon the job rather than poison it.
	#[tokio::test]
	async fn retry_transient_gives_up_after_max_attempts() {
		let queue: Arc<dyn QueueClient> = Arc::new(InMemoryQueueClient::new(3));
		let adapter: Arc<dyn TranscriptionAdapter> = Arc::new(DeterministicAdapter::new("det-v1", ScriptedOutcome::Success { segments: vec![], processing_delay: Duration::ZERO }));
		let (mut ctx, _store) = test_ctx(queue, adapter, 60);
		Arc::get_mut(&mut ctx).unwrap().max_transient_retries = 2;

		let attempts = Arc::new(AtomicU32::new(0));
		let attempts_clone = Arc::clone(&attempts);
		let result: Result<(), WorkerError> = retry_transient(&ctx, "test-op", move || {
			let attempts = Arc::clone(&attempts_clone);
			async move {
				attempts.fetch_add(1, Ordering::SeqCst);
				Err(WorkerError::Transient("always fails".to_string()))
			}
		})
		.await;

		assert!(matches!(result, Err(WorkerError::Transient(_))));
		assert_eq!(attempts.load(Ordering::SeqCst), 2);
	}

	/// Deleting a poison message is independent of the adapter outcome: a
	/// BadInput/EngineError job is poisoned and never redelivered, while a
	/// ResourceExhausted/Expired job is abandoned for another worker.
	#[tokio::test]
	async fn handle_job_error_poisons_bad_input_but_abandons_resource_exhaustion() {
		let queue = Arc::new(InMemoryQueueClient::new(3));
		queue.send(b"placeholder".to_vec()).await.unwrap();
		let message = queue.receive(1, 0, 30).await.unwrap().into_iter().next().unwrap();

		let adapter: Arc<dyn TranscriptionAdapter> = Arc::new(DeterministicAdapter::new("det-v1", ScriptedOutcome::Success { segments: vec![], processing_delay: Duration::ZERO }));
		let (ctx, _store) = test_ctx(Arc::clone(&queue) as Arc<dyn QueueClient>, adapter, 60);

		let job = sample_job("j-bad");
		let exit_code = handle_job_error(&ctx, &job, &message, WorkerError::BadInput("corrupt wav".to_string())).await;
		assert_eq!(exit_code, None);
		assert_eq!(queue.depth().await.unwrap().in_flight, 0);
		assert!(!ctx.cancellation_token.is_cancelled());

		queue.send(b"placeholder2".to_vec()).await.unwrap();
		let message2 = queue.receive(1, 0, 30).await.unwrap().into_iter().next().unwrap();
		let exit_code2 = handle_job_error(&ctx, &job, &message2, WorkerError::ResourceExhausted("oom".to_string())).await;
		assert_eq!(exit_code2, None);
		assert!(ctx.cancellation_token.is_cancelled());
	}
}
