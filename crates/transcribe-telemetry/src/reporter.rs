use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use transcribe_store::ObjectStoreClient;
use transcribe_types::{HeartbeatRecord, ProgressRecord, WorkerStatus};

use crate::observability::WorkerMetrics;

/// Progress events queue at most this many updates before the dispatcher's
/// sends start getting dropped. In practice the reporter drains the
/// channel well inside a tick, so this is a backstop, not a steady-state
/// limit.
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

struct SharedHeartbeatState {
	status: Mutex<WorkerStatus>,
	current_job_id: Mutex<Option<String>>,
	idle_seconds: AtomicU64,
}

/// Cheap, cloneable handle the dispatcher uses to feed the reporter. Every
/// method here is non-blocking: telemetry must never stall job processing.
#[derive(Clone)]
pub struct ReporterHandle {
	tx: mpsc::Sender<ProgressRecord>,
	shared: Arc<SharedHeartbeatState>,
	metrics: WorkerMetrics,
}

impl ReporterHandle {
	/// Queue a progress update. Last-value-wins: if the channel is full the
	/// newest update is dropped and `progress_drops` increments — by the
	/// time 64 updates are backed up the reporter itself is the thing in
	/// trouble, not this job.
	pub fn report_progress(&self, record: ProgressRecord) {
		if self.tx.try_send(record).is_err() {
			self.metrics.progress_drops.add(1, &[]);
			warn!("progress channel full, dropping update");
		}
	}

	pub fn set_status(&self, status: WorkerStatus) {
		*self.shared.status.lock().expect("heartbeat state poisoned") = status;
	}

	pub fn set_current_job(&self, job_id: Option<String>) {
		*self.shared.current_job_id.lock().expect("heartbeat state poisoned") = job_id;
	}

	pub fn set_idle_seconds(&self, seconds: u64) {
		self.shared.idle_seconds.store(seconds, Ordering::Relaxed);
	}
}

/// Spawn the progress/heartbeat reporter as a cooperative task. Returns a
/// handle the dispatcher feeds and the task's `JoinHandle`; callers should
/// await the join handle during shutdown to be sure the final heartbeat
/// was written.
pub fn spawn(
	store: Arc<ObjectStoreClient>,
	metrics_bucket: String,
	worker_id: String,
	progress_interval: Duration,
	heartbeat_interval: Duration,
	metrics: WorkerMetrics,
	cancellation_token: CancellationToken,
) -> (ReporterHandle, tokio::task::JoinHandle<()>) {
	let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
	let shared = Arc::new(SharedHeartbeatState { status: Mutex::new(WorkerStatus::Loading), current_job_id: Mutex::new(None), idle_seconds: AtomicU64::new(0) });

	let handle = ReporterHandle { tx, shared: Arc::clone(&shared), metrics: metrics.clone() };

	let task = tokio::spawn(run(store, metrics_bucket, worker_id, progress_interval, heartbeat_interval, metrics, shared, rx, cancellation_token));

	(handle, task)
}

#[allow(clippy::too_many_arguments)]
async fn run(
	store: Arc<ObjectStoreClient>,
	metrics_bucket: String,
	worker_id: String,
	progress_interval: Duration,
	heartbeat_interval: Duration,
	metrics: WorkerMetrics,
	shared: Arc<SharedHeartbeatState>,
	mut rx: mpsc::Receiver<ProgressRecord>,
	cancellation_token: CancellationToken,
) {
	let mut progress_tick = tokio::time::interval(progress_interval);
	let mut heartbeat_tick = tokio::time::interval(heartbeat_interval);
	let mut latest_progress: Option<ProgressRecord> = None;

	loop {
		tokio::select! {
			biased;

			() = cancellation_token.cancelled() => {
				write_heartbeat(&store, &metrics_bucket, &worker_id, &shared, &metrics).await;
				debug!("reporter flushed final heartbeat and exited");
				return;
			}

			Some(record) = rx.recv() => {
				latest_progress = Some(record);
			}

			_ = progress_tick.tick() => {
				if let Some(record) = latest_progress.take() {
					write_progress(&store, &metrics_bucket, &record, &metrics).await;
				}
			}

			_ = heartbeat_tick.tick() => {
				write_heartbeat(&store, &metrics_bucket, &worker_id, &shared, &metrics).await;
			}
		}
	}
}

async fn write_progress(store: &ObjectStoreClient, metrics_bucket: &str, record: &ProgressRecord, metrics: &WorkerMetrics) {
	let uri = format!("s3://{metrics_bucket}/progress/{}", record.job_id);
	match store.put_json(&uri, record).await {
		Ok(()) => metrics.progress_writes.add(1, &[]),
		Err(e) => {
			metrics.reporter_write_failures.add(1, &[]);
			warn!(error = %e, job_id = %record.job_id, "failed to write progress record, continuing");
		}
	}
}

async fn write_heartbeat(store: &ObjectStoreClient, metrics_bucket: &str, worker_id: &str, shared: &SharedHeartbeatState, metrics: &WorkerMetrics) {
	let record = HeartbeatRecord {
		worker_id: worker_id.to_string(),
		status: *shared.status.lock().expect("heartbeat state poisoned"),
		current_job_id: shared.current_job_id.lock().expect("heartbeat state poisoned").clone(),
		idle_seconds: shared.idle_seconds.load(Ordering::Relaxed),
		updated_at: Utc::now(),
	};

	let uri = format!("s3://{metrics_bucket}/workers/{worker_id}/heartbeat");
	match store.put_json(&uri, &record).await {
		Ok(()) => metrics.heartbeat_writes.add(1, &[]),
		Err(e) => {
			metrics.reporter_write_failures.add(1, &[]);
			warn!(error = %e, worker_id, "failed to write heartbeat record, continuing");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use opentelemetry::global;
	use std::sync::Arc as StdArc;
	use tempfile::tempdir;
	use transcribe_store::testing::InMemoryStoreFactory;
	use transcribe_types::Phase;

	fn metrics() -> WorkerMetrics {
		WorkerMetrics::new(&global::meter("test"))
	}

	fn store() -> StdArc<ObjectStoreClient> {
		StdArc::new(ObjectStoreClient::new(StdArc::new(InMemoryStoreFactory::default()), tempdir().unwrap().into_path()))
	}

	#[tokio::test]
	async fn writes_heartbeat_on_first_tick_even_without_any_job() {
		let store = store();
		let cancellation_token = CancellationToken::new();
		let (_handle, task) = spawn(StdArc::clone(&store), "metrics".to_string(), "w-1".to_string(), Duration::from_millis(20), Duration::from_millis(20), metrics(), cancellation_token.clone());

		tokio::time::sleep(Duration::from_millis(60)).await;
		assert!(store.exists("s3://metrics/workers/w-1/heartbeat").await.unwrap());

		cancellation_token.cancel();
		let _ = task.await;
	}

	#[tokio::test]
	async fn coalesces_bursts_into_a_single_write_per_tick() {
		let store = store();
		let cancellation_token = CancellationToken::new();
		let (handle, task) = spawn(StdArc::clone(&store), "metrics".to_string(), "w-1".to_string(), Duration::from_millis(50), Duration::from_secs(10), metrics(), cancellation_token.clone());

		for pct in [10.0, 50.0, 90.0] {
			handle.report_progress(ProgressRecord { job_id: "j1".to_string(), worker_id: "w-1".to_string(), phase: Phase::Transcribing, percent_complete: pct, message: String::new(), updated_at: Utc::now() });
		}

		tokio::time::sleep(Duration::from_millis(80)).await;

		cancellation_token.cancel();
		let _ = task.await;

		// InMemory store overwrite means only the last value is ever visible,
		// but it must have been written at all (bursts weren't lost wholesale).
		assert!(store.exists("s3://metrics/progress/j1").await.unwrap());
	}

	#[tokio::test]
	async fn flushes_a_final_heartbeat_on_cancellation() {
		let store = store();
		let cancellation_token = CancellationToken::new();
		let (handle, task) = spawn(StdArc::clone(&store), "metrics".to_string(), "w-1".to_string(), Duration::from_secs(10), Duration::from_secs(10), metrics(), cancellation_token.clone());

		handle.set_status(WorkerStatus::ShuttingDown);
		cancellation_token.cancel();
		task.await.unwrap();

		assert!(store.exists("s3://metrics/workers/w-1/heartbeat").await.unwrap());
	}
}
