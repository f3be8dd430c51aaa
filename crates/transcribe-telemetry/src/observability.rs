use anyhow::Result;
use opentelemetry::trace::TracerProvider;
use opentelemetry::{
	global,
	metrics::{Counter, Histogram, Meter},
	KeyValue,
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
	metrics::SdkMeterProvider,
	runtime,
	trace::{Config, RandomIdGenerator, Sampler},
	Resource,
};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Counters and histograms for the worker dispatcher, the object-store
/// client, the queue client, and the progress/heartbeat reporter. One
/// struct shared across the process, mirroring the transcriber service's
/// own `TranscriberMetrics`. Every field here is fed from somewhere in
/// `apps/worker` or `transcribe-telemetry::reporter` — an instrument with
/// nothing recording into it doesn't belong here.
#[derive(Clone)]
pub struct WorkerMetrics {
	pub jobs_received: Counter<u64>,
	pub jobs_completed: Counter<u64>,
	pub jobs_failed: Counter<u64>,
	pub jobs_poisoned: Counter<u64>,
	pub jobs_abandoned: Counter<u64>,

	pub download_latency: Histogram<f64>,
	pub upload_latency: Histogram<f64>,
	pub transcription_latency: Histogram<f64>,

	pub visibility_extensions: Counter<u64>,
	pub visibility_extension_failures: Counter<u64>,

	pub progress_writes: Counter<u64>,
	pub progress_drops: Counter<u64>,
	pub heartbeat_writes: Counter<u64>,
	pub reporter_write_failures: Counter<u64>,
}

impl WorkerMetrics {
	#[must_use]
	pub fn new(meter: &Meter) -> Self {
		Self {
			jobs_received: meter.u64_counter("worker.jobs.received").with_description("Total jobs dequeued").init(),
			jobs_completed: meter.u64_counter("worker.jobs.completed").with_description("Total jobs transcribed and uploaded").init(),
			jobs_failed: meter.u64_counter("worker.jobs.failed").with_description("Total jobs that ended in a failed progress record").init(),
			jobs_poisoned: meter.u64_counter("worker.jobs.poisoned").with_description("Total jobs deleted as unrecoverable (BadInput/EngineError)").init(),
			jobs_abandoned: meter.u64_counter("worker.jobs.abandoned").with_description("Total jobs left for redrive (ResourceExhausted/Expired/Transient exhaustion)").init(),

			download_latency: meter.f64_histogram("worker.download.latency").with_description("Object-store download latency (ms)").init(),
			upload_latency: meter.f64_histogram("worker.upload.latency").with_description("Object-store upload latency (ms)").init(),
			transcription_latency: meter.f64_histogram("worker.transcription.latency").with_description("Transcription latency (ms)").init(),

			visibility_extensions: meter.u64_counter("worker.visibility.extensions").with_description("Total visibility-timeout extensions issued").init(),
			visibility_extension_failures: meter.u64_counter("worker.visibility.extension_failures").with_description("Total visibility-timeout extensions that failed").init(),

			progress_writes: meter.u64_counter("worker.telemetry.progress_writes").with_description("Total progress records written").init(),
			progress_drops: meter.u64_counter("worker.telemetry.progress_drops").with_description("Total progress events coalesced away without being written").init(),
			heartbeat_writes: meter.u64_counter("worker.telemetry.heartbeat_writes").with_description("Total heartbeat records written").init(),
			reporter_write_failures: meter.u64_counter("worker.telemetry.write_failures").with_description("Total best-effort telemetry writes that failed").init(),
		}
	}
}

/// Initialize OpenTelemetry tracing + metrics export over OTLP, matching
/// the transcriber service's own pipeline setup.
pub fn init_observability(service_name: &str) -> Result<(SdkMeterProvider, WorkerMetrics)> {
	let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|_| "http://localhost:4317".to_string());

	info!(service = service_name, endpoint = %otlp_endpoint, "initializing opentelemetry");

	let resource = Resource::new(vec![KeyValue::new("service.name", service_name.to_string()), KeyValue::new("service.version", env!("CARGO_PKG_VERSION").to_string())]);

	let tracer = opentelemetry_otlp::new_pipeline()
		.tracing()
		.with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(&otlp_endpoint))
		.with_trace_config(Config::default().with_sampler(Sampler::AlwaysOn).with_id_generator(RandomIdGenerator::default()).with_resource(resource.clone()))
		.install_batch(runtime::Tokio)
		.map_err(|e| anyhow::anyhow!("failed to initialize tracer: {e}"))?;
	let tracer = tracer.tracer("transcribe-worker");

	let meter_provider = opentelemetry_otlp::new_pipeline()
		.metrics(runtime::Tokio)
		.with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(&otlp_endpoint))
		.with_resource(resource)
		.with_period(Duration::from_secs(10))
		.build()
		.map_err(|e| anyhow::anyhow!("failed to initialize metrics: {e}"))?;

	global::set_meter_provider(meter_provider.clone());
	let meter = global::meter(service_name.to_owned());
	let metrics = WorkerMetrics::new(&meter);

	let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,transcribe_worker=debug"));

	tracing_subscriber::registry().with(env_filter).with(telemetry_layer).with(tracing_subscriber::fmt::layer().with_target(true)).init();

	info!("opentelemetry initialized");
	Ok((meter_provider, metrics))
}

/// Local-only metrics, used when the OTLP collector is unreachable at
/// startup. The worker still logs and still tracks counters, it just
/// doesn't export them anywhere.
pub fn create_local_metrics() -> WorkerMetrics {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,transcribe_worker=debug"));
	tracing_subscriber::registry().with(env_filter).with(tracing_subscriber::fmt::layer().with_target(true)).init();

	let meter = global::meter("transcribe-worker-local");
	WorkerMetrics::new(&meter)
}

/// Try the full OTLP pipeline, falling back to local-only metrics (and
/// still initializing the `tracing` subscriber) if the collector can't be
/// reached. The worker must never refuse to start because telemetry
/// infrastructure is down.
pub async fn init_observability_with_fallback(service_name: &str) -> (Option<SdkMeterProvider>, WorkerMetrics) {
	match init_observability(service_name) {
		Ok((provider, metrics)) => (Some(provider), metrics),
		Err(e) => {
			warn!(error = %e, "OTLP observability failed to initialize, falling back to local metrics only");
			(None, create_local_metrics())
		}
	}
}

/// Periodic heartbeat *log line*, distinct from the object-store heartbeat
/// record written by the reporter — this one just proves the process is
/// alive in whatever log aggregator is watching stdout.
pub struct HeartbeatLogger {
	last_logged: std::time::Instant,
	interval: Duration,
}

impl HeartbeatLogger {
	#[must_use]
	pub fn new(interval_secs: u64) -> Self {
		Self { last_logged: std::time::Instant::now(), interval: Duration::from_secs(interval_secs) }
	}

	/// Log a throughput summary if `interval` has elapsed since the last
	/// log line. Returns whether it logged.
	pub fn maybe_log(&mut self, jobs_completed: u64, jobs_failed: u64, idle_seconds: u64) -> bool {
		if self.last_logged.elapsed() >= self.interval {
			info!(jobs_completed, jobs_failed, idle_seconds, "heartbeat");
			self.last_logged = std::time::Instant::now();
			true
		} else {
			false
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn heartbeat_logger_only_fires_after_interval_elapses() {
		let mut heartbeat = HeartbeatLogger::new(1);
		assert!(!heartbeat.maybe_log(0, 0, 0));
		std::thread::sleep(Duration::from_secs(1));
		assert!(heartbeat.maybe_log(0, 0, 0));
	}
}
