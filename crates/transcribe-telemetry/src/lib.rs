//! Structured logging, OpenTelemetry metrics, and the progress/heartbeat
//! reporter.

pub mod observability;
pub mod reporter;

pub use observability::{create_local_metrics, init_observability, init_observability_with_fallback, HeartbeatLogger, WorkerMetrics};
pub use reporter::{spawn as spawn_reporter, ReporterHandle};
