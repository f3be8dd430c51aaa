//! Shared wire types for the transcription worker fleet: the job message,
//! the transcript artifact, progress/heartbeat telemetry documents, the
//! error taxonomy, and worker identity generation.
//!
//! Every other crate in this workspace depends on this one; it depends on
//! nothing else in the workspace.

pub mod error;
pub mod job;
pub mod telemetry;
pub mod transcript;
pub mod worker_id;

pub use error::{RetryPolicy, WorkerError, WorkerResult};
pub use job::Job;
pub use telemetry::{HeartbeatRecord, Phase, ProgressRecord, WorkerStatus};
pub use transcript::{Device, Segment, TranscriptArtifact, Transcription};
