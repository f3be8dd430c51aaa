use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single transcribed span. `start`/`end` are seconds with millisecond
/// resolution; segments are strictly ordered by `start` and non-overlapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
	pub start: f64,
	pub end: f64,
	pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Device {
	Cuda,
	Cpu,
}

impl Device {
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Cuda => "cuda",
			Self::Cpu => "cpu",
		}
	}
}

/// The full transcript of one job: ordered segments plus the concatenation
/// of their `text` fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transcription {
	pub segments: Vec<Segment>,
	pub text: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub language: Option<String>,
}

impl Transcription {
	/// Build a `Transcription` from segments, deriving `text` as the
	/// space-joined segment texts in order.
	#[must_use]
	pub fn from_segments(segments: Vec<Segment>, language: Option<String>) -> Self {
		let text = segments.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ");
		Self { segments, text, language }
	}
}

/// The document uploaded to `s3_output_path` on job completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptArtifact {
	pub job_id: String,
	pub s3_input_path: String,
	pub s3_output_path: String,
	pub processed_at: DateTime<Utc>,
	pub worker_id: String,
	pub transcript: Transcription,
	pub processing_time_seconds: f64,
	pub device: Device,
	pub model: String,
}
