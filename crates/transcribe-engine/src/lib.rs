//! Transcription adapter: turns a local audio file into a transcript,
//! polymorphic over a GPU-optimized implementation, a CPU fallback, and a
//! deterministic test double that all share the `TranscriptionAdapter`
//! trait.

pub mod adapter;
pub mod audio_decode;
pub mod deterministic;
pub mod device;
pub mod error;
pub mod whisper_adapter;

pub use adapter::{ProgressCallback, TranscriptionAdapter};
pub use deterministic::{DeterministicAdapter, ScriptedOutcome};
pub use device::{select_device, probe_cuda, DeviceConfig, DevicePreference};
pub use error::EngineError;
pub use whisper_adapter::WhisperAdapter;
