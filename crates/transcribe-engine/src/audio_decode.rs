use std::path::Path;

use crate::error::EngineError;

/// Decode a WAV file into mono `f32` samples, mixing down any extra
/// channels. Whisper expects 16kHz mono; a file recorded at a different
/// rate is accepted but produces lower-quality output, matching the
/// standalone `simple_wav` reference tool this is ported from.
pub fn decode_wav_mono(path: &Path) -> Result<Vec<f32>, EngineError> {
	let mut reader = hound::WavReader::open(path).map_err(|e| EngineError::BadInput(format!("opening {}: {e}", path.display())))?;
	let spec = reader.spec();

	let samples: Result<Vec<f32>, hound::Error> = match spec.bits_per_sample {
		16 => reader.samples::<i16>().map(|s| s.map(|v| f32::from(v) / 32768.0)).collect(),
		32 if spec.sample_format == hound::SampleFormat::Int => reader.samples::<i32>().map(|s| s.map(|v| v as f32 / 2_147_483_648.0)).collect(),
		32 => reader.samples::<f32>().collect(),
		other => return Err(EngineError::BadInput(format!("unsupported bit depth: {other}"))),
	};
	let mut samples = samples.map_err(|e| EngineError::BadInput(format!("reading samples from {}: {e}", path.display())))?;

	if spec.channels > 1 {
		let channels = spec.channels as usize;
		samples = samples.chunks_exact(channels).map(|frame| frame.iter().sum::<f32>() / channels as f32).collect();
	}

	if samples.is_empty() {
		return Err(EngineError::BadInput(format!("{} contains no audio samples", path.display())));
	}

	Ok(samples)
}
