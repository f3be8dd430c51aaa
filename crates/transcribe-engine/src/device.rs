use transcribe_types::Device;

/// What the operator asked for, independent of what's actually available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePreference {
	/// `--cpu-only`: never attempt a GPU probe.
	ForceCpu,
	/// Default: probe for a usable accelerator, degrade to CPU on failure.
	Auto,
}

/// Precision/batch knobs that follow from which device was selected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceConfig {
	pub device: Device,
	/// Half precision on GPU, single precision on CPU.
	pub half_precision: bool,
	pub batch_size: usize,
}

impl DeviceConfig {
	#[must_use]
	pub fn cpu() -> Self {
		Self { device: Device::Cpu, half_precision: false, batch_size: 1 }
	}

	#[must_use]
	pub fn gpu(batch_size: usize) -> Self {
		Self { device: Device::Cuda, half_precision: true, batch_size }
	}
}

/// Probes for a usable CUDA accelerator. Checked, in order: an explicit
/// `CUDA_VISIBLE_DEVICES` assignment and the presence of an `/dev/nvidia*`
/// device node — the same two signals container runtimes use to decide
/// whether a GPU was passed through.
#[must_use]
pub fn probe_cuda() -> bool {
	let env_says_yes = std::env::var("CUDA_VISIBLE_DEVICES").map(|v| !v.trim().is_empty()).unwrap_or(false);
	let device_node_present = std::path::Path::new("/dev/nvidia0").exists();
	env_says_yes || device_node_present
}

/// Select a device configuration per the startup policy: forced CPU
/// first, then a GPU probe, then CPU fallback.
#[must_use]
pub fn select_device(preference: DevicePreference, gpu_batch_size: usize) -> DeviceConfig {
	match preference {
		DevicePreference::ForceCpu => DeviceConfig::cpu(),
		DevicePreference::Auto => {
			if probe_cuda() {
				DeviceConfig::gpu(gpu_batch_size)
			} else {
				DeviceConfig::cpu()
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn forced_cpu_never_probes() {
		let cfg = select_device(DevicePreference::ForceCpu, 8);
		assert_eq!(cfg.device, Device::Cpu);
		assert!(!cfg.half_precision);
	}

	#[test]
	fn cpu_config_is_single_precision_batch_one() {
		let cfg = DeviceConfig::cpu();
		assert_eq!(cfg.batch_size, 1);
		assert!(!cfg.half_precision);
	}

	#[test]
	fn gpu_config_is_half_precision_with_configured_batch() {
		let cfg = DeviceConfig::gpu(16);
		assert_eq!(cfg.device, Device::Cuda);
		assert!(cfg.half_precision);
		assert_eq!(cfg.batch_size, 16);
	}
}
