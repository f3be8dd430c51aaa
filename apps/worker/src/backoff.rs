use std::time::Duration;

/// Bounded exponential backoff for `Transient` errors: base 1s, factor 2,
/// cap 30s, a fixed number of attempts before the caller gives up and lets
/// the queue's redrive mechanism take over.
pub struct Backoff {
	base: Duration,
	cap: Duration,
	max_attempts: u32,
}

impl Backoff {
	#[must_use]
	pub fn new(max_attempts: u32) -> Self {
		Self { base: Duration::from_secs(1), cap: Duration::from_secs(30), max_attempts }
	}

	#[must_use]
	pub fn max_attempts(&self) -> u32 {
		self.max_attempts
	}

	/// Delay before the given attempt (1-indexed). Doubles each attempt,
	/// capped at 30s.
	#[must_use]
	pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
		let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
		self.base.saturating_mul(factor).min(self.cap)
	}

	pub async fn wait(&self, attempt: u32) {
		tokio::time::sleep(self.delay_for_attempt(attempt)).await;
	}
}
