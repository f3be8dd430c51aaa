use chrono::{DateTime, Utc};

/// A single delivery of a queued job. `handle` is opaque and only
/// meaningful to whichever backend issued it; callers must never inspect
/// its shape.
#[derive(Debug, Clone)]
pub struct Message {
	pub body: Vec<u8>,
	pub handle: String,
	pub receive_count: u32,
	pub first_received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDepth {
	pub visible: u64,
	pub in_flight: u64,
}
