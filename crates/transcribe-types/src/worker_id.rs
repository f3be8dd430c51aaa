use uuid::Uuid;

/// Generate a fresh, process-lifetime worker identity: a host identifier
/// plus a random suffix. Identity is ephemeral — nothing is persisted
/// across restarts.
#[must_use]
pub fn generate() -> String {
	let host = hostname::get().ok().and_then(|h| h.into_string().ok()).unwrap_or_else(|| "unknown-host".to_string());
	let suffix = Uuid::new_v4().simple().to_string();
	format!("{host}-{}", &suffix[..8])
}
