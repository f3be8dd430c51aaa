use object_store::path::Path as ObjectPath;

/// A parsed `s3://bucket/key` reference. Every path the worker touches
/// (job input, job output, progress/heartbeat documents) is addressed
/// this way; there is no support for non-S3 schemes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Uri {
	pub bucket: String,
	pub key: String,
}

impl S3Uri {
	pub fn parse(uri: &str) -> Result<Self, UriError> {
		let rest = uri.strip_prefix("s3://").ok_or_else(|| UriError::BadScheme(uri.to_string()))?;
		let (bucket, key) = rest.split_once('/').ok_or_else(|| UriError::MissingKey(uri.to_string()))?;
		if bucket.is_empty() {
			return Err(UriError::MissingBucket(uri.to_string()));
		}
		if key.is_empty() {
			return Err(UriError::MissingKey(uri.to_string()));
		}
		Ok(Self { bucket: bucket.to_string(), key: key.to_string() })
	}

	#[must_use]
	pub fn object_path(&self) -> ObjectPath {
		ObjectPath::from(self.key.as_str())
	}
}

#[derive(Debug, thiserror::Error)]
pub enum UriError {
	#[error("not an s3:// uri: {0}")]
	BadScheme(String),
	#[error("s3 uri missing bucket: {0}")]
	MissingBucket(String),
	#[error("s3 uri missing key: {0}")]
	MissingKey(String),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_bucket_and_nested_key() {
		let uri = S3Uri::parse("s3://transcripts/jobs/2026/07/abc.json").unwrap();
		assert_eq!(uri.bucket, "transcripts");
		assert_eq!(uri.key, "jobs/2026/07/abc.json");
	}

	#[test]
	fn rejects_non_s3_scheme() {
		assert!(matches!(S3Uri::parse("https://example.com/x"), Err(UriError::BadScheme(_))));
	}

	#[test]
	fn rejects_missing_key() {
		assert!(matches!(S3Uri::parse("s3://bucket-only"), Err(UriError::MissingKey(_))));
	}

	#[test]
	fn rejects_empty_bucket() {
		assert!(matches!(S3Uri::parse("s3:///key"), Err(UriError::MissingBucket(_))));
	}
}
