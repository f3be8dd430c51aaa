use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::ObjectStore;

use crate::client::StoreFactory;
use crate::error::StoreError;

/// Builds a real `AmazonS3` store per bucket, sharing one region and relying
/// on the default AWS credential provider chain (environment, instance
/// profile, or container credentials) via `object_store`'s own env lookup.
pub struct S3StoreFactory {
	region: String,
}

impl S3StoreFactory {
	#[must_use]
	pub fn new(region: String) -> Self {
		Self { region }
	}
}

impl StoreFactory for S3StoreFactory {
	fn store_for_bucket(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StoreError> {
		let store = AmazonS3Builder::from_env()
			.with_bucket_name(bucket)
			.with_region(&self.region)
			.build()
			.map_err(|e| StoreError::Transient(format!("building s3 client for bucket {bucket}: {e}")))?;
		Ok(Arc::new(store))
	}
}
