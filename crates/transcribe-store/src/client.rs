use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::StoreError;
use crate::uri::S3Uri;

/// Builds a per-bucket `ObjectStore` handle. Real deployments hit S3;
/// tests run entirely against an in-process store (see
/// `InMemoryStoreFactory` in the `testing` module).
pub trait StoreFactory: Send + Sync {
	fn store_for_bucket(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StoreError>;
}

/// Thin wrapper over an `object_store::ObjectStore`, keyed by bucket, that
/// speaks in `s3://` URIs and local temp-file paths instead of `object_store`
/// primitives. Every job-processing step (download input, upload output,
/// write progress/heartbeat documents) goes through this.
pub struct ObjectStoreClient {
	factory: Arc<dyn StoreFactory>,
	cache: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
	temp_dir: PathBuf,
}

impl ObjectStoreClient {
	#[must_use]
	pub fn new(factory: Arc<dyn StoreFactory>, temp_dir: PathBuf) -> Self {
		Self { factory, cache: Mutex::new(HashMap::new()), temp_dir }
	}

	fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StoreError> {
		if let Some(store) = self.cache.lock().expect("store cache poisoned").get(bucket) {
			return Ok(Arc::clone(store));
		}
		let store = self.factory.store_for_bucket(bucket)?;
		self.cache.lock().expect("store cache poisoned").insert(bucket.to_string(), Arc::clone(&store));
		Ok(store)
	}

	/// Download the object at `uri` into a fresh file under the client's
	/// temp directory and return its local path. Callers are responsible
	/// for removing the file once they're done with it.
	#[instrument(skip(self), fields(uri))]
	pub async fn download(&self, uri: &str) -> Result<PathBuf, StoreError> {
		let parsed = S3Uri::parse(uri)?;
		let store = self.store_for(&parsed.bucket)?;
		let result = store.get(&parsed.object_path()).await?;
		let bytes = result.bytes().await?;

		let file_name = parsed.key.rsplit('/').next().unwrap_or("download.bin");
		let local_path = self.temp_dir.join(format!("{}-{file_name}", uuid::Uuid::new_v4()));
		tokio::fs::write(&local_path, &bytes).await?;
		debug!(bytes = bytes.len(), path = %local_path.display(), "downloaded object");
		Ok(local_path)
	}

	/// Upload a local file to `uri` with the given content type, overwriting
	/// any existing object.
	#[instrument(skip(self, local_path), fields(uri))]
	pub async fn upload(&self, local_path: &Path, uri: &str, content_type: &str) -> Result<(), StoreError> {
		let parsed = S3Uri::parse(uri)?;
		let store = self.store_for(&parsed.bucket)?;
		let bytes = tokio::fs::read(local_path).await?;
		self.put_with_content_type(&store, &parsed, bytes.into(), content_type).await
	}

	/// Serialize `doc` as JSON and upload it to `uri`. Used for the
	/// transcript artifact, progress records, and heartbeat records.
	pub async fn put_json<T: Serialize + Sync>(&self, uri: &str, doc: &T) -> Result<(), StoreError> {
		let parsed = S3Uri::parse(uri)?;
		let store = self.store_for(&parsed.bucket)?;
		let bytes = serde_json::to_vec(doc).map_err(|e| StoreError::Transient(format!("serializing json: {e}")))?;
		self.put_with_content_type(&store, &parsed, bytes.into(), "application/json").await
	}

	async fn put_with_content_type(&self, store: &Arc<dyn ObjectStore>, parsed: &S3Uri, payload: PutPayload, content_type: &str) -> Result<(), StoreError> {
		let attributes = Attributes::from_iter([(Attribute::ContentType, content_type.to_string().into())]);
		let opts = PutOptions { attributes, ..Default::default() };
		store.put_opts(&parsed.object_path(), payload, opts).await?;
		Ok(())
	}

	pub async fn exists(&self, uri: &str) -> Result<bool, StoreError> {
		let parsed = S3Uri::parse(uri)?;
		let store = self.store_for(&parsed.bucket)?;
		match store.head(&parsed.object_path()).await {
			Ok(_) => Ok(true),
			Err(object_store::Error::NotFound { .. }) => Ok(false),
			Err(e) => Err(e.into()),
		}
	}

	pub async fn delete(&self, uri: &str) -> Result<(), StoreError> {
		let parsed = S3Uri::parse(uri)?;
		let store = self.store_for(&parsed.bucket)?;
		match store.delete(&parsed.object_path()).await {
			Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}
