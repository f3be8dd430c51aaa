use std::sync::Arc;

use object_store::memory::InMemory;
use object_store::ObjectStore;

use crate::client::StoreFactory;
use crate::error::StoreError;

/// A `StoreFactory` backed by a single shared `InMemory` store. Buckets are
/// modeled as a key prefix rather than separate stores, which is enough to
/// exercise every operation the client exposes without a network call.
#[derive(Default)]
pub struct InMemoryStoreFactory {
	store: std::sync::OnceLock<Arc<InMemory>>,
}

impl StoreFactory for InMemoryStoreFactory {
	fn store_for_bucket(&self, _bucket: &str) -> Result<Arc<dyn ObjectStore>, StoreError> {
		let store = self.store.get_or_init(|| Arc::new(InMemory::new()));
		Ok(Arc::clone(store) as Arc<dyn ObjectStore>)
	}
}
