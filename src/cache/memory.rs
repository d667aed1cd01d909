//! Thread-safe in-memory [`TokenCacheStore`] for local development and tests.

// self
use crate::{
	_prelude::*,
	cache::{CacheKey, StoreFuture, TokenCacheItem, TokenCacheStore},
};

type StoreMap = Arc<RwLock<HashMap<String, TokenCacheItem>>>;

/// Plaintext in-process store; entries never leave memory, so no envelope layer is applied.
#[derive(Clone, Debug, Default)]
pub struct MemoryCacheStore(StoreMap);
impl MemoryCacheStore {
	/// Returns the number of stored entries.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no entries are stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Fetches an entry synchronously; test helper mirroring [`TokenCacheStore::get`].
	pub fn get_now(&self, key: &CacheKey) -> Option<TokenCacheItem> {
		self.0.read().get(&key.render()).cloned()
	}
}
impl TokenCacheStore for MemoryCacheStore {
	fn put<'a>(&'a self, key: &'a CacheKey, item: TokenCacheItem) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = key.render();

		Box::pin(async move {
			map.write().insert(key, item);

			Ok(())
		})
	}

	fn get<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<TokenCacheItem>> {
		let map = self.0.clone();
		let key = key.render();

		Box::pin(async move { Ok(map.read().get(&key).cloned()) })
	}

	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = key.render();

		Box::pin(async move {
			map.write().remove(&key);

			Ok(())
		})
	}

	fn all(&self) -> StoreFuture<'_, Vec<TokenCacheItem>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().values().cloned().collect()) })
	}

	fn remove_all(&self) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().clear();

			Ok(())
		})
	}
}
