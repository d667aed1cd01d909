//! Token cache: key model, entry model, envelope encryption, and store implementations.

pub mod envelope;
pub mod item;
pub mod key;
pub mod keyring;

pub mod encrypted;
pub mod memory;

pub(crate) mod accessor;

pub use encrypted::EncryptedFileStore;
pub use envelope::*;
pub use item::*;
pub use key::*;
pub use keyring::*;
pub use memory::MemoryCacheStore;

// self
use crate::_prelude::*;

/// Future type returned by [`TokenCacheStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for cached token entries.
///
/// Values are addressed by [`CacheKey`]. Implementations must keep same-key writes serialized
/// and must never surface a torn entry to readers; reads and writes touching different keys may
/// proceed concurrently. Corrupt entries are an implementation concern: a store that cannot
/// produce a valid [`TokenCacheItem`] for a key evicts it and reports a miss instead of
/// failing the read.
pub trait TokenCacheStore
where
	Self: Send + Sync,
{
	/// Persists or replaces the entry stored under `key`.
	fn put<'a>(&'a self, key: &'a CacheKey, item: TokenCacheItem) -> StoreFuture<'a, ()>;

	/// Fetches the entry stored under `key`, if present and readable.
	fn get<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<TokenCacheItem>>;

	/// Removes the entry stored under `key`; removing an absent key is a no-op.
	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, ()>;

	/// Returns a snapshot of every readable entry.
	///
	/// The snapshot is finite and re-enumerates the underlying store on every call, so
	/// repeated invocations observe concurrent mutations.
	fn all(&self) -> StoreFuture<'_, Vec<TokenCacheItem>>;

	/// Removes every entry; used by sign-out flows.
	fn remove_all(&self) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`TokenCacheStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
