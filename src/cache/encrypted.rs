//! Encrypted file-backed [`TokenCacheStore`].

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	cache::{
		CacheKey, StoreError, StoreFuture, TokenCacheItem, TokenCacheStore, envelope,
		envelope::EnvelopeError, keyring::Keyring,
	},
	platform::KeyVaultError,
};

/// Persists one envelope per entry in a JSON map, rewritten atomically after each mutation.
///
/// Decryption happens lazily on read. Any entry whose envelope fails parsing, MAC
/// verification, or decryption is evicted on the spot and reported as a miss; corruption never
/// crosses the store boundary as an error. The only exception is a key-vault I/O failure,
/// which reads as a miss without evicting so a transient vault outage cannot wipe the cache.
pub struct EncryptedFileStore {
	path: PathBuf,
	keyring: Arc<Keyring>,
	inner: Arc<RwLock<HashMap<String, String>>>,
}
impl EncryptedFileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing envelopes.
	pub fn open(path: impl Into<PathBuf>, keyring: Arc<Keyring>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = if path.exists() { Self::load_snapshot(&path)? } else { HashMap::new() };

		Ok(Self { path, keyring, inner: Arc::new(RwLock::new(snapshot)) })
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<String, String>, StoreError> {
		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;
		let entries: Vec<(String, String)> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		Ok(entries.into_iter().collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &HashMap<String, String>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let snapshot: Vec<_> = contents.iter().collect();
		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn decrypt_item(&self, blob: &str) -> Result<TokenCacheItem, EnvelopeError> {
		let plaintext = envelope::open(&self.keyring, blob)?;

		serde_json::from_slice(&plaintext)
			.map_err(|_| EnvelopeError::Malformed { reason: "entry payload is not valid JSON" })
	}

	/// Removes a corrupt entry. Persistence failures here are swallowed: the entry is already
	/// gone from the in-memory view and the next successful mutation rewrites the file.
	fn evict(&self, key: &str) {
		let mut guard = self.inner.write();

		if guard.remove(key).is_some() {
			let _ = self.persist_locked(&guard);
		}

		#[cfg(feature = "tracing")]
		tracing::warn!(
			code = crate::error::ErrorCode::CacheIntegrityFailure.as_str(),
			"Evicted a cache entry that failed envelope verification.",
		);
	}

	fn read_through(&self, key: &str) -> Option<TokenCacheItem> {
		let blob = self.inner.read().get(key).cloned()?;

		match self.decrypt_item(&blob) {
			Ok(item) => Some(item),
			Err(EnvelopeError::KeyVault(KeyVaultError::Io { .. })) => None,
			Err(_) => {
				self.evict(key);

				None
			},
		}
	}
}
impl TokenCacheStore for EncryptedFileStore {
	fn put<'a>(&'a self, key: &'a CacheKey, item: TokenCacheItem) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let plaintext = serde_json::to_vec(&item).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize cache entry: {e}"),
			})?;
			let sealed =
				envelope::seal(&self.keyring, &plaintext).map_err(|e| StoreError::Backend {
					message: format!("Failed to seal cache entry: {e}"),
				})?;
			let mut guard = self.inner.write();

			guard.insert(key.render(), sealed);
			self.persist_locked(&guard)?;

			Ok(())
		})
	}

	fn get<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<TokenCacheItem>> {
		Box::pin(async move { Ok(self.read_through(&key.render())) })
	}

	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			if guard.remove(&key.render()).is_some() {
				self.persist_locked(&guard)?;
			}

			Ok(())
		})
	}

	fn all(&self) -> StoreFuture<'_, Vec<TokenCacheItem>> {
		Box::pin(async move {
			let snapshot: Vec<(String, String)> =
				self.inner.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
			let mut items = Vec::with_capacity(snapshot.len());

			for (key, blob) in snapshot {
				match self.decrypt_item(&blob) {
					Ok(item) => items.push(item),
					Err(EnvelopeError::KeyVault(KeyVaultError::Io { .. })) => {},
					Err(_) => self.evict(&key),
				}
			}

			Ok(items)
		})
	}

	fn remove_all(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			guard.clear();
			self.persist_locked(&guard)?;

			Ok(())
		})
	}
}
impl Debug for EncryptedFileStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EncryptedFileStore")
			.field("path", &self.path)
			.field("keyring", &self.keyring)
			.finish_non_exhaustive()
	}
}
