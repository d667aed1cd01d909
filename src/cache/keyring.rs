//! Cache encryption key management across the platform and caller-supplied tiers.

// crates.io
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};
// self
use crate::{
	_prelude::*,
	cache::envelope::EnvelopeError,
	platform::{KeyVaultError, PlatformKeyVault},
};

/// Byte length of cache encryption keys.
pub const KEY_LEN: usize = 32;

/// Identifies which master-key tier protected a stored envelope.
///
/// The tag is persisted inside every envelope so mixed-tier histories (written before and
/// after a caller key was configured) stay decryptable until rewritten.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyVersion {
	/// Key wrapped by the injected [`PlatformKeyVault`].
	Platform,
	/// Raw key supplied by the embedding application.
	CallerSupplied,
}
impl KeyVersion {
	/// Byte length of the persisted tag.
	pub const TAG_LEN: usize = 4;

	/// Returns the persisted envelope tag for the tier.
	pub const fn tag(self) -> &'static [u8; Self::TAG_LEN] {
		match self {
			Self::Platform => b"P001",
			Self::CallerSupplied => b"U001",
		}
	}

	/// Resolves a persisted tag back to its tier.
	pub fn from_tag(tag: &[u8]) -> Option<Self> {
		match tag {
			b"P001" => Some(Self::Platform),
			b"U001" => Some(Self::CallerSupplied),
			_ => None,
		}
	}
}
impl Display for KeyVersion {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(match self {
			Self::Platform => "platform",
			Self::CallerSupplied => "caller-supplied",
		})
	}
}

/// Symmetric key material, zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial([u8; KEY_LEN]);
impl KeyMaterial {
	/// Wraps caller-provided raw key bytes.
	pub fn new(bytes: [u8; KEY_LEN]) -> Self {
		Self(bytes)
	}

	/// Generates fresh random key material.
	pub fn random() -> Self {
		let mut bytes = [0_u8; KEY_LEN];

		rand::rng().fill_bytes(&mut bytes);

		Self(bytes)
	}

	pub(crate) fn bytes(&self) -> &[u8; KEY_LEN] {
		&self.0
	}
}
impl Debug for KeyMaterial {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("KeyMaterial").field(&"<redacted>").finish()
	}
}

/// Chooses and caches the key material protecting stored envelopes.
///
/// The active tier is decided once at construction: a configured caller key always wins, the
/// platform vault otherwise. Decryption selects material by the envelope's key-version tag
/// regardless of the active tier. One-time platform key generation runs inside a mutex so
/// concurrent first use cannot mint two competing key sets.
pub struct Keyring {
	vault: Arc<dyn PlatformKeyVault>,
	caller_key: Option<KeyMaterial>,
	platform_key: Mutex<Option<KeyMaterial>>,
}
impl Keyring {
	/// Creates a keyring over the vault, optionally pinning a caller-supplied key.
	pub fn new(vault: Arc<dyn PlatformKeyVault>, caller_key: Option<KeyMaterial>) -> Self {
		Self { vault, caller_key, platform_key: Mutex::new(None) }
	}

	/// Returns the tier new envelopes are sealed under.
	pub fn active_version(&self) -> KeyVersion {
		if self.caller_key.is_some() { KeyVersion::CallerSupplied } else { KeyVersion::Platform }
	}

	/// Returns the key material new envelopes are sealed with, creating it on first use.
	pub fn encryption_key(&self) -> Result<(KeyVersion, KeyMaterial), EnvelopeError> {
		match &self.caller_key {
			Some(key) => Ok((KeyVersion::CallerSupplied, key.clone())),
			None => Ok((KeyVersion::Platform, self.platform_key_or_create()?)),
		}
	}

	/// Returns the key material for a stored envelope's tier.
	///
	/// A caller-supplied tag with no configured caller key yields
	/// [`EnvelopeError::KeyUnavailable`]; the affected entries are unrecoverable and read as
	/// absent.
	pub fn decryption_key(&self, version: KeyVersion) -> Result<KeyMaterial, EnvelopeError> {
		match version {
			KeyVersion::CallerSupplied => self
				.caller_key
				.clone()
				.ok_or(EnvelopeError::KeyUnavailable { version }),
			KeyVersion::Platform => self.platform_key_or_create(),
		}
	}

	fn platform_key_or_create(&self) -> Result<KeyMaterial, EnvelopeError> {
		let mut guard = self.platform_key.lock();

		if let Some(key) = guard.as_ref() {
			return Ok(key.clone());
		}

		match self.vault.read_wrapped_key() {
			Ok(Some(blob)) => match self.vault.unwrap(&blob) {
				Ok(raw) => {
					if let Some(key) = key_from_raw(raw) {
						*guard = Some(key.clone());

						return Ok(key);
					}

					// Wrong-size material means the vault state no longer matches the blob.
					let _ = self.vault.reset();
				},
				Err(KeyVaultError::Integrity) => {
					// Keystore reset: old ciphertexts are orphaned; regenerate below.
					let _ = self.vault.reset();
				},
				Err(err @ KeyVaultError::Io { .. }) => return Err(err.into()),
			},
			Ok(None) => {},
			Err(err) => return Err(err.into()),
		}

		let key = KeyMaterial::random();
		let wrapped = self.vault.wrap(key.bytes())?;

		self.vault.write_wrapped_key(&wrapped)?;
		*guard = Some(key.clone());

		Ok(key)
	}
}
impl Debug for Keyring {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Keyring")
			.field("active_version", &self.active_version())
			.finish_non_exhaustive()
	}
}

fn key_from_raw(mut raw: Vec<u8>) -> Option<KeyMaterial> {
	let key = <[u8; KEY_LEN]>::try_from(raw.as_slice()).ok().map(KeyMaterial::new);

	raw.zeroize();

	key
}
