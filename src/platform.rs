//! Platform collaborator contracts injected into the engine.
//!
//! The engine never talks to an operating system directly. Hosts inject a [`Clock`], a
//! [`PlatformKeyVault`] guarding cache key material, and optionally a [`DeviceCertResponder`]
//! answering device-certificate challenges. Each contract is intentionally narrow so ports to
//! new platforms only implement what the silent chain actually consumes.

// self
use crate::_prelude::*;

/// Future returned by [`Clock::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

/// Time source used for expiry math and retry pacing.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current UTC instant.
	fn now(&self) -> OffsetDateTime;

	/// Suspends the calling task for the provided duration.
	fn sleep(&self, duration: Duration) -> SleepFuture<'_>;
}

/// Wall-clock implementation backed by the tokio timer.
#[cfg(feature = "reqwest")]
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
#[cfg(feature = "reqwest")]
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}

	fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
		let delay = duration.unsigned_abs();

		Box::pin(async move {
			if !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}
		})
	}
}

/// Error type produced by [`PlatformKeyVault`] implementations.
///
/// Integrity failures are reported distinctly from I/O failures so the keyring can tell a
/// wiped keystore apart from a transient storage problem.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum KeyVaultError {
	/// Reading or writing the wrapped key blob failed.
	#[error("Key vault I/O failure: {message}.")]
	Io {
		/// Human-readable error payload.
		message: String,
	},
	/// The wrapped key blob exists but cannot be unwrapped with the current vault state.
	#[error("Wrapped key blob failed verification against the current vault state.")]
	Integrity,
}

/// Vault guarding the platform-tier cache encryption key.
///
/// Implementations wrap the symmetric cache key with platform-secured material (a hardware
/// keystore keypair on mobile targets) and persist the wrapped blob. The raw cache key never
/// leaves the engine; the vault only sees wrapped bytes. A vault whose backing keystore has
/// been reset must fail `unwrap` with [`KeyVaultError::Integrity`] so the keyring can
/// regenerate and orphan the old ciphertexts.
pub trait PlatformKeyVault
where
	Self: Send + Sync,
{
	/// Returns the persisted wrapped key blob, if one exists.
	fn read_wrapped_key(&self) -> Result<Option<Vec<u8>>, KeyVaultError>;

	/// Persists the wrapped key blob, replacing any previous one.
	fn write_wrapped_key(&self, blob: &[u8]) -> Result<(), KeyVaultError>;

	/// Wraps freshly generated key material for persistence.
	fn wrap(&self, key: &[u8]) -> Result<Vec<u8>, KeyVaultError>;

	/// Unwraps a previously wrapped key blob.
	fn unwrap(&self, blob: &[u8]) -> Result<Vec<u8>, KeyVaultError>;

	/// Discards the vault's wrapping state and any persisted blob.
	fn reset(&self) -> Result<(), KeyVaultError>;
}

/// In-process [`PlatformKeyVault`] for tests, demos, and hosts without a secure keystore.
///
/// Wrapping is an identity copy; the blob lives only in process memory, so every process
/// restart behaves like a keystore reset.
#[derive(Debug, Default)]
pub struct EphemeralKeyVault(Mutex<Option<Vec<u8>>>);
impl PlatformKeyVault for EphemeralKeyVault {
	fn read_wrapped_key(&self) -> Result<Option<Vec<u8>>, KeyVaultError> {
		Ok(self.0.lock().clone())
	}

	fn write_wrapped_key(&self, blob: &[u8]) -> Result<(), KeyVaultError> {
		*self.0.lock() = Some(blob.to_vec());

		Ok(())
	}

	fn wrap(&self, key: &[u8]) -> Result<Vec<u8>, KeyVaultError> {
		Ok(key.to_vec())
	}

	fn unwrap(&self, blob: &[u8]) -> Result<Vec<u8>, KeyVaultError> {
		Ok(blob.to_vec())
	}

	fn reset(&self) -> Result<(), KeyVaultError> {
		*self.0.lock() = None;

		Ok(())
	}
}

/// Error produced by a [`DeviceCertResponder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Device certificate challenge could not be answered: {message}.")]
pub struct ChallengeError {
	/// Human-readable error payload.
	pub message: String,
}

/// Capability answering device-certificate challenges issued by the token endpoint.
///
/// When the endpoint answers `401` with a `PKeyAuth` challenge, the transport invokes the
/// responder once and resends the request with the returned `Authorization` header value.
/// Challenge semantics are owned entirely by the implementation; the engine treats both
/// strings as opaque.
pub trait DeviceCertResponder
where
	Self: Send + Sync,
{
	/// Produces the `Authorization` header value answering `challenge` for `endpoint`.
	fn respond(&self, challenge: &str, endpoint: &str) -> Result<String, ChallengeError>;
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn ephemeral_vault_round_trips_and_resets() {
		let vault = EphemeralKeyVault::default();

		assert_eq!(vault.read_wrapped_key().expect("Read should succeed."), None);

		let wrapped = vault.wrap(b"key-material").expect("Wrap should succeed.");

		vault.write_wrapped_key(&wrapped).expect("Write should succeed.");

		let read = vault
			.read_wrapped_key()
			.expect("Read should succeed.")
			.expect("Blob should be present after write.");

		assert_eq!(vault.unwrap(&read).expect("Unwrap should succeed."), b"key-material");

		vault.reset().expect("Reset should succeed.");

		assert_eq!(vault.read_wrapped_key().expect("Read should succeed."), None);
	}
}
