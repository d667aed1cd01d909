//! Versioned envelope encryption for persisted cache entries.
//!
//! Wire form: a printable prefix of `(b'a' + ENCODE_VERSION.len()) as char` followed by
//! [`ENCODE_VERSION`], then the base64 body `key_version ‖ ciphertext ‖ nonce ‖ mac`. The MAC
//! is HMAC-SHA256 over `key_version ‖ ciphertext ‖ nonce` with a key derived as
//! `SHA-256(cipher_key)`, and is verified in constant time before any decryption happens.

// crates.io
use aes_gcm::{
	Aes256Gcm, Key, Nonce,
	aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	cache::keyring::{KeyMaterial, KeyVersion, Keyring},
	platform::KeyVaultError,
};

/// Encoding version carried by every envelope.
pub const ENCODE_VERSION: &str = "E1";
/// Nonce length in bytes.
pub const NONCE_LEN: usize = 12;
/// MAC length in bytes.
pub const MAC_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Errors surfaced by the envelope layer.
///
/// The store absorbs every variant into an eviction plus a cache miss; none of them crosses
/// the store boundary.
#[derive(Debug, ThisError)]
pub enum EnvelopeError {
	/// The blob does not parse as an envelope.
	#[error("Envelope encoding is malformed: {reason}.")]
	Malformed {
		/// Which structural check failed.
		reason: &'static str,
	},
	/// MAC verification or decryption failed; the blob must not be trusted.
	#[error("Envelope failed integrity verification.")]
	Integrity,
	/// No key material exists for the tier that sealed this envelope.
	#[error("Key material for {version} entries is unavailable.")]
	KeyUnavailable {
		/// Tier recorded in the envelope.
		version: KeyVersion,
	},
	/// The platform key vault failed while preparing key material.
	#[error(transparent)]
	KeyVault(#[from] KeyVaultError),
}

/// Seals `plaintext` under the keyring's active tier.
pub fn seal(keyring: &Keyring, plaintext: &[u8]) -> Result<String, EnvelopeError> {
	let (version, key) = keyring.encryption_key()?;

	seal_with(version, &key, plaintext)
}

pub(crate) fn seal_with(
	version: KeyVersion,
	key: &KeyMaterial,
	plaintext: &[u8],
) -> Result<String, EnvelopeError> {
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.bytes()));
	let mut nonce = [0_u8; NONCE_LEN];

	rand::rng().fill_bytes(&mut nonce);

	let ciphertext = cipher
		.encrypt(Nonce::from_slice(&nonce), plaintext)
		.map_err(|_| EnvelopeError::Integrity)?;
	let mut body =
		Vec::with_capacity(KeyVersion::TAG_LEN + ciphertext.len() + NONCE_LEN + MAC_LEN);

	body.extend_from_slice(version.tag());
	body.extend_from_slice(&ciphertext);
	body.extend_from_slice(&nonce);

	let mac = mac_over(key, &body)?;

	body.extend_from_slice(&mac);

	Ok(format!("{}{ENCODE_VERSION}{}", encode_version_prefix(), STANDARD.encode(&body)))
}

/// Opens an envelope, verifying the MAC before decrypting.
pub fn open(keyring: &Keyring, blob: &str) -> Result<Vec<u8>, EnvelopeError> {
	let body = decode_body(blob)?;
	let version = KeyVersion::from_tag(&body[..KeyVersion::TAG_LEN])
		.ok_or(EnvelopeError::Malformed { reason: "unknown key version tag" })?;
	let key = keyring.decryption_key(version)?;
	let mac_index = body.len() - MAC_LEN;
	let nonce_index = mac_index - NONCE_LEN;
	let mut mac = mac_builder(&key)?;

	mac.update(&body[..mac_index]);
	// Constant-time comparison; a mismatch must not leak how far the digests agree.
	mac.verify_slice(&body[mac_index..]).map_err(|_| EnvelopeError::Integrity)?;

	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.bytes()));

	cipher
		.decrypt(
			Nonce::from_slice(&body[nonce_index..mac_index]),
			&body[KeyVersion::TAG_LEN..nonce_index],
		)
		.map_err(|_| EnvelopeError::Integrity)
}

fn decode_body(blob: &str) -> Result<Vec<u8>, EnvelopeError> {
	let prefix = blob
		.chars()
		.next()
		.ok_or(EnvelopeError::Malformed { reason: "empty blob" })?;
	let version_len = (prefix as usize)
		.checked_sub('a' as usize)
		.filter(|len| (1..=9).contains(len))
		.ok_or(EnvelopeError::Malformed { reason: "invalid encode-version prefix" })?;
	let version = blob
		.get(1..1 + version_len)
		.ok_or(EnvelopeError::Malformed { reason: "truncated encode version" })?;

	if version != ENCODE_VERSION {
		return Err(EnvelopeError::Malformed { reason: "unsupported encode version" });
	}

	let body = STANDARD
		.decode(&blob[1 + version_len..])
		.map_err(|_| EnvelopeError::Malformed { reason: "invalid base64 body" })?;

	if body.len() <= KeyVersion::TAG_LEN + NONCE_LEN + MAC_LEN {
		return Err(EnvelopeError::Malformed { reason: "body too short" });
	}

	Ok(body)
}

fn encode_version_prefix() -> char {
	(b'a' + ENCODE_VERSION.len() as u8) as char
}

fn mac_builder(key: &KeyMaterial) -> Result<HmacSha256, EnvelopeError> {
	let mac_key = Sha256::digest(key.bytes());

	<HmacSha256 as Mac>::new_from_slice(&mac_key).map_err(|_| EnvelopeError::Integrity)
}

fn mac_over(key: &KeyMaterial, data: &[u8]) -> Result<[u8; MAC_LEN], EnvelopeError> {
	let mut mac = mac_builder(key)?;

	mac.update(data);

	Ok(mac.finalize().into_bytes().into())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::platform::EphemeralKeyVault;

	fn keyring() -> Keyring {
		Keyring::new(
			Arc::new(EphemeralKeyVault::default()),
			Some(KeyMaterial::new([42_u8; 32])),
		)
	}

	#[test]
	fn round_trip_restores_the_plaintext() {
		let keyring = keyring();
		let sealed = seal(&keyring, b"cache entry payload").expect("Seal should succeed.");
		let opened = open(&keyring, &sealed).expect("Open should succeed.");

		assert_eq!(opened, b"cache entry payload");
		assert!(sealed.starts_with("cE1"), "Prefix must carry the encode version.");
	}

	#[test]
	fn every_corrupted_byte_fails_integrity() {
		let keyring = keyring();
		let sealed = seal(&keyring, b"payload-to-corrupt").expect("Seal should succeed.");
		let prefix_len = 1 + ENCODE_VERSION.len();
		let mut body = STANDARD.decode(&sealed[prefix_len..]).expect("Body should decode.");

		// Flip one ciphertext byte and one MAC byte; both must be rejected as corruption,
		// never decrypted into garbage.
		for index in [KeyVersion::TAG_LEN, body.len() - 1] {
			body[index] ^= 0x01;

			let tampered =
				format!("{}{}", &sealed[..prefix_len], STANDARD.encode(&body));

			assert!(matches!(open(&keyring, &tampered), Err(EnvelopeError::Integrity)));

			body[index] ^= 0x01;
		}
	}

	#[test]
	fn malformed_blobs_are_rejected_before_key_use() {
		let keyring = keyring();

		for (blob, _reason) in [
			("", "empty"),
			("aE1AAAA", "zero-length version"),
			("cE9AAAA", "wrong version"),
			("cE1!!!!", "bad base64"),
			("cE1AAAA", "too short"),
		] {
			assert!(matches!(open(&keyring, blob), Err(EnvelopeError::Malformed { .. })));
		}
	}

	#[test]
	fn wrong_key_material_reads_as_integrity_failure() {
		let sealer = keyring();
		let sealed = seal(&sealer, b"tier secret").expect("Seal should succeed.");
		let other = Keyring::new(
			Arc::new(EphemeralKeyVault::default()),
			Some(KeyMaterial::new([43_u8; 32])),
		);

		assert!(matches!(open(&other, &sealed), Err(EnvelopeError::Integrity)));
	}

	#[test]
	fn envelopes_record_their_key_tier() {
		let vault = Arc::new(EphemeralKeyVault::default());
		let platform = Keyring::new(vault.clone(), None);
		let sealed = seal(&platform, b"platform entry").expect("Seal should succeed.");

		// A keyring that gained a caller key later still opens platform-tier envelopes.
		let mixed = Keyring::new(vault, Some(KeyMaterial::new([9_u8; 32])));

		assert_eq!(
			open(&mixed, &sealed).expect("Mixed-tier open should succeed."),
			b"platform entry",
		);
	}
}
