//! Encrypted file store behavior: round trips, corruption eviction, and key-tier handling.

// std
use std::{env, fs, path::PathBuf, process, sync::Arc};
// crates.io
use time::{Duration, OffsetDateTime};
// self
use oauth2_silent::{
	auth::{Authority, ClientId, ResourceId, TokenSecret},
	cache::{
		CacheKey, EncryptedFileStore, KeyMaterial, Keyring, TokenCacheItem, TokenCacheStore,
	},
	platform::EphemeralKeyVault,
};

fn temp_path() -> PathBuf {
	let unique = format!(
		"oauth2_silent_store_{}_{}.json",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	);

	env::temp_dir().join(unique)
}

fn caller_keyring() -> Arc<Keyring> {
	Arc::new(Keyring::new(
		Arc::new(EphemeralKeyVault::default()),
		Some(KeyMaterial::new([5_u8; 32])),
	))
}

fn fixture() -> (CacheKey, TokenCacheItem) {
	let authority =
		Authority::new("https://login.example.com/tenant").expect("Fixture should parse.");
	let resource = ResourceId::new("api://payments").expect("Fixture should be valid.");
	let client = ClientId::new("client-1").expect("Fixture should be valid.");
	let key = CacheKey::regular(&authority, &resource, &client, None);
	let item = TokenCacheItem {
		authority,
		resource: Some(resource),
		client_id: Some(client),
		access_token: Some(TokenSecret::new("at-secret")),
		refresh_token: Some(TokenSecret::new("rt-secret")),
		expires_on: OffsetDateTime::now_utc() + Duration::hours(1),
		extended_expires_on: None,
		is_multi_resource: false,
		family_id: None,
		user_info: None,
		tenant_id: Some("tenant-1".into()),
		raw_id_token: None,
	};

	(key, item)
}

fn cleanup(path: &PathBuf) {
	let _ = fs::remove_file(path);
}

#[tokio::test]
async fn save_and_reload_round_trip() {
	let path = temp_path();
	let keyring = caller_keyring();
	let store =
		EncryptedFileStore::open(&path, keyring.clone()).expect("Store should open cleanly.");
	let (key, item) = fixture();

	store.put(&key, item.clone()).await.expect("Put should succeed.");
	drop(store);

	// Tokens must not appear in cleartext on disk.
	let raw = fs::read_to_string(&path).expect("Snapshot should be readable.");

	assert!(!raw.contains("at-secret"));
	assert!(!raw.contains("rt-secret"));

	let reopened = EncryptedFileStore::open(&path, keyring).expect("Store should reopen.");
	let fetched = reopened
		.get(&key)
		.await
		.expect("Get should succeed.")
		.expect("Entry should survive a reopen.");

	assert_eq!(fetched, item);

	cleanup(&path);
}

#[tokio::test]
async fn corrupted_envelopes_are_evicted_not_surfaced() {
	let path = temp_path();
	let keyring = caller_keyring();
	let store =
		EncryptedFileStore::open(&path, keyring.clone()).expect("Store should open cleanly.");
	let (key, item) = fixture();

	store.put(&key, item).await.expect("Put should succeed.");
	drop(store);

	// Flip one character inside the envelope body.
	let raw = fs::read_to_string(&path).expect("Snapshot should be readable.");
	let tampered = {
		let pivot = raw.rfind("cE1").expect("Snapshot should contain an envelope.") + 20;
		let mut chars: Vec<char> = raw.chars().collect();

		chars[pivot] = if chars[pivot] == 'A' { 'B' } else { 'A' };
		chars.into_iter().collect::<String>()
	};

	fs::write(&path, tampered).expect("Tampered snapshot should be writable.");

	let reopened =
		EncryptedFileStore::open(&path, keyring).expect("A tampered snapshot still opens.");

	assert_eq!(reopened.get(&key).await.expect("Get should succeed."), None);
	assert!(
		reopened.all().await.expect("All should succeed.").is_empty(),
		"The corrupt entry must be gone after eviction.",
	);

	cleanup(&path);
}

#[tokio::test]
async fn keystore_reset_orphans_old_entries_without_breaking_the_store() {
	let path = temp_path();
	let vault = Arc::new(EphemeralKeyVault::default());
	let store = EncryptedFileStore::open(&path, Arc::new(Keyring::new(vault, None)))
		.expect("Store should open cleanly.");
	let (key, item) = fixture();

	store.put(&key, item.clone()).await.expect("Put should succeed.");
	drop(store);

	// A fresh vault models a wiped platform keystore: new key material is generated and the
	// old ciphertexts become unreadable.
	let reset_vault = Arc::new(EphemeralKeyVault::default());
	let reopened = EncryptedFileStore::open(&path, Arc::new(Keyring::new(reset_vault, None)))
		.expect("Store should reopen after a keystore reset.");

	assert_eq!(
		reopened.get(&key).await.expect("Get should succeed."),
		None,
		"Orphaned entries read as absent, never as errors.",
	);

	// The store keeps working under the regenerated key.
	reopened.put(&key, item.clone()).await.expect("Put should succeed after reset.");

	assert_eq!(reopened.get(&key).await.expect("Get should succeed."), Some(item));

	cleanup(&path);
}

#[tokio::test]
async fn mixed_key_tiers_stay_readable_until_rewritten() {
	let path = temp_path();
	let vault = Arc::new(EphemeralKeyVault::default());
	let platform_store = EncryptedFileStore::open(
		&path,
		Arc::new(Keyring::new(vault.clone(), None)),
	)
	.expect("Store should open cleanly.");
	let (key, item) = fixture();

	platform_store.put(&key, item.clone()).await.expect("Put should succeed.");
	drop(platform_store);

	// The caller later pins a raw key; platform-tier history must remain decryptable.
	let mixed = EncryptedFileStore::open(
		&path,
		Arc::new(Keyring::new(vault, Some(KeyMaterial::new([9_u8; 32])))),
	)
	.expect("Store should reopen with a caller key.");

	assert_eq!(
		mixed.get(&key).await.expect("Get should succeed."),
		Some(item.clone()),
		"Platform-tier entries stay readable after a caller key arrives.",
	);

	// New writes land under the caller tier and read back fine.
	mixed.put(&key, item.clone()).await.expect("Put should succeed.");

	assert_eq!(mixed.get(&key).await.expect("Get should succeed."), Some(item));

	cleanup(&path);
}

#[tokio::test]
async fn remove_and_remove_all_persist() {
	let path = temp_path();
	let keyring = caller_keyring();
	let store =
		EncryptedFileStore::open(&path, keyring.clone()).expect("Store should open cleanly.");
	let (key, item) = fixture();

	store.put(&key, item.clone()).await.expect("Put should succeed.");
	store.remove(&key).await.expect("Remove should succeed.");

	assert_eq!(store.get(&key).await.expect("Get should succeed."), None);

	store.put(&key, item).await.expect("Put should succeed.");
	store.remove_all().await.expect("Sign-out wipe should succeed.");
	drop(store);

	let reopened = EncryptedFileStore::open(&path, keyring).expect("Store should reopen.");

	assert!(reopened.all().await.expect("All should succeed.").is_empty());

	cleanup(&path);
}
