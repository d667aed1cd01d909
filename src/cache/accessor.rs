//! Lookup, ambiguity, persistence, and eviction policy layered over the store trait.

// std
use std::collections::HashSet;
// self
use crate::{
	_prelude::*,
	auth::{FamilyId, ResourceId, UserIdentifier, UserInfo, is_user_mismatch},
	cache::{CacheKey, EntryKind, TokenCacheItem, TokenCacheStore},
	flows::{AcquisitionRequest, BrokerConfig},
	oauth::GrantedToken,
	platform::Clock,
};

/// Cache policy facade used by the silent chain.
///
/// Grants are written under three key variants per entry shape (displayable id, unique id, and
/// the any-user key) so later lookups succeed whichever discriminator the caller passes.
pub(crate) struct CacheAccessor<'a> {
	store: &'a dyn TokenCacheStore,
	clock: &'a dyn Clock,
	config: &'a BrokerConfig,
}
impl<'a> CacheAccessor<'a> {
	pub(crate) fn new(
		store: &'a dyn TokenCacheStore,
		clock: &'a dyn Clock,
		config: &'a BrokerConfig,
	) -> Self {
		Self { store, clock, config }
	}

	/// Looks up the regular entry addressed by the request tuple.
	pub(crate) async fn regular_item(
		&self,
		request: &AcquisitionRequest,
	) -> Result<Option<TokenCacheItem>> {
		let key = CacheKey::regular(
			&request.authority,
			&request.resource,
			&request.client_id,
			request.user.as_ref(),
		);

		Ok(self.store.get(&key).await?)
	}

	/// Looks up the multi-resource entry for the request's client and user.
	pub(crate) async fn mrrt_item(
		&self,
		request: &AcquisitionRequest,
	) -> Result<Option<TokenCacheItem>> {
		let key =
			CacheKey::multi_resource(&request.authority, &request.client_id, request.user.as_ref());

		Ok(self.store.get(&key).await?)
	}

	/// Looks up the family entry; family lookups require a user discriminator.
	pub(crate) async fn frt_item(
		&self,
		family: &FamilyId,
		request: &AcquisitionRequest,
	) -> Result<Option<TokenCacheItem>> {
		if request.user.is_none() {
			return Ok(None);
		}

		let key = CacheKey::family(&request.authority, family, request.user.as_ref());

		Ok(self.store.get(&key).await?)
	}

	/// Returns `true` when a redeemable multi-resource entry exists for the request.
	///
	/// Older cache generations never marked the regular entry as multi-resource even when the
	/// token was, so the chain probes for the separate MRRT entry explicitly.
	pub(crate) async fn mrrt_entry_exists(&self, request: &AcquisitionRequest) -> Result<bool> {
		Ok(self
			.mrrt_item(request)
			.await?
			.is_some_and(|item| item.refresh_secret().is_some()))
	}

	/// Returns the cached entry when it can satisfy the request without a network call.
	pub(crate) async fn fresh_access_token(
		&self,
		request: &AcquisitionRequest,
	) -> Result<Option<TokenCacheItem>> {
		let Some(item) = self.regular_item(request).await? else { return Ok(None) };

		self.ensure_unambiguous_regular(request).await?;

		if request.force_refresh || request.claims.is_some() {
			return Ok(None);
		}
		if !item.has_access_token() {
			return Ok(None);
		}
		if item.is_expired_at(self.clock.now(), self.config.expiration_buffer) {
			return Ok(None);
		}
		if is_user_mismatch(request.user.as_ref(), item.user_info.as_ref()) {
			return Err(Error::UserMismatch);
		}

		Ok(Some(item))
	}

	/// Returns the expired-but-extended-valid entry backing a degraded result, if any.
	pub(crate) async fn stale_access_token(
		&self,
		request: &AcquisitionRequest,
	) -> Result<Option<TokenCacheItem>> {
		let Some(item) = self.regular_item(request).await? else { return Ok(None) };

		if !item.is_extended_usable_at(self.clock.now(), self.config.expiration_buffer) {
			return Ok(None);
		}

		self.ensure_unambiguous_regular(request).await?;

		Ok(Some(item))
	}

	/// Fails with [`Error::UserMismatch`] when an anonymous request would have to pick among
	/// regular entries belonging to different users. Picking one silently is never acceptable.
	pub(crate) async fn ensure_unambiguous_regular(
		&self,
		request: &AcquisitionRequest,
	) -> Result<()> {
		if request.user.is_some() {
			return Ok(());
		}

		let identities = self
			.matching_identities(|item| {
				item.entry_kind() == EntryKind::Regular
					&& !item.is_multi_resource
					&& item.authority == request.authority
					&& item.client_id.as_ref().is_some_and(|c| c.matches(&request.client_id))
					&& item.resource.as_ref().is_some_and(|r| r.matches(&request.resource))
			})
			.await?;

		if identities > 1 { Err(Error::UserMismatch) } else { Ok(()) }
	}

	/// Multi-resource counterpart of [`Self::ensure_unambiguous_regular`].
	pub(crate) async fn ensure_unambiguous_mrrt(
		&self,
		request: &AcquisitionRequest,
	) -> Result<()> {
		if request.user.is_some() {
			return Ok(());
		}

		let identities = self
			.matching_identities(|item| {
				(item.is_multi_resource || item.resource.is_none())
					&& item.authority == request.authority
					&& item.client_id.as_ref().is_some_and(|c| c.matches(&request.client_id))
			})
			.await?;

		if identities > 1 { Err(Error::UserMismatch) } else { Ok(()) }
	}

	/// Counts distinct user identities among matching entries. Entries written for the same
	/// user under several key variants collapse to one identity.
	async fn matching_identities(
		&self,
		matches: impl Fn(&TokenCacheItem) -> bool,
	) -> Result<usize> {
		let items = self.store.all().await?;
		let mut identities = HashSet::new();

		for item in items.iter().filter(|item| matches(item)) {
			identities
				.insert(item.user_info.as_ref().map(UserInfo::fingerprint).unwrap_or_default());
		}

		Ok(identities.len())
	}

	/// Persists a grant under every entry shape and user-key variant it covers.
	pub(crate) async fn persist_grant(
		&self,
		request: &AcquisitionRequest,
		granted: &GrantedToken,
	) -> Result<()> {
		for user in user_variants(granted.user_info.as_ref()) {
			let user = user.as_ref();
			let regular_key = CacheKey::regular(
				&request.authority,
				&request.resource,
				&request.client_id,
				user,
			);

			self.store
				.put(
					&regular_key,
					TokenCacheItem::regular_entry(
						&request.authority,
						&request.resource,
						&request.client_id,
						granted,
					),
				)
				.await?;

			if granted.is_multi_resource {
				let key =
					CacheKey::multi_resource(&request.authority, &request.client_id, user);

				self.store
					.put(
						&key,
						TokenCacheItem::mrrt_entry(&request.authority, &request.client_id, granted),
					)
					.await?;
			}
			if let (Some(family), Some(_)) = (granted.family_id.as_ref(), user) {
				let key = CacheKey::family(&request.authority, family, user);

				self.store
					.put(&key, TokenCacheItem::frt_entry(&request.authority, granted))
					.await?;
			}
		}

		Ok(())
	}

	/// Evicts the cache entries invalidated by a dead refresh token.
	///
	/// Regular entries clear their own key variants. A dead multi-resource token also clears
	/// the regular entry for the requested resource, because both held the same secret. Family
	/// keys are cleared only when the stored secret still equals the one that just failed;
	/// another client in the family may have rotated it since.
	pub(crate) async fn evict_for_item(
		&self,
		item: &TokenCacheItem,
		request_resource: &ResourceId,
	) -> Result<()> {
		let variants = user_variants(item.user_info.as_ref());

		match item.entry_kind() {
			EntryKind::Regular => {
				let (Some(resource), Some(client)) = (&item.resource, &item.client_id) else {
					return Ok(());
				};

				for user in &variants {
					self.store
						.remove(&CacheKey::regular(&item.authority, resource, client, user.as_ref()))
						.await?;
				}
			},
			EntryKind::MultiResource => {
				let Some(client) = &item.client_id else { return Ok(()) };

				for user in &variants {
					self.store
						.remove(&CacheKey::multi_resource(&item.authority, client, user.as_ref()))
						.await?;
					self.store
						.remove(&CacheKey::regular(
							&item.authority,
							request_resource,
							client,
							user.as_ref(),
						))
						.await?;
				}
			},
			EntryKind::Family => {
				let family = item.family_id.clone().unwrap_or_else(FamilyId::well_known);

				for user in &variants {
					let key = CacheKey::family(&item.authority, &family, user.as_ref());
					let Some(stored) = self.store.get(&key).await? else { continue };
					let same_secret = match (&stored.refresh_token, &item.refresh_token) {
						(Some(a), Some(b)) => a.matches(b),
						_ => false,
					};

					if same_secret {
						self.store.remove(&key).await?;
					}
				}
			},
		}

		Ok(())
	}
}

fn user_variants(info: Option<&UserInfo>) -> Vec<Option<UserIdentifier>> {
	let mut variants = vec![None];

	if let Some(info) = info {
		if let Some(display) = info.displayable_id.as_deref().and_then(UserIdentifier::new) {
			variants.push(Some(display));
		}
		if let Some(unique) = info.unique_id.as_deref().and_then(UserIdentifier::new) {
			variants.push(Some(unique));
		}
	}

	variants
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		auth::{Authority, ClientId, TokenSecret},
		cache::MemoryCacheStore,
		platform::SleepFuture,
	};

	struct ManualClock(OffsetDateTime);
	impl Clock for ManualClock {
		fn now(&self) -> OffsetDateTime {
			self.0
		}

		fn sleep(&self, _: Duration) -> SleepFuture<'_> {
			Box::pin(async {})
		}
	}

	fn request() -> AcquisitionRequest {
		AcquisitionRequest::new(
			Authority::new("https://login.example.com/tenant").expect("Fixture should parse."),
			ResourceId::new("api://payments").expect("Fixture should be valid."),
			ClientId::new("client-1").expect("Fixture should be valid."),
		)
	}

	fn granted(user: Option<&str>) -> GrantedToken {
		GrantedToken {
			access_token: TokenSecret::new("at"),
			refresh_token: TokenSecret::new("rt"),
			expires_on: macros::datetime!(2026-01-01 12:00 UTC),
			extended_expires_on: None,
			is_multi_resource: true,
			family_id: Some(FamilyId::well_known()),
			user_info: user.map(|id| UserInfo {
				unique_id: Some(format!("oid-{id}")),
				displayable_id: Some(format!("{id}@example.com")),
			}),
			tenant_id: None,
			raw_id_token: None,
		}
	}

	fn clock() -> ManualClock {
		ManualClock(macros::datetime!(2026-01-01 00:00 UTC))
	}

	#[tokio::test]
	async fn persisted_grant_is_visible_under_every_key_variant() {
		let store = MemoryCacheStore::default();
		let config = BrokerConfig::default();
		let clock = clock();
		let accessor = CacheAccessor::new(&store, &clock, &config);
		let request = request();

		accessor
			.persist_grant(&request, &granted(Some("ada")))
			.await
			.expect("Persist should succeed.");

		// Regular + MRRT for three user variants, FRT for the two named variants.
		assert_eq!(store.len(), 8);

		let by_display = request
			.clone()
			.for_user(UserIdentifier::new("ada@example.com").expect("Valid user."));
		let by_unique =
			request.clone().for_user(UserIdentifier::new("oid-ada").expect("Valid user."));

		for req in [&request, &by_display, &by_unique] {
			assert!(
				accessor
					.regular_item(req)
					.await
					.expect("Lookup should succeed.")
					.is_some(),
			);
			assert!(
				accessor.mrrt_item(req).await.expect("Lookup should succeed.").is_some(),
			);
		}

		assert!(
			accessor
				.frt_item(&FamilyId::well_known(), &by_unique)
				.await
				.expect("Lookup should succeed.")
				.is_some(),
		);
		assert!(
			accessor
				.frt_item(&FamilyId::well_known(), &request)
				.await
				.expect("Lookup should succeed.")
				.is_none(),
			"Family lookups require a user discriminator.",
		);
	}

	#[tokio::test]
	async fn one_user_under_many_keys_is_not_ambiguous() {
		let store = MemoryCacheStore::default();
		let config = BrokerConfig::default();
		let clock = clock();
		let accessor = CacheAccessor::new(&store, &clock, &config);
		let request = request();

		accessor
			.persist_grant(&request, &granted(Some("ada")))
			.await
			.expect("Persist should succeed.");
		accessor
			.ensure_unambiguous_regular(&request)
			.await
			.expect("One identity must not trip the ambiguity check.");
	}

	#[tokio::test]
	async fn two_users_make_an_anonymous_request_ambiguous() {
		let store = MemoryCacheStore::default();
		let config = BrokerConfig::default();
		let clock = clock();
		let accessor = CacheAccessor::new(&store, &clock, &config);
		let request = request();

		accessor
			.persist_grant(&request, &granted(Some("ada")))
			.await
			.expect("Persist should succeed.");
		accessor
			.persist_grant(&request, &granted(Some("grace")))
			.await
			.expect("Persist should succeed.");

		assert!(matches!(
			accessor.ensure_unambiguous_regular(&request).await,
			Err(Error::UserMismatch),
		));
		assert!(matches!(
			accessor.ensure_unambiguous_mrrt(&request).await,
			Err(Error::UserMismatch),
		));
	}

	#[tokio::test]
	async fn evicting_a_dead_mrrt_clears_the_regular_entry_too() {
		let store = MemoryCacheStore::default();
		let config = BrokerConfig::default();
		let clock = clock();
		let accessor = CacheAccessor::new(&store, &clock, &config);
		let request = request();

		accessor
			.persist_grant(&request, &granted(Some("ada")))
			.await
			.expect("Persist should succeed.");

		let mrrt = accessor
			.mrrt_item(&request)
			.await
			.expect("Lookup should succeed.")
			.expect("MRRT entry should exist.");

		accessor
			.evict_for_item(&mrrt, &request.resource)
			.await
			.expect("Eviction should succeed.");

		assert!(accessor.mrrt_item(&request).await.expect("Lookup should succeed.").is_none());
		assert!(
			accessor.regular_item(&request).await.expect("Lookup should succeed.").is_none(),
		);
	}

	#[tokio::test]
	async fn family_eviction_spares_rotated_secrets() {
		let store = MemoryCacheStore::default();
		let config = BrokerConfig::default();
		let clock = clock();
		let accessor = CacheAccessor::new(&store, &clock, &config);
		let request = request();

		accessor
			.persist_grant(&request, &granted(Some("ada")))
			.await
			.expect("Persist should succeed.");

		let user = UserIdentifier::new("oid-ada").expect("Valid user.");
		let by_unique = request.clone().for_user(user);
		let mut failed = accessor
			.frt_item(&FamilyId::well_known(), &by_unique)
			.await
			.expect("Lookup should succeed.")
			.expect("FRT entry should exist.");

		// Another family client rotated the secret since this copy was read.
		failed.refresh_token = Some(TokenSecret::new("stale-frt"));
		accessor
			.evict_for_item(&failed, &request.resource)
			.await
			.expect("Eviction should succeed.");

		assert!(
			accessor
				.frt_item(&FamilyId::well_known(), &by_unique)
				.await
				.expect("Lookup should succeed.")
				.is_some(),
			"A rotated family secret must survive the eviction.",
		);
	}

	#[tokio::test]
	async fn fresh_access_token_respects_expiry_and_bypass_flags() {
		let store = MemoryCacheStore::default();
		let config = BrokerConfig::default();
		let clock = clock();
		let accessor = CacheAccessor::new(&store, &clock, &config);
		let request = request();

		accessor
			.persist_grant(&request, &granted(None))
			.await
			.expect("Persist should succeed.");
		assert!(
			accessor
				.fresh_access_token(&request)
				.await
				.expect("Lookup should succeed.")
				.is_some(),
		);

		let forced = request.clone().with_force_refresh(true);

		assert!(
			accessor
				.fresh_access_token(&forced)
				.await
				.expect("Lookup should succeed.")
				.is_none(),
			"Force refresh must bypass the cached access token.",
		);

		let challenged = request.clone().with_claims_challenge("{\"access_token\":{}}");

		assert!(
			accessor
				.fresh_access_token(&challenged)
				.await
				.expect("Lookup should succeed.")
				.is_none(),
			"A claims challenge must bypass the cached access token.",
		);
	}
}
