//! Cached credential entries and their lifecycle rules.

// self
use crate::{
	_prelude::*,
	auth::{Authority, ClientId, FamilyId, ResourceId, TokenSecret, UserInfo},
	oauth::GrantedToken,
};

/// Shape of a stored entry, derived from which fields are populated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
	/// Resource-bound entry carrying the access token.
	Regular,
	/// Multi-resource refresh-token entry; no resource or access token stored.
	MultiResource,
	/// Family refresh-token entry; no resource, client id, or access token stored.
	Family,
}

/// One cached credential grouping.
///
/// Field presence determines the entry shape (see [`EntryKind`]): only regular entries store a
/// resource, and family entries drop the client id as well. An entry whose access token is
/// blank and whose refresh token is blank cannot satisfy any request and is evicted on sight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenCacheItem {
	/// Authority the credential was issued by.
	pub authority: Authority,
	/// Resource the access token is scoped to; absent for MRRT/FRT entries.
	pub resource: Option<ResourceId>,
	/// Client the credential was issued to; absent for FRT entries.
	pub client_id: Option<ClientId>,
	/// Access token, when the entry shape stores one.
	pub access_token: Option<TokenSecret>,
	/// Refresh token redeemable at the authority.
	pub refresh_token: Option<TokenSecret>,
	/// Primary expiry instant of the access token.
	pub expires_on: OffsetDateTime,
	/// Extended expiry instant honored when the authority degrades gracefully.
	pub extended_expires_on: Option<OffsetDateTime>,
	/// Marks the refresh token as valid for any resource under the client.
	pub is_multi_resource: bool,
	/// Family the refresh token belongs to, when the authority signaled membership.
	pub family_id: Option<FamilyId>,
	/// Identity attached to the credential, when an ID token accompanied it.
	pub user_info: Option<UserInfo>,
	/// Tenant extracted from the ID token.
	pub tenant_id: Option<String>,
	/// Raw ID token as returned by the authority.
	pub raw_id_token: Option<String>,
}
impl TokenCacheItem {
	/// Builds the resource-bound entry persisted for every grant.
	pub fn regular_entry(
		authority: &Authority,
		resource: &ResourceId,
		client: &ClientId,
		granted: &GrantedToken,
	) -> Self {
		Self {
			authority: authority.clone(),
			resource: Some(resource.clone()),
			client_id: Some(client.clone()),
			access_token: Some(granted.access_token.clone()),
			..Self::base(authority, granted)
		}
	}

	/// Builds the multi-resource entry; the access token and resource are deliberately dropped.
	pub fn mrrt_entry(authority: &Authority, client: &ClientId, granted: &GrantedToken) -> Self {
		Self { client_id: Some(client.clone()), ..Self::base(authority, granted) }
	}

	/// Builds the family entry; client id, resource, and access token are all dropped.
	pub fn frt_entry(authority: &Authority, granted: &GrantedToken) -> Self {
		Self::base(authority, granted)
	}

	fn base(authority: &Authority, granted: &GrantedToken) -> Self {
		Self {
			authority: authority.clone(),
			resource: None,
			client_id: None,
			access_token: None,
			refresh_token: Some(granted.refresh_token.clone()),
			expires_on: granted.expires_on,
			extended_expires_on: granted.extended_expires_on,
			is_multi_resource: granted.is_multi_resource,
			family_id: granted.family_id.clone(),
			user_info: granted.user_info.clone(),
			tenant_id: granted.tenant_id.clone(),
			raw_id_token: granted.raw_id_token.clone(),
		}
	}

	/// Derives the entry shape from field presence.
	pub fn entry_kind(&self) -> EntryKind {
		if self.resource.is_some() {
			EntryKind::Regular
		} else if self.client_id.is_none() {
			EntryKind::Family
		} else {
			EntryKind::MultiResource
		}
	}

	/// Returns `true` when the authority marked this credential as family-joined.
	pub fn is_family_token(&self) -> bool {
		self.family_id.is_some()
	}

	/// Returns the refresh token when it is present and non-blank.
	pub fn refresh_secret(&self) -> Option<&str> {
		self.refresh_token.as_ref().filter(|secret| !secret.is_blank()).map(TokenSecret::expose)
	}

	/// Returns `true` when a non-blank access token is stored.
	pub fn has_access_token(&self) -> bool {
		self.access_token.as_ref().is_some_and(|secret| !secret.is_blank())
	}

	/// Returns `true` when the access token should no longer be handed out at `now`.
	///
	/// The buffer makes a token that is about to lapse count as expired, so it is refreshed
	/// proactively instead of being returned to a caller who would immediately hit a 401.
	pub fn is_expired_at(&self, now: OffsetDateTime, buffer: Duration) -> bool {
		self.expires_on - now <= buffer
	}

	/// Returns `true` when the entry can back an extended-lifetime (degraded) result at `now`.
	pub fn is_extended_usable_at(&self, now: OffsetDateTime, buffer: Duration) -> bool {
		self.has_access_token()
			&& self
				.extended_expires_on
				.is_some_and(|extended| extended - now > buffer)
	}

	/// Returns `true` when neither token slot can satisfy any request.
	pub fn is_unusable(&self) -> bool {
		!self.has_access_token() && self.refresh_secret().is_none()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::UserIdentifier;

	pub(crate) fn granted() -> GrantedToken {
		GrantedToken {
			access_token: TokenSecret::new("at-1"),
			refresh_token: TokenSecret::new("rt-1"),
			expires_on: macros::datetime!(2026-01-01 01:00 UTC),
			extended_expires_on: Some(macros::datetime!(2026-01-02 00:00 UTC)),
			is_multi_resource: true,
			family_id: Some(FamilyId::well_known()),
			user_info: Some(UserInfo {
				unique_id: Some("oid-1".into()),
				displayable_id: Some("ada@example.com".into()),
			}),
			tenant_id: Some("tenant-1".into()),
			raw_id_token: Some("h.p.s".into()),
		}
	}

	fn authority() -> Authority {
		Authority::new("https://login.example.com/tenant").expect("Fixture should parse.")
	}

	#[test]
	fn entry_kind_follows_field_presence() {
		let authority = authority();
		let resource = ResourceId::new("api://payments").expect("Fixture should be valid.");
		let client = ClientId::new("client-1").expect("Fixture should be valid.");
		let granted = granted();
		let regular = TokenCacheItem::regular_entry(&authority, &resource, &client, &granted);
		let mrrt = TokenCacheItem::mrrt_entry(&authority, &client, &granted);
		let frt = TokenCacheItem::frt_entry(&authority, &granted);

		assert_eq!(regular.entry_kind(), EntryKind::Regular);
		assert_eq!(mrrt.entry_kind(), EntryKind::MultiResource);
		assert_eq!(frt.entry_kind(), EntryKind::Family);
		assert!(regular.has_access_token());
		assert!(!mrrt.has_access_token(), "MRRT entries must not store the access token.");
		assert!(frt.client_id.is_none(), "FRT entries must not store the client id.");
		assert!(frt.is_family_token());
		assert!(
			regular
				.user_info
				.as_ref()
				.expect("Identity should be carried.")
				.matches(&UserIdentifier::new("ada@example.com").expect("Valid user.")),
		);
	}

	#[test]
	fn expiry_buffer_is_inclusive_at_the_boundary() {
		let now = macros::datetime!(2026-01-01 00:00 UTC);
		let buffer = Duration::seconds(300);
		let mut item = TokenCacheItem::regular_entry(
			&authority(),
			&ResourceId::new("api://payments").expect("Fixture should be valid."),
			&ClientId::new("client-1").expect("Fixture should be valid."),
			&granted(),
		);

		item.expires_on = now + buffer - Duration::seconds(1);

		assert!(item.is_expired_at(now, buffer));

		item.expires_on = now + buffer + Duration::seconds(1);

		assert!(!item.is_expired_at(now, buffer));

		item.expires_on = now + buffer;

		assert!(item.is_expired_at(now, buffer), "The boundary instant counts as expired.");
	}

	#[test]
	fn extended_usability_requires_token_and_future_extended_expiry() {
		let now = macros::datetime!(2026-01-01 00:00 UTC);
		let buffer = Duration::seconds(300);
		let mut item = TokenCacheItem::regular_entry(
			&authority(),
			&ResourceId::new("api://payments").expect("Fixture should be valid."),
			&ClientId::new("client-1").expect("Fixture should be valid."),
			&granted(),
		);

		item.expires_on = now - Duration::hours(1);
		item.extended_expires_on = Some(now + Duration::hours(1));

		assert!(item.is_extended_usable_at(now, buffer));

		item.extended_expires_on = Some(now - Duration::seconds(1));

		assert!(!item.is_extended_usable_at(now, buffer));

		item.extended_expires_on = None;

		assert!(!item.is_extended_usable_at(now, buffer));
	}

	#[test]
	fn unusable_entries_have_no_redeemable_material() {
		let mut item = TokenCacheItem::frt_entry(&authority(), &granted());

		assert!(!item.is_unusable());

		item.refresh_token = Some(TokenSecret::new("  "));

		assert!(item.is_unusable());
	}
}
