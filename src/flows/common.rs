//! Request and result types shared across the silent chain.

// self
use crate::{
	_prelude::*,
	auth::{Authority, ClientId, ResourceId, TokenSecret, UserIdentifier, UserInfo},
	cache::TokenCacheItem,
	oauth::GrantedToken,
};

/// One silent acquisition request, immutable for the duration of the attempt.
#[derive(Clone, Debug)]
pub struct AcquisitionRequest {
	/// Authority to acquire against.
	pub authority: Authority,
	/// Resource the access token must cover.
	pub resource: ResourceId,
	/// Client identifier the credential belongs to.
	pub client_id: ClientId,
	/// Optional user discriminator; omitted selects the any-user cache partition.
	pub user: Option<UserIdentifier>,
	/// Bypasses the cached access token and forces a refresh.
	pub force_refresh: bool,
	/// Claims challenge to forward; its presence also bypasses the cached access token.
	pub claims: Option<String>,
}
impl AcquisitionRequest {
	/// Creates a request for the provided authority/resource/client tuple.
	pub fn new(authority: Authority, resource: ResourceId, client_id: ClientId) -> Self {
		Self { authority, resource, client_id, user: None, force_refresh: false, claims: None }
	}

	/// Scopes the request to a user.
	pub fn for_user(mut self, user: UserIdentifier) -> Self {
		self.user = Some(user);

		self
	}

	/// Overrides the force-refresh flag.
	pub fn with_force_refresh(mut self, force: bool) -> Self {
		self.force_refresh = force;

		self
	}

	/// Attaches a claims challenge to forward with the refresh grant.
	pub fn with_claims_challenge(mut self, claims: impl Into<String>) -> Self {
		self.claims = Some(claims.into());

		self
	}
}

/// Final outcome handed to the caller: an access token plus the identity it covers.
#[derive(Clone, Debug, PartialEq)]
pub struct AcquiredToken {
	/// Access token to present to the resource server.
	pub access_token: TokenSecret,
	/// Expiry instant callers should honor; the extended expiry for degraded results.
	pub expires_on: OffsetDateTime,
	/// Tenant the token was issued in, when known.
	pub tenant_id: Option<String>,
	/// Identity the token belongs to, when known.
	pub user_info: Option<UserInfo>,
	/// Raw ID token, when one accompanied the grant.
	pub raw_id_token: Option<String>,
	/// Marks a stale token returned under its extended lifetime during an authority brownout.
	pub is_extended_lifetime: bool,
}
impl AcquiredToken {
	/// Builds the result for a cache hit; requires a non-blank stored access token.
	pub(crate) fn from_cache_item(item: &TokenCacheItem) -> Option<Self> {
		let access_token = item.access_token.clone().filter(|secret| !secret.is_blank())?;

		Some(Self {
			access_token,
			expires_on: item.expires_on,
			tenant_id: item.tenant_id.clone(),
			user_info: item.user_info.clone(),
			raw_id_token: item.raw_id_token.clone(),
			is_extended_lifetime: false,
		})
	}

	/// Builds the degraded result that swaps the primary expiry for the extended one.
	pub(crate) fn extended_from_cache_item(item: &TokenCacheItem) -> Option<Self> {
		let extended_expires_on = item.extended_expires_on?;
		let mut token = Self::from_cache_item(item)?;

		token.expires_on = extended_expires_on;
		token.is_extended_lifetime = true;

		Some(token)
	}

	/// Builds the result for a freshly redeemed grant.
	pub(crate) fn from_granted(granted: &GrantedToken) -> Self {
		Self {
			access_token: granted.access_token.clone(),
			expires_on: granted.expires_on,
			tenant_id: granted.tenant_id.clone(),
			user_info: granted.user_info.clone(),
			raw_id_token: granted.raw_id_token.clone(),
			is_extended_lifetime: false,
		}
	}
}
