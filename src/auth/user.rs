//! User identity attached to cached credentials.

// self
use crate::{_prelude::*, auth::id_token::IdTokenClaims};

/// User discriminator supplied with an acquisition request.
///
/// The caller may pass either the displayable identifier (a UPN-style name) or the unique
/// object identifier; cache matching accepts both. Omitting the discriminator entirely selects
/// the any-user cache partition used by applications that do not track identity.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserIdentifier(String);
impl UserIdentifier {
	/// Creates a user discriminator; blank input is rejected.
	pub fn new(value: impl AsRef<str>) -> Option<Self> {
		let view = value.as_ref().trim();

		if view.is_empty() { None } else { Some(Self(view.to_owned())) }
	}

	/// Returns the raw discriminator value.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Returns the lower-cased form used inside cache keys.
	pub fn to_key_segment(&self) -> String {
		self.0.to_lowercase()
	}
}
impl AsRef<str> for UserIdentifier {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Debug for UserIdentifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "UserIdentifier({})", self.0)
	}
}
impl Display for UserIdentifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Identity attributes extracted from the ID token accompanying a grant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
	/// Immutable unique identifier (object id or subject).
	pub unique_id: Option<String>,
	/// Human-readable identifier (UPN or email).
	pub displayable_id: Option<String>,
}
impl UserInfo {
	/// Builds user info from parsed ID-token claims, preferring stable identifiers.
	pub fn from_claims(claims: &IdTokenClaims) -> Self {
		Self {
			unique_id: claims.object_id.clone().or_else(|| claims.subject.clone()),
			displayable_id: claims.upn.clone().or_else(|| claims.email.clone()),
		}
	}

	/// Returns `true` when the discriminator names this user; matching is case-insensitive
	/// against either identifier.
	pub fn matches(&self, user: &UserIdentifier) -> bool {
		let candidate = user.as_str();

		self.displayable_id
			.as_deref()
			.is_some_and(|id| id.eq_ignore_ascii_case(candidate))
			|| self.unique_id.as_deref().is_some_and(|id| id.eq_ignore_ascii_case(candidate))
	}

	/// Lower-cased identity fingerprint used to deduplicate multi-key cache writes.
	pub(crate) fn fingerprint(&self) -> String {
		format!(
			"{}\u{1}{}",
			self.unique_id.as_deref().unwrap_or_default().to_lowercase(),
			self.displayable_id.as_deref().unwrap_or_default().to_lowercase(),
		)
	}
}

/// Returns `true` when `user` was requested but the cached identity belongs to someone else.
pub fn is_user_mismatch(user: Option<&UserIdentifier>, info: Option<&UserInfo>) -> bool {
	match (user, info) {
		(Some(user), Some(info)) => !info.matches(user),
		_ => false,
	}
}
