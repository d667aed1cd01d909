//! Deterministic cache key construction.

// self
use crate::{
	_prelude::*,
	auth::{Authority, ClientId, FamilyId, ResourceId, UserIdentifier},
};

/// Discriminator segment prefix marking family entries.
const FAMILY_SEGMENT_PREFIX: &str = "foci-";
const SEPARATOR: char = '$';

/// Deterministic lookup key for one cached credential grouping.
///
/// The key is a pure function of its inputs: authority (normalized), resource (omitted for
/// multi-resource and family entries), client id (omitted for family entries), the
/// multi-resource marker, and an optional user discriminator. Omitting the user produces the
/// distinct any-user key used by applications that do not track identity; it is never aliased
/// to a concrete user's key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
	authority: Authority,
	resource: Option<String>,
	client: Option<String>,
	multi_resource: bool,
	user: Option<String>,
	family: Option<String>,
}
impl CacheKey {
	/// Builds the key for a regular (resource-bound) entry.
	pub fn regular(
		authority: &Authority,
		resource: &ResourceId,
		client: &ClientId,
		user: Option<&UserIdentifier>,
	) -> Self {
		Self {
			authority: authority.clone(),
			resource: Some(resource.to_key_segment()),
			client: Some(client.to_key_segment()),
			multi_resource: false,
			user: user.map(UserIdentifier::to_key_segment),
			family: None,
		}
	}

	/// Builds the key for a multi-resource refresh-token entry; the resource is omitted.
	pub fn multi_resource(
		authority: &Authority,
		client: &ClientId,
		user: Option<&UserIdentifier>,
	) -> Self {
		Self {
			authority: authority.clone(),
			resource: None,
			client: Some(client.to_key_segment()),
			multi_resource: true,
			user: user.map(UserIdentifier::to_key_segment),
			family: None,
		}
	}

	/// Builds the key for a family refresh-token entry; resource and client are omitted.
	pub fn family(
		authority: &Authority,
		family: &FamilyId,
		user: Option<&UserIdentifier>,
	) -> Self {
		Self {
			authority: authority.clone(),
			resource: None,
			client: None,
			multi_resource: true,
			user: user.map(UserIdentifier::to_key_segment),
			family: Some(family.to_key_segment()),
		}
	}

	/// Renders the canonical string form used to address the underlying store.
	pub fn render(&self) -> String {
		let mut buf = String::with_capacity(96);

		buf.push_str(self.authority.as_str());
		buf.push(SEPARATOR);
		buf.push_str(self.resource.as_deref().unwrap_or_default());
		buf.push(SEPARATOR);
		buf.push_str(self.client.as_deref().unwrap_or_default());
		buf.push(SEPARATOR);
		buf.push(if self.multi_resource { 'y' } else { 'n' });
		buf.push(SEPARATOR);
		buf.push_str(self.user.as_deref().unwrap_or_default());

		if let Some(family) = &self.family {
			buf.push(SEPARATOR);
			buf.push_str(FAMILY_SEGMENT_PREFIX);
			buf.push_str(family);
		}

		buf
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.render())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn authority() -> Authority {
		Authority::new("https://login.example.com/tenant").expect("Fixture should parse.")
	}

	fn client() -> ClientId {
		ClientId::new("Client-1").expect("Fixture should be valid.")
	}

	fn resource() -> ResourceId {
		ResourceId::new("api://Payments").expect("Fixture should be valid.")
	}

	fn user(raw: &str) -> UserIdentifier {
		UserIdentifier::new(raw).expect("Fixture should be valid.")
	}

	#[test]
	fn keys_are_pure_and_stable() {
		let a = CacheKey::regular(&authority(), &resource(), &client(), Some(&user("Ada")));
		let b = CacheKey::regular(&authority(), &resource(), &client(), Some(&user("ada")));

		assert_eq!(a, b, "Key construction must be case-insensitive over its inputs.");
		assert_eq!(a.render(), b.render());
		assert_eq!(
			a.render(),
			"https://login.example.com/tenant$api://payments$client-1$n$ada",
		);
	}

	#[test]
	fn user_presence_partitions_the_key_space() {
		let anonymous = CacheKey::regular(&authority(), &resource(), &client(), None);
		let named = CacheKey::regular(&authority(), &resource(), &client(), Some(&user("ada")));

		assert_ne!(anonymous, named);
		assert_ne!(anonymous.render(), named.render());
	}

	#[test]
	fn entry_shapes_render_distinct_keys() {
		let ada = user("ada");
		let regular = CacheKey::regular(&authority(), &resource(), &client(), Some(&ada));
		let mrrt = CacheKey::multi_resource(&authority(), &client(), Some(&ada));
		let frt = CacheKey::family(&authority(), &FamilyId::well_known(), Some(&ada));

		assert_ne!(regular.render(), mrrt.render());
		assert_ne!(mrrt.render(), frt.render());
		assert_eq!(mrrt.render(), "https://login.example.com/tenant$$client-1$y$ada");
		assert_eq!(frt.render(), "https://login.example.com/tenant$$$y$ada$foci-1");
	}
}
