//! Strongly typed identifiers enforced across the engine domain.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}

			/// Returns the lower-cased form used inside cache keys.
			pub fn to_key_segment(&self) -> String {
				self.0.to_lowercase()
			}

			/// Case-insensitive comparison against a raw string.
			pub fn matches(&self, other: &str) -> bool {
				self.0.eq_ignore_ascii_case(other)
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 256;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty or whitespace.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (client, resource, family).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (client, resource, family).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (client, resource, family).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! { ClientId, "OAuth 2.0 client identifier registered with the authority.", "Client" }
def_id! { ResourceId, "Identifier of the resource server an access token is scoped to.", "Resource" }
def_id! { FamilyId, "Identifier shared across a family of related client applications.", "Family" }

impl FamilyId {
	/// Well-known family identifier the authorization server assigns to first-party families.
	pub const WELL_KNOWN: &'static str = "1";

	/// Returns the well-known default family identifier.
	pub fn well_known() -> Self {
		Self(Self::WELL_KNOWN.to_owned())
	}
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_reject_blank_and_whitespace() {
		assert!(ClientId::new("").is_err());
		assert!(ClientId::new("client id").is_err(), "Embedded whitespace must be rejected.");
		assert!(ResourceId::new(" https://api.example.com").is_err());

		let client = ClientId::new("Client-123").expect("Client fixture should be valid.");

		assert_eq!(client.as_ref(), "Client-123");
		assert_eq!(client.to_key_segment(), "client-123");
		assert!(client.matches("CLIENT-123"));
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let payload = "\"api://resource-42\"";
		let resource: ResourceId =
			serde_json::from_str(payload).expect("Resource should deserialize successfully.");

		assert_eq!(resource.as_ref(), "api://resource-42");
		assert!(serde_json::from_str::<ResourceId>("\"with space\"").is_err());
	}

	#[test]
	fn well_known_family_id_is_stable() {
		assert_eq!(FamilyId::well_known().as_ref(), "1");

		let exact = "a".repeat(IDENTIFIER_MAX_LEN);

		FamilyId::new(&exact).expect("Exact length should succeed.");
		assert!(FamilyId::new(format!("{exact}a")).is_err());
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<ClientId, u8> = HashMap::from_iter([(
			ClientId::new("client-123").expect("Client used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("client-123"), Some(&7));
	}
}
