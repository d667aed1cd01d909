//! Authority URL normalization.

// self
use crate::{_prelude::*, error::ConfigError};

const TOKEN_ENDPOINT_PATH: &str = "/oauth2/token";

/// Normalized authority URL of the authorization server.
///
/// Normalization lower-cases the scheme, host, and path and strips the trailing slash, so two
/// spellings of the same tenant always map onto the same cache partition.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Authority(String);
impl Authority {
	/// Parses and normalizes an authority URL.
	pub fn new(value: impl AsRef<str>) -> Result<Self, ConfigError> {
		let view = value.as_ref().trim();

		if view.is_empty() {
			return Err(ConfigError::InvalidArgument { name: "authority" });
		}

		let url =
			Url::parse(view).map_err(|source| ConfigError::InvalidAuthority { source })?;

		if url.host_str().is_none() {
			return Err(ConfigError::InvalidAuthority { source: url::ParseError::EmptyHost });
		}

		let mut normalized = url.to_string().to_lowercase();

		while normalized.ends_with('/') {
			normalized.pop();
		}

		Ok(Self(normalized))
	}

	/// Returns the normalized authority string.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Derives the token endpoint used for refresh-grant requests.
	pub fn token_endpoint(&self) -> Result<Url, ConfigError> {
		Url::parse(&format!("{}{TOKEN_ENDPOINT_PATH}", self.0))
			.map_err(|source| ConfigError::InvalidAuthority { source })
	}

	/// Case-insensitive comparison against another authority string.
	pub fn matches(&self, other: &str) -> bool {
		let trimmed = other.trim_end_matches('/');

		self.0.eq_ignore_ascii_case(trimmed)
	}
}
impl AsRef<str> for Authority {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl From<Authority> for String {
	fn from(value: Authority) -> Self {
		value.0
	}
}
impl TryFrom<String> for Authority {
	type Error = ConfigError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl Debug for Authority {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Authority({})", self.0)
	}
}
impl Display for Authority {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl FromStr for Authority {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn normalization_lower_cases_and_strips_trailing_slash() {
		let a = Authority::new("https://Login.Example.COM/Tenant-1/")
			.expect("Authority fixture should parse.");
		let b = Authority::new("https://login.example.com/tenant-1")
			.expect("Authority fixture should parse.");

		assert_eq!(a, b);
		assert_eq!(a.as_str(), "https://login.example.com/tenant-1");
	}

	#[test]
	fn rejects_blank_and_malformed_input() {
		assert!(matches!(
			Authority::new("   "),
			Err(ConfigError::InvalidArgument { name: "authority" })
		));
		assert!(matches!(
			Authority::new("not a url"),
			Err(ConfigError::InvalidAuthority { .. })
		));
	}

	#[test]
	fn token_endpoint_extends_the_authority_path() {
		let authority =
			Authority::new("https://login.example.com/tenant").expect("Fixture should parse.");
		let endpoint = authority.token_endpoint().expect("Endpoint should derive.");

		assert_eq!(endpoint.as_str(), "https://login.example.com/tenant/oauth2/token");
	}

	#[test]
	fn matches_ignores_case_and_trailing_slash() {
		let authority =
			Authority::new("https://login.example.com/tenant").expect("Fixture should parse.");

		assert!(authority.matches("https://LOGIN.example.com/tenant/"));
		assert!(!authority.matches("https://login.example.com/other"));
	}
}
