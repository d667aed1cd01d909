//! Redacted wrapper for token material.

// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when the secret is empty or whitespace.
	///
	/// Blank refresh tokens occur in practice: legacy cache entries stored alongside an access
	/// token may carry an empty refresh slot, and the chain must treat them as unusable.
	pub fn is_blank(&self) -> bool {
		self.0.trim().is_empty()
	}

	/// Case-insensitive comparison against another secret.
	pub fn matches(&self, other: &TokenSecret) -> bool {
		self.0.eq_ignore_ascii_case(&other.0)
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn secret_formatters_redact() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}

	#[test]
	fn blank_detection_covers_whitespace() {
		assert!(TokenSecret::new("").is_blank());
		assert!(TokenSecret::new("   ").is_blank());
		assert!(!TokenSecret::new("rt").is_blank());
	}
}
