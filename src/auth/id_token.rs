//! ID-token claim extraction.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::_prelude::*;

/// Claims the engine extracts from an OpenID Connect ID token.
///
/// Only the fields the cache and user model consume are surfaced; everything else in the
/// payload is ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
	/// Subject claim (`sub`).
	#[serde(default, rename = "sub")]
	pub subject: Option<String>,
	/// Object identifier claim (`oid`).
	#[serde(default, rename = "oid")]
	pub object_id: Option<String>,
	/// Tenant identifier claim (`tid`).
	#[serde(default, rename = "tid")]
	pub tenant_id: Option<String>,
	/// User principal name claim (`upn`).
	#[serde(default)]
	pub upn: Option<String>,
	/// Email claim; some directories return it instead of a UPN.
	#[serde(default)]
	pub email: Option<String>,
}

/// Error returned when an ID token cannot be parsed.
#[derive(Debug, ThisError)]
pub enum IdTokenError {
	/// The token does not have the `header.payload.signature` shape.
	#[error("ID token is not a three-segment JWT.")]
	MalformedToken,
	/// The payload segment is not valid base64url.
	#[error("ID token payload is not valid base64url.")]
	PayloadEncoding(#[from] base64::DecodeError),
	/// The payload decodes but is not the expected JSON object.
	#[error("ID token payload is not a JSON claims object.")]
	PayloadJson(#[from] serde_json::Error),
}

/// Collaborator extracting claims from a raw ID token.
///
/// The engine never validates signatures; the token arrived over the same TLS channel as the
/// access token it accompanies. Hosts that require validation inject their own parser.
pub trait IdTokenParser
where
	Self: Send + Sync,
{
	/// Parses `raw` into the claims the engine consumes.
	fn parse(&self, raw: &str) -> Result<IdTokenClaims, IdTokenError>;
}

/// Default parser decoding the JWT payload segment without signature validation.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultIdTokenParser;
impl IdTokenParser for DefaultIdTokenParser {
	fn parse(&self, raw: &str) -> Result<IdTokenClaims, IdTokenError> {
		let mut segments = raw.split('.');
		let payload = match (segments.next(), segments.next(), segments.next()) {
			(Some(_), Some(payload), Some(_)) if segments.next().is_none() => payload,
			_ => return Err(IdTokenError::MalformedToken),
		};
		let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;

		Ok(serde_json::from_slice(&decoded)?)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn encode_token(payload: &serde_json::Value) -> String {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
		let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());

		format!("{header}.{body}.signature")
	}

	#[test]
	fn parses_expected_claims_and_ignores_extras() {
		let raw = encode_token(&serde_json::json!({
			"sub": "subject-1",
			"oid": "object-1",
			"tid": "tenant-1",
			"upn": "ada@example.com",
			"aud": "ignored",
			"exp": 1_700_000_000,
		}));
		let claims =
			DefaultIdTokenParser.parse(&raw).expect("Claims fixture should parse cleanly.");

		assert_eq!(claims.subject.as_deref(), Some("subject-1"));
		assert_eq!(claims.object_id.as_deref(), Some("object-1"));
		assert_eq!(claims.tenant_id.as_deref(), Some("tenant-1"));
		assert_eq!(claims.upn.as_deref(), Some("ada@example.com"));
		assert_eq!(claims.email, None);
	}

	#[test]
	fn rejects_non_jwt_shapes() {
		assert!(matches!(
			DefaultIdTokenParser.parse("only-one-segment"),
			Err(IdTokenError::MalformedToken)
		));
		assert!(matches!(
			DefaultIdTokenParser.parse("a.b.c.d"),
			Err(IdTokenError::MalformedToken)
		));
		assert!(DefaultIdTokenParser.parse("a.!!!.c").is_err());
	}
}
