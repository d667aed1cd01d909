//! Engine-level error types shared across the acquisition chain, protocol client, and stores.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical engine error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::cache::StoreError,
	),
	/// Local configuration or caller-contract problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Provider rejected the refresh grant; the backing cache entry has been evicted.
	#[error("Provider rejected the refresh grant ({code}): {}.", .description.as_deref().unwrap_or("no description"))]
	InvalidGrant {
		/// OAuth error code returned by the token endpoint.
		code: String,
		/// OAuth error description, when supplied.
		description: Option<String>,
	},
	/// Provider returned a terminal OAuth error outside the invalid-grant family.
	#[error("Token endpoint rejected the request ({code}): {}.", .description.as_deref().unwrap_or("no description"))]
	Rejected {
		/// OAuth error code returned by the token endpoint.
		code: String,
		/// OAuth error description, when supplied.
		description: Option<String>,
	},
	/// No user was specified and multiple cached credentials match the request.
	#[error("Multiple cached tokens match the request and no user was specified.")]
	UserMismatch,
	/// The whole fallback chain ran out of usable credentials.
	#[error("No cached credential could be redeemed silently: {reason}.")]
	NoToken {
		/// Human-readable summary of the last chain step.
		reason: String,
	},
}
impl Error {
	/// Returns `true` when the failure is worth one more attempt against the token endpoint.
	///
	/// Covers endpoint timeouts and 5xx-class answers, including 5xx bodies the response parser
	/// could not make sense of. Everything else is terminal for the current refresh tier.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Transient(TransientError::TokenEndpoint { .. }) => true,
			Self::Transient(TransientError::TokenResponseParse { status, .. }) =>
				matches!(status, Some(code) if *code >= 500),
			_ => false,
		}
	}

	/// Maps the error onto the closed [`ErrorCode`] catalog.
	pub fn code(&self) -> ErrorCode {
		match self {
			Self::Storage(_) => ErrorCode::CacheStorageFailure,
			Self::Config(ConfigError::InvalidAuthority { .. }) => ErrorCode::InvalidAuthorityUrl,
			Self::Config(_) => ErrorCode::InvalidArgument,
			Self::Transient(_) => ErrorCode::ServerError,
			Self::Transport(_) => ErrorCode::NetworkFailure,
			Self::InvalidGrant { .. } => ErrorCode::InvalidGrant,
			Self::Rejected { .. } => ErrorCode::ServerRejected,
			Self::UserMismatch => ErrorCode::UserMismatch,
			Self::NoToken { .. } => ErrorCode::AuthFailedNoToken,
		}
	}
}

/// Closed catalog of failure codes surfaced to embedding applications.
///
/// The description lookup is pure data so hosts can map codes onto their own
/// localization or telemetry tables without virtual dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
	/// The silent chain exhausted every refresh tier without obtaining a token.
	AuthFailedNoToken,
	/// Cache store reported a backend or serialization failure.
	CacheStorageFailure,
	/// A stored envelope failed integrity verification and was evicted.
	CacheIntegrityFailure,
	/// Caller supplied an invalid argument (blank identifier, malformed input).
	InvalidArgument,
	/// Authority is not a valid URL.
	InvalidAuthorityUrl,
	/// Provider answered with an invalid-grant-class OAuth error.
	InvalidGrant,
	/// Key vault could not produce usable key material.
	KeyVaultFailure,
	/// Transport-level network failure.
	NetworkFailure,
	/// Provider or network failed in a way that may succeed on retry.
	ServerError,
	/// Provider returned a terminal OAuth error outside the invalid-grant family.
	ServerRejected,
	/// Multiple cached credentials matched an anonymous request.
	UserMismatch,
}
impl ErrorCode {
	/// Returns a stable label suitable for telemetry fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::AuthFailedNoToken => "auth_failed_no_token",
			Self::CacheStorageFailure => "cache_storage_failure",
			Self::CacheIntegrityFailure => "cache_integrity_failure",
			Self::InvalidArgument => "invalid_argument",
			Self::InvalidAuthorityUrl => "invalid_authority_url",
			Self::InvalidGrant => "invalid_grant",
			Self::KeyVaultFailure => "key_vault_failure",
			Self::NetworkFailure => "network_failure",
			Self::ServerError => "server_error",
			Self::ServerRejected => "server_rejected",
			Self::UserMismatch => "user_mismatch",
		}
	}

	/// Returns the human-readable description for the code.
	pub const fn description(self) -> &'static str {
		match self {
			Self::AuthFailedNoToken =>
				"Silent acquisition could not redeem any cached refresh token.",
			Self::CacheStorageFailure => "Token cache storage backend failed.",
			Self::CacheIntegrityFailure =>
				"A cached envelope failed MAC verification or decryption and was evicted.",
			Self::InvalidArgument => "Caller supplied an invalid or blank argument.",
			Self::InvalidAuthorityUrl => "Authority is not a well-formed URL.",
			Self::InvalidGrant => "The refresh token was rejected by the authorization server.",
			Self::KeyVaultFailure => "Platform key vault could not produce usable key material.",
			Self::NetworkFailure => "Network error occurred while calling the token endpoint.",
			Self::ServerError => "The authorization server failed transiently.",
			Self::ServerRejected => "The authorization server rejected the request.",
			Self::UserMismatch =>
				"Multiple cached users match the request; specify a user discriminator.",
		}
	}
}
impl Display for ErrorCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Configuration and caller-contract failures raised by the engine.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Authority (or the token endpoint derived from it) is not a valid URL.
	#[error("Authority is not a valid URL.")]
	InvalidAuthority {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// An identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// A required argument was blank or missing.
	#[error("Argument `{name}` must not be blank.")]
	InvalidArgument {
		/// Name of the offending argument.
		name: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for ConfigError {
	fn from(e: reqwest::Error) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint timed out or answered with a retryable status.
	#[error("Token endpoint returned a retryable failure: {message}.")]
	TokenEndpoint {
		/// Provider- or engine-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn retryability_covers_endpoint_and_5xx_parse_failures() {
		let endpoint: Error = TransientError::TokenEndpoint {
			message: "service unavailable".into(),
			status: Some(503),
			retry_after: None,
		}
		.into();

		assert!(endpoint.is_retryable());

		let rejected =
			Error::InvalidGrant { code: "invalid_grant".into(), description: None };

		assert!(!rejected.is_retryable());
	}

	#[test]
	fn error_codes_expose_pure_descriptions() {
		assert_eq!(ErrorCode::UserMismatch.as_str(), "user_mismatch");
		assert!(ErrorCode::InvalidGrant.description().contains("refresh token"));

		let err = Error::UserMismatch;

		assert_eq!(err.code(), ErrorCode::UserMismatch);
	}

	#[test]
	fn store_error_converts_into_engine_error_with_source() {
		let store_error =
			crate::cache::StoreError::Backend { message: "database unreachable".into() };
		let engine_error: Error = store_error.clone().into();

		assert!(matches!(engine_error, Error::Storage(_)));
		assert!(engine_error.to_string().contains("database unreachable"));

		let source = StdError::source(&engine_error)
			.expect("Engine error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}
}
