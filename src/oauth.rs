//! Refresh-grant facade and response mapping.
//!
//! The facade drives `grant_type=refresh_token` exchanges through the `oauth2` crate with a
//! custom token-response type carrying the directory-specific extras (`resource`, `foci`,
//! `ext_expires_in`, `id_token`). OAuth error answers become [`TokenResult::Rejected`] data,
//! not errors; only transport, transient, and protocol failures surface as [`Error`].

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, Client, ClientId as OauthClientId, EndpointNotSet, EndpointSet, ExtraTokenFields,
	HttpClientError, RefreshToken, RequestTokenError, StandardRevocableToken,
	StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
use serde::{Deserializer, de::Error as DeError};
// self
use crate::{
	_prelude::*,
	auth::{FamilyId, IdTokenParser, ResourceId, TokenSecret, UserInfo},
	cache::TokenCacheItem,
	error::{ConfigError, TransientError, TransportError},
	flows::{AcquisitionRequest, SilentBroker},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

/// Token lifetime applied when the endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN: Duration = Duration::seconds(3600);

type AadTokenResponse = StandardTokenResponse<AadExtraFields, BasicTokenType>;
type ConfiguredRefreshClient = Client<
	BasicErrorResponse,
	AadTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Extra fields the directory attaches to refresh responses beyond RFC 6749.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AadExtraFields {
	/// Resource the grant was issued for; its presence marks a multi-resource refresh token.
	#[serde(default)]
	pub resource: Option<String>,
	/// Family identifier when the client belongs to a token family.
	#[serde(default)]
	pub foci: Option<String>,
	/// Extended lifetime in seconds, honored during authority brownouts.
	#[serde(default, deserialize_with = "de_opt_seconds")]
	pub ext_expires_in: Option<i64>,
	/// Raw ID token accompanying the grant.
	#[serde(default)]
	pub id_token: Option<String>,
}
impl ExtraTokenFields for AadExtraFields {}

/// Terminal OAuth error answer carried as data through the fallback chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OauthRejection {
	/// OAuth `error` field.
	pub code: String,
	/// OAuth `error_description` field, when supplied.
	pub description: Option<String>,
	/// HTTP status the answer arrived with, when known.
	pub http_status: Option<u16>,
}
impl OauthRejection {
	/// Returns `true` for the invalid-grant error family; these kill the refresh token that
	/// was redeemed and trigger eviction of its cache entry.
	pub fn is_invalid_grant(&self) -> bool {
		self.code.eq_ignore_ascii_case("invalid_grant")
			|| self.code.eq_ignore_ascii_case("access_denied")
	}

	/// Returns `true` when the answer signals a transient authority failure.
	pub fn is_transient(&self) -> bool {
		self.code.eq_ignore_ascii_case("server_error")
			|| self.code.eq_ignore_ascii_case("temporarily_unavailable")
			|| matches!(self.http_status, Some(status) if status == 429 || status >= 500)
	}

	/// Converts the rejection into the matching terminal [`Error`].
	pub fn into_error(self) -> Error {
		if self.is_invalid_grant() {
			Error::InvalidGrant { code: self.code, description: self.description }
		} else {
			Error::Rejected { code: self.code, description: self.description }
		}
	}
}

/// Successfully redeemed grant, normalized for cache persistence.
#[derive(Clone, Debug, PartialEq)]
pub struct GrantedToken {
	/// Fresh access token.
	pub access_token: TokenSecret,
	/// Refresh token to keep using; a response without one inherits the redeemed secret.
	pub refresh_token: TokenSecret,
	/// Primary expiry instant.
	pub expires_on: OffsetDateTime,
	/// Extended expiry instant, when the authority granted one.
	pub extended_expires_on: Option<OffsetDateTime>,
	/// Marks the refresh token as valid for any resource under the client.
	pub is_multi_resource: bool,
	/// Family the client belongs to, when signaled.
	pub family_id: Option<FamilyId>,
	/// Identity extracted from the accompanying ID token.
	pub user_info: Option<UserInfo>,
	/// Tenant extracted from the accompanying ID token.
	pub tenant_id: Option<String>,
	/// Raw ID token.
	pub raw_id_token: Option<String>,
}
impl GrantedToken {
	/// Backfills identity fields from the cache entry that was redeemed.
	///
	/// Refresh responses frequently omit the ID token; the entry that held the refresh token
	/// already knows who it belongs to.
	pub(crate) fn merge_identity_from(&mut self, item: &TokenCacheItem) {
		if self.user_info.is_none() {
			self.user_info = item.user_info.clone();
		}
		if self.tenant_id.is_none() {
			self.tenant_id = item.tenant_id.clone();
		}
		if self.raw_id_token.is_none() {
			self.raw_id_token = item.raw_id_token.clone();
		}
	}
}

/// Outcome of one refresh-grant exchange.
#[derive(Clone, Debug)]
pub enum TokenResult {
	/// The endpoint issued a new access token.
	Granted(GrantedToken),
	/// The endpoint answered with a terminal OAuth error.
	Rejected(OauthRejection),
}

/// Maps HTTP transport failures into engine [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into an engine error.
	fn map_transport_error(
		&self,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_unknown_transport_error(meta),
		}
	}
}

pub(crate) struct RefreshFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredRefreshClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> RefreshFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds a facade targeting the request's authority and client.
	pub(crate) fn from_request(
		request: &AcquisitionRequest,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self> {
		let token_url = TokenUrl::from_url(request.authority.token_endpoint()?);
		let oauth_client: ConfiguredRefreshClient =
			Client::new(OauthClientId::new(request.client_id.as_ref().to_owned()))
				// Public native client: the identifier travels in the form body.
				.set_auth_type(AuthType::RequestBody)
				.set_token_uri(token_url);

		Ok(Self { oauth_client, http_client, error_mapper })
	}

	/// Performs one refresh-grant exchange.
	pub(crate) fn refresh_token<'a>(
		&'a self,
		refresh_token: &'a str,
		resource: Option<&'a ResourceId>,
		claims: Option<&'a str>,
		issued_at: OffsetDateTime,
		parser: &'a dyn IdTokenParser,
	) -> FacadeFuture<'a, TokenResult> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let secret = RefreshToken::new(refresh_token.to_owned());
			let mut token_request = self.oauth_client.exchange_refresh_token(&secret);

			if let Some(resource) = resource {
				token_request = token_request.add_extra_param("resource", resource.as_ref());
			}
			if let Some(claims) = claims {
				token_request = token_request.add_extra_param("claims", claims);
			}

			match token_request.request_async(&instrumented).await {
				Ok(response) => Ok(TokenResult::Granted(map_granted(
					response,
					refresh_token,
					issued_at,
					parser,
				))),
				Err(err) =>
					match map_request_error(meta.take(), err, self.error_mapper.as_ref()) {
						RefreshFailure::Rejected(rejection) =>
							Ok(TokenResult::Rejected(rejection)),
						RefreshFailure::Failed(error) => Err(error),
					},
			}
		})
	}
}

/// Redeems `refresh_token` for the request, retrying once after a fixed delay when the first
/// attempt fails transiently. A still-transient second failure propagates as the retryable
/// signal the chain may convert into an extended-lifetime result.
pub(crate) async fn redeem_refresh_token<C, M>(
	broker: &SilentBroker<C, M>,
	request: &AcquisitionRequest,
	refresh_token: &str,
) -> Result<TokenResult>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let facade = RefreshFacade::from_request(
		request,
		broker.http_client.clone(),
		broker.transport_mapper.clone(),
	)?;
	let mut outcome = facade
		.refresh_token(
			refresh_token,
			Some(&request.resource),
			request.claims.as_deref(),
			broker.clock.now(),
			broker.id_token_parser.as_ref(),
		)
		.await;

	if outcome.as_ref().is_err_and(Error::is_retryable) {
		broker.clock.sleep(broker.config.retry_delay).await;

		outcome = facade
			.refresh_token(
				refresh_token,
				Some(&request.resource),
				request.claims.as_deref(),
				broker.clock.now(),
				broker.id_token_parser.as_ref(),
			)
			.await;
	}

	outcome
}

enum RefreshFailure {
	Rejected(OauthRejection),
	Failed(Error),
}

fn map_granted(
	response: AadTokenResponse,
	sent_refresh: &str,
	issued_at: OffsetDateTime,
	parser: &dyn IdTokenParser,
) -> GrantedToken {
	let access_token = TokenSecret::new(response.access_token().secret().clone());
	let refresh_token = response
		.refresh_token()
		.map(|token| TokenSecret::new(token.secret().clone()))
		.filter(|secret| !secret.is_blank())
		.unwrap_or_else(|| TokenSecret::new(sent_refresh));
	let expires_in = response
		.expires_in()
		.map(|lifetime| Duration::seconds(lifetime.as_secs().min(i64::MAX as u64) as i64))
		.unwrap_or(DEFAULT_EXPIRES_IN);
	let extras = response.extra_fields();
	let extended_expires_on =
		extras.ext_expires_in.map(|seconds| issued_at + Duration::seconds(seconds));
	let is_multi_resource = extras.resource.is_some() && !refresh_token.is_blank();
	let family_id = extras.foci.as_deref().and_then(|foci| FamilyId::new(foci).ok());
	let raw_id_token = extras.id_token.clone().filter(|raw| !raw.trim().is_empty());
	let claims = raw_id_token.as_deref().and_then(|raw| parser.parse(raw).ok());
	let (user_info, tenant_id) = match &claims {
		Some(claims) => (Some(UserInfo::from_claims(claims)), claims.tenant_id.clone()),
		None => (None, None),
	};

	GrantedToken {
		access_token,
		refresh_token,
		expires_on: issued_at + expires_in,
		extended_expires_on,
		is_multi_resource,
		family_id,
		user_info,
		tenant_id,
		raw_id_token,
	}
}

fn map_request_error<E, M>(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> RefreshFailure
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => {
			let rejection = OauthRejection {
				code: response.error().as_ref().to_string(),
				description: response.error_description().cloned(),
				http_status: meta_status(meta_ref),
			};

			if rejection.is_transient() {
				RefreshFailure::Failed(
					TransientError::TokenEndpoint {
						message: format!(
							"Token endpoint answered {} transiently",
							rejection.code,
						),
						status: meta_status(meta_ref),
						retry_after: meta_retry_after(meta_ref),
					}
					.into(),
				)
			} else {
				RefreshFailure::Rejected(rejection)
			}
		},
		RequestTokenError::Request(error) =>
			RefreshFailure::Failed(mapper.map_transport_error(meta_ref, error)),
		RequestTokenError::Parse(error, _body) => RefreshFailure::Failed(
			TransientError::TokenResponseParse { source: error, status: meta_status(meta_ref) }
				.into(),
		),
		RequestTokenError::Other(message) => RefreshFailure::Failed(
			TransientError::TokenEndpoint {
				message: format!("Token endpoint returned an unexpected response: {message}"),
				status: meta_status(meta_ref),
				retry_after: meta_retry_after(meta_ref),
			}
			.into(),
		),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: "Request timed out while calling the token endpoint".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

fn map_generic_transport_error(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	TransientError::TokenEndpoint {
		message: format!("HTTP client error occurred while calling the token endpoint: {message}"),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn map_unknown_transport_error(meta: Option<&ResponseMetadata>) -> Error {
	TransientError::TokenEndpoint {
		message: "HTTP client error occurred while calling the token endpoint".into(),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

fn de_opt_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	// The directory has been observed sending the field both as a number and as a string.
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Num(i64),
		Str(String),
	}

	match Option::<Raw>::deserialize(deserializer)? {
		None => Ok(None),
		Some(Raw::Num(value)) => Ok(Some(value)),
		Some(Raw::Str(value)) if value.trim().is_empty() => Ok(None),
		Some(Raw::Str(value)) => value.trim().parse().map(Some).map_err(DeError::custom),
	}
}
