//! Transport primitives for refresh-grant exchanges.
//!
//! The module exposes [`TokenHttpClient`] alongside [`ResponseMetadata`] and
//! [`ResponseMetadataSlot`] so downstream crates can integrate custom HTTP clients
//! without losing the engine's error-classification hooks. Implementations call
//! [`ResponseMetadataSlot::take`] before dispatching a request and
//! [`ResponseMetadataSlot::store`] once an HTTP status or retry hint is known, enabling the
//! transport error mapper to classify failures with consistent metadata.

// std
use std::ops::Deref;
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
#[cfg(feature = "reqwest")]
use oauth2::http::request::Parts;
#[cfg(feature = "reqwest")]
use reqwest::{
	StatusCode,
	header::{AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER, WWW_AUTHENTICATE},
};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;
#[cfg(feature = "reqwest")]
use crate::{error::ConfigError, flows::BrokerConfig, platform::DeviceCertResponder};

/// Authentication scheme marking a device-certificate challenge.
#[cfg(feature = "reqwest")]
const PKEY_AUTH_SCHEME: &str = "PKeyAuth";

/// Abstraction over HTTP transports capable of executing refresh-grant exchanges while
/// publishing response metadata to the engine's error-classification pipeline.
///
/// The trait is the engine's only dependency on an HTTP stack. Callers provide an
/// implementation (typically behind `Arc<T>` where `T: TokenHttpClient`) and the engine
/// requests short-lived [`AsyncHttpClient`] handles that each carry a clone of a
/// [`ResponseMetadataSlot`]. Implementations must be `Send + Sync + 'static` so they can be
/// shared across broker instances, and the handles they return must own whatever state is
/// required so their request futures remain `Send` for the lifetime of the in-flight
/// operation.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// # Metadata Contract
	///
	/// - Call [`ResponseMetadataSlot::take`] before submitting the HTTP request so stale
	///   information never leaks across retries.
	/// - Once an HTTP response (successful or erroneous) provides status headers, save them with
	///   [`ResponseMetadataSlot::store`].
	/// - Never retain the slot clone beyond the lifetime of the returned handle.
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the token endpoint, if available.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
///
/// The engine creates a fresh slot for each token request and reads the captured metadata
/// immediately after the exchange resolves. Transport implementations borrow the slot just
/// long enough to call [`store`](ResponseMetadataSlot::store) and must keep ownership with
/// the engine.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Token requests never follow redirects, matching OAuth 2.0 guidance that token endpoints
/// return results directly instead of delegating to another URI. When a
/// [`DeviceCertResponder`] is attached, a `401` carrying a `PKeyAuth` challenge is answered
/// once by resending the request with the responder's `Authorization` header; everything else
/// about the challenge is opaque to the transport.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
	client: ReqwestClient,
	responder: Option<Arc<dyn DeviceCertResponder>>,
}
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`]. Configure the client to disable redirect
	/// following, because the engine passes it straight into token exchanges.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client, responder: None }
	}

	/// Builds a client honoring the configured connect/read timeouts.
	pub fn from_config(config: &BrokerConfig) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.connect_timeout(config.connect_timeout.unsigned_abs())
			.timeout(config.read_timeout.unsigned_abs())
			.redirect(reqwest::redirect::Policy::none())
			.build()?;

		Ok(Self { client, responder: None })
	}

	/// Attaches the responder consulted for `PKeyAuth` challenges.
	pub fn with_device_cert_responder(mut self, responder: Arc<dyn DeviceCertResponder>) -> Self {
		self.responder = Some(responder);

		self
	}

	pub(crate) fn instrumented(&self, slot: ResponseMetadataSlot) -> InstrumentedHandle {
		InstrumentedHandle::new(self.client.clone(), self.responder.clone(), slot)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.client
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.client
	}
}
#[cfg(feature = "reqwest")]
impl Debug for ReqwestHttpClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ReqwestHttpClient")
			.field("responder_set", &self.responder.is_some())
			.finish_non_exhaustive()
	}
}

#[cfg(feature = "reqwest")]
/// Instrumented adapter that implements [`AsyncHttpClient`] for reqwest.
pub(crate) struct InstrumentedHttpClient {
	client: ReqwestClient,
	responder: Option<Arc<dyn DeviceCertResponder>>,
	slot: ResponseMetadataSlot,
}
#[cfg(feature = "reqwest")]
impl InstrumentedHttpClient {
	async fn send(
		&self,
		parts: &Parts,
		body: Vec<u8>,
		authorization: Option<HeaderValue>,
	) -> Result<reqwest::Response, HttpClientError<ReqwestError>> {
		let mut builder = self
			.client
			.request(parts.method.clone(), parts.uri.to_string())
			.headers(parts.headers.clone())
			.body(body);

		if let Some(authorization) = authorization {
			builder = builder.header(AUTHORIZATION, authorization);
		}

		builder.send().await.map_err(|e| HttpClientError::from(Box::new(e)))
	}

	fn challenge_answer(&self, headers: &HeaderMap, endpoint: &str) -> Option<HeaderValue> {
		let responder = self.responder.as_ref()?;
		let challenge = headers.get(WWW_AUTHENTICATE)?.to_str().ok()?;

		if !challenge.trim_start().starts_with(PKEY_AUTH_SCHEME) {
			return None;
		}

		let answer = responder.respond(challenge, endpoint).ok()?;

		HeaderValue::from_str(&answer).ok()
	}
}

#[cfg(feature = "reqwest")]
/// Public handle returned by [`ReqwestHttpClient`] that satisfies [`TokenHttpClient`].
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
#[cfg(feature = "reqwest")]
impl InstrumentedHandle {
	fn new(
		client: ReqwestClient,
		responder: Option<Arc<dyn DeviceCertResponder>>,
		slot: ResponseMetadataSlot,
	) -> Self {
		Self(Arc::new(InstrumentedHttpClient { client, responder, slot }))
	}
}
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = Arc::clone(&self.0);

		Box::pin(async move {
			client.slot.take();

			let (parts, body) = request.into_parts();
			let mut response = client.send(&parts, body.clone(), None).await?;

			if response.status() == StatusCode::UNAUTHORIZED
				&& let Some(answer) =
					client.challenge_answer(response.headers(), &parts.uri.to_string())
			{
				response = client.send(&parts, body, Some(answer)).await?;
			}

			let status = response.status();
			let headers = response.headers().to_owned();
			let retry_after = parse_retry_after(&headers);

			client.slot.store(ResponseMetadata { status: Some(status.as_u16()), retry_after });

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		self.instrumented(slot)
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(secs as i64));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
