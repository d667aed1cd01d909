//! Silent acquisition orchestration.

pub mod common;
pub mod silent;

pub use common::*;
pub use silent::*;

// self
use crate::{
	_prelude::*,
	auth::{DefaultIdTokenParser, FamilyId, IdTokenParser},
	cache::TokenCacheStore,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	platform::Clock,
};
#[cfg(feature = "reqwest")]
use crate::{
	error::ConfigError,
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	platform::SystemClock,
};

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestSilentBroker = SilentBroker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Engine configuration passed into constructors.
///
/// There is deliberately no process-wide settings object; every broker (and store) receives
/// its own immutable copy.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
	/// Tokens expiring within this window count as expired and are refreshed proactively.
	pub expiration_buffer: Duration,
	/// Allows returning a stale token under its extended expiry during authority brownouts.
	pub extended_lifetime_enabled: bool,
	/// Transport connect timeout.
	pub connect_timeout: Duration,
	/// Transport read timeout.
	pub read_timeout: Duration,
	/// Pause before the single transient-failure retry.
	pub retry_delay: Duration,
	/// Family id assumed when an entry predates family signaling.
	pub default_family_id: FamilyId,
}
impl BrokerConfig {
	/// Overrides the expiration buffer (defaults to 300 seconds).
	pub fn with_expiration_buffer(mut self, buffer: Duration) -> Self {
		self.expiration_buffer = if buffer.is_negative() { Duration::ZERO } else { buffer };

		self
	}

	/// Enables or disables extended-lifetime (degraded) results.
	pub fn with_extended_lifetime(mut self, enabled: bool) -> Self {
		self.extended_lifetime_enabled = enabled;

		self
	}

	/// Overrides the transport connect timeout (defaults to 30 seconds).
	pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
		self.connect_timeout = timeout;

		self
	}

	/// Overrides the transport read timeout (defaults to 30 seconds).
	pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
		self.read_timeout = timeout;

		self
	}

	/// Overrides the transient-retry pause (defaults to 1 second).
	pub fn with_retry_delay(mut self, delay: Duration) -> Self {
		self.retry_delay = if delay.is_negative() { Duration::ZERO } else { delay };

		self
	}
}
impl Default for BrokerConfig {
	fn default() -> Self {
		Self {
			expiration_buffer: Duration::seconds(300),
			extended_lifetime_enabled: false,
			connect_timeout: Duration::seconds(30),
			read_timeout: Duration::seconds(30),
			retry_delay: Duration::seconds(1),
			default_family_id: FamilyId::well_known(),
		}
	}
}

/// Coordinates silent token acquisition against one cache store and transport.
///
/// The broker owns the store, transport, clock, and ID-token parser so the chain
/// implementation can focus on fallback logic. Authority, client, resource, and user all
/// travel per-request; a single broker serves any number of tenants.
#[derive(Clone)]
pub struct SilentBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Cache store consulted and updated by every acquisition.
	pub store: Arc<dyn TokenCacheStore>,
	/// HTTP client wrapper used for every token-endpoint request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Time source for expiry math and retry pacing.
	pub clock: Arc<dyn Clock>,
	/// Parser extracting identity claims from ID tokens.
	pub id_token_parser: Arc<dyn IdTokenParser>,
	/// Immutable engine configuration.
	pub config: BrokerConfig,
	/// Shared counters for silent-flow outcomes.
	pub silent_metrics: Arc<SilentMetrics>,
}
impl<C, M> SilentBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		store: Arc<dyn TokenCacheStore>,
		config: BrokerConfig,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			store,
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			clock,
			id_token_parser: Arc::new(DefaultIdTokenParser),
			config,
			silent_metrics: Default::default(),
		}
	}

	/// Replaces the ID-token parser (defaults to the signature-less payload parser).
	pub fn with_id_token_parser(mut self, parser: Arc<dyn IdTokenParser>) -> Self {
		self.id_token_parser = parser;

		self
	}
}
#[cfg(feature = "reqwest")]
impl ReqwestSilentBroker {
	/// Creates a broker with a reqwest transport honoring the configured timeouts and the
	/// system clock.
	pub fn new(store: Arc<dyn TokenCacheStore>, config: BrokerConfig) -> Result<Self, ConfigError> {
		let http_client = ReqwestHttpClient::from_config(&config)?;

		Ok(Self::with_http_client(
			store,
			config,
			http_client,
			Arc::new(ReqwestTransportErrorMapper),
			Arc::new(SystemClock),
		))
	}
}
impl<C, M> Debug for SilentBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SilentBroker").field("config", &self.config).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn config_builders_clamp_negative_durations() {
		let config = BrokerConfig::default()
			.with_retry_delay(Duration::seconds(-5))
			.with_expiration_buffer(Duration::seconds(-1));

		assert_eq!(config.retry_delay, Duration::ZERO);
		assert_eq!(config.expiration_buffer, Duration::ZERO);
		assert!(!config.extended_lifetime_enabled);
		assert_eq!(config.default_family_id.as_ref(), "1");
	}
}
