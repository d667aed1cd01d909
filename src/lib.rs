//! Rust’s silent OAuth 2.0 token engine—cache-first acquisition chains, family-aware refresh
//! fallbacks, and encrypted-at-rest token stores in one crate built for native clients.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod platform;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		cache::{MemoryCacheStore, TokenCacheStore},
		flows::{BrokerConfig, SilentBroker},
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		platform::SystemClock,
	};

	/// Broker type alias used by reqwest-backed integration tests.
	pub type ReqwestTestBroker = SilentBroker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Constructs a [`SilentBroker`] backed by an in-memory store, the system clock, and the
	/// reqwest transport used across integration tests. The retry delay is zeroed so transient
	/// scenarios run without wall-clock pauses.
	pub fn build_reqwest_test_broker(
		config: BrokerConfig,
	) -> (ReqwestTestBroker, Arc<MemoryCacheStore>) {
		let store_backend = Arc::new(MemoryCacheStore::default());
		let store: Arc<dyn TokenCacheStore> = store_backend.clone();
		let broker = SilentBroker::with_http_client(
			store,
			config.with_retry_delay(Duration::ZERO),
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
			Arc::new(SystemClock),
		);

		(broker, store_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {httpmock as _, tokio as _};
