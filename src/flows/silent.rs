//! The silent acquisition state machine.
//!
//! One acquisition walks `TryAT → TryRegularRT → TryMRRT → TryFRT`, preferring broader
//! refresh tokens over narrower ones and falling back across tiers when a redemption fails.
//! The MRRT tier runs at most once per acquisition (`attempted_mrrt`), which is what keeps
//! the MRRT ↔ FRT fallback from ping-ponging. The fallback bookkeeping is deliberately
//! asymmetric: when both tiers fail, the FRT answer wins unless the late MRRT attempt
//! produced nothing at all. Changing that ordering changes which error callers see, so it is
//! pinned by the integration tests.

mod metrics;

pub use metrics::SilentMetrics;

// self
use crate::{
	_prelude::*,
	auth::FamilyId,
	cache::{TokenCacheItem, accessor::CacheAccessor},
	flows::{AcquiredToken, AcquisitionRequest, SilentBroker},
	http::TokenHttpClient,
	oauth::{self, GrantedToken, OauthRejection, TokenResult, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl<C, M> SilentBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Acquires an access token without user interaction.
	///
	/// Returns the cached access token when it is fresh, otherwise redeems the best available
	/// refresh token (regular → multi-resource → family) and persists the outcome. Every
	/// failure mode surfaces as a typed [`Error`]; there is no silent-null result.
	pub async fn acquire_token_silent(
		&self,
		request: AcquisitionRequest,
	) -> Result<AcquiredToken> {
		const KIND: FlowKind = FlowKind::Silent;

		let span = FlowSpan::new(KIND, "acquire_token_silent");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.silent_metrics.record_attempt();

		let result =
			span.instrument(SilentAcquisition::new(self, &request).run()).await;

		match &result {
			Ok(_) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
				self.silent_metrics.record_success();
			},
			Err(_) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				self.silent_metrics.record_failure();
			},
		}

		result
	}
}

/// Result threaded through the chain: a token, a terminal OAuth answer, or nothing usable.
enum ChainOutcome {
	Token(AcquiredToken),
	Rejected(OauthRejection),
}

fn is_rejected(outcome: &Option<ChainOutcome>) -> bool {
	matches!(outcome, Some(ChainOutcome::Rejected(_)))
}

enum RedeemResult {
	Granted(GrantedToken),
	Extended(AcquiredToken),
	Rejected(OauthRejection),
}

/// Per-request chain state. Each attempt works on immutable item snapshots and threads the
/// current best fallback answer explicitly; nothing is mutated across tiers.
struct SilentAcquisition<'a, C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	broker: &'a SilentBroker<C, M>,
	request: &'a AcquisitionRequest,
	attempted_mrrt: bool,
	mrrt_item: Option<TokenCacheItem>,
}
impl<'a, C, M> SilentAcquisition<'a, C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn new(broker: &'a SilentBroker<C, M>, request: &'a AcquisitionRequest) -> Self {
		Self { broker, request, attempted_mrrt: false, mrrt_item: None }
	}

	fn accessor(&self) -> CacheAccessor<'a> {
		CacheAccessor::new(
			self.broker.store.as_ref(),
			self.broker.clock.as_ref(),
			&self.broker.config,
		)
	}

	async fn run(mut self) -> Result<AcquiredToken> {
		if let Some(item) = self.accessor().fresh_access_token(self.request).await?
			&& let Some(token) = AcquiredToken::from_cache_item(&item)
		{
			self.broker.silent_metrics.record_cache_hit();

			return Ok(token);
		}

		match self.try_regular_rt().await? {
			Some(ChainOutcome::Token(token)) => Ok(token),
			Some(ChainOutcome::Rejected(rejection)) => Err(rejection.into_error()),
			None => Err(Error::NoToken {
				reason: "no refresh token tier produced a usable credential".into(),
			}),
		}
	}

	/// Regular-RT tier. Prefers the MRRT tier whenever the entry is marked multi-resource or
	/// a separate MRRT entry exists, so narrow per-resource redemptions do not pile up
	/// redundant round trips.
	async fn try_regular_rt(&mut self) -> Result<Option<ChainOutcome>> {
		self.accessor().ensure_unambiguous_regular(self.request).await?;

		let Some(item) = self.accessor().regular_item(self.request).await? else {
			return self.try_mrrt().await;
		};

		if item.refresh_secret().is_none() {
			return self.try_mrrt().await;
		}
		if item.is_multi_resource || self.accessor().mrrt_entry_exists(self.request).await? {
			return self.try_mrrt().await;
		}

		let outcome = self.redeem(FlowKind::RegularRefresh, &item).await?;

		if is_rejected(&outcome) && !self.attempted_mrrt {
			// The narrow token is dead; a broader grant may still cover the resource.
			return match self.try_mrrt().await? {
				Some(next) => Ok(Some(next)),
				None => Ok(outcome),
			};
		}

		Ok(outcome)
	}

	/// MRRT tier. A family-joined MRRT defers to the FRT tier first without burning the
	/// one-shot MRRT attempt.
	async fn try_mrrt(&mut self) -> Result<Option<ChainOutcome>> {
		self.accessor().ensure_unambiguous_mrrt(self.request).await?;
		self.mrrt_item = self.accessor().mrrt_item(self.request).await?;

		let Some(item) = self.mrrt_item.clone() else {
			return self.try_frt(self.broker.config.default_family_id.clone(), None).await;
		};

		if let Some(family) = item.family_id.clone() {
			return self.try_frt(family, None).await;
		}

		let outcome = self.use_mrrt().await?;

		if is_rejected(&outcome) {
			// Entries written before family signaling may still have a family sibling under
			// the default id.
			let family = item
				.family_id
				.clone()
				.unwrap_or_else(|| self.broker.config.default_family_id.clone());

			return self.try_frt(family, outcome).await;
		}

		Ok(outcome)
	}

	/// FRT tier. `fallback` carries the MRRT answer to return when no family entry exists.
	async fn try_frt(
		&mut self,
		family: FamilyId,
		fallback: Option<ChainOutcome>,
	) -> Result<Option<ChainOutcome>> {
		let Some(item) = self.accessor().frt_item(&family, self.request).await? else {
			if !self.attempted_mrrt {
				return self.use_mrrt().await;
			}

			return Ok(fallback);
		};
		let outcome = self.redeem(FlowKind::FamilyRefresh, &item).await?;

		if is_rejected(&outcome) && !self.attempted_mrrt {
			let retried = self.use_mrrt().await?;

			// The FRT failure stands unless the late MRRT attempt produced an answer.
			return Ok(match retried {
				Some(result) => Some(result),
				None => outcome,
			});
		}

		Ok(outcome)
	}

	/// Burns the one-shot MRRT attempt, whether or not an entry exists.
	async fn use_mrrt(&mut self) -> Result<Option<ChainOutcome>> {
		self.attempted_mrrt = true;

		let Some(item) = self.mrrt_item.clone() else { return Ok(None) };

		self.redeem(FlowKind::MultiResourceRefresh, &item).await
	}

	/// Redeems one cached item's refresh token and reconciles the cache with the answer.
	async fn redeem(
		&self,
		kind: FlowKind,
		item: &TokenCacheItem,
	) -> Result<Option<ChainOutcome>> {
		let Some(refresh_token) = item.refresh_secret() else { return Ok(None) };

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		match self.acquire_with_refresh(refresh_token).await? {
			RedeemResult::Granted(mut granted) => {
				obs::record_flow_outcome(kind, FlowOutcome::Success);
				granted.merge_identity_from(item);
				self.accessor().persist_grant(self.request, &granted).await?;

				Ok(Some(ChainOutcome::Token(AcquiredToken::from_granted(&granted))))
			},
			RedeemResult::Extended(token) => {
				obs::record_flow_outcome(kind, FlowOutcome::Success);

				// Degraded results are never persisted; the stored entry stays as-is for the
				// next attempt against a recovered authority.
				Ok(Some(ChainOutcome::Token(token)))
			},
			RedeemResult::Rejected(rejection) => {
				obs::record_flow_outcome(kind, FlowOutcome::Failure);

				if rejection.is_invalid_grant() {
					self.accessor().evict_for_item(item, &self.request.resource).await?;
				}

				Ok(Some(ChainOutcome::Rejected(rejection)))
			},
		}
	}

	/// One redemption including the transient retry and the extended-lifetime recovery.
	async fn acquire_with_refresh(&self, refresh_token: &str) -> Result<RedeemResult> {
		match oauth::redeem_refresh_token(self.broker, self.request, refresh_token).await {
			Ok(TokenResult::Granted(granted)) => Ok(RedeemResult::Granted(granted)),
			Ok(TokenResult::Rejected(rejection)) => Ok(RedeemResult::Rejected(rejection)),
			Err(err)
				if err.is_retryable() && self.broker.config.extended_lifetime_enabled =>
			{
				if let Some(stale) = self.accessor().stale_access_token(self.request).await?
					&& let Some(token) = AcquiredToken::extended_from_cache_item(&stale)
				{
					return Ok(RedeemResult::Extended(token));
				}

				Err(err)
			},
			Err(err) => Err(err),
		}
	}
}
