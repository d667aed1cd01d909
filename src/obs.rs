//! Optional observability helpers for the silent acquisition chain.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oauth2_silent.flow` with the `flow`
//!   (tier) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `oauth2_silent_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Acquisition tiers observed by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// The whole silent acquisition chain.
	Silent,
	/// Redemption of a regular resource-bound refresh token.
	RegularRefresh,
	/// Redemption of a multi-resource refresh token.
	MultiResourceRefresh,
	/// Redemption of a family refresh token.
	FamilyRefresh,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Silent => "silent",
			FlowKind::RegularRefresh => "refresh_regular",
			FlowKind::MultiResourceRefresh => "refresh_mrrt",
			FlowKind::FamilyRefresh => "refresh_frt",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to an engine helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
