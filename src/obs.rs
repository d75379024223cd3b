//! Optional observability helpers for claims and pool maintenance.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (on by default) to run each claim inside a span named `keygate.claim` with
//!   a `stage` field, and to emit store maintenance events. Keys only ever appear by fingerprint.
//! - Enable `metrics` to increment `keygate_claim_total` (labeled by `outcome`) for every claim
//!   and `keygate_keys_generated_total` whenever the pool is replenished.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;
pub(crate) use tracing::{log_debug, log_event, log_info, log_warn};

// self
use crate::_prelude::*;

/// Outcome labels recorded for each claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClaimOutcomeLabel {
	/// Entry to [`crate::dispenser::KeyDispenser::claim`].
	Attempt,
	/// A key was handed out.
	Granted,
	/// The client exhausted its window budget.
	RateLimited,
	/// The pool had no keys left.
	NoKeys,
	/// The store failed while taking a key.
	Unavailable,
}
impl ClaimOutcomeLabel {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ClaimOutcomeLabel::Attempt => "attempt",
			ClaimOutcomeLabel::Granted => "granted",
			ClaimOutcomeLabel::RateLimited => "rate_limited",
			ClaimOutcomeLabel::NoKeys => "no_keys",
			ClaimOutcomeLabel::Unavailable => "unavailable",
		}
	}
}
impl Display for ClaimOutcomeLabel {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
