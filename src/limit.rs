//! Per-client claim budgets consulted before the pool is touched.

pub mod sliding_window;

pub use sliding_window::*;

// std
use std::num::NonZeroU32;
// self
use crate::{_prelude::*, key::ClientId};

/// Default number of claims a client may make per window.
pub const DEFAULT_MAX_CLAIMS: NonZeroU32 = NonZeroU32::MIN;
/// Default rolling window length.
pub const DEFAULT_WINDOW: Duration = Duration::hours(24);

/// Strategy that decides whether a client may claim another key right now.
pub trait RateLimitPolicy
where
	Self: Send + Sync,
{
	/// Admits and records a claim, or denies it without recording anything.
	///
	/// The check and the record form one critical section: two concurrent calls for the same
	/// client can never both pass on the strength of a single remaining slot.
	fn check_and_record(&self, context: &RateLimitContext) -> RateLimitDecision;

	/// Gives back a slot previously recorded for `client` at `issued_at`.
	///
	/// Returns `false` when no such record exists (for example, because it already expired).
	fn refund(&self, client: &ClientId, issued_at: OffsetDateTime) -> bool;
}

/// Bound on claims per client over a rolling window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitQuota {
	/// Claims admitted per window.
	pub max_claims: NonZeroU32,
	/// Rolling window length.
	pub window: Duration,
}
impl Default for RateLimitQuota {
	fn default() -> Self {
		Self { max_claims: DEFAULT_MAX_CLAIMS, window: DEFAULT_WINDOW }
	}
}

/// Context shared with a [`RateLimitPolicy`] for a single claim.
#[derive(Clone, Debug)]
pub struct RateLimitContext {
	/// Client requesting a key.
	pub client: ClientId,
	/// Instant the claim is evaluated at.
	pub observed_at: OffsetDateTime,
}
impl RateLimitContext {
	/// Creates a context for `client` observed at the current wall-clock time.
	pub fn new(client: ClientId) -> Self {
		Self { client, observed_at: OffsetDateTime::now_utc() }
	}

	/// Overrides the timestamp associated with the observation.
	pub fn with_observed_at(mut self, instant: OffsetDateTime) -> Self {
		self.observed_at = instant;

		self
	}
}

/// Result emitted by a [`RateLimitPolicy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The claim was admitted and recorded.
	Allow,
	/// The client is over quota.
	Deny(RetryDirective),
}
impl RateLimitDecision {
	/// Whether the claim was admitted.
	pub fn is_allowed(&self) -> bool {
		matches!(self, Self::Allow)
	}
}

/// Advises callers when to retry after a [`RateLimitDecision::Deny`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant when the oldest in-window claim expires.
	pub earliest_retry_at: OffsetDateTime,
	/// Time left until `earliest_retry_at`, relative to the observation.
	pub recommended_backoff: Duration,
	/// Optional descriptive string.
	pub reason: Option<String>,
}
impl RetryDirective {
	/// Creates a new directive with the provided timing metadata.
	pub fn new(earliest_retry_at: OffsetDateTime, recommended_backoff: Duration) -> Self {
		Self { earliest_retry_at, recommended_backoff, reason: None }
	}

	/// Adds a human-readable reason.
	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());

		self
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn default_quota_is_one_claim_per_day() {
		let quota = RateLimitQuota::default();

		assert_eq!(quota.max_claims.get(), 1);
		assert_eq!(quota.window, Duration::days(1));
	}
}
