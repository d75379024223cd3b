//! In-memory sliding-window limiter keyed by client identity.
//!
//! Each client keeps the timestamps of its in-window claims. A claim observed at `now` is
//! admitted while fewer than `max_claims` timestamps fall inside `(now - window, now]`; a
//! timestamp stops counting exactly `window` after it was recorded.
//!
//! State is process-local and lost on restart. Expired timestamps are evicted lazily on the next
//! check for the same client; [`SlidingWindowLimiter::sweep`] drops idle clients in bulk. Between
//! sweeps, memory grows with the number of distinct clients seen inside one window.

// self
use crate::{
	_prelude::*,
	key::ClientId,
	limit::{RateLimitContext, RateLimitDecision, RateLimitPolicy, RateLimitQuota, RetryDirective},
};

/// Single-lock sliding-window limiter.
#[derive(Debug, Default)]
pub struct SlidingWindowLimiter {
	quota: RateLimitQuota,
	clients: Mutex<HashMap<ClientId, VecDeque<OffsetDateTime>>>,
}
impl SlidingWindowLimiter {
	/// Creates a limiter enforcing `quota`.
	pub fn new(quota: RateLimitQuota) -> Self {
		Self { quota, clients: Mutex::default() }
	}

	/// Quota enforced by this limiter.
	pub fn quota(&self) -> RateLimitQuota {
		self.quota
	}

	/// Counts claims by `client` that still count against its budget at `now`.
	pub fn claims_in_window(&self, client: &ClientId, now: OffsetDateTime) -> usize {
		let horizon = now - self.quota.window;

		self.clients
			.lock()
			.get(client)
			.map_or(0, |history| history.iter().filter(|at| **at > horizon).count())
	}

	/// Number of clients currently holding limiter state.
	pub fn tracked_clients(&self) -> usize {
		self.clients.lock().len()
	}

	/// Evicts expired timestamps for every client and forgets clients left with none.
	///
	/// Returns how many clients were forgotten.
	pub fn sweep(&self, now: OffsetDateTime) -> usize {
		let horizon = now - self.quota.window;
		let mut guard = self.clients.lock();
		let before = guard.len();

		guard.retain(|_, history| {
			evict_expired(history, horizon);

			!history.is_empty()
		});

		before - guard.len()
	}
}
impl RateLimitPolicy for SlidingWindowLimiter {
	fn check_and_record(&self, context: &RateLimitContext) -> RateLimitDecision {
		let now = context.observed_at;
		let mut guard = self.clients.lock();
		let history = guard.entry(context.client.clone()).or_default();

		evict_expired(history, now - self.quota.window);

		let budget = self.quota.max_claims.get() as usize;

		if history.len() >= budget {
			// The client is readmitted once all but `budget - 1` records have expired.
			let earliest_retry_at = history
				.get(history.len() - budget)
				.map_or(now, |pivot| *pivot + self.quota.window);

			return RateLimitDecision::Deny(
				RetryDirective::new(earliest_retry_at, earliest_retry_at - now).with_reason(
					format!(
						"at most {} key(s) per {} hour(s)",
						self.quota.max_claims,
						self.quota.window.whole_hours()
					),
				),
			);
		}

		let position = history.partition_point(|at| *at <= now);

		history.insert(position, now);

		RateLimitDecision::Allow
	}

	fn refund(&self, client: &ClientId, issued_at: OffsetDateTime) -> bool {
		let mut guard = self.clients.lock();
		let Some(history) = guard.get_mut(client) else {
			return false;
		};
		let Some(position) = history.iter().rposition(|at| *at == issued_at) else {
			return false;
		};

		history.remove(position);

		if history.is_empty() {
			guard.remove(client);
		}

		true
	}
}

// Histories stay sorted even when observations arrive out of order, e.g. after the wall clock
// steps backwards.
fn evict_expired(history: &mut VecDeque<OffsetDateTime>, horizon: OffsetDateTime) {
	let expired = history.partition_point(|at| *at <= horizon);

	history.drain(..expired);
}
