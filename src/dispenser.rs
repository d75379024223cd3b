//! Claim orchestration: rate limiter first, then the pool.
//!
//! [`KeyDispenser::claim`] is the single entry point for handing out keys. It consults the
//! [`RateLimitPolicy`] before touching the [`KeyStore`], so an over-quota client can never race
//! under-quota clients for the last keys, and a denied claim never depletes the pool. Every
//! failure is folded into a [`ClaimOutcome::Denied`]; nothing escapes to the request layer.

// std
use std::path::PathBuf;
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	config::DispenserConfig,
	key::{ActivationKey, ClientId, KeyGenerator, OsKeyGenerator},
	limit::{RateLimitContext, RateLimitDecision, RateLimitPolicy, SlidingWindowLimiter},
	obs::{self, ClaimOutcomeLabel, ClaimSpan},
	store::{FileStore, KeyStore, StoreError},
};

/// Why a claim was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
	/// The client exhausted its budget for the current window.
	RateLimited,
	/// The pool is empty.
	NoKeys,
	/// The store failed while taking a key.
	Unavailable,
}
impl DenialReason {
	/// Returns a stable label suitable for logs and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			DenialReason::RateLimited => "rate_limited",
			DenialReason::NoKeys => "no_keys",
			DenialReason::Unavailable => "unavailable",
		}
	}

	fn label(self) -> ClaimOutcomeLabel {
		match self {
			DenialReason::RateLimited => ClaimOutcomeLabel::RateLimited,
			DenialReason::NoKeys => ClaimOutcomeLabel::NoKeys,
			DenialReason::Unavailable => ClaimOutcomeLabel::Unavailable,
		}
	}
}
impl Display for DenialReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Structured refusal returned to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Denial {
	/// Refusal category.
	pub reason: DenialReason,
	/// Human-readable explanation suitable for the client.
	pub message: String,
	/// For rate-limited claims, when the client may try again.
	pub retry_at: Option<OffsetDateTime>,
}

/// Result of a single claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
	/// A key was removed from the pool for this client.
	Granted(ActivationKey),
	/// The claim was refused.
	Denied(Denial),
}
impl ClaimOutcome {
	/// Returns the granted key, if any.
	pub fn key(&self) -> Option<&ActivationKey> {
		match self {
			Self::Granted(key) => Some(key),
			Self::Denied(_) => None,
		}
	}

	/// Returns the denial reason, if any.
	pub fn denial_reason(&self) -> Option<DenialReason> {
		match self {
			Self::Granted(_) => None,
			Self::Denied(denial) => Some(denial.reason),
		}
	}
}

/// Composes a rate limiter and a key store into one claim operation.
#[derive(Clone)]
pub struct KeyDispenser {
	/// Pool of unissued keys.
	pub store: Arc<dyn KeyStore>,
	/// Per-client budget.
	pub limiter: Arc<dyn RateLimitPolicy>,
	/// Time source for [`Self::claim`] and [`Self::sweep`].
	pub clock: Arc<dyn Clock>,
	/// Random source for [`Self::replenish`].
	pub generator: Arc<dyn KeyGenerator>,
	/// Whether a slot is handed back when the pool cannot serve an admitted claim.
	pub refund_on_failure: bool,
	sweeper: Option<Arc<SlidingWindowLimiter>>,
}
impl KeyDispenser {
	/// Creates a dispenser over `store` and `limiter` using the system clock and OS randomness.
	pub fn new(store: Arc<dyn KeyStore>, limiter: Arc<dyn RateLimitPolicy>) -> Self {
		Self {
			store,
			limiter,
			clock: Arc::new(SystemClock),
			generator: Arc::new(OsKeyGenerator::default()),
			refund_on_failure: false,
			sweeper: None,
		}
	}

	/// Creates a dispenser whose sliding-window limiter can also be swept via [`Self::sweep`].
	pub fn with_sliding_window(store: Arc<dyn KeyStore>, limiter: SlidingWindowLimiter) -> Self {
		let limiter = Arc::new(limiter);
		let mut dispenser = Self::new(store, limiter.clone());

		dispenser.sweeper = Some(limiter);

		dispenser
	}

	/// Builds a file-backed dispenser from `config`.
	///
	/// When the persisted pool is empty and `seed_on_empty` is set, `replenish_size` fresh keys
	/// are generated before the dispenser is returned.
	pub async fn open(config: &DispenserConfig) -> Result<Self> {
		config.validate()?;

		let store = FileStore::open(PathBuf::from(&config.pool_path))?
			.with_compact_after(config.compact_after);
		let dispenser = Self::with_sliding_window(
			Arc::new(store),
			SlidingWindowLimiter::new(config.quota()?),
		)
		.with_generator(OsKeyGenerator::new(config.key_bytes))
		.with_refund_on_failure(config.refund_on_failure);

		if config.seed_on_empty && dispenser.remaining().await? == 0 {
			let added = dispenser.replenish(config.replenish_size).await?;

			obs::log_info!(added, path = %config.pool_path, "seeded empty key pool");
		}

		Ok(dispenser)
	}

	/// Replaces the clock.
	pub fn with_clock(mut self, clock: impl 'static + Clock) -> Self {
		self.clock = Arc::new(clock);

		self
	}

	/// Replaces the key generator.
	pub fn with_generator(mut self, generator: impl 'static + KeyGenerator) -> Self {
		self.generator = Arc::new(generator);

		self
	}

	/// Hands the window slot back when an admitted claim finds no key to take.
	pub fn with_refund_on_failure(mut self, refund: bool) -> Self {
		self.refund_on_failure = refund;

		self
	}

	/// Claims a key for `client` at the clock's current time.
	pub async fn claim(&self, client: &ClientId) -> ClaimOutcome {
		self.claim_at(client, self.clock.now_utc()).await
	}

	/// Claims a key for `client` as if observed at `now`.
	///
	/// Performs at most one limiter record and at most one pool removal.
	pub async fn claim_at(&self, client: &ClientId, now: OffsetDateTime) -> ClaimOutcome {
		let span = ClaimSpan::new(client, "claim");

		obs::record_claim_outcome(ClaimOutcomeLabel::Attempt);

		let outcome = span.instrument(self.claim_inner(client, now)).await;
		let label = match &outcome {
			ClaimOutcome::Granted(_) => ClaimOutcomeLabel::Granted,
			ClaimOutcome::Denied(denial) => denial.reason.label(),
		};

		span.record_outcome(label);
		obs::record_claim_outcome(label);

		outcome
	}

	async fn claim_inner(&self, client: &ClientId, now: OffsetDateTime) -> ClaimOutcome {
		let context = RateLimitContext::new(client.clone()).with_observed_at(now);

		if let RateLimitDecision::Deny(directive) = self.limiter.check_and_record(&context) {
			obs::log_debug!(retry_at = %directive.earliest_retry_at, "claim rate limited");

			return ClaimOutcome::Denied(Denial {
				reason: DenialReason::RateLimited,
				message: format!(
					"Too many activation requests: {}. Please try again later.",
					directive.reason.as_deref().unwrap_or("limit reached")
				),
				retry_at: Some(directive.earliest_retry_at),
			});
		}

		let taken = self.store.take_one().await;

		if taken.is_err() && self.refund_on_failure {
			self.limiter.refund(client, now);
		}

		match taken {
			Ok(key) => {
				obs::log_info!(key = %key.fingerprint(), "issued activation key");

				ClaimOutcome::Granted(key)
			},
			Err(StoreError::EmptyPool) => {
				obs::log_warn!("claim admitted but the key pool is empty");

				ClaimOutcome::Denied(Denial {
					reason: DenialReason::NoKeys,
					message: "No keys available for activation.".into(),
					retry_at: None,
				})
			},
			Err(e) => {
				obs::log_warn!(error = %e, "failed to take a key from the pool");

				ClaimOutcome::Denied(Denial {
					reason: DenialReason::Unavailable,
					message: "Key activation is temporarily unavailable.".into(),
					retry_at: None,
				})
			},
		}
	}

	/// Generates `count` keys with the configured generator and appends them to the pool.
	pub async fn replenish(&self, count: usize) -> Result<usize> {
		let added = self.store.generate(self.generator.as_ref(), count).await?;

		Ok(added)
	}

	/// Counts unissued keys.
	pub async fn remaining(&self) -> Result<usize> {
		Ok(self.store.remaining().await?)
	}

	/// Forgets clients whose window has fully elapsed, returning how many were dropped.
	///
	/// Only limiters installed through [`Self::with_sliding_window`] or [`Self::open`] can be
	/// swept; other policies report zero.
	pub fn sweep(&self) -> usize {
		self.sweeper.as_ref().map_or(0, |limiter| limiter.sweep(self.clock.now_utc()))
	}
}
impl Debug for KeyDispenser {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("KeyDispenser")
			.field("refund_on_failure", &self.refund_on_failure)
			.field("sweepable", &self.sweeper.is_some())
			.finish()
	}
}
