//! Injectable time source so throttling decisions can be replayed deterministically.

// self
use crate::_prelude::*;

/// Time source consulted by [`crate::dispenser::KeyDispenser`] for every claim.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current UTC instant.
	fn now_utc(&self) -> OffsetDateTime;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now_utc(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Clock frozen at a caller-controlled instant; clones share the same reading.
#[cfg(any(test, feature = "test"))]
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<OffsetDateTime>>);
#[cfg(any(test, feature = "test"))]
impl ManualClock {
	/// Creates a clock frozen at `now`.
	pub fn new(now: OffsetDateTime) -> Self {
		Self(Arc::new(Mutex::new(now)))
	}

	/// Moves the clock forward (or backward, for negative durations).
	pub fn advance(&self, by: Duration) {
		*self.0.lock() += by;
	}

	/// Jumps to an absolute instant.
	pub fn set(&self, now: OffsetDateTime) {
		*self.0.lock() = now;
	}
}
#[cfg(any(test, feature = "test"))]
impl Clock for ManualClock {
	fn now_utc(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}
