//! Single-use activation key dispenser: a crash-safe persisted key pool, per-client
//! sliding-window throttling, and a claim service that never hands out the same key twice.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod clock;
pub mod config;
pub mod dispenser;
pub mod error;
pub mod http;
pub mod key;
pub mod limit;
pub mod obs;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		env, fs,
		path::{Path, PathBuf},
		process,
		sync::atomic::{AtomicUsize, Ordering},
	};
	// self
	use crate::{
		clock::ManualClock,
		dispenser::KeyDispenser,
		key::{ActivationKey, ClientId},
		limit::{RateLimitQuota, SlidingWindowLimiter},
		store::MemoryStore,
	};

	static TEMP_POOL_SEQ: AtomicUsize = AtomicUsize::new(0);

	/// Parses a key fixture.
	pub fn key(text: &str) -> ActivationKey {
		ActivationKey::parse(text).expect("Key fixture should parse.")
	}

	/// Parses a list of key fixtures.
	pub fn keys(texts: &[&str]) -> Vec<ActivationKey> {
		texts.iter().map(|text| key(text)).collect()
	}

	/// Exposes keys as owned strings for comparisons.
	pub fn exposed(keys: &[ActivationKey]) -> Vec<String> {
		keys.iter().map(|key| key.expose().to_owned()).collect()
	}

	/// Builds a client identity fixture.
	pub fn client(id: &str) -> ClientId {
		ClientId::new(id).expect("Client fixture should be valid.")
	}

	/// Builds a dispenser over an in-memory pool holding `keys`, throttled by `quota`, with a
	/// manual clock frozen at `now`.
	pub fn build_memory_dispenser(
		keys: &[&str],
		quota: RateLimitQuota,
		now: OffsetDateTime,
	) -> (KeyDispenser, MemoryStore, ManualClock) {
		let store = MemoryStore::with_keys(self::keys(keys))
			.expect("Memory store fixture should accept distinct keys.");
		let clock = ManualClock::new(now);
		let dispenser = KeyDispenser::with_sliding_window(
			Arc::new(store.clone()),
			SlidingWindowLimiter::new(quota),
		)
		.with_clock(clock.clone());

		(dispenser, store, clock)
	}

	/// Unique pool path under the system temp directory; removes the pool files on drop.
	#[derive(Debug)]
	pub struct TempPool(PathBuf);
	impl TempPool {
		/// Reserves a fresh path tagged with `label`.
		pub fn new(label: &str) -> Self {
			let unique = format!(
				"keygate_{label}_{}_{}.txt",
				process::id(),
				TEMP_POOL_SEQ.fetch_add(1, Ordering::Relaxed)
			);

			Self(env::temp_dir().join(unique))
		}

		/// Snapshot path of the pool.
		pub fn path(&self) -> &Path {
			&self.0
		}

		/// Path of the pool file with `suffix` appended to its name.
		pub fn with_suffix(&self, suffix: &str) -> PathBuf {
			let mut name = self.0.clone().into_os_string();

			name.push(suffix);

			PathBuf::from(name)
		}
	}
	impl Drop for TempPool {
		fn drop(&mut self) {
			for suffix in ["", ".taken", ".tmp"] {
				let _ = fs::remove_file(self.with_suffix(suffix));
			}
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{HashMap, HashSet, VecDeque},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::Mutex;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::Result;
}

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test"))] pub use clock::ManualClock;
pub use config::DispenserConfig;
pub use dispenser::{ClaimOutcome, Denial, DenialReason, KeyDispenser};
pub use key::{ActivationKey, ClientId};
#[cfg(test)] use {color_eyre as _, tower as _, tracing_subscriber as _};
