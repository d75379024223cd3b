//! Pool storage contracts and built-in store implementations.
//!
//! A [`KeyStore`] is the only component allowed to mutate the pool. Every implementation must
//! serialize [`KeyStore::take_one`] so that each key is returned to exactly one caller, and must
//! make each removal visible (and, for durable stores, persisted) before the next take starts.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	key::{ActivationKey, GeneratorError, KeyGenerator},
	obs,
};

/// Boxed future returned by [`KeyStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract implemented by key pools.
pub trait KeyStore
where
	Self: Send + Sync,
{
	/// Appends `keys` to the tail of the pool as a single unit.
	///
	/// Either the whole batch becomes visible (and durable) or none of it does. Keys already in
	/// the pool, or repeated within the batch, are rejected with [`StoreError::DuplicateKey`].
	fn append(&self, keys: Vec<ActivationKey>) -> StoreFuture<'_, ()>;

	/// Atomically removes and returns the head of the pool.
	fn take_one(&self) -> StoreFuture<'_, ActivationKey>;

	/// Counts unissued keys.
	fn remaining(&self) -> StoreFuture<'_, usize>;

	/// Returns the unissued keys in issue order.
	fn snapshot(&self) -> StoreFuture<'_, Vec<ActivationKey>>;

	/// Mints `count` keys with `generator` and appends them, returning how many were added.
	fn generate<'a>(
		&'a self,
		generator: &'a dyn KeyGenerator,
		count: usize,
	) -> StoreFuture<'a, usize> {
		Box::pin(async move {
			let keys = generator.generate_batch(count)?;

			self.append(keys).await?;
			obs::record_keys_generated(count);

			Ok(count)
		})
	}
}

/// Error type produced by [`KeyStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// No unissued keys remain; recoverable by replenishing the pool.
	#[error("Key pool is empty.")]
	EmptyPool,
	/// Backend-level failure (IO) for the storage medium.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// Persisted state could not be interpreted.
	#[error("Corrupt pool state: {message}.")]
	Corrupt {
		/// Human-readable error payload.
		message: String,
	},
	/// A key would have appeared twice in the pool.
	#[error("Duplicate key {fingerprint} rejected.")]
	DuplicateKey {
		/// Fingerprint of the offending key.
		fingerprint: String,
	},
	/// The key generator failed before anything was persisted.
	#[error("Key generation failed: {message}.")]
	Generator {
		/// Human-readable error payload.
		message: String,
	},
}
impl From<GeneratorError> for StoreError {
	fn from(e: GeneratorError) -> Self {
		Self::Generator { message: e.to_string() }
	}
}

/// Rejects a batch that repeats a key or collides with `existing`.
pub(crate) fn ensure_unique<'a>(
	existing: impl IntoIterator<Item = &'a ActivationKey>,
	batch: &'a [ActivationKey],
) -> Result<(), StoreError> {
	let mut seen = existing.into_iter().collect::<HashSet<_>>();

	for key in batch {
		if !seen.insert(key) {
			return Err(StoreError::DuplicateKey { fingerprint: key.fingerprint() });
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;
	use crate::{_preludet::key, error::Error};

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "disk unplugged".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("disk unplugged"));

		let source = StdError::source(&error)
			.expect("Crate error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn ensure_unique_rejects_collisions() {
		let pool = [key("A"), key("B")];

		assert!(ensure_unique(&pool, &[key("C"), key("D")]).is_ok());
		assert_eq!(
			ensure_unique(&pool, &[key("C"), key("B")]),
			Err(StoreError::DuplicateKey { fingerprint: key("B").fingerprint() })
		);
		assert_eq!(
			ensure_unique(&[], &[key("C"), key("C")]),
			Err(StoreError::DuplicateKey { fingerprint: key("C").fingerprint() })
		);
	}

	#[test]
	fn generator_errors_map_into_store_errors() {
		let error: StoreError = GeneratorError::Exhausted.into();

		assert!(matches!(error, StoreError::Generator { .. }));
	}
}
