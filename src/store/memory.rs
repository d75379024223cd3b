//! Thread-safe in-memory [`KeyStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	key::ActivationKey,
	store::{self, KeyStore, StoreError, StoreFuture},
};

type Pool = Arc<Mutex<VecDeque<ActivationKey>>>;

/// Non-durable pool that keeps keys in-process; restarts lose every key.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Pool);
impl MemoryStore {
	/// Creates a store pre-populated with `keys`, rejecting duplicates.
	pub fn with_keys(keys: impl IntoIterator<Item = ActivationKey>) -> Result<Self, StoreError> {
		let store = Self::default();

		Self::append_now(&store.0, keys.into_iter().collect())?;

		Ok(store)
	}

	fn append_now(pool: &Pool, keys: Vec<ActivationKey>) -> Result<(), StoreError> {
		let mut guard = pool.lock();

		store::ensure_unique(guard.iter(), &keys)?;
		guard.extend(keys);

		Ok(())
	}

	fn take_now(pool: &Pool) -> Result<ActivationKey, StoreError> {
		pool.lock().pop_front().ok_or(StoreError::EmptyPool)
	}
}
impl KeyStore for MemoryStore {
	fn append(&self, keys: Vec<ActivationKey>) -> StoreFuture<'_, ()> {
		let pool = self.0.clone();

		Box::pin(async move { Self::append_now(&pool, keys) })
	}

	fn take_one(&self) -> StoreFuture<'_, ActivationKey> {
		let pool = self.0.clone();

		Box::pin(async move { Self::take_now(&pool) })
	}

	fn remaining(&self) -> StoreFuture<'_, usize> {
		let pool = self.0.clone();

		Box::pin(async move { Ok(pool.lock().len()) })
	}

	fn snapshot(&self) -> StoreFuture<'_, Vec<ActivationKey>> {
		let pool = self.0.clone();

		Box::pin(async move { Ok(pool.lock().iter().cloned().collect()) })
	}
}
