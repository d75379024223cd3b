//! The single source of randomness for minted keys.

// crates.io
use rand::{TryRngCore, rngs::OsRng};
// self
use crate::{_prelude::*, key::ActivationKey};

/// Default entropy per key, in bytes.
pub const DEFAULT_KEY_BYTES: usize = 32;
/// Largest accepted entropy per key, in bytes.
pub const MAX_KEY_BYTES: usize = 1_024;

/// Failure raised while minting keys.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum GeneratorError {
	/// The operating system random source could not be read.
	#[error("Random source failed: {message}.")]
	RandomSource {
		/// Human-readable error payload.
		message: String,
	},
	/// A deterministic generator ran out of scripted keys.
	#[error("Scripted key sequence is exhausted.")]
	Exhausted,
}

/// Mints fresh activation keys.
pub trait KeyGenerator
where
	Self: Send + Sync,
{
	/// Produces one key.
	fn generate(&self) -> Result<ActivationKey, GeneratorError>;

	/// Produces `count` keys, failing as a whole if any single key cannot be minted.
	fn generate_batch(&self, count: usize) -> Result<Vec<ActivationKey>, GeneratorError> {
		(0..count).map(|_| self.generate()).collect()
	}
}

/// Draws key entropy straight from the operating system CSPRNG.
#[derive(Clone, Copy, Debug)]
pub struct OsKeyGenerator {
	key_bytes: usize,
}
impl OsKeyGenerator {
	/// Creates a generator producing keys with `key_bytes` bytes of entropy.
	pub fn new(key_bytes: usize) -> Self {
		Self { key_bytes }
	}

	/// Entropy per key, in bytes.
	pub fn key_bytes(&self) -> usize {
		self.key_bytes
	}
}
impl Default for OsKeyGenerator {
	fn default() -> Self {
		Self::new(DEFAULT_KEY_BYTES)
	}
}
impl KeyGenerator for OsKeyGenerator {
	fn generate(&self) -> Result<ActivationKey, GeneratorError> {
		let mut entropy = vec![0_u8; self.key_bytes];

		OsRng
			.try_fill_bytes(&mut entropy)
			.map_err(|e| GeneratorError::RandomSource { message: e.to_string() })?;

		Ok(ActivationKey::from_entropy(&entropy))
	}
}

/// Replays a fixed list of keys in order, for deterministic tests and fixtures.
#[cfg(any(test, feature = "test"))]
#[derive(Debug, Default)]
pub struct SequenceKeyGenerator(Mutex<VecDeque<ActivationKey>>);
#[cfg(any(test, feature = "test"))]
impl SequenceKeyGenerator {
	/// Creates a generator that yields `keys` in order and then reports exhaustion.
	pub fn new(keys: impl IntoIterator<Item = ActivationKey>) -> Self {
		Self(Mutex::new(keys.into_iter().collect()))
	}

	/// Number of scripted keys not yet handed out.
	pub fn remaining(&self) -> usize {
		self.0.lock().len()
	}
}
#[cfg(any(test, feature = "test"))]
impl KeyGenerator for SequenceKeyGenerator {
	fn generate(&self) -> Result<ActivationKey, GeneratorError> {
		self.0.lock().pop_front().ok_or(GeneratorError::Exhausted)
	}

	fn generate_batch(&self, count: usize) -> Result<Vec<ActivationKey>, GeneratorError> {
		let mut queue = self.0.lock();

		if queue.len() < count {
			return Err(GeneratorError::Exhausted);
		}

		Ok(queue.drain(..count).collect())
	}
}
