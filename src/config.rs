//! Dispenser configuration with per-field defaults.

// std
use std::{fs, num::NonZeroU32, path::Path};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	key::{DEFAULT_KEY_BYTES, MAX_KEY_BYTES},
	limit::RateLimitQuota,
	store::file::DEFAULT_COMPACT_AFTER,
};

/// Recognized dispenser options.
///
/// Every field is optional in the serialized form; missing fields fall back to
/// [`DispenserConfig::default`]. Unknown fields are rejected so typos surface early.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispenserConfig {
	/// Snapshot file of the persisted pool.
	pub pool_path: String,
	/// Keys generated when an empty pool is seeded.
	pub replenish_size: usize,
	/// Entropy per key, in bytes.
	pub key_bytes: usize,
	/// Claims admitted per client per window.
	pub max_claims: u32,
	/// Rolling window length, in seconds.
	pub window_secs: u64,
	/// Whether an admitted claim that finds no key gives its slot back.
	pub refund_on_failure: bool,
	/// HTTP status returned when the pool is exhausted (404 or 429 are typical).
	pub exhausted_status: u16,
	/// Issuance log entries tolerated before the pool snapshot is compacted.
	pub compact_after: usize,
	/// Whether [`crate::dispenser::KeyDispenser::open`] seeds an empty pool.
	pub seed_on_empty: bool,
}
impl DispenserConfig {
	/// Parses a JSON document, reporting the path of the first offending field.
	pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
		let deserializer = &mut serde_json::Deserializer::from_str(json);
		let config: Self = serde_path_to_error::deserialize(deserializer)?;

		config.validate()?;

		Ok(config)
	}

	/// Reads and parses a JSON configuration file.
	pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let json = fs::read_to_string(path)
			.map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

		Self::from_json_str(&json)
	}

	/// Checks value ranges that serde cannot express.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_claims == 0 {
			return Err(ConfigError::ZeroMaxClaims);
		}
		if self.window_secs == 0 || i64::try_from(self.window_secs).is_err() {
			return Err(ConfigError::ZeroWindow);
		}
		if self.key_bytes == 0 {
			return Err(ConfigError::ZeroKeyLength);
		}
		if self.key_bytes > MAX_KEY_BYTES {
			return Err(ConfigError::KeyLengthTooLarge {
				bytes: self.key_bytes,
				max: MAX_KEY_BYTES,
			});
		}
		if !(400..600).contains(&self.exhausted_status) {
			return Err(ConfigError::InvalidStatus { status: self.exhausted_status });
		}

		Ok(())
	}

	/// Rate-limit quota described by `max_claims` and `window_secs`.
	pub fn quota(&self) -> Result<RateLimitQuota, ConfigError> {
		let max_claims = NonZeroU32::new(self.max_claims).ok_or(ConfigError::ZeroMaxClaims)?;
		let window = i64::try_from(self.window_secs)
			.ok()
			.filter(|secs| *secs > 0)
			.map(Duration::seconds)
			.ok_or(ConfigError::ZeroWindow)?;

		Ok(RateLimitQuota { max_claims, window })
	}

	/// Sets the pool snapshot path.
	pub fn with_pool_path(mut self, path: impl Into<String>) -> Self {
		self.pool_path = path.into();

		self
	}

	/// Sets how many keys seed an empty pool.
	pub fn with_replenish_size(mut self, size: usize) -> Self {
		self.replenish_size = size;

		self
	}

	/// Sets the rate-limit budget and window.
	pub fn with_rate_limit(mut self, max_claims: u32, window: Duration) -> Self {
		self.max_claims = max_claims;
		self.window_secs = window.whole_seconds().max(0) as u64;

		self
	}

	/// Sets the exhausted-pool HTTP status.
	pub fn with_exhausted_status(mut self, status: u16) -> Self {
		self.exhausted_status = status;

		self
	}
}
impl Default for DispenserConfig {
	fn default() -> Self {
		Self {
			pool_path: "keys.txt".into(),
			replenish_size: 50_000,
			key_bytes: DEFAULT_KEY_BYTES,
			max_claims: 1,
			window_secs: 24 * 60 * 60,
			refund_on_failure: false,
			exhausted_status: 404,
			compact_after: DEFAULT_COMPACT_AFTER,
			seed_on_empty: true,
		}
	}
}
