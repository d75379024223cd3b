//! Crate-level error types shared across the store, limiter, and dispenser.

// std
use std::path::PathBuf;
// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical error exposed by administrative APIs.
///
/// Claims never surface this type; [`crate::dispenser::KeyDispenser::claim`] maps every
/// failure into a structured denial instead.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Client identity failed validation.
	#[error(transparent)]
	Identifier(#[from] crate::key::IdentifierError),
	/// Activation key text failed validation.
	#[error(transparent)]
	Key(#[from] crate::key::KeyError),
}

/// Configuration and validation failures raised while building a dispenser.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// The per-window claim budget must allow at least one claim.
	#[error("The max_claims value must be positive.")]
	ZeroMaxClaims,
	/// The rate-limit window must be a positive duration.
	#[error("The window_secs value must be positive.")]
	ZeroWindow,
	/// Keys must carry at least one byte of entropy.
	#[error("The key_bytes value must be positive.")]
	ZeroKeyLength,
	/// Keys would be unreasonably long.
	#[error("The key_bytes value {bytes} exceeds the maximum of {max}.")]
	KeyLengthTooLarge {
		/// Configured entropy per key.
		bytes: usize,
		/// Largest accepted value.
		max: usize,
	},
	/// The configured exhausted-pool status is not a client or server error code.
	#[error("The exhausted_status value {status} is not a 4xx or 5xx status code.")]
	InvalidStatus {
		/// Offending status code.
		status: u16,
	},
	/// Configuration file could not be read.
	#[error("Failed to read configuration file {}.", .path.display())]
	Read {
		/// Path that was being read.
		path: PathBuf,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// Configuration payload is not valid JSON for [`crate::config::DispenserConfig`].
	#[error("Configuration is malformed at `{}`.", .source.path())]
	Parse {
		/// Structured parsing failure including the offending field path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl From<serde_path_to_error::Error<serde_json::Error>> for ConfigError {
	fn from(source: serde_path_to_error::Error<serde_json::Error>) -> Self {
		Self::Parse { source }
	}
}
