//! Activation key wrapper that redacts itself in logs.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

const FINGERPRINT_LEN: usize = 12;

/// Error returned when persisted key text is malformed.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum KeyError {
	/// The key text was empty.
	#[error("Activation key cannot be empty.")]
	Empty,
	/// The key text contains a character outside the URL-safe base64 alphabet.
	#[error("Activation key contains {found:?}, which is outside the URL-safe alphabet.")]
	InvalidCharacter {
		/// First offending character.
		found: char,
	},
}

/// Single-use activation credential drawn from the pool.
///
/// The value is URL-safe base64 without padding, so it can never contain the newline that
/// separates records on disk. `Debug` and `Display` are redacted; use [`Self::fingerprint`] to
/// correlate a key in logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ActivationKey(String);
impl ActivationKey {
	/// Encodes raw entropy into a key.
	pub fn from_entropy(bytes: &[u8]) -> Self {
		Self(URL_SAFE_NO_PAD.encode(bytes))
	}

	/// Parses a persisted or externally supplied key.
	pub fn parse(text: impl AsRef<str>) -> Result<Self, KeyError> {
		let text = text.as_ref();

		if text.is_empty() {
			return Err(KeyError::Empty);
		}
		if let Some(found) =
			text.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
		{
			return Err(KeyError::InvalidCharacter { found });
		}

		Ok(Self(text.to_owned()))
	}

	/// Returns the key text. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Short, non-reversible identifier that is safe to log.
	pub fn fingerprint(&self) -> String {
		let digest = Sha256::digest(self.0.as_bytes());
		let mut encoded = URL_SAFE_NO_PAD.encode(digest);

		encoded.truncate(FINGERPRINT_LEN);

		encoded
	}
}
impl AsRef<str> for ActivationKey {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl FromStr for ActivationKey {
	type Err = KeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}
impl Debug for ActivationKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ActivationKey").field(&"<redacted>").finish()
	}
}
impl Display for ActivationKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn key_formatters_redact() {
		let key = ActivationKey::parse("super-secret").expect("Key fixture should parse.");

		assert_eq!(format!("{key:?}"), "ActivationKey(\"<redacted>\")");
		assert_eq!(format!("{key}"), "<redacted>");
	}

	#[test]
	fn entropy_is_url_safe_and_unpadded() {
		let key = ActivationKey::from_entropy(&[0xfb; 32]);

		assert_eq!(key.expose().len(), 43);
		assert!(!key.expose().contains(['+', '/', '=']));
		assert_eq!(ActivationKey::parse(key.expose()), Ok(key));
	}

	#[test]
	fn parse_rejects_foreign_characters() {
		assert_eq!(ActivationKey::parse(""), Err(KeyError::Empty));
		assert_eq!(ActivationKey::parse("abc\n"), Err(KeyError::InvalidCharacter { found: '\n' }));
		assert_eq!(ActivationKey::parse("ab+c"), Err(KeyError::InvalidCharacter { found: '+' }));
	}

	#[test]
	fn fingerprint_is_stable_and_short() {
		let key = ActivationKey::parse("AAAA").expect("Key fixture should parse.");
		let fingerprint = key.fingerprint();

		assert_eq!(fingerprint.len(), FINGERPRINT_LEN);
		assert_eq!(fingerprint, key.clone().fingerprint());
		assert_ne!(fingerprint, ActivationKey::parse("AAAB").expect("parse").fingerprint());
	}
}
