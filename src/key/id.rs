//! Client identity used as the rate-limit key.

// std
use std::{borrow::Borrow, net::IpAddr, ops::Deref};
// self
use crate::_prelude::*;

const IDENTIFIER_MAX_LEN: usize = 128;
const AUXILIARY_SEPARATOR: char = '#';

/// Error returned when client identity validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identity was empty.
	#[error("Client identifier cannot be empty.")]
	Empty,
	/// The identity contains whitespace characters.
	#[error("Client identifier contains whitespace.")]
	ContainsWhitespace,
	/// The identity exceeded the allowed character count.
	#[error("Client identifier exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
}

/// Opaque, comparable identity of a requesting client.
///
/// Usually derived from the peer's network address. The external contract allows an
/// auxiliary qualifier, which is folded in as `addr#aux`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);
impl ClientId {
	/// Creates a new identity after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let view = value.as_ref();

		validate_view(view)?;

		Ok(Self(view.to_owned()))
	}

	/// Qualifies the identity with an auxiliary identifier supplied by the router.
	pub fn with_auxiliary(self, auxiliary: impl AsRef<str>) -> Result<Self, IdentifierError> {
		Self::new(format!("{}{AUXILIARY_SEPARATOR}{}", self.0, auxiliary.as_ref()))
	}
}
impl From<IpAddr> for ClientId {
	fn from(addr: IpAddr) -> Self {
		// IPv4-mapped IPv6 peers share their IPv4 quota.
		let addr = match addr {
			IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(addr),
			v4 => v4,
		};

		Self(addr.to_string())
	}
}
impl Deref for ClientId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for ClientId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for ClientId {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<ClientId> for String {
	fn from(value: ClientId) -> Self {
		value.0
	}
}
impl TryFrom<String> for ClientId {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_view(&value)?;

		Ok(Self(value))
	}
}
impl FromStr for ClientId {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for ClientId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Client({})", self.0)
	}
}
impl Display for ClientId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

fn validate_view(view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty);
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace);
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// std
	use std::net::{Ipv4Addr, Ipv6Addr};
	// self
	use super::*;

	#[test]
	fn identifiers_validate() {
		assert_eq!(ClientId::new(""), Err(IdentifierError::Empty));
		assert_eq!(ClientId::new(" 10.0.0.1"), Err(IdentifierError::ContainsWhitespace));
		assert!(ClientId::new("a".repeat(IDENTIFIER_MAX_LEN)).is_ok());
		assert_eq!(
			ClientId::new("a".repeat(IDENTIFIER_MAX_LEN + 1)),
			Err(IdentifierError::TooLong { max: IDENTIFIER_MAX_LEN })
		);
	}

	#[test]
	fn ipv4_mapped_addresses_collapse() {
		let v4 = ClientId::from(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7)));
		let mapped = ClientId::from(IpAddr::V6(Ipv4Addr::new(192, 0, 2, 7).to_ipv6_mapped()));

		assert_eq!(v4, mapped);
		assert_eq!(v4.as_ref(), "192.0.2.7");
		assert_eq!(ClientId::from(IpAddr::V6(Ipv6Addr::LOCALHOST)).as_ref(), "::1");
	}

	#[test]
	fn auxiliary_identifier_is_folded_in() {
		let client = ClientId::new("192.0.2.7")
			.and_then(|id| id.with_auxiliary("device-42"))
			.expect("Qualified identity fixture should be valid.");

		assert_eq!(client.as_ref(), "192.0.2.7#device-42");
		assert!(
			ClientId::new("192.0.2.7")
				.and_then(|id| id.with_auxiliary("has space"))
				.is_err()
		);
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<ClientId, u8> = HashMap::from_iter([(
			ClientId::new("10.1.2.3").expect("Client used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("10.1.2.3"), Some(&7));
	}
}
