//! Redacting wrapper for TCGplayer credentials.
//!
//! Holds the application's private key (`client_secret`) and every bearer token the client
//! sends. `Debug` and `Display` never print the value, so configs, tokens, and errors can be
//! logged as a whole.

// self
use crate::_prelude::*;

const REDACTED: &str = "<redacted>";

/// Private key or bearer token; only [`expose`](TokenSecret::expose) reveals the value.
///
/// Serializes as the bare string so [`FileStore`](crate::store::FileStore) snapshots and
/// serde-loaded [`ClientConfig`](crate::ClientConfig) documents stay readable.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps `value` verbatim.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Raw value for the `Authorization` header or the token form body.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Empty or whitespace-only values count as "not configured".
	pub fn is_blank(&self) -> bool {
		self.0.trim().is_empty()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "TokenSecret({REDACTED})")
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(REDACTED)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn private_keys_never_reach_log_output() {
		let secret = TokenSecret::new("tcg-private-key");

		assert_eq!(format!("{secret:?}"), "TokenSecret(<redacted>)");
		assert_eq!(format!("{secret}"), "<redacted>");
		assert!(!format!("{:?}", Some(&secret)).contains("tcg-private-key"));
		assert_eq!(
			serde_json::to_string(&secret).expect("Secrets should serialize."),
			"\"tcg-private-key\""
		);
	}

	#[test]
	fn whitespace_only_values_are_blank() {
		assert!(TokenSecret::new("").is_blank());
		assert!(TokenSecret::new(" \n\t").is_blank());
		assert!(!TokenSecret::new(" key ").is_blank());
	}
}
