//! Token persistence contracts and built-in store implementations.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::AccessToken};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for bearer tokens.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Persists or replaces the token stored under `key`.
	fn save<'a>(&'a self, key: &'a StoreKey, token: AccessToken) -> StoreFuture<'a, ()>;

	/// Fetches the token stored under `key`, if present.
	fn fetch<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<AccessToken>>;

	/// Removes and returns the token stored under `key`.
	fn remove<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<AccessToken>>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Key identifying a stored token.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreKey(String);
impl StoreKey {
	/// Key for tokens obtained through the client-credentials exchange.
	pub fn client(client_id: &str) -> Self {
		Self(format!("client:{client_id}"))
	}

	/// Key for a caller-supplied bearer token.
	pub fn bearer() -> Self {
		Self("bearer-token".into())
	}

	/// Returns the raw key.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for StoreKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn keys_partition_by_credential_source() {
		assert_eq!(StoreKey::client("abc"), StoreKey::client("abc"));
		assert_ne!(StoreKey::client("abc"), StoreKey::client("xyz"));
		assert_ne!(StoreKey::client("bearer-token"), StoreKey::bearer());
		assert_eq!(StoreKey::client("abc").to_string(), "client:abc");
	}

	#[test]
	fn store_error_serializes_for_diagnostics() {
		let payload = serde_json::to_string(&StoreError::Backend { message: "locked".into() })
			.expect("Store errors should serialize to JSON.");

		assert_eq!(payload, "{\"Backend\":{\"message\":\"locked\"}}");
	}
}
