//! Thread-safe in-memory [`TokenStore`], the default when no cache path is configured.

// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	store::{StoreFuture, StoreKey, TokenStore},
};

/// Storage backend that keeps tokens in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<HashMap<StoreKey, AccessToken>>>);
impl MemoryStore {
	/// Number of stored tokens.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl TokenStore for MemoryStore {
	fn save<'a>(&'a self, key: &'a StoreKey, token: AccessToken) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.0.write().insert(key.clone(), token);

			Ok(())
		})
	}

	fn fetch<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<AccessToken>> {
		Box::pin(async move { Ok(self.0.read().get(key).cloned()) })
	}

	fn remove<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<AccessToken>> {
		Box::pin(async move { Ok(self.0.write().remove(key)) })
	}
}
