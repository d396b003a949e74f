//! Token cache state owned by each client and the stores that persist it.
//!
//! Every client carries a [`TokenCache`]. Reads and writes against it are bracketed by the
//! attached [`CacheSerializer`]'s `before_access` and `after_access` hooks, which is where
//! [`MemoryCacheStore`] and [`DurableCacheStore`] load and save the serialized blob.

pub mod durable;
pub mod memory;
pub mod token_cache;

pub use durable::{DurableCacheStore, KeyringStorage, SecureStorage};
pub use memory::MemoryCacheStore;
pub use token_cache::{CacheKind, TokenCache, TokenWrite};

// self
use crate::_prelude::*;

/// Boxed future returned by [`CacheSerializer`] hooks.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + 'a + Send>>;

/// Error type produced by caches and their stores.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CacheError {
	/// Cache state could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// The storage backend failed.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Snapshot handed to [`CacheSerializer`] hooks.
#[derive(Clone, Copy)]
pub struct CacheAccessArgs<'a> {
	/// Cache being accessed; stores call [`TokenCache::serialize`] / [`TokenCache::deserialize`].
	pub cache: &'a TokenCache,
	/// Whether the operation just performed modified the cache.
	pub has_state_changed: bool,
}
impl CacheAccessArgs<'_> {
	/// Key the store should file the blob under.
	pub fn suggested_key(&self) -> String {
		self.cache.suggested_key()
	}

	/// Whether any access or refresh token remains in the cache.
	pub fn has_tokens(&self) -> bool {
		self.cache.has_tokens()
	}

	/// Instant after which the blob is useless, when the cache can tell.
	pub fn suggested_expiry(&self) -> Option<OffsetDateTime> {
		self.cache.suggested_expiry()
	}
}
impl Debug for CacheAccessArgs<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CacheAccessArgs")
			.field("suggested_key", &self.suggested_key())
			.field("has_state_changed", &self.has_state_changed)
			.finish()
	}
}

/// Persistence hooks a store attaches to a [`TokenCache`].
pub trait CacheSerializer
where
	Self: Send + Sync,
{
	/// Runs before the cache is read or written; typically loads the stored blob.
	fn before_access<'a>(&'a self, args: CacheAccessArgs<'a>) -> CacheFuture<'a, ()>;

	/// Runs after the cache was read or written; typically saves or removes the blob.
	fn after_access<'a>(&'a self, args: CacheAccessArgs<'a>) -> CacheFuture<'a, ()>;
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as _;
	// self
	use super::*;

	#[test]
	fn cache_error_converts_into_crate_error_with_source() {
		let cache_error = CacheError::Backend { message: "keychain locked".into() };
		let err: Error = cache_error.clone().into();

		assert!(matches!(err, Error::Cache(_)));
		assert!(err.to_string().contains("keychain locked"));
		assert_eq!(
			err.source().expect("Crate error should expose the cache error.").to_string(),
			cache_error.to_string()
		);
	}
}
