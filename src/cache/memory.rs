//! Process-wide in-memory token cache store.

// std
use std::sync::OnceLock;
// self
use crate::{
	_prelude::*,
	cache::{CacheAccessArgs, CacheFuture, CacheSerializer, TokenCache},
	config::AuthConfig,
};

#[derive(Clone, Debug)]
struct MemoryEntry {
	blob: Arc<[u8]>,
	expires_at: OffsetDateTime,
}

/// Keeps serialized token caches in process memory, keyed by each cache's suggested key.
///
/// Entries expire after the cache's suggested expiry, or after the configured lifetime when no
/// expiry is suggested. Expired entries are dropped the next time they are read. Confidential
/// clients share [`MemoryCacheStore::shared`] unless a store is injected.
#[derive(Debug)]
pub struct MemoryCacheStore {
	entries: RwLock<HashMap<String, MemoryEntry>>,
	default_lifetime: Duration,
	expired_hint_fallback: Duration,
}
impl MemoryCacheStore {
	/// Creates a store with the lifetimes configured in `config`.
	pub fn with_config(config: &AuthConfig) -> Self {
		Self {
			entries: Default::default(),
			default_lifetime: config.memory_cache_lifetime(),
			expired_hint_fallback: config.expired_hint_fallback(),
		}
	}

	/// Process-wide instance using default lifetimes.
	pub fn shared() -> Arc<Self> {
		static SHARED: OnceLock<Arc<MemoryCacheStore>> = OnceLock::new();

		SHARED.get_or_init(|| Arc::new(Self::default())).clone()
	}

	/// Wires this store's hooks into `cache`.
	pub fn initialize(self: &Arc<Self>, cache: &TokenCache) {
		cache.set_serializer(self.clone());
	}

	/// Returns the blob stored under `key` unless it has expired; expired entries are evicted.
	pub fn get(&self, key: &str) -> Option<Arc<[u8]>> {
		let now = OffsetDateTime::now_utc();

		{
			let entries = self.entries.read();
			let entry = entries.get(key)?;

			if entry.expires_at > now {
				return Some(entry.blob.clone());
			}
		}

		let mut entries = self.entries.write();

		if entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
			entries.remove(key);
		}

		None
	}

	/// Stores `blob` under `key`; the last writer wins.
	///
	/// No `suggested_expiry` means the default lifetime. A suggestion already in the past is
	/// replaced with the fallback lifetime so the entry stays readable for a while.
	pub fn set(
		&self,
		key: impl Into<String>,
		blob: &[u8],
		suggested_expiry: Option<OffsetDateTime>,
	) {
		let now = OffsetDateTime::now_utc();
		let expires_at = match suggested_expiry {
			None => now + self.default_lifetime,
			Some(instant) if instant < now => now + self.expired_hint_fallback,
			Some(instant) => instant,
		};

		self.entries.write().insert(key.into(), MemoryEntry { blob: Arc::from(blob), expires_at });
	}

	/// Removes the entry stored under `key`.
	pub fn remove(&self, key: &str) {
		self.entries.write().remove(key);
	}

	/// Expiry of the entry stored under `key`, including already expired entries.
	pub fn entry_expiry(&self, key: &str) -> Option<OffsetDateTime> {
		self.entries.read().get(key).map(|entry| entry.expires_at)
	}
}
impl Default for MemoryCacheStore {
	fn default() -> Self {
		Self::with_config(&AuthConfig::default())
	}
}
impl CacheSerializer for MemoryCacheStore {
	fn before_access<'a>(&'a self, args: CacheAccessArgs<'a>) -> CacheFuture<'a, ()> {
		Box::pin(async move {
			if let Some(blob) = self.get(&args.suggested_key()) {
				args.cache.deserialize(&blob)?;
			}

			Ok(())
		})
	}

	fn after_access<'a>(&'a self, args: CacheAccessArgs<'a>) -> CacheFuture<'a, ()> {
		Box::pin(async move {
			if !args.has_state_changed {
				return Ok(());
			}

			let key = args.suggested_key();

			if args.has_tokens() {
				self.set(key, &args.cache.serialize()?, args.suggested_expiry());
			} else {
				self.remove(&key);
			}

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn missing_suggestion_uses_the_default_lifetime() {
		let store = MemoryCacheStore::default();
		let before = OffsetDateTime::now_utc();

		store.set("k", b"blob", None);

		let expiry = store.entry_expiry("k").expect("Entry should exist.");

		assert!(expiry >= before + Duration::days(14));
		assert!(expiry <= OffsetDateTime::now_utc() + Duration::days(14));
	}

	#[test]
	fn past_suggestion_is_clamped_to_one_hour() {
		let store = MemoryCacheStore::default();
		let before = OffsetDateTime::now_utc();

		store.set("k", b"blob", Some(before - Duration::minutes(5)));

		let expiry = store.entry_expiry("k").expect("Entry should exist.");

		assert!(expiry >= before + Duration::hours(1));
		assert!(expiry <= OffsetDateTime::now_utc() + Duration::hours(1));
		assert_eq!(store.get("k").as_deref(), Some(&b"blob"[..]));
	}

	#[test]
	fn future_suggestion_is_kept() {
		let store = MemoryCacheStore::default();
		let expiry = OffsetDateTime::now_utc() + Duration::minutes(42);

		store.set("k", b"blob", Some(expiry));

		assert_eq!(store.entry_expiry("k"), Some(expiry));
	}

	#[test]
	fn missing_and_expired_keys_read_as_absent() {
		let config = AuthConfig { memory_cache_lifetime_secs: 0, ..Default::default() };
		let store = MemoryCacheStore::with_config(&config);

		assert!(store.get("never-written").is_none());

		store.set("k", b"blob", None);

		assert!(store.get("k").is_none());
		assert!(store.entry_expiry("k").is_none(), "Expired entries are evicted on read.");
	}

	#[test]
	fn shared_store_is_a_singleton() {
		assert!(Arc::ptr_eq(&MemoryCacheStore::shared(), &MemoryCacheStore::shared()));
	}
}
