// std
use std::{
	env, fs,
	sync::atomic::{AtomicUsize, Ordering},
};
// self
use dataverse_auth::{
	_preludet::*,
	auth::{Account, AccountId, ClientId, ScopeSet, TokenRecord, TokenSecret},
	cache::{
		CacheError, CacheKind, DurableCacheStore, MemoryCacheStore, SecureStorage, TokenCache,
		TokenWrite,
	},
	config::AuthConfig,
};

#[derive(Clone, Default)]
struct FakeStorage {
	blob: Arc<Mutex<Option<Vec<u8>>>>,
	loads: Arc<AtomicUsize>,
}
impl SecureStorage for FakeStorage {
	fn load(&self) -> Result<Option<Vec<u8>>, CacheError> {
		self.loads.fetch_add(1, Ordering::SeqCst);

		Ok(self.blob.lock().clone())
	}

	fn store(&self, blob: &[u8]) -> Result<(), CacheError> {
		*self.blob.lock() = Some(blob.to_vec());

		Ok(())
	}

	fn clear(&self) -> Result<(), CacheError> {
		*self.blob.lock() = None;

		Ok(())
	}
}

fn marker_path(test: &str) -> PathBuf {
	env::temp_dir()
		.join("dataverse-auth-tests")
		.join(format!("{test}-{}", std::process::id()))
		.join("token_cache.dat")
}

fn account() -> Account {
	Account {
		home_account_id: AccountId::from_parts("oid-1", "tid-1")
			.expect("Account identifier fixture should be valid."),
		username: "ada@contoso.test".into(),
		environment: "login.example.test".into(),
		tenant_id: Some("tid-1".into()),
	}
}

fn user_cache() -> TokenCache {
	TokenCache::new(
		ClientId::new("client-durable").expect("Client identifier fixture should be valid."),
		CacheKind::User,
	)
}

fn write(account: &Account, token: &str) -> TokenWrite {
	let record = TokenRecord::builder(
		Some(account.home_account_id.clone()),
		ScopeSet::new(["https://org.example.test/user_impersonation"])
			.expect("Scope fixture should be valid."),
	)
	.access_token(token)
	.issued_at(OffsetDateTime::now_utc())
	.expires_in(Duration::hours(1))
	.build()
	.expect("Token record fixture should build.");

	TokenWrite {
		record,
		account: Some(account.clone()),
		refresh_token: Some(TokenSecret::new("refresh")),
	}
}

#[tokio::test]
async fn durable_store_shares_state_across_caches() {
	let path = marker_path("shares-state");
	let storage = FakeStorage::default();
	let writer_store = Arc::new(DurableCacheStore::with_storage(storage.clone(), &path));
	let reader_store = Arc::new(DurableCacheStore::with_storage(storage.clone(), &path));
	let writer = user_cache();
	let reader = user_cache();

	writer_store.initialize(&writer);
	reader_store.initialize(&reader);
	writer.save(write(&account(), "durable-token")).await.expect("Save should succeed.");

	assert!(storage.blob.lock().is_some());
	assert!(path.exists(), "Marker file should be written next to the secure entry.");

	let accounts = reader.accounts().await.expect("Reader should load the stored cache.");

	assert_eq!(accounts, vec![account()]);

	let loads = storage.loads.load(Ordering::SeqCst);

	reader.accounts().await.expect("Second read should succeed.");

	assert_eq!(
		storage.loads.load(Ordering::SeqCst),
		loads,
		"An unchanged marker should not reload the secure entry."
	);

	let _ = fs::remove_dir_all(path.parent().expect("Marker path should have a parent."));
}

#[tokio::test]
async fn durable_store_clears_storage_when_no_tokens_remain() {
	let path = marker_path("clears-storage");
	let storage = FakeStorage::default();
	let store = Arc::new(DurableCacheStore::with_storage(storage.clone(), &path));
	let cache = user_cache();

	store.initialize(&cache);
	cache.save(write(&account(), "soon-removed")).await.expect("Save should succeed.");
	cache.remove_account(&account().home_account_id).await.expect("Removal should succeed.");

	assert!(storage.blob.lock().is_none());
	assert!(!path.exists(), "Marker should be removed with the last token.");

	let _ = fs::remove_dir_all(path.parent().expect("Marker path should have a parent."));
}

#[tokio::test]
async fn memory_store_clamps_past_expiry_hints() {
	let store = MemoryCacheStore::with_config(&AuthConfig::default());
	let before = OffsetDateTime::now_utc();

	store.set("stale", b"blob", Some(before - Duration::hours(1)));

	let expiry = store.entry_expiry("stale").expect("Entry should be stored.");

	assert!(expiry >= before + Duration::minutes(59));
	assert!(expiry <= OffsetDateTime::now_utc() + Duration::hours(1));
	assert_eq!(store.get("stale").as_deref(), Some(&b"blob"[..]));
	assert!(store.get("never-written").is_none());
}

#[tokio::test]
async fn memory_store_round_trips_a_client_cache() {
	let store = Arc::new(MemoryCacheStore::with_config(&AuthConfig::default()));
	let first = user_cache();
	let second = user_cache();

	store.initialize(&first);
	store.initialize(&second);
	first.save(write(&account(), "memory-token")).await.expect("Save should succeed.");

	let found = second
		.find_access_token(
			Some(&account().home_account_id),
			&ScopeSet::new(["https://org.example.test/user_impersonation"])
				.expect("Scope fixture should be valid."),
		)
		.await
		.expect("Lookup should succeed.")
		.expect("Second cache should see the first cache's token.");

	assert_eq!(found.access_token.expose(), "memory-token");
	assert!(store.get("client-durable_UserTokenCache").is_some());
}
