//! Per-client token cache with serializer hooks.

// self
use crate::{
	_prelude::*,
	auth::{Account, AccountId, ClientId, ScopeSet, TokenRecord, TokenSecret},
	cache::{CacheAccessArgs, CacheError, CacheSerializer},
};

/// Which kind of client a cache belongs to; decides the suggested key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKind {
	/// Confidential (app-only) tokens.
	App,
	/// Public-client (delegated user) tokens.
	User,
}

/// Tokens produced by one successful grant.
#[derive(Clone, Debug)]
pub struct TokenWrite {
	/// Access token to store, replacing any record with the same account and scopes.
	pub record: TokenRecord,
	/// Account the grant signed in, if any.
	pub account: Option<Account>,
	/// Refresh token issued alongside the access token.
	pub refresh_token: Option<TokenSecret>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct CacheState {
	accounts: BTreeMap<AccountId, Account>,
	access_tokens: Vec<TokenRecord>,
	refresh_tokens: BTreeMap<AccountId, TokenSecret>,
}
impl CacheState {
	fn has_tokens(&self) -> bool {
		!self.access_tokens.is_empty() || !self.refresh_tokens.is_empty()
	}
}

/// Accounts, access tokens, and refresh tokens known to one client.
///
/// Each read or write takes the cache's async access lock, runs the serializer's
/// `before_access` hook, touches the state, then runs `after_access`, so one client never
/// interleaves two load/save sequences.
pub struct TokenCache {
	client_id: ClientId,
	kind: CacheKind,
	state: RwLock<CacheState>,
	serializer: RwLock<Option<Arc<dyn CacheSerializer>>>,
	access_lock: AsyncMutex<()>,
}
impl TokenCache {
	/// Creates an empty cache for `client_id`.
	pub fn new(client_id: ClientId, kind: CacheKind) -> Self {
		Self {
			client_id,
			kind,
			state: Default::default(),
			serializer: Default::default(),
			access_lock: AsyncMutex::new(()),
		}
	}

	/// Attaches (or replaces) the persistence hooks.
	pub fn set_serializer(&self, serializer: Arc<dyn CacheSerializer>) {
		*self.serializer.write() = Some(serializer);
	}

	/// Client the cache belongs to.
	pub fn client_id(&self) -> &ClientId {
		&self.client_id
	}

	/// Cache kind.
	pub fn kind(&self) -> CacheKind {
		self.kind
	}

	/// Storage key stores should use: `{client_id}_AppTokenCache` or `{client_id}_UserTokenCache`.
	pub fn suggested_key(&self) -> String {
		match self.kind {
			CacheKind::App => format!("{}_AppTokenCache", self.client_id),
			CacheKind::User => format!("{}_UserTokenCache", self.client_id),
		}
	}

	/// Whether any access or refresh token is present.
	pub fn has_tokens(&self) -> bool {
		self.state.read().has_tokens()
	}

	/// Latest access-token expiry, unless a refresh token keeps the cache useful indefinitely.
	pub fn suggested_expiry(&self) -> Option<OffsetDateTime> {
		let state = self.state.read();

		if !state.refresh_tokens.is_empty() {
			return None;
		}

		state.access_tokens.iter().map(|record| record.expires_at).max()
	}

	/// Encodes the full state as JSON.
	pub fn serialize(&self) -> Result<Vec<u8>, CacheError> {
		serde_json::to_vec(&*self.state.read())
			.map_err(|e| CacheError::Serialization { message: format!("Failed to encode cache: {e}") })
	}

	/// Replaces the state with a previously serialized blob.
	pub fn deserialize(&self, blob: &[u8]) -> Result<(), CacheError> {
		let state = serde_json::from_slice::<CacheState>(blob).map_err(|e| {
			CacheError::Serialization { message: format!("Failed to decode cache: {e}") }
		})?;

		*self.state.write() = state;

		Ok(())
	}

	/// Accounts with tokens in this cache.
	pub async fn accounts(&self) -> Result<Vec<Account>, CacheError> {
		self.access(|state| (state.accounts.values().cloned().collect(), false)).await
	}

	/// Finds an access token for `account` covering every scope in `scope`.
	///
	/// Reserved OIDC scopes are ignored during the comparison.
	pub async fn find_access_token(
		&self,
		account: Option<&AccountId>,
		scope: &ScopeSet,
	) -> Result<Option<TokenRecord>, CacheError> {
		let wanted = scope.without_reserved();

		self.access(|state| {
			let found = state
				.access_tokens
				.iter()
				.filter(|record| record.account.as_ref() == account)
				.find(|record| record.scope.is_superset_of(&wanted))
				.cloned();

			(found, false)
		})
		.await
	}

	/// Refresh token held for `account`.
	pub async fn refresh_token(
		&self,
		account: &AccountId,
	) -> Result<Option<TokenSecret>, CacheError> {
		self.access(|state| (state.refresh_tokens.get(account).cloned(), false)).await
	}

	/// Stores the outcome of a grant.
	pub async fn save(&self, write: TokenWrite) -> Result<(), CacheError> {
		self.access(move |state| {
			let TokenWrite { mut record, account, refresh_token } = write;

			record.scope = record.scope.without_reserved();
			state.access_tokens.retain(|existing| {
				existing.account != record.account || existing.scope != record.scope
			});

			if let Some(account) = account {
				if let Some(refresh) = refresh_token {
					state.refresh_tokens.insert(account.home_account_id.clone(), refresh);
				}

				state.accounts.insert(account.home_account_id.clone(), account);
			}

			state.access_tokens.push(record);

			((), true)
		})
		.await
	}

	/// Forgets an account together with its tokens.
	pub async fn remove_account(&self, account: &AccountId) -> Result<(), CacheError> {
		self.access(|state| {
			let before = state.access_tokens.len();

			state.access_tokens.retain(|record| record.account.as_ref() != Some(account));

			let removed = state.accounts.remove(account).is_some()
				| state.refresh_tokens.remove(account).is_some()
				| (before != state.access_tokens.len());

			((), removed)
		})
		.await
	}

	async fn access<T>(
		&self,
		op: impl FnOnce(&mut CacheState) -> (T, bool),
	) -> Result<T, CacheError> {
		let _access = self.access_lock.lock().await;
		let serializer = self.serializer.read().clone();

		if let Some(serializer) = &serializer {
			serializer.before_access(CacheAccessArgs { cache: self, has_state_changed: false }).await?;
		}

		let (value, has_state_changed) = op(&mut self.state.write());

		if let Some(serializer) = &serializer {
			serializer.after_access(CacheAccessArgs { cache: self, has_state_changed }).await?;
		}

		Ok(value)
	}
}
impl Debug for TokenCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.read();

		f.debug_struct("TokenCache")
			.field("client_id", &self.client_id)
			.field("kind", &self.kind)
			.field("accounts", &state.accounts.len())
			.field("access_tokens", &state.access_tokens.len())
			.field("refresh_tokens", &state.refresh_tokens.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;

	fn client() -> ClientId {
		ClientId::new("51f81489-12ee-4a9e-aaae-a2591f45987d").expect("Client fixture should be valid.")
	}

	fn scope() -> ScopeSet {
		ScopeSet::new(["https://org.example.test/user_impersonation"])
			.expect("Scope fixture should be valid.")
	}

	fn account() -> Account {
		Account {
			home_account_id: AccountId::from_parts("oid", "tid")
				.expect("Account fixture should be valid."),
			username: "ada@contoso.test".into(),
			environment: "login.example.test".into(),
			tenant_id: Some("tid".into()),
		}
	}

	fn write(expires_in: Duration, refresh: Option<&str>) -> TokenWrite {
		let account = account();
		let record = TokenRecord::builder(Some(account.home_account_id.clone()), scope().with_reserved())
			.access_token("access")
			.expires_in(expires_in)
			.build()
			.expect("Record fixture should build.");

		TokenWrite { record, account: Some(account), refresh_token: refresh.map(TokenSecret::new) }
	}

	#[derive(Default)]
	struct Counting {
		before: AtomicUsize,
		changed: AtomicUsize,
	}
	impl CacheSerializer for Counting {
		fn before_access<'a>(&'a self, _: CacheAccessArgs<'a>) -> crate::cache::CacheFuture<'a, ()> {
			self.before.fetch_add(1, Ordering::SeqCst);

			Box::pin(async { Ok(()) })
		}

		fn after_access<'a>(&'a self, args: CacheAccessArgs<'a>) -> crate::cache::CacheFuture<'a, ()> {
			if args.has_state_changed {
				self.changed.fetch_add(1, Ordering::SeqCst);
			}

			Box::pin(async { Ok(()) })
		}
	}

	#[tokio::test]
	async fn hooks_bracket_reads_and_writes() {
		let cache = TokenCache::new(client(), CacheKind::User);
		let hooks = Arc::new(Counting::default());

		cache.set_serializer(hooks.clone());
		cache.save(write(Duration::hours(1), Some("refresh"))).await.expect("Save should succeed.");

		let found = cache
			.find_access_token(Some(&account().home_account_id), &scope())
			.await
			.expect("Lookup should succeed.");

		assert!(found.is_some());
		assert_eq!(hooks.before.load(Ordering::SeqCst), 2);
		assert_eq!(hooks.changed.load(Ordering::SeqCst), 1);
		assert_eq!(cache.suggested_key(), format!("{}_UserTokenCache", client()));
	}

	#[tokio::test]
	async fn suggested_expiry_tracks_access_tokens_without_refresh_tokens() {
		let cache = TokenCache::new(client(), CacheKind::App);

		assert_eq!(cache.suggested_expiry(), None);
		assert!(!cache.has_tokens());

		let entry = write(Duration::minutes(30), None);
		let expected = entry.record.expires_at;

		cache.save(entry).await.expect("Save should succeed.");

		assert_eq!(cache.suggested_expiry(), Some(expected));

		cache.save(write(Duration::minutes(30), Some("refresh"))).await.expect("Save should succeed.");

		assert_eq!(cache.suggested_expiry(), None);
	}

	#[tokio::test]
	async fn blobs_round_trip_and_accounts_can_be_removed() {
		let cache = TokenCache::new(client(), CacheKind::User);

		cache.save(write(Duration::hours(1), Some("refresh"))).await.expect("Save should succeed.");

		let blob = cache.serialize().expect("Serialize should succeed.");
		let restored = TokenCache::new(client(), CacheKind::User);

		restored.deserialize(&blob).expect("Deserialize should succeed.");

		let accounts = restored.accounts().await.expect("Accounts should load.");

		assert_eq!(accounts, vec![account()]);
		assert_eq!(
			restored
				.refresh_token(&account().home_account_id)
				.await
				.expect("Refresh lookup should succeed.")
				.map(|secret| secret.expose().to_owned()),
			Some("refresh".into())
		);

		restored.remove_account(&account().home_account_id).await.expect("Remove should succeed.");

		assert!(!restored.has_tokens());
		assert!(restored.deserialize(b"not json").is_err());
	}
}
