//! One acquisition attempt: picks the path a strategy takes on a client and drives it.

// self
use crate::{
	_prelude::*,
	auth::{Account, ScopeSet},
	client::{ClientKind, InteractiveOptions, TokenProvider, TokenResult},
	error::ConfigError,
	obs::{AuthLogger, FlowKind, LogLevel, TracingLogger},
	strategy::{CredentialStrategy, ExternalTokenSource},
};

/// Client a token is acquired with, retained by the caller for later silent refreshes.
#[derive(Clone)]
pub enum ClientHandle {
	/// Public client for user flows.
	Public(Arc<dyn TokenProvider>),
	/// Confidential client for app-only flows.
	Confidential(Arc<dyn TokenProvider>),
	/// Caller-owned token source.
	External(Arc<dyn ExternalTokenSource>),
}
impl ClientHandle {
	/// Short label used in logs and errors.
	pub fn label(&self) -> &'static str {
		match self {
			ClientHandle::Public(_) => "public",
			ClientHandle::Confidential(_) => "confidential",
			ClientHandle::External(_) => "external",
		}
	}

	/// Underlying provider, unless the handle wraps an external source.
	pub fn provider(&self) -> Option<&Arc<dyn TokenProvider>> {
		match self {
			ClientHandle::Public(provider) | ClientHandle::Confidential(provider) => Some(provider),
			ClientHandle::External(_) => None,
		}
	}

	/// Whether `strategy` can run on this handle.
	pub fn serves(&self, strategy: &CredentialStrategy) -> bool {
		match (self, strategy.client_kind()) {
			(ClientHandle::Public(_), Some(ClientKind::Public))
			| (ClientHandle::Confidential(_), Some(ClientKind::Confidential))
			| (ClientHandle::External(_), None) => true,
			_ => false,
		}
	}
}
impl Debug for ClientHandle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self.provider() {
			Some(provider) => f
				.debug_struct("ClientHandle")
				.field("kind", &self.label())
				.field("client_id", provider.client_id())
				.field("authority", &provider.authority().as_str())
				.finish(),
			None => f.write_str("ClientHandle(external)"),
		}
	}
}

/// Path an acquisition actually took.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AcquisitionPath {
	/// Cached or refreshed token for a known account.
	Silent,
	/// Resource-owner password grant.
	UsernamePassword,
	/// Operating-system identity.
	Integrated,
	/// Authorization-code sign-in through the prompt.
	Interactive,
	/// Confidential client credential grant.
	Client,
	/// Caller-supplied token.
	External,
}
impl AcquisitionPath {
	/// Flow label used by spans and counters.
	pub const fn flow_kind(self) -> FlowKind {
		match self {
			AcquisitionPath::Silent => FlowKind::Silent,
			AcquisitionPath::UsernamePassword => FlowKind::UsernamePassword,
			AcquisitionPath::Integrated => FlowKind::Integrated,
			AcquisitionPath::Interactive => FlowKind::Interactive,
			AcquisitionPath::Client => FlowKind::Client,
			AcquisitionPath::External => FlowKind::External,
		}
	}
}
impl Display for AcquisitionPath {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.flow_kind().as_str())
	}
}

/// Successful acquisition.
#[derive(Clone, Debug)]
pub struct AcquisitionOutcome {
	/// Token and the account it belongs to.
	pub token: TokenResult,
	/// Path taken.
	pub path: AcquisitionPath,
}

/// Drives one acquisition attempt against a client.
#[derive(Clone)]
pub struct TokenAcquisitionEngine {
	logger: Arc<dyn AuthLogger>,
}
impl TokenAcquisitionEngine {
	/// Creates an engine reporting through `logger`.
	pub fn new(logger: Arc<dyn AuthLogger>) -> Self {
		Self { logger }
	}

	/// Acquires a token for `scopes` with `strategy` on `client`.
	///
	/// User strategies run in this order, first match wins:
	///
	/// 1. Without an explicit `account`, adopt the cached account matching the login hint.
	/// 2. Username and password: silent for a known account, else the password grant.
	/// 3. Integrated: the operating-system identity with the login hint.
	/// 4. Interactive: a prompt value forces the prompt; otherwise a known account goes silent
	///    and an unknown one gets the prompt with only the login hint.
	///
	/// Application strategies request an app-only token; external strategies ask their source.
	pub async fn acquire(
		&self,
		client: &ClientHandle,
		scopes: &ScopeSet,
		strategy: &CredentialStrategy,
		account: Option<Account>,
	) -> Result<AcquisitionOutcome> {
		match (client, strategy) {
			(ClientHandle::External(source), CredentialStrategy::External(_)) => {
				self.log_path(AcquisitionPath::External, scopes);

				let token = source.token(scopes).await?;

				Ok(AcquisitionOutcome {
					token: TokenResult {
						access_token: token.access_token,
						expires_at: token.expires_at,
						scopes: scopes.clone(),
						account: None,
					},
					path: AcquisitionPath::External,
				})
			},
			(ClientHandle::Confidential(provider), CredentialStrategy::Application(_)) => {
				self.log_path(AcquisitionPath::Client, scopes);

				let token = provider.acquire_for_client(scopes).await?;

				Ok(AcquisitionOutcome { token, path: AcquisitionPath::Client })
			},
			(ClientHandle::Public(provider), strategy) if client.serves(strategy) =>
				self.acquire_for_user(provider.as_ref(), scopes, strategy, account).await,
			_ => Err(ConfigError::StrategyMismatch {
				strategy: strategy.label(),
				client: client.label(),
			}
			.into()),
		}
	}

	async fn acquire_for_user(
		&self,
		provider: &dyn TokenProvider,
		scopes: &ScopeSet,
		strategy: &CredentialStrategy,
		account: Option<Account>,
	) -> Result<AcquisitionOutcome> {
		let account = match (account, strategy.login_hint()) {
			(Some(account), _) => Some(account),
			(None, Some(hint)) =>
				provider.accounts().await?.into_iter().find(|known| known.matches_username(hint)),
			(None, None) => None,
		};

		match strategy {
			CredentialStrategy::UsernamePassword { username, password } => match account {
				Some(account) => self.silent(provider, scopes, &account).await,
				None => {
					self.log_path(AcquisitionPath::UsernamePassword, scopes);

					let token = provider
						.acquire_by_username_password(scopes, username, password.expose())
						.await?;

					Ok(AcquisitionOutcome { token, path: AcquisitionPath::UsernamePassword })
				},
			},
			CredentialStrategy::Integrated { login_hint } => {
				self.log_path(AcquisitionPath::Integrated, scopes);

				let token = provider.acquire_integrated(scopes, login_hint.as_deref()).await?;

				Ok(AcquisitionOutcome { token, path: AcquisitionPath::Integrated })
			},
			CredentialStrategy::Interactive { login_hint, prompt } =>
				match (prompt.to_prompt(), account) {
					(None, Some(account)) => self.silent(provider, scopes, &account).await,
					(prompt, account) => {
						self.log_path(AcquisitionPath::Interactive, scopes);

						let options =
							InteractiveOptions { prompt, login_hint: login_hint.clone(), account };
						let token = provider.acquire_interactive(scopes, options).await?;

						Ok(AcquisitionOutcome { token, path: AcquisitionPath::Interactive })
					},
				},
			CredentialStrategy::Application(_) | CredentialStrategy::External(_) =>
				Err(ConfigError::StrategyMismatch { strategy: strategy.label(), client: "public" }
					.into()),
		}
	}

	async fn silent(
		&self,
		provider: &dyn TokenProvider,
		scopes: &ScopeSet,
		account: &Account,
	) -> Result<AcquisitionOutcome> {
		self.log_path(AcquisitionPath::Silent, scopes);

		let token = provider.acquire_silent(scopes, account).await?;

		Ok(AcquisitionOutcome { token, path: AcquisitionPath::Silent })
	}

	fn log_path(&self, path: AcquisitionPath, scopes: &ScopeSet) {
		self.logger.log(
			LogLevel::Verbose,
			&format!("Acquiring a token for `{scopes}` via the {path} path."),
			None,
		);
	}
}
impl Default for TokenAcquisitionEngine {
	fn default() -> Self {
		Self::new(Arc::new(TracingLogger))
	}
}
impl Debug for TokenAcquisitionEngine {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TokenAcquisitionEngine")
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		auth::{AccountId, ClientId, TokenSecret},
		client::{Prompt, PromptBehavior, ProviderFuture},
		strategy::Credential,
	};

	#[derive(Default)]
	struct FakeProvider {
		accounts: Vec<Account>,
		calls: Mutex<Vec<String>>,
		interactive_prompts: Mutex<Vec<Option<Prompt>>>,
		count: AtomicUsize,
	}
	impl FakeProvider {
		fn with_account(username: &str) -> Self {
			Self {
				accounts: vec![Account {
					home_account_id: AccountId::from_parts("oid", "tid")
						.expect("Account id fixture should be valid."),
					username: username.into(),
					environment: "login.example.test".into(),
					tenant_id: Some("tid".into()),
				}],
				..Default::default()
			}
		}

		fn record(&self, call: &str) -> Result<TokenResult> {
			self.calls.lock().push(call.into());
			self.count.fetch_add(1, Ordering::SeqCst);

			Ok(TokenResult {
				access_token: TokenSecret::new(format!("{call}-token")),
				expires_at: OffsetDateTime::now_utc() + Duration::hours(1),
				scopes: ScopeSet::new(["https://org.example.test/user_impersonation"])
					.expect("Scope fixture should be valid."),
				account: self.accounts.first().cloned(),
			})
		}

		fn calls(&self) -> Vec<String> {
			self.calls.lock().clone()
		}
	}
	impl TokenProvider for FakeProvider {
		fn kind(&self) -> ClientKind {
			ClientKind::Public
		}

		fn client_id(&self) -> &ClientId {
			unimplemented!("The engine never reads the client id.")
		}

		fn authority(&self) -> &Url {
			unimplemented!("The engine never reads the authority.")
		}

		fn accounts(&self) -> ProviderFuture<'_, Vec<Account>> {
			Box::pin(async move { Ok(self.accounts.clone()) })
		}

		fn acquire_silent<'a>(
			&'a self,
			_: &'a ScopeSet,
			_: &'a Account,
		) -> ProviderFuture<'a, TokenResult> {
			Box::pin(async move { self.record("silent") })
		}

		fn acquire_interactive<'a>(
			&'a self,
			_: &'a ScopeSet,
			options: InteractiveOptions,
		) -> ProviderFuture<'a, TokenResult> {
			Box::pin(async move {
				self.interactive_prompts.lock().push(options.prompt);

				self.record("interactive")
			})
		}

		fn acquire_by_username_password<'a>(
			&'a self,
			_: &'a ScopeSet,
			_: &'a str,
			_: &'a str,
		) -> ProviderFuture<'a, TokenResult> {
			Box::pin(async move { self.record("password") })
		}

		fn acquire_integrated<'a>(
			&'a self,
			_: &'a ScopeSet,
			_: Option<&'a str>,
		) -> ProviderFuture<'a, TokenResult> {
			Box::pin(async move { self.record("integrated") })
		}

		fn acquire_for_client<'a>(&'a self, _: &'a ScopeSet) -> ProviderFuture<'a, TokenResult> {
			Box::pin(async move { self.record("client") })
		}
	}

	fn scopes() -> ScopeSet {
		ScopeSet::new(["https://org.example.test/user_impersonation"])
			.expect("Scope fixture should be valid.")
	}

	async fn run(
		provider: Arc<FakeProvider>,
		credential: Credential,
		prompt: PromptBehavior,
	) -> AcquisitionOutcome {
		let strategy = CredentialStrategy::select(&credential, prompt)
			.expect("Fixture credential should select a strategy.");

		TokenAcquisitionEngine::default()
			.acquire(&ClientHandle::Public(provider), &scopes(), &strategy, None)
			.await
			.expect("Acquisition should succeed.")
	}

	#[tokio::test]
	async fn known_account_goes_silent_without_a_forced_prompt() {
		let provider = Arc::new(FakeProvider::with_account("ada@contoso.test"));
		let outcome = run(
			provider.clone(),
			Credential::interactive(Some("ADA@contoso.test".into())),
			PromptBehavior::Auto,
		)
		.await;

		assert_eq!(outcome.path, AcquisitionPath::Silent);
		assert_eq!(provider.calls(), ["silent"]);
	}

	#[tokio::test]
	async fn prompt_values_force_the_interactive_path() {
		let provider = Arc::new(FakeProvider::with_account("ada@contoso.test"));
		let outcome = run(
			provider.clone(),
			Credential::interactive(Some("ada@contoso.test".into())),
			PromptBehavior::SelectAccount,
		)
		.await;

		assert_eq!(outcome.path, AcquisitionPath::Interactive);
		assert_eq!(*provider.interactive_prompts.lock(), [Some(Prompt::SelectAccount)]);
	}

	#[tokio::test]
	async fn unknown_account_falls_back_to_interactive_with_hint_only() {
		let provider = Arc::new(FakeProvider::default());
		let outcome = run(provider.clone(), Credential::interactive(None), PromptBehavior::Auto).await;

		assert_eq!(outcome.path, AcquisitionPath::Interactive);
		assert_eq!(*provider.interactive_prompts.lock(), [None]);
	}

	#[tokio::test]
	async fn password_prefers_a_cached_account() {
		let cached = Arc::new(FakeProvider::with_account("ada@contoso.test"));
		let outcome = run(
			cached.clone(),
			Credential::username_password("ada@contoso.test", "pw"),
			PromptBehavior::Auto,
		)
		.await;

		assert_eq!(outcome.path, AcquisitionPath::Silent);

		let empty = Arc::new(FakeProvider::default());
		let outcome = run(
			empty.clone(),
			Credential::username_password("ada@contoso.test", "pw"),
			PromptBehavior::Never,
		)
		.await;

		assert_eq!(outcome.path, AcquisitionPath::UsernamePassword);
		assert_eq!(empty.calls(), ["password"]);
	}

	#[tokio::test]
	async fn integrated_identity_is_used_when_requested() {
		let provider = Arc::new(FakeProvider::with_account("ada@contoso.test"));
		let outcome = run(
			provider.clone(),
			Credential::integrated(Some("someone@else.test".into())),
			PromptBehavior::Auto,
		)
		.await;

		assert_eq!(outcome.path, AcquisitionPath::Integrated);
		assert_eq!(provider.count.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn confidential_handles_acquire_app_tokens() {
		let provider = Arc::new(FakeProvider::default());
		let strategy = CredentialStrategy::select(
			&Credential::client_secret("secret"),
			PromptBehavior::Auto,
		)
		.expect("Secret credential should select a strategy.");
		let outcome = TokenAcquisitionEngine::default()
			.acquire(&ClientHandle::Confidential(provider.clone()), &scopes(), &strategy, None)
			.await
			.expect("Client acquisition should succeed.");

		assert_eq!(outcome.path, AcquisitionPath::Client);
		assert_eq!(provider.calls(), ["client"]);
	}

	#[tokio::test]
	async fn mismatched_handles_are_rejected_before_any_call() {
		let provider = Arc::new(FakeProvider::default());
		let strategy = CredentialStrategy::select(
			&Credential::client_secret("secret"),
			PromptBehavior::Auto,
		)
		.expect("Secret credential should select a strategy.");
		let err = TokenAcquisitionEngine::default()
			.acquire(&ClientHandle::Public(provider.clone()), &scopes(), &strategy, None)
			.await
			.expect_err("A secret cannot run on a public client.");

		assert!(matches!(err, Error::Config(ConfigError::StrategyMismatch { .. })));
		assert!(provider.calls().is_empty());
	}
}
