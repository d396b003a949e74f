//! Top-level entry point: resolve the authority, build or reuse a client, acquire a token, and
//! recover once from interaction-required failures.

// self
use crate::{
	_prelude::*,
	auth::{Account, ClientId, ScopeSet, TokenSecret},
	authority::AuthorityResolver,
	cache::{CacheSerializer, DurableCacheStore, MemoryCacheStore},
	client::{
		AuthorizationPrompt, ClientCredential, ClientFactory, ClientKind, ClientParams,
		OAuthClientFactory, PromptBehavior, TokenResult,
	},
	config::AuthConfig,
	engine::{AcquisitionOutcome, AcquisitionPath, ClientHandle, TokenAcquisitionEngine},
	error::ConfigError,
	obs::{self, AuthLogger, FlowKind, FlowOutcome, FlowSpan, LogLevel, TracingLogger},
	strategy::{Credential, CredentialStrategy},
};

/// Inputs of one authentication attempt.
///
/// ```
/// use dataverse_auth::{
/// 	auth::ClientId,
/// 	client::PromptBehavior,
/// 	orchestrator::AuthenticationRequest,
/// 	strategy::Credential,
/// 	url::Url,
/// };
///
/// let request = AuthenticationRequest::new(
/// 	Url::parse("https://org.example.test/")?,
/// 	ClientId::new("51f81489-12ee-4a9e-aaae-a2591f45987d")?,
/// 	Credential::interactive(Some("ada@contoso.test".into())),
/// )
/// .with_prompt(PromptBehavior::SelectAccount);
///
/// assert_eq!(request.prompt, PromptBehavior::SelectAccount);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug)]
pub struct AuthenticationRequest {
	/// Service endpoint.
	pub service_url: Url,
	/// Authority, when already known; skips the probe.
	pub authority: Option<Url>,
	/// Resource, when already known; defaults to the service origin next to a known authority.
	pub resource: Option<Url>,
	/// Application (client) id.
	pub client_id: ClientId,
	/// Redirect URI of the public client.
	pub redirect_uri: Option<Url>,
	/// Credential material.
	pub credential: Credential,
	/// Prompt behavior.
	pub prompt: PromptBehavior,
	/// Account from an earlier authentication.
	pub account: Option<Account>,
	/// Marker path of the durable cache for public clients.
	pub durable_cache_path: Option<PathBuf>,
	/// Probe an on-premises deployment, tolerating malformed challenge values.
	pub on_premises: bool,
	/// Overrides [`AuthConfig::use_versioned_endpoint`].
	pub use_versioned_endpoint: Option<bool>,
	/// Client from an earlier authentication to reuse.
	pub client: Option<ClientHandle>,
}
impl AuthenticationRequest {
	/// Creates a request with automatic prompting and no pre-known authority.
	pub fn new(service_url: Url, client_id: ClientId, credential: Credential) -> Self {
		Self {
			service_url,
			authority: None,
			resource: None,
			client_id,
			redirect_uri: None,
			credential,
			prompt: PromptBehavior::Auto,
			account: None,
			durable_cache_path: None,
			on_premises: false,
			use_versioned_endpoint: None,
			client: None,
		}
	}

	/// Sets the authority, skipping the probe.
	pub fn with_authority(mut self, authority: Url) -> Self {
		self.authority = Some(authority);

		self
	}

	/// Sets the resource.
	pub fn with_resource(mut self, resource: Url) -> Self {
		self.resource = Some(resource);

		self
	}

	/// Sets the public client's redirect URI.
	pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
		self.redirect_uri = Some(redirect_uri);

		self
	}

	/// Sets the prompt behavior.
	pub fn with_prompt(mut self, prompt: PromptBehavior) -> Self {
		self.prompt = prompt;

		self
	}

	/// Sets the account to acquire silently for.
	pub fn with_account(mut self, account: Account) -> Self {
		self.account = Some(account);

		self
	}

	/// Sets the durable cache marker path.
	pub fn with_durable_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.durable_cache_path = Some(path.into());

		self
	}

	/// Marks the service as an on-premises deployment.
	pub fn on_premises(mut self, on_premises: bool) -> Self {
		self.on_premises = on_premises;

		self
	}

	/// Overrides whether the service URL is rewritten to the versioned Web API endpoint.
	pub fn with_versioned_endpoint(mut self, enabled: bool) -> Self {
		self.use_versioned_endpoint = Some(enabled);

		self
	}

	/// Reuses a client from an earlier authentication.
	pub fn with_client(mut self, client: ClientHandle) -> Self {
		self.client = Some(client);

		self
	}

	/// Request for the interaction-required retry: no account, prompt forced, no OS identity.
	pub fn forced_interactive(&self) -> Self {
		let credential = match &self.credential {
			Credential::User { login_hint, password, .. } => Credential::User {
				login_hint: login_hint.clone(),
				password: password.clone(),
				use_default_identity: false,
			},
			other => other.clone(),
		};

		Self { credential, prompt: PromptBehavior::Always, account: None, ..self.clone() }
	}
}

/// Token produced by [`AuthOrchestrator::authenticate`].
#[derive(Clone, Debug)]
pub struct AcquiredToken {
	/// Bearer token.
	pub access_token: TokenSecret,
	/// Expiry instant.
	pub expires_at: OffsetDateTime,
	/// Service URL subsequent calls go to.
	pub service_url: Url,
	/// Authority the token came from.
	pub authority: Url,
	/// Resource the token is scoped to.
	pub resource: Url,
	/// Granted scopes.
	pub scopes: ScopeSet,
	/// Signed-in account; `None` for app-only and external tokens.
	pub account: Option<Account>,
	/// Acquisition path taken.
	pub path: AcquisitionPath,
	/// Client that produced the token, for later refreshes.
	pub client: ClientHandle,
}
impl AcquiredToken {
	/// Returns `true` once `instant` reaches the expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Returns `true` when fewer than `window` remain before expiry.
	pub fn expires_within(&self, window: Duration) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc() + window)
	}

	/// Acquires a fresh token through the retained client without resolving the authority again.
	///
	/// Public clients need the account; without one the call fails with [`Error::UiRequired`].
	pub async fn refresh_silently(&self) -> Result<AcquiredToken> {
		let outcome = match &self.client {
			ClientHandle::Public(provider) => {
				let account = self.account.as_ref().ok_or_else(|| Error::UiRequired {
					reason: "no account was retained for a silent refresh".into(),
				})?;
				let token = provider.acquire_silent(&self.scopes, account).await?;

				AcquisitionOutcome { token, path: AcquisitionPath::Silent }
			},
			ClientHandle::Confidential(provider) => AcquisitionOutcome {
				token: provider.acquire_for_client(&self.scopes).await?,
				path: AcquisitionPath::Client,
			},
			ClientHandle::External(source) => {
				let token = source.token(&self.scopes).await?;

				AcquisitionOutcome {
					token: TokenResult {
						access_token: token.access_token,
						expires_at: token.expires_at,
						scopes: self.scopes.clone(),
						account: None,
					},
					path: AcquisitionPath::External,
				}
			},
		};

		Ok(self.with_outcome(outcome))
	}

	fn with_outcome(&self, outcome: AcquisitionOutcome) -> Self {
		let AcquisitionOutcome { token, path } = outcome;

		Self {
			access_token: token.access_token,
			expires_at: token.expires_at,
			scopes: token.scopes,
			account: token.account.or_else(|| self.account.clone()),
			path,
			..self.clone()
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ClientKey {
	kind: ClientKind,
	authority: String,
	client_id: ClientId,
	credential: Option<String>,
	redirect_uri: Option<String>,
	cache_path: Option<PathBuf>,
}

/// Authenticates requests end to end.
///
/// The orchestrator owns the clients it builds and reuses them for later requests with the same
/// authority, client id, and credential material; public clients also match on the redirect URI
/// and durable cache path. Confidential clients share one memory cache; public clients persist
/// to the durable cache unless a public cache is injected.
pub struct AuthOrchestrator {
	config: AuthConfig,
	resolver: AuthorityResolver,
	factory: Arc<dyn ClientFactory>,
	engine: TokenAcquisitionEngine,
	logger: Arc<dyn AuthLogger>,
	prompt: Option<Arc<dyn AuthorizationPrompt>>,
	memory_cache: Arc<MemoryCacheStore>,
	public_cache: Option<Arc<dyn CacheSerializer>>,
	clients: Mutex<HashMap<ClientKey, ClientHandle>>,
}
impl AuthOrchestrator {
	/// Creates an orchestrator with default transports and the process-wide memory cache.
	pub fn new(config: AuthConfig) -> Self {
		let logger: Arc<dyn AuthLogger> = Arc::new(TracingLogger);

		Self {
			config,
			resolver: AuthorityResolver::default(),
			factory: Arc::new(OAuthClientFactory::default()),
			engine: TokenAcquisitionEngine::new(logger.clone()),
			logger,
			prompt: None,
			memory_cache: MemoryCacheStore::shared(),
			public_cache: None,
			clients: Mutex::new(HashMap::new()),
		}
	}

	/// Creates an orchestrator whose transports honor the configured timeout and user agent.
	pub fn from_config(config: AuthConfig) -> Result<Self, ConfigError> {
		let resolver = AuthorityResolver::from_config(&config)?;
		let factory = OAuthClientFactory::from_config(&config)?;

		Ok(Self::new(config).with_resolver(resolver).with_client_factory(Arc::new(factory)))
	}

	/// Replaces the authority resolver.
	pub fn with_resolver(mut self, resolver: AuthorityResolver) -> Self {
		self.resolver = resolver;

		self
	}

	/// Replaces the client factory.
	pub fn with_client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
		self.factory = factory;

		self
	}

	/// Replaces the memory cache confidential clients share.
	pub fn with_memory_cache(mut self, cache: Arc<MemoryCacheStore>) -> Self {
		self.memory_cache = cache;

		self
	}

	/// Injects the cache store public clients use instead of the durable cache.
	pub fn with_public_cache(mut self, cache: Arc<dyn CacheSerializer>) -> Self {
		self.public_cache = Some(cache);

		self
	}

	/// Replaces the logger.
	pub fn with_logger(mut self, logger: Arc<dyn AuthLogger>) -> Self {
		self.engine = TokenAcquisitionEngine::new(logger.clone());
		self.logger = logger;

		self
	}

	/// Sets the prompt capability interactive and integrated sign-ins go through.
	pub fn with_prompt(mut self, prompt: Arc<dyn AuthorizationPrompt>) -> Self {
		self.prompt = Some(prompt);

		self
	}

	/// Engine configuration.
	pub fn config(&self) -> &AuthConfig {
		&self.config
	}

	/// Authenticates `request`.
	///
	/// An interaction-required failure is retried exactly once with the account cleared and the
	/// prompt forced, provided the request's prompt behavior allows interaction. Every other
	/// failure is logged and returned unchanged.
	pub async fn authenticate(&self, request: AuthenticationRequest) -> Result<AcquiredToken> {
		const KIND: FlowKind = FlowKind::Authenticate;

		let span = FlowSpan::new(KIND, "authenticate");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.authenticate_with_retry(request)).await;

		obs::record_result(KIND, &result);

		result
	}

	async fn authenticate_with_retry(
		&self,
		request: AuthenticationRequest,
	) -> Result<AcquiredToken> {
		let e = match self.attempt(&request).await {
			Ok(token) => return Ok(token),
			Err(e) => e,
		};

		if !e.requires_interaction() {
			self.log_failure(&e);

			return Err(e);
		}
		if !request.prompt.allows_interaction() {
			self.logger.log(
				LogLevel::Error,
				&format!(
					"Interaction is required but prompt behavior {:?} does not allow it.",
					request.prompt
				),
				Some(&e),
			);

			return Err(e);
		}

		self.logger.log(
			LogLevel::Warning,
			"Interaction is required; retrying once with a forced prompt.",
			Some(&e),
		);

		self.attempt(&request.forced_interactive()).await.inspect_err(|e| self.log_failure(e))
	}

	async fn attempt(&self, request: &AuthenticationRequest) -> Result<AcquiredToken> {
		let strategy = CredentialStrategy::select(&request.credential, request.prompt)?;
		let versioned =
			request.use_versioned_endpoint.unwrap_or(self.config.use_versioned_endpoint);
		let service_url = if versioned {
			versioned_service_url(&request.service_url, &self.config.api_version)?
		} else {
			request.service_url.clone()
		};
		let (authority, resource) = self.resolve(request, &service_url).await?;
		let scopes = match strategy.client_kind() {
			Some(ClientKind::Confidential) => ScopeSet::app_default(&resource),
			_ => ScopeSet::user_impersonation(&resource),
		};
		let client = self.client_for(request, &strategy, &authority)?;
		let outcome =
			self.engine.acquire(&client, &scopes, &strategy, request.account.clone()).await?;

		self.logger.log(
			LogLevel::Information,
			&format!("Acquired a token for {resource} via the {} path.", outcome.path),
			None,
		);

		Ok(AcquiredToken {
			access_token: outcome.token.access_token,
			expires_at: outcome.token.expires_at,
			service_url,
			authority,
			resource,
			scopes: outcome.token.scopes,
			account: outcome.token.account,
			path: outcome.path,
			client,
		})
	}

	async fn resolve(
		&self,
		request: &AuthenticationRequest,
		service_url: &Url,
	) -> Result<(Url, Url)> {
		if let Some(authority) = &request.authority {
			let resource = match &request.resource {
				Some(resource) => resource.clone(),
				None => service_origin(service_url)?,
			};

			return Ok((authority.clone(), resource));
		}

		let details = self.resolver.probe(service_url, request.on_premises).await;

		match (details.authority(), details.resource()) {
			(Some(authority), Some(resource)) if details.success() => {
				let resource = request.resource.clone().unwrap_or_else(|| resource.clone());

				Ok((authority.clone(), resource))
			},
			_ => {
				let e = Error::AuthorityResolution {
					endpoint: service_url.to_string(),
					message: details.error_message().to_owned(),
				};

				self.logger.log(LogLevel::Error, "Authority discovery failed.", Some(&e));

				Err(e)
			},
		}
	}

	fn client_for(
		&self,
		request: &AuthenticationRequest,
		strategy: &CredentialStrategy,
		authority: &Url,
	) -> Result<ClientHandle> {
		if let Some(client) = request.client.as_ref().filter(|client| client.serves(strategy)) {
			return Ok(client.clone());
		}

		let (kind, credential) = match strategy {
			CredentialStrategy::External(source) =>
				return Ok(ClientHandle::External(source.clone())),
			CredentialStrategy::Application(credential) =>
				(ClientKind::Confidential, Some(credential)),
			_ => (ClientKind::Public, None),
		};
		let key = ClientKey {
			kind,
			authority: authority.as_str().trim_end_matches('/').to_owned(),
			client_id: request.client_id.clone(),
			credential: credential.map(ClientCredential::fingerprint),
			redirect_uri: match kind {
				ClientKind::Public => request.redirect_uri.as_ref().map(Url::to_string),
				ClientKind::Confidential => None,
			},
			cache_path: match kind {
				ClientKind::Public => request.durable_cache_path.clone(),
				ClientKind::Confidential => None,
			},
		};

		if let Some(client) = self.clients.lock().get(&key) {
			return Ok(client.clone());
		}

		let client = self.build_client(request, kind, credential, authority)?;

		Ok(self.clients.lock().entry(key).or_insert(client).clone())
	}

	fn build_client(
		&self,
		request: &AuthenticationRequest,
		kind: ClientKind,
		credential: Option<&ClientCredential>,
		authority: &Url,
	) -> Result<ClientHandle> {
		let cache_store: Arc<dyn CacheSerializer> = match kind {
			ClientKind::Confidential => self.memory_cache.clone(),
			ClientKind::Public => match &self.public_cache {
				Some(cache) => cache.clone(),
				None => {
					let mut options = self.config.durable_cache.clone();

					if let Some(path) = &request.durable_cache_path {
						options.path = Some(path.clone());
					}

					Arc::new(DurableCacheStore::open(&options)?)
				},
			},
		};
		let params = ClientParams {
			authority: authority.clone(),
			client_id: request.client_id.clone(),
			redirect_uri: request.redirect_uri.clone(),
			prompt: self.prompt.clone(),
			logger: self.logger.clone(),
			cache_store,
		};

		match (kind, credential) {
			(ClientKind::Confidential, Some(credential)) => {
				let provider = self.factory.confidential_client(params, credential.clone())?;

				Ok(ClientHandle::Confidential(provider))
			},
			(ClientKind::Confidential, None) => Err(ConfigError::MissingClientCredential.into()),
			(ClientKind::Public, _) => Ok(ClientHandle::Public(self.factory.public_client(params)?)),
		}
	}

	fn log_failure(&self, e: &Error) {
		self.logger.log(LogLevel::Error, "Authentication failed.", Some(e));
	}
}
impl Debug for AuthOrchestrator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthOrchestrator")
			.field("config", &self.config)
			.field("resolver", &self.resolver)
			.field("clients", &self.clients.lock().len())
			.finish()
	}
}

/// Rewrites `service_url` to the version-tagged Web API endpoint
/// `{scheme}://{host}[:port]/api/data/v{api_version}/`.
///
/// URLs already pointing at a Web API path are returned unchanged.
pub fn versioned_service_url(service_url: &Url, api_version: &str) -> Result<Url, ConfigError> {
	if service_url.path().contains("/api/data/") {
		return Ok(service_url.clone());
	}

	let origin = service_origin(service_url)?;

	origin.join(&format!("api/data/v{api_version}/")).map_err(|_| {
		ConfigError::InvalidServiceUrl {
			url: service_url.to_string(),
			reason: "the API version does not form a valid path",
		}
	})
}

fn service_origin(service_url: &Url) -> Result<Url, ConfigError> {
	if !matches!(service_url.scheme(), "http" | "https") {
		return Err(ConfigError::InvalidServiceUrl {
			url: service_url.to_string(),
			reason: "the scheme must be http or https",
		});
	}
	if service_url.host_str().is_none() {
		return Err(ConfigError::InvalidServiceUrl {
			url: service_url.to_string(),
			reason: "a host is required",
		});
	}

	let mut origin = service_url.clone();

	origin.set_path("/");
	origin.set_query(None);
	origin.set_fragment(None);

	Ok(origin)
}
