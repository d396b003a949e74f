// self
use crate::{
	_prelude::*,
	auth::{Account, ClientId, IdTokenClaims, ScopeSet, TokenRecord, TokenSecret},
	cache::{CacheKind, TokenCache, TokenWrite},
	client::{
		AuthorizationPrompt, AuthorizationSession, ClientCredential, ClientFactory, ClientKind,
		ClientParams, InteractiveOptions, Prompt, ProviderFuture, TokenProvider, TokenResult,
	},
	config::AuthConfig,
	error::{ConfigError, TransientError},
	http::ReqwestHttpClient,
	oauth::{BasicFacade, IssuedTokens, OAuth2Facade, ReqwestTransportErrorMapper},
	obs::{self, AuthLogger, FlowKind, FlowOutcome, FlowSpan, LogLevel},
};

/// Cached access tokens closer than this to expiry are refreshed instead of reused.
pub const REFRESH_WINDOW: Duration = Duration::minutes(5);

/// [`TokenProvider`] over the `oauth2` crate against a v2.0 identity-provider authority.
pub struct OAuthClient {
	kind: ClientKind,
	client_id: ClientId,
	authority: Url,
	token_url: Url,
	redirect_uri: Option<Url>,
	prompt: Option<Arc<dyn AuthorizationPrompt>>,
	credential: Option<ClientCredential>,
	facade: BasicFacade,
	cache: TokenCache,
	logger: Arc<dyn AuthLogger>,
}
impl OAuthClient {
	/// Builds a public client; its cache uses the user-cache key.
	pub fn public(params: ClientParams, http_client: ReqwestHttpClient) -> Result<Self> {
		Self::build(ClientKind::Public, params, None, http_client)
	}

	/// Builds a confidential client bound to `credential`; its cache uses the app-cache key.
	pub fn confidential(
		params: ClientParams,
		credential: ClientCredential,
		http_client: ReqwestHttpClient,
	) -> Result<Self> {
		Self::build(ClientKind::Confidential, params, Some(credential), http_client)
	}

	/// The client's token cache.
	pub fn token_cache(&self) -> &TokenCache {
		&self.cache
	}

	fn build(
		kind: ClientKind,
		params: ClientParams,
		credential: Option<ClientCredential>,
		http_client: ReqwestHttpClient,
	) -> Result<Self> {
		let ClientParams { authority, client_id, redirect_uri, prompt, logger, cache_store } =
			params;
		let secret =
			credential.as_ref().and_then(ClientCredential::secret).map(TokenSecret::expose);
		let facade = <BasicFacade>::for_authority(
			&authority,
			&client_id,
			secret,
			Arc::new(http_client),
			Arc::new(ReqwestTransportErrorMapper),
		)?;
		let token_url = facade.token_url().clone();
		let cache_kind = match kind {
			ClientKind::Public => CacheKind::User,
			ClientKind::Confidential => CacheKind::App,
		};
		let cache = TokenCache::new(client_id.clone(), cache_kind);

		cache.set_serializer(cache_store);

		Ok(Self {
			kind,
			client_id,
			authority,
			token_url,
			redirect_uri,
			prompt,
			credential,
			facade,
			cache,
			logger,
		})
	}

	fn environment(&self) -> &str {
		self.authority.host_str().unwrap_or_default()
	}

	async fn cached(
		&self,
		account: Option<&Account>,
		scopes: &ScopeSet,
	) -> Result<Option<TokenResult>> {
		let record = self
			.cache
			.find_access_token(account.map(|account| &account.home_account_id), scopes)
			.await?
			.filter(|record| record.is_fresh_at(OffsetDateTime::now_utc(), REFRESH_WINDOW));

		Ok(record.map(|record| TokenResult {
			access_token: record.access_token,
			expires_at: record.expires_at,
			scopes: record.scope,
			account: account.cloned(),
		}))
	}

	async fn store(
		&self,
		issued: IssuedTokens,
		scopes: &ScopeSet,
		username_hint: Option<&str>,
		known_account: Option<&Account>,
	) -> Result<TokenResult> {
		let account = match &issued.id_token {
			Some(id_token) => Some(
				IdTokenClaims::decode(id_token)
					.and_then(|claims| claims.into_account(self.environment(), username_hint))
					.map_err(TransientError::from)?,
			),
			None => known_account.cloned(),
		};
		let record = TokenRecord::builder(
			account.as_ref().map(|account| account.home_account_id.clone()),
			scopes.without_reserved(),
		)
		.access_token(issued.access_token)
		.issued_at(OffsetDateTime::now_utc())
		.expires_in(issued.expires_in)
		.build()
		.map_err(ConfigError::from)?;

		self.cache
			.save(TokenWrite {
				record: record.clone(),
				account: account.clone(),
				refresh_token: issued.refresh_token.map(TokenSecret::new),
			})
			.await?;

		Ok(TokenResult {
			access_token: record.access_token,
			expires_at: record.expires_at,
			scopes: record.scope,
			account,
		})
	}

	async fn authorize(
		&self,
		scopes: &ScopeSet,
		prompt: Option<Prompt>,
		login_hint: Option<&str>,
	) -> Result<TokenResult> {
		let redirect_uri = self.redirect_uri.clone().ok_or(ConfigError::MissingRedirectUri)?;
		let capability = self.prompt.as_ref().ok_or(ConfigError::MissingPrompt)?;
		let requested = scopes.with_reserved();
		let session = AuthorizationSession::new(
			self.facade.authorize_url(),
			&self.client_id,
			redirect_uri,
			requested.clone(),
			prompt,
			login_hint,
		);
		let response = capability.authorize(&session).await?;

		session.validate_state(&response.state)?;

		let issued = self
			.facade
			.exchange_authorization_code(
				&response.code,
				session.pkce_verifier(),
				&requested,
				&session.redirect_uri,
			)
			.await?;

		self.store(issued, scopes, login_hint, None).await
	}

	async fn observe<T>(
		&self,
		kind: FlowKind,
		stage: &'static str,
		fut: impl Future<Output = Result<T>>,
	) -> Result<T> {
		let span = FlowSpan::new(kind, stage);

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let result = span.instrument(fut).await;

		obs::record_result(kind, &result);

		if let Err(e) = &result {
			self.logger.log(
				LogLevel::Verbose,
				&format!("{} acquisition for client {} failed.", kind, self.client_id),
				Some(e),
			);
		}

		result
	}
}
impl TokenProvider for OAuthClient {
	fn kind(&self) -> ClientKind {
		self.kind
	}

	fn client_id(&self) -> &ClientId {
		&self.client_id
	}

	fn authority(&self) -> &Url {
		&self.authority
	}

	fn accounts(&self) -> ProviderFuture<'_, Vec<Account>> {
		Box::pin(async move { Ok(self.cache.accounts().await?) })
	}

	fn acquire_silent<'a>(
		&'a self,
		scopes: &'a ScopeSet,
		account: &'a Account,
	) -> ProviderFuture<'a, TokenResult> {
		Box::pin(self.observe(FlowKind::Silent, "acquire_silent", async move {
			if let Some(cached) = self.cached(Some(account), scopes).await? {
				return Ok(cached);
			}

			let refresh = self.cache.refresh_token(&account.home_account_id).await?.ok_or_else(
				|| Error::UiRequired { reason: format!("no refresh token for {}", account.username) },
			)?;
			let issued = match self
				.facade
				.exchange_refresh_token(refresh.expose(), &scopes.with_reserved())
				.await
			{
				Ok(issued) => issued,
				Err(Error::Service(e)) if e.code == "invalid_grant" =>
					return Err(Error::UiRequired { reason: e.to_string() }),
				Err(e) => return Err(e),
			};

			self.store(issued, scopes, Some(&account.username), Some(account)).await
		}))
	}

	fn acquire_interactive<'a>(
		&'a self,
		scopes: &'a ScopeSet,
		options: InteractiveOptions,
	) -> ProviderFuture<'a, TokenResult> {
		Box::pin(self.observe(FlowKind::Interactive, "acquire_interactive", async move {
			let hint = options
				.login_hint
				.or_else(|| options.account.map(|account| account.username));

			self.authorize(scopes, options.prompt, hint.as_deref()).await
		}))
	}

	fn acquire_by_username_password<'a>(
		&'a self,
		scopes: &'a ScopeSet,
		username: &'a str,
		password: &'a str,
	) -> ProviderFuture<'a, TokenResult> {
		let flow = async move {
			let issued =
				self.facade.exchange_password(username, password, &scopes.with_reserved()).await?;

			self.store(issued, scopes, Some(username), None).await
		};

		Box::pin(self.observe(FlowKind::UsernamePassword, "acquire_by_username_password", flow))
	}

	fn acquire_integrated<'a>(
		&'a self,
		scopes: &'a ScopeSet,
		login_hint: Option<&'a str>,
	) -> ProviderFuture<'a, TokenResult> {
		Box::pin(self.observe(FlowKind::Integrated, "acquire_integrated", async move {
			self.authorize(scopes, Some(Prompt::NoPrompt), login_hint).await
		}))
	}

	fn acquire_for_client<'a>(&'a self, scopes: &'a ScopeSet) -> ProviderFuture<'a, TokenResult> {
		Box::pin(self.observe(FlowKind::Client, "acquire_for_client", async move {
			let credential = self.credential.as_ref().ok_or(ConfigError::MissingClientCredential)?;

			if let Some(cached) = self.cached(None, scopes).await? {
				return Ok(cached);
			}

			let params = credential.assertion_params(&self.client_id, &self.token_url)?;
			let issued = self.facade.exchange_client_credentials(scopes, &params).await?;

			self.store(issued, scopes, None, None).await
		}))
	}
}
impl Debug for OAuthClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthClient")
			.field("kind", &self.kind)
			.field("client_id", &self.client_id)
			.field("authority", &self.authority)
			.field("credential", &self.credential.as_ref().map(ClientCredential::label))
			.field("cache", &self.cache)
			.finish()
	}
}

/// [`ClientFactory`] producing [`OAuthClient`]s over one shared transport.
#[derive(Clone, Debug, Default)]
pub struct OAuthClientFactory {
	http_client: ReqwestHttpClient,
}
impl OAuthClientFactory {
	/// Builds a factory whose transport honors the configured timeout and user agent.
	pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
		Ok(Self::with_http_client(ReqwestHttpClient::from_config(config)?))
	}

	/// Builds a factory over a caller-provided transport.
	pub fn with_http_client(http_client: ReqwestHttpClient) -> Self {
		Self { http_client }
	}
}
impl ClientFactory for OAuthClientFactory {
	fn public_client(&self, params: ClientParams) -> Result<Arc<dyn TokenProvider>> {
		Ok(Arc::new(OAuthClient::public(params, self.http_client.clone())?))
	}

	fn confidential_client(
		&self,
		params: ClientParams,
		credential: ClientCredential,
	) -> Result<Arc<dyn TokenProvider>> {
		Ok(Arc::new(OAuthClient::confidential(params, credential, self.http_client.clone())?))
	}
}
