//! Token-acquisition clients: the [`TokenProvider`] boundary the engine talks to, the builders
//! that create providers, and the `oauth2`-backed implementation.

pub mod credential;
pub mod prompt;

mod oauth_client;

pub use credential::*;
pub use oauth_client::*;
pub use prompt::*;

// self
use crate::{
	_prelude::*,
	auth::{Account, ClientId, ScopeSet, TokenSecret},
	cache::CacheSerializer,
	obs::AuthLogger,
};

/// Boxed future returned by [`TokenProvider`] operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Public (user) or confidential (application) client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClientKind {
	/// Signs users in; cannot hold a secret.
	Public,
	/// Authenticates as itself with a certificate, secret, or federated assertion.
	Confidential,
}

/// Token handed back by a provider.
#[derive(Clone, Debug)]
pub struct TokenResult {
	/// Bearer token.
	pub access_token: TokenSecret,
	/// Expiry instant.
	pub expires_at: OffsetDateTime,
	/// Scopes the token was issued for.
	pub scopes: ScopeSet,
	/// Signed-in account; `None` for app-only tokens.
	pub account: Option<Account>,
}

/// Options for [`TokenProvider::acquire_interactive`].
#[derive(Clone, Debug, Default)]
pub struct InteractiveOptions {
	/// Prompt value sent to the identity provider.
	pub prompt: Option<Prompt>,
	/// Pre-filled sign-in name.
	pub login_hint: Option<String>,
	/// Account to re-authenticate.
	pub account: Option<Account>,
}

/// Token-acquisition capability the engine depends on.
///
/// Implementations own a token cache; every operation reads and writes it through the
/// serializer hooks attached when the provider was built.
pub trait TokenProvider
where
	Self: Send + Sync,
{
	/// Public or confidential.
	fn kind(&self) -> ClientKind;

	/// Application (client) id.
	fn client_id(&self) -> &ClientId;

	/// Authority the provider requests tokens from.
	fn authority(&self) -> &Url;

	/// Accounts present in the provider's cache.
	fn accounts(&self) -> ProviderFuture<'_, Vec<Account>>;

	/// Returns a cached or refreshed token for `account` without user interaction.
	///
	/// Fails with [`Error::UiRequired`] when only an interactive sign-in can help.
	fn acquire_silent<'a>(
		&'a self,
		scopes: &'a ScopeSet,
		account: &'a Account,
	) -> ProviderFuture<'a, TokenResult>;

	/// Signs a user in through the authorization prompt.
	fn acquire_interactive<'a>(
		&'a self,
		scopes: &'a ScopeSet,
		options: InteractiveOptions,
	) -> ProviderFuture<'a, TokenResult>;

	/// Redeems a username and password.
	fn acquire_by_username_password<'a>(
		&'a self,
		scopes: &'a ScopeSet,
		username: &'a str,
		password: &'a str,
	) -> ProviderFuture<'a, TokenResult>;

	/// Signs the operating-system identity in without showing UI.
	fn acquire_integrated<'a>(
		&'a self,
		scopes: &'a ScopeSet,
		login_hint: Option<&'a str>,
	) -> ProviderFuture<'a, TokenResult>;

	/// Acquires an app-only token with the client's own credential.
	fn acquire_for_client<'a>(&'a self, scopes: &'a ScopeSet) -> ProviderFuture<'a, TokenResult>;
}

/// Inputs shared by public and confidential client builders.
#[derive(Clone)]
pub struct ClientParams {
	/// Identity-provider authority.
	pub authority: Url,
	/// Application (client) id.
	pub client_id: ClientId,
	/// Redirect URI; public clients only.
	pub redirect_uri: Option<Url>,
	/// Prompt capability for interactive and integrated sign-in.
	pub prompt: Option<Arc<dyn AuthorizationPrompt>>,
	/// Diagnostics sink.
	pub logger: Arc<dyn AuthLogger>,
	/// Cache persistence hooks attached to the new client's token cache.
	pub cache_store: Arc<dyn CacheSerializer>,
}
impl Debug for ClientParams {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientParams")
			.field("authority", &self.authority)
			.field("client_id", &self.client_id)
			.field("redirect_uri", &self.redirect_uri)
			.field("prompt", &self.prompt.is_some())
			.finish()
	}
}

/// Builds token providers.
pub trait ClientFactory
where
	Self: Send + Sync,
{
	/// Builds a public client.
	fn public_client(&self, params: ClientParams) -> Result<Arc<dyn TokenProvider>>;

	/// Builds a confidential client bound to `credential`.
	fn confidential_client(
		&self,
		params: ClientParams,
		credential: ClientCredential,
	) -> Result<Arc<dyn TokenProvider>>;
}
