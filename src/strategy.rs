//! Credential shapes accepted by the orchestrator and the strategy each one selects.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	client::{ClientCertificate, ClientCredential, ClientKind, PromptBehavior, ProviderFuture},
	error::ConfigError,
};

/// Credential material carried by an authentication request.
#[derive(Clone)]
pub enum Credential {
	/// A user signing in through a public client.
	User {
		/// Sign-in name; doubles as the username of the password grant.
		login_hint: Option<String>,
		/// Password for the resource-owner grant.
		password: Option<TokenSecret>,
		/// Sign in as the operating-system identity.
		use_default_identity: bool,
	},
	/// An application authenticating as itself through a confidential client.
	Application {
		/// Certificate; wins over every other field.
		certificate: Option<ClientCertificate>,
		/// Client secret.
		secret: Option<TokenSecret>,
		/// Federated workload-identity token file.
		federated_token_file: Option<PathBuf>,
	},
	/// Tokens minted by the caller.
	External(Arc<dyn ExternalTokenSource>),
}
impl Credential {
	/// Interactive user sign-in with an optional login hint.
	pub fn interactive(login_hint: Option<String>) -> Self {
		Self::User { login_hint, password: None, use_default_identity: false }
	}

	/// Resource-owner password credentials.
	pub fn username_password(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self::User {
			login_hint: Some(username.into()),
			password: Some(TokenSecret::new(password)),
			use_default_identity: false,
		}
	}

	/// Operating-system identity.
	pub fn integrated(login_hint: Option<String>) -> Self {
		Self::User { login_hint, password: None, use_default_identity: true }
	}

	/// Client certificate.
	pub fn certificate(certificate: ClientCertificate) -> Self {
		Self::Application { certificate: Some(certificate), secret: None, federated_token_file: None }
	}

	/// Client secret.
	pub fn client_secret(secret: impl Into<String>) -> Self {
		Self::Application {
			certificate: None,
			secret: Some(TokenSecret::new(secret)),
			federated_token_file: None,
		}
	}

	/// Federated token file.
	pub fn federated_token_file(path: impl Into<PathBuf>) -> Self {
		Self::Application {
			certificate: None,
			secret: None,
			federated_token_file: Some(path.into()),
		}
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Credential::User { login_hint, password, use_default_identity } => f
				.debug_struct("User")
				.field("login_hint", login_hint)
				.field("password", &password.is_some())
				.field("use_default_identity", use_default_identity)
				.finish(),
			Credential::Application { certificate, secret, federated_token_file } => f
				.debug_struct("Application")
				.field("certificate", certificate)
				.field("secret", &secret.is_some())
				.field("federated_token_file", federated_token_file)
				.finish(),
			Credential::External(_) => f.write_str("External(..)"),
		}
	}
}

/// Token handed over by an [`ExternalTokenSource`].
#[derive(Clone, Debug)]
pub struct ExternalToken {
	/// Bearer token.
	pub access_token: TokenSecret,
	/// Expiry instant.
	pub expires_at: OffsetDateTime,
}

/// Caller-owned token minting, used instead of any identity-provider client.
pub trait ExternalTokenSource
where
	Self: Send + Sync,
{
	/// Returns a token valid for `scopes`.
	fn token<'a>(&'a self, scopes: &'a ScopeSet) -> ProviderFuture<'a, ExternalToken>;
}

/// [`ExternalTokenSource`] that always returns the same token.
#[derive(Clone, Debug)]
pub struct StaticTokenSource(pub ExternalToken);
impl ExternalTokenSource for StaticTokenSource {
	fn token<'a>(&'a self, _: &'a ScopeSet) -> ProviderFuture<'a, ExternalToken> {
		Box::pin(async move { Ok(self.0.clone()) })
	}
}

/// Acquisition family chosen from the request's credential shape.
///
/// Silent acquisition from the client cache is not selected here; the engine takes it for the
/// user strategies whenever an account is known and no prompt is demanded.
#[derive(Clone)]
pub enum CredentialStrategy {
	/// Resource-owner password grant.
	UsernamePassword {
		/// Username.
		username: String,
		/// Password.
		password: TokenSecret,
	},
	/// Operating-system identity.
	Integrated {
		/// Optional sign-in name.
		login_hint: Option<String>,
	},
	/// Interactive prompt family.
	Interactive {
		/// Optional sign-in name.
		login_hint: Option<String>,
		/// Caller's prompt behavior.
		prompt: PromptBehavior,
	},
	/// Confidential client bound to a certificate, secret, or federated token.
	Application(ClientCredential),
	/// Caller-supplied tokens.
	External(Arc<dyn ExternalTokenSource>),
}
impl CredentialStrategy {
	/// Picks the strategy for `credential` under `prompt`.
	///
	/// A password is only used while the prompt is not forced; a certificate takes precedence
	/// over a secret, and a non-blank secret over a federated token file. Fails before any
	/// network call when a required piece is missing.
	pub fn select(credential: &Credential, prompt: PromptBehavior) -> Result<Self, ConfigError> {
		match credential {
			Credential::User { login_hint, password: Some(password), use_default_identity: false }
				if prompt != PromptBehavior::Always =>
			{
				let username = login_hint
					.as_deref()
					.map(str::trim)
					.filter(|name| !name.is_empty())
					.ok_or(ConfigError::MissingUsername)?;

				Ok(Self::UsernamePassword {
					username: username.to_owned(),
					password: password.clone(),
				})
			},
			Credential::User { login_hint, use_default_identity: true, .. } =>
				Ok(Self::Integrated { login_hint: login_hint.clone() }),
			Credential::User { login_hint, .. } =>
				Ok(Self::Interactive { login_hint: login_hint.clone(), prompt }),
			Credential::Application { certificate, secret, federated_token_file } => {
				let credential = if let Some(certificate) = certificate {
					ClientCredential::Certificate(certificate.clone())
				} else if let Some(secret) = secret.as_ref().filter(|secret| !secret.is_blank()) {
					ClientCredential::Secret(secret.clone())
				} else if let Some(path) = federated_token_file {
					ClientCredential::FederatedTokenFile(path.clone())
				} else {
					return Err(ConfigError::MissingClientCredential);
				};

				Ok(Self::Application(credential))
			},
			Credential::External(source) => Ok(Self::External(source.clone())),
		}
	}

	/// Client kind the strategy runs on; `None` for external tokens.
	pub fn client_kind(&self) -> Option<ClientKind> {
		match self {
			Self::UsernamePassword { .. } | Self::Integrated { .. } | Self::Interactive { .. } =>
				Some(ClientKind::Public),
			Self::Application(_) => Some(ClientKind::Confidential),
			Self::External(_) => None,
		}
	}

	/// Sign-in name used to look up a cached account.
	pub fn login_hint(&self) -> Option<&str> {
		match self {
			Self::UsernamePassword { username, .. } => Some(username),
			Self::Integrated { login_hint } | Self::Interactive { login_hint, .. } =>
				login_hint.as_deref(),
			Self::Application(_) | Self::External(_) => None,
		}
	}

	/// Short label used in logs and errors.
	pub fn label(&self) -> &'static str {
		match self {
			Self::UsernamePassword { .. } => "username_password",
			Self::Integrated { .. } => "integrated",
			Self::Interactive { .. } => "interactive",
			Self::Application(credential) => credential.label(),
			Self::External(_) => "external",
		}
	}
}
impl Debug for CredentialStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Interactive { login_hint, prompt } => f
				.debug_struct("Interactive")
				.field("login_hint", login_hint)
				.field("prompt", prompt)
				.finish(),
			Self::UsernamePassword { username, .. } =>
				f.debug_struct("UsernamePassword").field("username", username).finish(),
			_ => f.write_str(self.label()),
		}
	}
}
