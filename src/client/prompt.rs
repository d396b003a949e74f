//! Prompt behaviors and the authorization prompt capability behind interactive sign-in.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::ScopeSet, error::ServiceError, oauth};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Boxed future returned by [`AuthorizationPrompt`].
pub type PromptFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// How eagerly the caller is willing to show a sign-in prompt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromptBehavior {
	/// Prompt only when the identity provider needs it.
	#[default]
	Auto,
	/// Always ask for credentials.
	Always,
	/// Never show a prompt.
	Never,
	/// Re-validate the session without showing UI.
	RefreshSession,
	/// Let the user pick among signed-in accounts.
	SelectAccount,
}
impl PromptBehavior {
	/// OAuth `prompt` value, or `None` for [`PromptBehavior::Auto`].
	pub const fn to_prompt(self) -> Option<Prompt> {
		match self {
			PromptBehavior::Auto => None,
			PromptBehavior::Always => Some(Prompt::Login),
			PromptBehavior::Never | PromptBehavior::RefreshSession => Some(Prompt::NoPrompt),
			PromptBehavior::SelectAccount => Some(Prompt::SelectAccount),
		}
	}

	/// Whether an interaction-required failure may be answered with a forced prompt.
	pub const fn allows_interaction(self) -> bool {
		matches!(self, PromptBehavior::Always | PromptBehavior::Auto)
	}
}

/// OAuth `prompt` parameter values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Prompt {
	/// `login`: force credential entry.
	Login,
	/// `none`: fail rather than show UI.
	NoPrompt,
	/// `select_account`: show the account picker.
	SelectAccount,
}
impl Prompt {
	/// Wire value.
	pub const fn as_str(self) -> &'static str {
		match self {
			Prompt::Login => "login",
			Prompt::NoPrompt => "none",
			Prompt::SelectAccount => "select_account",
		}
	}
}

/// Authorization request the prompt must complete.
#[derive(Clone)]
pub struct AuthorizationSession {
	/// Opaque state value that must round-trip through the redirect.
	pub state: String,
	/// Redirect URI the provider returns to.
	pub redirect_uri: Url,
	/// Fully formed authorize URL to open.
	pub authorize_url: Url,
	/// Scopes requested.
	pub scope: ScopeSet,
	pkce_verifier: String,
}
impl AuthorizationSession {
	/// Builds a PKCE (S256) authorization request against `authorize_endpoint`.
	pub fn new(
		authorize_endpoint: &Url,
		client_id: &str,
		redirect_uri: Url,
		scope: ScopeSet,
		prompt: Option<Prompt>,
		login_hint: Option<&str>,
	) -> Self {
		let state = random_string(STATE_LEN);
		let pkce_verifier = random_string(PKCE_VERIFIER_LEN);
		let mut authorize_url = authorize_endpoint.clone();

		{
			let mut pairs = authorize_url.query_pairs_mut();

			pairs.append_pair("response_type", "code");
			pairs.append_pair("client_id", client_id);
			pairs.append_pair("redirect_uri", redirect_uri.as_str());
			pairs.append_pair("scope", &scope.normalized());
			pairs.append_pair("state", &state);
			pairs.append_pair("code_challenge", &pkce_challenge(&pkce_verifier));
			pairs.append_pair("code_challenge_method", "S256");

			if let Some(prompt) = prompt {
				pairs.append_pair("prompt", prompt.as_str());
			}
			if let Some(hint) = login_hint.filter(|hint| !hint.trim().is_empty()) {
				pairs.append_pair("login_hint", hint.trim());
			}
		}

		Self { state, redirect_uri, authorize_url, scope, pkce_verifier }
	}

	/// Checks the `state` returned by the redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		if returned_state == self.state { Ok(()) } else { Err(Error::StateMismatch) }
	}

	pub(crate) fn pkce_verifier(&self) -> &str {
		&self.pkce_verifier
	}
}
impl Debug for AuthorizationSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationSession")
			.field("state", &self.state)
			.field("redirect_uri", &self.redirect_uri)
			.field("authorize_url", &self.authorize_url)
			.finish()
	}
}

/// Code and state delivered to the redirect URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationResponse {
	/// Authorization code.
	pub code: String,
	/// Returned state.
	pub state: String,
}
impl AuthorizationResponse {
	/// Reads the redirect's query, turning `error` responses into [`ServiceError`]s.
	pub fn from_redirect(redirect: &Url) -> Result<Self> {
		let mut code = None;
		let mut state = None;
		let mut error = None;
		let mut description = None;

		for (key, value) in redirect.query_pairs() {
			match key.as_ref() {
				"code" => code = Some(value.into_owned()),
				"state" => state = Some(value.into_owned()),
				"error" => error = Some(value.into_owned()),
				"error_description" => description = Some(value.into_owned()),
				_ => {},
			}
		}

		if let Some(raw_code) = error {
			return Err(ServiceError {
				code: oauth::refine_error_code(&raw_code, description.as_deref()),
				raw_code,
				description,
				status: None,
			}
			.into());
		}

		match (code, state) {
			(Some(code), Some(state)) => Ok(Self { code, state }),
			_ => Err(Error::StateMismatch),
		}
	}
}

/// Capability that shows the authorize URL to the user (browser, embedded view, or OS
/// broker) and returns what arrived at the redirect URI.
pub trait AuthorizationPrompt
where
	Self: Send + Sync,
{
	/// Completes `session`, returning the redirect's code and state.
	fn authorize<'a>(
		&'a self,
		session: &'a AuthorizationSession,
	) -> PromptFuture<'a, AuthorizationResponse>;
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn pkce_challenge(verifier: &str) -> String {
	URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
