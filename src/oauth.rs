//! Token endpoint facade over the `oauth2` crate.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientSecret, EndpointNotSet, EndpointSet,
	ExtraTokenFields, HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken,
	RequestTokenError, ResourceOwnerPassword, ResourceOwnerUsername, Scope, StandardRevocableToken,
	StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	error::{ConfigError, ServiceError, TransientError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

/// `client_assertion_type` value for JWT client assertions.
pub const JWT_BEARER_ASSERTION_TYPE: &str =
	"urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

const AADSTS_PREFIX: &str = "AADSTS";

type FacadeTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;
type ConfiguredClient = oauth2::Client<
	BasicErrorResponse,
	FacadeTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type UnconfiguredClient = oauth2::Client<
	BasicErrorResponse,
	FacadeTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
>;
pub(crate) type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Grant kinds the facade performs; used to label errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GrantType {
	/// `authorization_code` with PKCE.
	AuthorizationCode,
	/// `client_credentials`.
	ClientCredentials,
	/// Resource-owner `password`.
	Password,
	/// `refresh_token`.
	RefreshToken,
}
impl GrantType {
	/// OAuth `grant_type` value.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::ClientCredentials => "client_credentials",
			GrantType::Password => "password",
			GrantType::RefreshToken => "refresh_token",
		}
	}
}

/// Extra token-response fields the engine reads.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
	/// OIDC ID token, present for user flows that requested `openid`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
}
impl ExtraTokenFields for IdTokenFields {}

/// Tokens returned by a successful grant.
#[derive(Clone)]
pub struct IssuedTokens {
	/// Access token value.
	pub access_token: String,
	/// Positive lifetime of the access token.
	pub expires_in: Duration,
	/// Refresh token, when the grant returned one.
	pub refresh_token: Option<String>,
	/// ID token, when the grant returned one.
	pub id_token: Option<String>,
}
impl Debug for IssuedTokens {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IssuedTokens")
			.field("expires_in", &self.expires_in)
			.field("refresh_token", &self.refresh_token.is_some())
			.field("id_token", &self.id_token.is_some())
			.finish()
	}
}

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	fn map_transport_error(
		&self,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(grant, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => TransientError::TokenEndpoint {
				message: format!("HTTP client error during the {} grant: {message}", grant.as_str()),
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			}
			.into(),
			_ => TransientError::TokenEndpoint {
				message: format!("HTTP client error during the {} grant", grant.as_str()),
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			}
			.into(),
		}
	}
}

pub(crate) trait OAuth2Facade {
	fn exchange_client_credentials<'a>(
		&'a self,
		scope: &'a ScopeSet,
		extra_params: &'a [(String, String)],
	) -> FacadeFuture<'a, IssuedTokens>;

	fn exchange_password<'a>(
		&'a self,
		username: &'a str,
		password: &'a str,
		scope: &'a ScopeSet,
	) -> FacadeFuture<'a, IssuedTokens>;

	fn exchange_refresh_token<'a>(
		&'a self,
		refresh_token: &'a str,
		scope: &'a ScopeSet,
	) -> FacadeFuture<'a, IssuedTokens>;

	fn exchange_authorization_code<'a>(
		&'a self,
		code: &'a str,
		pkce_verifier: &'a str,
		scope: &'a ScopeSet,
		redirect_uri: &'a Url,
	) -> FacadeFuture<'a, IssuedTokens>;
}

pub(crate) struct BasicFacade<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds a facade for `authority` (`{authority}/oauth2/v2.0/{authorize,token}`).
	pub(crate) fn for_authority(
		authority: &Url,
		client_id: &str,
		client_secret: Option<&str>,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let auth_url = AuthUrl::from_url(authority_endpoint(authority, "authorize")?);
		let token_url = TokenUrl::from_url(authority_endpoint(authority, "token")?);
		let mut oauth_client: ConfiguredClient =
			UnconfiguredClient::new(oauth2::ClientId::new(client_id.to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_auth_type(AuthType::RequestBody);

		if let Some(secret) = client_secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.to_owned()));
		}

		Ok(Self {
			oauth_client,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		})
	}

	/// Authorization endpoint the interactive flows send users to.
	pub(crate) fn authorize_url(&self) -> &Url {
		self.oauth_client.auth_uri().url()
	}

	/// Token endpoint; the audience of client assertions.
	pub(crate) fn token_url(&self) -> &Url {
		self.oauth_client.token_uri().url()
	}

	fn map_error(
		&self,
		grant: GrantType,
		meta: &ResponseMetadataSlot,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
	) -> Error {
		map_request_error(grant, meta.take(), err, self.error_mapper.as_ref())
	}
}
impl<C, M> OAuth2Facade for BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_client_credentials<'a>(
		&'a self,
		scope: &'a ScopeSet,
		extra_params: &'a [(String, String)],
	) -> FacadeFuture<'a, IssuedTokens> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let mut request = self.oauth_client.exchange_client_credentials();

			for value in scope.iter() {
				request = request.add_scope(Scope::new(value.to_owned()));
			}
			for (key, value) in extra_params {
				request = request.add_extra_param(key, value);
			}

			let response = request
				.request_async(&instrumented)
				.await
				.map_err(|err| self.map_error(GrantType::ClientCredentials, &meta, err))?;

			issued_tokens(response)
		})
	}

	fn exchange_password<'a>(
		&'a self,
		username: &'a str,
		password: &'a str,
		scope: &'a ScopeSet,
	) -> FacadeFuture<'a, IssuedTokens> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let username = ResourceOwnerUsername::new(username.to_owned());
			let password = ResourceOwnerPassword::new(password.to_owned());
			let mut request = self.oauth_client.exchange_password(&username, &password);

			for value in scope.iter() {
				request = request.add_scope(Scope::new(value.to_owned()));
			}

			let response = request
				.request_async(&instrumented)
				.await
				.map_err(|err| self.map_error(GrantType::Password, &meta, err))?;

			issued_tokens(response)
		})
	}

	fn exchange_refresh_token<'a>(
		&'a self,
		refresh_token: &'a str,
		scope: &'a ScopeSet,
	) -> FacadeFuture<'a, IssuedTokens> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.to_owned());
			let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

			for value in scope.iter() {
				request = request.add_scope(Scope::new(value.to_owned()));
			}

			let response = request
				.request_async(&instrumented)
				.await
				.map_err(|err| self.map_error(GrantType::RefreshToken, &meta, err))?;

			issued_tokens(response)
		})
	}

	fn exchange_authorization_code<'a>(
		&'a self,
		code: &'a str,
		pkce_verifier: &'a str,
		scope: &'a ScopeSet,
		redirect_uri: &'a Url,
	) -> FacadeFuture<'a, IssuedTokens> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let redirect_url = RedirectUrl::from_url(redirect_uri.clone());
			let mut request = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_owned()))
				.set_redirect_uri(Cow::Owned(redirect_url));

			if !scope.is_empty() {
				request = request.add_extra_param("scope", scope.normalized());
			}

			let response = request
				.request_async(&instrumented)
				.await
				.map_err(|err| self.map_error(GrantType::AuthorizationCode, &meta, err))?;

			issued_tokens(response)
		})
	}
}

/// Derives the OAuth refinement of an error code from the `AADSTS` code in its description.
///
/// `AADSTS50055` (expired password) becomes `user_password_expired`; the MFA and consent codes
/// `AADSTS50076`, `AADSTS50079`, `AADSTS50158`, and `AADSTS65001` become `interaction_required`.
pub fn refine_error_code(raw_code: &str, description: Option<&str>) -> String {
	let aadsts = description.and_then(|text| {
		let start = text.find(AADSTS_PREFIX)? + AADSTS_PREFIX.len();
		let digits = text[start..].chars().take_while(char::is_ascii_digit).collect::<String>();

		(!digits.is_empty()).then_some(digits)
	});

	match aadsts.as_deref() {
		Some("50055") => "user_password_expired".into(),
		Some("50076" | "50079" | "50158" | "65001") => "interaction_required".into(),
		_ => raw_code.to_owned(),
	}
}

fn authority_endpoint(authority: &Url, endpoint: &str) -> Result<Url, ConfigError> {
	let base = authority.as_str().trim_end_matches('/');

	Url::parse(&format!("{base}/oauth2/v2.0/{endpoint}"))
		.map_err(|source| ConfigError::InvalidAuthority { source })
}

fn issued_tokens(response: FacadeTokenResponse) -> Result<IssuedTokens> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	Ok(IssuedTokens {
		access_token: response.access_token().secret().to_owned(),
		expires_in: Duration::seconds(expires_in),
		refresh_token: response.refresh_token().map(|token| token.secret().to_owned()),
		id_token: response.extra_fields().id_token.clone(),
	})
}

fn map_request_error<E, M>(
	grant: GrantType,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => {
			let raw_code = response.error().as_ref().to_owned();
			let description = response.error_description().cloned();

			ServiceError {
				code: refine_error_code(&raw_code, description.as_deref()),
				raw_code,
				description,
				status: meta_status(meta_ref),
			}
			.into()
		},
		RequestTokenError::Request(error) => mapper.map_transport_error(grant, meta_ref, error),
		RequestTokenError::Parse(error, _body) =>
			TransientError::TokenResponseParse { source: error, status: meta_status(meta_ref) }
				.into(),
		RequestTokenError::Other(message) => TransientError::TokenEndpoint {
			message: format!("Unexpected {} response: {message}", grant.as_str()),
			status: meta_status(meta_ref),
			retry_after: meta_retry_after(meta_ref),
		}
		.into(),
	}
}

fn map_reqwest_error(
	grant: GrantType,
	meta: Option<&ResponseMetadata>,
	err: ReqwestError,
) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: format!("The {} request timed out", grant.as_str()),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
