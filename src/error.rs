//! Crate-level error types shared by the resolver, caches, clients, and orchestrator.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// OAuth error codes that demand an interactive step before a token can be issued.
pub const INTERACTION_REQUIRED_CODES: [&str; 3] =
	["interaction_required", "user_password_expired", "password_required_for_managed_user"];

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Token cache persistence failure.
	#[error("{0}")]
	Cache(
		#[from]
		#[source]
		crate::cache::CacheError,
	),
	/// Local configuration problem or missing prerequisite.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The identity provider rejected the request with an OAuth error.
	#[error(transparent)]
	Service(#[from] ServiceError),

	/// Authority discovery failed, so no resource/authority pair is available.
	#[error("Unable to resolve the authority for {endpoint}: {message}")]
	AuthorityResolution {
		/// Endpoint that was probed.
		endpoint: String,
		/// Human-readable probe failure.
		message: String,
	},
	/// A silent acquisition cannot complete without user interaction.
	#[error("User interaction is required: {reason}.")]
	UiRequired {
		/// Why the silent path could not produce a token.
		reason: String,
	},
	/// The authorization redirect carried a `state` other than the one sent.
	#[error("Authorization response state does not match the request.")]
	StateMismatch,
	/// The caller-supplied external token source failed.
	#[error("External token source failed.")]
	ExternalSource {
		/// Underlying source failure.
		#[source]
		source: BoxError,
	},
}
impl Error {
	/// Returns `true` when the remote provider demands an interactive step.
	///
	/// Covers [`Error::UiRequired`] and service errors whose code is one of
	/// [`INTERACTION_REQUIRED_CODES`].
	pub fn requires_interaction(&self) -> bool {
		match self {
			Self::UiRequired { .. } => true,
			Self::Service(err) => err.requires_interaction(),
			_ => false,
		}
	}

	/// Wraps a failure reported by an external token source.
	pub fn external(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::ExternalSource { source: Box::new(src) }
	}
}

/// OAuth error response returned by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error(
	"Identity provider returned `{code}`: {}.",
	.description.as_deref().unwrap_or("no description")
)]
pub struct ServiceError {
	/// OAuth `error` code, possibly refined from an AADSTS code in the description.
	pub code: String,
	/// Raw `error` value as sent by the provider.
	pub raw_code: String,
	/// Provider-supplied `error_description`.
	pub description: Option<String>,
	/// HTTP status code, when available.
	pub status: Option<u16>,
}
impl ServiceError {
	/// Returns `true` if the code is one of [`INTERACTION_REQUIRED_CODES`].
	pub fn requires_interaction(&self) -> bool {
		INTERACTION_REQUIRED_CODES.iter().any(|code| self.code.eq_ignore_ascii_case(code))
	}
}

/// Configuration and prerequisite failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Authority or endpoint URL is invalid.
	#[error("Authority URL is invalid.")]
	InvalidAuthority {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Service URL cannot be turned into a resource or versioned endpoint.
	#[error("Service URL `{url}` cannot be used: {reason}.")]
	InvalidServiceUrl {
		/// Offending URL.
		url: String,
		/// Why it was rejected.
		reason: &'static str,
	},

	/// Application credential requested with no certificate, secret, or federated token.
	#[error("Confidential client requires a client certificate, client secret, or federated token.")]
	MissingClientCredential,
	/// Credential strategy paired with a client of the wrong kind.
	#[error("The {strategy} strategy cannot run on a {client} client.")]
	StrategyMismatch {
		/// Strategy label.
		strategy: &'static str,
		/// Client label.
		client: &'static str,
	},
	/// Username/password flow requested without a username.
	#[error("Username is required when a password is supplied.")]
	MissingUsername,
	/// Public client needs a redirect URI for interactive flows.
	#[error("A redirect URI is required for interactive and integrated flows.")]
	MissingRedirectUri,
	/// Public client needs an authorization prompt to drive interactive flows.
	#[error("No authorization prompt is configured for interactive and integrated flows.")]
	MissingPrompt,
	/// Client certificate or key could not be used.
	#[error("Client certificate is invalid: {reason}.")]
	InvalidCertificate {
		/// Why the certificate was rejected.
		reason: String,
	},
	/// Client assertion could not be signed.
	#[error("Client assertion could not be signed.")]
	AssertionSigning(#[from] jsonwebtoken::errors::Error),
	/// Federated token file could not be read.
	#[error("Federated token file `{}` could not be read.", .path.display())]
	FederatedToken {
		/// Token file path.
		path: PathBuf,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::TokenRecordBuilderError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Configuration document could not be parsed.
	#[error("Configuration could not be parsed.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or client-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint returned an ID token that does not identify an account.
	#[error("Token endpoint returned an unusable ID token.")]
	IdToken(#[from] crate::auth::IdTokenError),
	/// Token expired before it was attached to a request; refresh it first.
	#[error("Token for {resource} expired at {expires_at}.")]
	TokenExpired {
		/// Resource the token was scoped to.
		resource: String,
		/// Expiry instant.
		expires_at: OffsetDateTime,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the identity provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the identity provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
