//! Authority and resource discovery through an unauthenticated probe.
//!
//! [`AuthorityResolver::probe`] sends a bare `GET` to the service endpoint and reads the bearer
//! challenge the service answers with. The probe never fails: every problem is folded into an
//! unsuccessful [`AuthorityDetails`] carrying a message that names the endpoint.

pub mod challenge;

pub use challenge::{BearerChallenge, ChallengeError};

// crates.io
use reqwest::{StatusCode, header::WWW_AUTHENTICATE};
// self
use crate::{
	_prelude::*,
	config::AuthConfig,
	error::ConfigError,
	http::ReqwestHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Outcome of an authority probe.
///
/// A successful value always carries both an authority and a resource; a failed one carries
/// neither and explains why in [`error_message`](Self::error_message).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorityDetails {
	authority: Option<Url>,
	resource: Option<Url>,
	error_message: String,
}
impl AuthorityDetails {
	/// Builds a successful result.
	pub fn resolved(authority: Url, resource: Url) -> Self {
		Self { authority: Some(authority), resource: Some(resource), error_message: String::new() }
	}

	/// Builds a failed result.
	pub fn failed(message: impl Into<String>) -> Self {
		Self { authority: None, resource: None, error_message: message.into() }
	}

	/// Whether discovery produced both an authority and a resource.
	pub fn success(&self) -> bool {
		self.authority.is_some() && self.resource.is_some()
	}

	/// Discovered authority.
	pub fn authority(&self) -> Option<&Url> {
		self.authority.as_ref()
	}

	/// Discovered resource in normalized URL form; a bare origin such as
	/// `https://svc.example.test` comes back as `https://svc.example.test/`.
	pub fn resource(&self) -> Option<&Url> {
		self.resource.as_ref()
	}

	/// Failure description; empty on success.
	pub fn error_message(&self) -> &str {
		&self.error_message
	}
}

/// Discovers the authority and resource protecting a service endpoint.
#[derive(Clone, Debug, Default)]
pub struct AuthorityResolver {
	http_client: ReqwestHttpClient,
}
impl AuthorityResolver {
	/// Builds a resolver whose transport honors the configured timeout and user agent.
	pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
		Ok(Self::with_http_client(ReqwestHttpClient::from_config(config)?))
	}

	/// Builds a resolver over a caller-provided transport.
	pub fn with_http_client(http_client: ReqwestHttpClient) -> Self {
		Self { http_client }
	}

	/// Probes `endpoint` and parses its bearer challenge.
	///
	/// `on_premises` tolerates malformed challenge values by moving on to the next
	/// `WWW-Authenticate` header; otherwise the first unusable value ends the probe.
	pub async fn probe(&self, endpoint: &Url, on_premises: bool) -> AuthorityDetails {
		const KIND: FlowKind = FlowKind::AuthorityProbe;

		let span = FlowSpan::new(KIND, "probe");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let details = span.instrument(self.probe_inner(endpoint, on_premises)).await;

		obs::record_flow_outcome(
			KIND,
			if details.success() { FlowOutcome::Success } else { FlowOutcome::Failure },
		);

		details
	}

	async fn probe_inner(&self, endpoint: &Url, on_premises: bool) -> AuthorityDetails {
		let response = match self.http_client.get(endpoint.clone()).send().await {
			Ok(response) => response,
			Err(e) =>
				return AuthorityDetails::failed(format!(
					"Failed to reach {endpoint} while discovering its authority: {e}"
				)),
		};
		let status = response.status();

		if matches!(status, StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST) {
			return AuthorityDetails::failed(format!(
				"Endpoint {endpoint} returned HTTP {status}; no service is reachable there."
			));
		}

		let mut last_failure = None;

		for value in response.headers().get_all(WWW_AUTHENTICATE) {
			let parsed = value
				.to_str()
				.map_err(|_| ChallengeError::NotBearer)
				.and_then(challenge::parse);

			match parsed {
				Ok(found) => return AuthorityDetails::resolved(found.authority, found.resource),
				Err(e) if on_premises => last_failure = Some(e),
				Err(e) => return challenge_failure(endpoint, status, &e),
			}
		}

		match last_failure {
			Some(e) => challenge_failure(endpoint, status, &e),
			None => AuthorityDetails::failed(format!(
				"Endpoint {endpoint} returned HTTP {status} without a bearer challenge."
			)),
		}
	}
}

fn challenge_failure(endpoint: &Url, status: StatusCode, e: &ChallengeError) -> AuthorityDetails {
	AuthorityDetails::failed(format!(
		"Endpoint {endpoint} returned HTTP {status} with an unusable challenge: {e}"
	))
}
