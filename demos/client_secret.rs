//! Authenticates an application with a client secret against a mocked service: the authority is
//! discovered from the service's bearer challenge, and the second call is served from the memory
//! cache.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use dataverse_auth::{
	auth::ClientId,
	authority::AuthorityResolver,
	cache::MemoryCacheStore,
	client::OAuthClientFactory,
	config::AuthConfig,
	http::ReqwestHttpClient,
	orchestrator::{AuthOrchestrator, AuthenticationRequest},
	reqwest::Client,
	strategy::Credential,
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let challenge = format!(
		"Bearer authorization_uri={}, resource_id={}",
		server.url("/tenant-1/oauth2/authorize"),
		server.url("/"),
	);
	let probe_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/data/v9.2/");
			then.status(401).header("WWW-Authenticate", challenge.as_str());
		})
		.await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/tenant-1/oauth2/v2.0/token")
				.form_urlencoded_tuple("grant_type", "client_credentials");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-app-token\",\"token_type\":\"Bearer\",\"expires_in\":3599}",
			);
		})
		.await;
	let http_client = ReqwestHttpClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	);
	let orchestrator = AuthOrchestrator::new(AuthConfig::default())
		.with_resolver(AuthorityResolver::with_http_client(http_client.clone()))
		.with_client_factory(Arc::new(OAuthClientFactory::with_http_client(http_client)))
		.with_memory_cache(Arc::new(MemoryCacheStore::default()));
	let request = AuthenticationRequest::new(
		Url::parse(&server.url("/"))?,
		ClientId::new("demo-app")?,
		Credential::client_secret("super-secret"),
	);
	let token = orchestrator.authenticate(request.clone()).await?;

	println!(
		"Acquired a token for {} from {} via the {} path, expiring at {}.",
		token.resource, token.authority, token.path, token.expires_at
	);

	let again = orchestrator.authenticate(request).await?;

	println!("Second call reused the cached token: {}.", again.access_token.expose());

	probe_mock.assert_calls_async(2).await;
	token_mock.assert_async().await;

	Ok(())
}
