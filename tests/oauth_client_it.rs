// crates.io
use httpmock::prelude::*;
// self
use dataverse_auth::{
	_preludet::*,
	auth::{ClientId, ScopeSet, TokenSecret},
	cache::MemoryCacheStore,
	client::{ClientCredential, ClientParams, OAuthClient, TokenProvider},
	config::AuthConfig,
	obs::NoopLogger,
};

const CLIENT_ID: &str = "51f81489-12ee-4a9e-aaae-a2591f45987d";
const RESOURCE_SCOPE: &str = "https://org.example.test/user_impersonation";
// Payload: {"oid":"oid-1","tid":"tid-1","preferred_username":"ada@contoso.test"}
const ID_TOKEN: &str = "eyJhbGciOiJub25lIn0.eyJvaWQiOiJvaWQtMSIsInRpZCI6InRpZC0xIiwicHJlZmVycmVkX3VzZXJuYW1lIjoiYWRhQGNvbnRvc28udGVzdCJ9.sig";
const TOKEN_PATH: &str = "/tenant-1/oauth2/v2.0/token";

fn params(server: &MockServer, cache: Arc<MemoryCacheStore>) -> ClientParams {
	ClientParams {
		authority: Url::parse(&server.url("/tenant-1"))
			.expect("Mock authority should parse successfully."),
		client_id: ClientId::new(CLIENT_ID).expect("Client identifier fixture should be valid."),
		redirect_uri: None,
		prompt: None,
		logger: Arc::new(NoopLogger),
		cache_store: cache,
	}
}

fn memory_cache() -> Arc<MemoryCacheStore> {
	Arc::new(MemoryCacheStore::with_config(&AuthConfig::default()))
}

fn user_scopes() -> ScopeSet {
	ScopeSet::new([RESOURCE_SCOPE]).expect("User scope fixture should be valid.")
}

fn password_body(expires_in: u32) -> String {
	format!(
		"{{\"access_token\":\"password-token\",\"refresh_token\":\"refresh-1\",\"id_token\":\"{ID_TOKEN}\",\"token_type\":\"Bearer\",\"expires_in\":{expires_in}}}"
	)
}

#[tokio::test]
async fn client_credentials_are_served_from_the_memory_cache() {
	let server = MockServer::start_async().await;
	let cache = memory_cache();
	let client = OAuthClient::confidential(
		params(&server, cache.clone()),
		ClientCredential::Secret(TokenSecret::new("s3cret")),
		test_reqwest_http_client(),
	)
	.expect("Confidential client should build.");
	let scopes = ScopeSet::new(["https://org.example.test/.default"])
		.expect("App scope fixture should be valid.");
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "client_credentials")
				.form_urlencoded_tuple("client_secret", "s3cret");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"app-token\",\"token_type\":\"Bearer\",\"expires_in\":3599}",
			);
		})
		.await;
	let first =
		client.acquire_for_client(&scopes).await.expect("First client acquisition should succeed.");
	let second =
		client.acquire_for_client(&scopes).await.expect("Cached client acquisition should succeed.");

	assert_eq!(first.access_token.expose(), "app-token");
	assert_eq!(second.access_token.expose(), "app-token");
	assert!(first.account.is_none());

	mock.assert_calls_async(1).await;

	assert!(cache.get(&format!("{CLIENT_ID}_AppTokenCache")).is_some());
}

#[tokio::test]
async fn password_grant_discovers_the_account_and_then_goes_silent() {
	let server = MockServer::start_async().await;
	let client = OAuthClient::public(params(&server, memory_cache()), test_reqwest_http_client())
		.expect("Public client should build.");
	let scopes = user_scopes();
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).form_urlencoded_tuple("grant_type", "password");
			then.status(200).header("content-type", "application/json").body(password_body(3600));
		})
		.await;
	let first = client
		.acquire_by_username_password(&scopes, "ada@contoso.test", "pw")
		.await
		.expect("Password grant should succeed.");
	let account = first.account.clone().expect("ID token should yield an account.");

	assert_eq!(account.username, "ada@contoso.test");
	assert_eq!(account.home_account_id.as_ref(), "oid-1.tid-1");
	assert_eq!(
		client.accounts().await.expect("Accounts should be readable."),
		vec![account.clone()]
	);

	let silent =
		client.acquire_silent(&scopes, &account).await.expect("Silent acquisition should succeed.");

	assert_eq!(silent.access_token.expose(), "password-token");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn silent_acquisition_redeems_the_refresh_token_near_expiry() {
	let server = MockServer::start_async().await;
	let client = OAuthClient::public(params(&server, memory_cache()), test_reqwest_http_client())
		.expect("Public client should build.");
	let scopes = user_scopes();
	let password = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).form_urlencoded_tuple("grant_type", "password");
			then.status(200).header("content-type", "application/json").body(password_body(60));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", "refresh-1");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"refreshed-token\",\"refresh_token\":\"refresh-2\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let first = client
		.acquire_by_username_password(&scopes, "ada@contoso.test", "pw")
		.await
		.expect("Password grant should succeed.");
	let account = first.account.expect("ID token should yield an account.");
	let refreshed =
		client.acquire_silent(&scopes, &account).await.expect("Refresh should succeed.");

	assert_eq!(refreshed.access_token.expose(), "refreshed-token");
	assert_eq!(refreshed.account.as_ref(), Some(&account));

	password.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;
}

#[tokio::test]
async fn rejected_refresh_tokens_require_interaction() {
	let server = MockServer::start_async().await;
	let client = OAuthClient::public(params(&server, memory_cache()), test_reqwest_http_client())
		.expect("Public client should build.");
	let scopes = user_scopes();
	let _password = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).form_urlencoded_tuple("grant_type", "password");
			then.status(200).header("content-type", "application/json").body(password_body(30));
		})
		.await;
	let _refresh = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).form_urlencoded_tuple("grant_type", "refresh_token");
			then.status(400).header("content-type", "application/json").body(
				"{\"error\":\"invalid_grant\",\"error_description\":\"AADSTS70008: The refresh token has expired.\"}",
			);
		})
		.await;
	let account = client
		.acquire_by_username_password(&scopes, "ada@contoso.test", "pw")
		.await
		.expect("Password grant should succeed.")
		.account
		.expect("ID token should yield an account.");
	let err = client
		.acquire_silent(&scopes, &account)
		.await
		.expect_err("Expired refresh token should fail.");

	assert!(matches!(err, Error::UiRequired { .. }));
	assert!(err.requires_interaction());
}

#[tokio::test]
async fn mfa_errors_are_refined_to_interaction_required() {
	let server = MockServer::start_async().await;
	let client = OAuthClient::public(params(&server, memory_cache()), test_reqwest_http_client())
		.expect("Public client should build.");
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(400).header("content-type", "application/json").body(
				"{\"error\":\"invalid_grant\",\"error_description\":\"AADSTS50076: Due to a configuration change you must use multi-factor authentication.\"}",
			);
		})
		.await;
	let err = client
		.acquire_by_username_password(&user_scopes(), "ada@contoso.test", "pw")
		.await
		.expect_err("MFA-protected account should fail the password grant.");

	match &err {
		Error::Service(service) => {
			assert_eq!(service.code, "interaction_required");
			assert_eq!(service.raw_code, "invalid_grant");
			assert_eq!(service.status, Some(400));
		},
		other => panic!("Expected a service error, got {other:?}."),
	}

	assert!(err.requires_interaction());
}

#[tokio::test]
async fn oversized_expires_in_is_rejected_without_caching() {
	let server = MockServer::start_async().await;
	let cache = memory_cache();
	let client = OAuthClient::confidential(
		params(&server, cache.clone()),
		ClientCredential::Secret(TokenSecret::new("s3cret")),
		test_reqwest_http_client(),
	)
	.expect("Confidential client should build.");
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"app-token\",\"token_type\":\"Bearer\",\"expires_in\":1000000000000000}",
			);
		})
		.await;
	let scopes = ScopeSet::new(["https://org.example.test/.default"])
		.expect("App scope fixture should be valid.");
	let err = client
		.acquire_for_client(&scopes)
		.await
		.expect_err("An unrepresentable expiry should fail the acquisition.");

	assert!(matches!(
		err,
		Error::Config(dataverse_auth::error::ConfigError::TokenBuild(
			dataverse_auth::auth::TokenRecordBuilderError::ExpiryOutOfRange
		))
	));
	assert!(cache.get(&format!("{CLIENT_ID}_AppTokenCache")).is_none());
}

#[tokio::test]
async fn public_clients_cannot_acquire_app_tokens() {
	let server = MockServer::start_async().await;
	let client = OAuthClient::public(params(&server, memory_cache()), test_reqwest_http_client())
		.expect("Public client should build.");
	let err = client
		.acquire_for_client(&user_scopes())
		.await
		.expect_err("Public clients hold no credential.");

	assert!(matches!(
		err,
		Error::Config(dataverse_auth::error::ConfigError::MissingClientCredential)
	));
}
