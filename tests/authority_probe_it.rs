// crates.io
use httpmock::prelude::*;
// self
use dataverse_auth::_preludet::*;

const CHALLENGE: &str = "Bearer authorization_uri=https://login.example.test/common/oauth2/authorize, resource_id=https://svc.example.test";

fn endpoint(server: &MockServer) -> Url {
	Url::parse(&server.url("/api")).expect("Mock service endpoint should parse successfully.")
}

#[tokio::test]
async fn unauthorized_challenge_resolves_authority_and_resource() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api");
			then.status(401).header("WWW-Authenticate", CHALLENGE);
		})
		.await;
	let details = test_authority_resolver().probe(&endpoint(&server), false).await;

	mock.assert_async().await;

	assert!(details.success(), "Probe should succeed: {}", details.error_message());
	assert_eq!(
		details.authority().map(Url::as_str),
		Some("https://login.example.test/organizations")
	);
	assert_eq!(details.resource().map(Url::as_str), Some("https://svc.example.test/"));
}

#[tokio::test]
async fn missing_endpoints_fail_without_parsing() {
	let server = MockServer::start_async().await;

	for status in [404, 400] {
		let mut mock = server
			.mock_async(|when, then| {
				when.method(GET).path("/api");
				then.status(status).header("WWW-Authenticate", CHALLENGE);
			})
			.await;
		let details = test_authority_resolver().probe(&endpoint(&server), false).await;

		assert!(!details.success());
		assert!(details.authority().is_none());
		assert!(
			details.error_message().contains(&status.to_string()),
			"Message should name the status: {}",
			details.error_message()
		);

		mock.delete_async().await;
	}
}

#[tokio::test]
async fn malformed_challenges_fail_for_online_services() {
	let server = MockServer::start_async().await;

	for challenge in [
		"BearerXXXX authorization_uri=https://login.example.test/common/oauth2/authorize",
		"Bearer",
		"Bear er authorization_uri=https://login.example.test/common/oauth2/authorize",
	] {
		let mut mock = server
			.mock_async(|when, then| {
				when.method(GET).path("/api");
				then.status(401).header("WWW-Authenticate", challenge);
			})
			.await;
		let details = test_authority_resolver().probe(&endpoint(&server), false).await;

		assert!(!details.success(), "`{challenge}` should be rejected.");
		assert!(!details.error_message().is_empty());

		mock.delete_async().await;
	}
}

#[tokio::test]
async fn missing_resource_id_is_named_in_the_message() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api");
			then.status(401).header(
				"WWW-Authenticate",
				"Bearer authorization_uri=https://login.example.test/common/oauth2/authorize",
			);
		})
		.await;
	let details = test_authority_resolver().probe(&endpoint(&server), true).await;

	assert!(!details.success());
	assert!(details.error_message().contains("resource_id"), "{}", details.error_message());
}

#[tokio::test]
async fn unreachable_hosts_report_the_endpoint() {
	let endpoint = Url::parse("http://dataverse-auth-probe.invalid/api")
		.expect("Unreachable endpoint fixture should parse.");
	let details = test_authority_resolver().probe(&endpoint, false).await;

	assert!(!details.success());
	assert!(
		details.error_message().contains("dataverse-auth-probe.invalid"),
		"Message should name the endpoint: {}",
		details.error_message()
	);
}

#[tokio::test]
async fn on_premises_discovery_skips_malformed_challenges() {
	let server = MockServer::start_async().await;

	for (on_premises, expect_success) in [(true, true), (false, false)] {
		let mut mock = server
			.mock_async(|when, then| {
				when.method(GET).path("/api");
				then.status(401)
					.header("WWW-Authenticate", "BearerXXXX junk")
					.header("WWW-Authenticate", CHALLENGE);
			})
			.await;
		let details = test_authority_resolver().probe(&endpoint(&server), on_premises).await;

		assert_eq!(details.success(), expect_success, "on_premises={on_premises}");

		if expect_success {
			assert_eq!(
				details.authority().map(Url::as_str),
				Some("https://login.example.test/organizations")
			);
			assert_eq!(details.resource().map(Url::as_str), Some("https://svc.example.test/"));
		} else {
			assert!(details.authority().is_none());
		}

		mock.delete_async().await;
	}
}
