// crates.io
use jsonwebtoken::Algorithm;
// self
use dataverse_auth::{
	_preludet::*,
	auth::ClientId,
	client::{ClientCertificate, ClientCredential},
	oauth::JWT_BEARER_ASSERTION_TYPE,
};

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/client_cert.pem");
const THUMBPRINT: &str = "hYmol6isq8AUqlEbDcOdZPKY-BGFRr6eqY3gWtSLD2g";

#[test]
fn pem_bundle_yields_the_sha256_thumbprint() {
	let certificate =
		ClientCertificate::from_pem_file(FIXTURE).expect("Certificate fixture should load.");

	assert_eq!(certificate.thumbprint(), THUMBPRINT);
}

#[test]
fn assertions_are_rs256_jwts_bound_to_the_token_endpoint() {
	let certificate =
		ClientCertificate::from_pem_file(FIXTURE).expect("Certificate fixture should load.");
	let client = ClientId::new("client-cert").expect("Client identifier fixture should be valid.");
	let token_url = Url::parse("https://login.example.test/tenant/oauth2/v2.0/token")
		.expect("Token URL fixture should parse.");
	let params = ClientCredential::Certificate(certificate)
		.assertion_params(&client, &token_url)
		.expect("Certificate assertion should sign.");

	assert_eq!(params[0].0, "client_assertion_type");
	assert_eq!(params[0].1, JWT_BEARER_ASSERTION_TYPE);
	assert_eq!(params[1].0, "client_assertion");

	let assertion = &params[1].1;
	let header = jsonwebtoken::decode_header(assertion).expect("Assertion header should decode.");

	assert_eq!(header.alg, Algorithm::RS256);
	assert_eq!(header.x5t_s256.as_deref(), Some(THUMBPRINT));
	assert_eq!(assertion.split('.').count(), 3);
}
